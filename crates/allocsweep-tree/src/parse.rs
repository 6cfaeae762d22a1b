//! Reader for the parenthesized text form.

use crate::document::{Document, NodeId};
use crate::error::{ParseErrorKind, TreeError};
use crate::string::{HookString, unescape};

/// Characters that may appear in a node name.
pub(crate) fn is_name_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '"' | ';' | '\\')
}

struct Reader<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn error(&self, kind: ParseErrorKind) -> TreeError {
        TreeError::Parse {
            offset: self.pos,
            kind,
        }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    /// Skip whitespace and `;` comments.
    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c == ';' {
                self.pos = self.text[self.pos..]
                    .find('\n')
                    .map_or(self.text.len(), |end| self.pos + end);
            } else if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn name(&mut self) -> Result<&'a str, TreeError> {
        let start = self.pos;
        let rest = &self.text[start..];
        let len = rest.find(|c: char| !is_name_char(c)).unwrap_or(rest.len());
        if len == 0 {
            return Err(match self.peek() {
                None => self.error(ParseErrorKind::UnexpectedEnd),
                Some(_) => self.error(ParseErrorKind::MissingName),
            });
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    /// Read a quoted string starting at the opening quote.
    fn string(&mut self) -> Result<HookString, TreeError> {
        self.pos += 1;
        let start = self.pos;
        let mut decoded_len = 0;
        let mut chars = self.text[start..].char_indices();
        while let Some((at, c)) = chars.next() {
            match c {
                '"' => {
                    let raw = &self.text[start..start + at];
                    self.pos = start + at + 1;
                    return HookString::try_unescape(raw, decoded_len);
                }
                '\\' => match chars.next() {
                    Some((_, named)) => match unescape(named) {
                        Some(decoded) => decoded_len += decoded.len_utf8(),
                        None => {
                            self.pos = start + at;
                            return Err(self.error(ParseErrorKind::InvalidEscape(named)));
                        }
                    },
                    None => break,
                },
                _ => decoded_len += c.len_utf8(),
            }
        }
        self.pos = self.text.len();
        Err(self.error(ParseErrorKind::UnterminatedString))
    }
}

/// Append every node in `text` under the root of `doc`.
pub(crate) fn parse_into(doc: &mut Document, text: &str) -> Result<(), TreeError> {
    let mut reader = Reader { text, pos: 0 };
    let mut current = NodeId::ROOT;
    let mut expect_value = false;
    loop {
        reader.skip_trivia();
        let Some(c) = reader.peek() else {
            break;
        };
        match c {
            '(' => {
                reader.pos += 1;
                reader.skip_trivia();
                let name = reader.name()?;
                current = doc.append_child(current, name)?;
                expect_value = true;
            }
            ')' if current != NodeId::ROOT => {
                reader.pos += 1;
                current = doc.parent(current).unwrap_or(NodeId::ROOT);
                expect_value = false;
            }
            '"' if expect_value => {
                let value = reader.string()?;
                doc.set_value_string(current, value)?;
                expect_value = false;
            }
            '"' if current != NodeId::ROOT => {
                return Err(reader.error(ParseErrorKind::MisplacedValue));
            }
            other => return Err(reader.error(ParseErrorKind::UnexpectedChar(other))),
        }
    }
    if current != NodeId::ROOT {
        return Err(reader.error(ParseErrorKind::UnexpectedEnd));
    }
    Ok(())
}
