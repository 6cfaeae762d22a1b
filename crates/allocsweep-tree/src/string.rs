//! UTF-8 string stored in a block from the allocation functions.

use std::fmt;

use crate::error::TreeError;
use crate::memory::RawBlock;

/// Immutable UTF-8 text. The empty string owns no block.
#[derive(Default)]
pub struct HookString {
    block: Option<RawBlock>,
    len: usize,
}

impl HookString {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            block: None,
            len: 0,
        }
    }

    /// Copy `text` into a fresh block.
    pub fn try_from_str(text: &str) -> Result<Self, TreeError> {
        Self::try_filled(text.len(), |buf| buf.copy_from_slice(text.as_bytes()))
    }

    /// Decode the body of a quoted string whose escapes are already known to
    /// be valid.
    pub(crate) fn try_unescape(raw: &str, decoded_len: usize) -> Result<Self, TreeError> {
        Self::try_filled(decoded_len, |buf| {
            let mut at = 0;
            let mut chars = raw.chars();
            while let Some(c) = chars.next() {
                let c = if c == '\\' {
                    chars.next().and_then(unescape).unwrap_or(c)
                } else {
                    c
                };
                at += c.encode_utf8(&mut buf[at..]).len();
            }
            debug_assert_eq!(at, buf.len());
        })
    }

    pub fn try_clone(&self) -> Result<Self, TreeError> {
        Self::try_from_str(self.as_str())
    }

    /// Allocate `len` bytes and let `fill` write all of them as UTF-8.
    fn try_filled(len: usize, fill: impl FnOnce(&mut [u8])) -> Result<Self, TreeError> {
        if len == 0 {
            return Ok(Self::new());
        }
        let block = RawBlock::allocate(len)?;
        // SAFETY: the block is `len` bytes, freshly allocated and unaliased.
        let buf = unsafe { std::slice::from_raw_parts_mut(block.as_ptr(), len) };
        buf.fill(0);
        fill(buf);
        Ok(Self {
            block: Some(block),
            len,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match &self.block {
            None => "",
            // SAFETY: the block holds `len` bytes written as UTF-8 by
            // `try_filled` and never mutated afterwards.
            Some(block) => unsafe {
                std::str::from_utf8_unchecked(std::slice::from_raw_parts(block.as_ptr(), self.len))
            },
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Character produced by the escape `\c`, if `c` names one.
pub(crate) fn unescape(c: char) -> Option<char> {
    match c {
        '"' => Some('"'),
        '\\' => Some('\\'),
        'n' => Some('\n'),
        't' => Some('\t'),
        _ => None,
    }
}

/// Escape sequence for `c` inside a quoted string, if it needs one.
pub(crate) fn escape(c: char) -> Option<&'static str> {
    match c {
        '"' => Some("\\\""),
        '\\' => Some("\\\\"),
        '\n' => Some("\\n"),
        '\t' => Some("\\t"),
        _ => None,
    }
}

impl fmt::Debug for HookString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for HookString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq<str> for HookString {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for HookString {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}
