//! Test registry.
//!
//! An ordered list of named test bodies, filled by an explicit registration
//! pass before the run starts. Declaration order is run order.

use crate::error::HarnessError;

/// A named, argument-less test body.
#[derive(Debug, Clone, Copy)]
pub struct TestCase {
    pub name: &'static str,
    pub body: fn(),
}

/// Ordered collection of [`TestCase`]s.
#[derive(Debug, Default)]
pub struct Registry {
    cases: Vec<TestCase>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a test. Names must be non-empty and unique.
    pub fn register(&mut self, name: &'static str, body: fn()) -> Result<(), HarnessError> {
        if name.is_empty() {
            return Err(HarnessError::EmptyTestName);
        }
        if self.get(name).is_some() {
            return Err(HarnessError::DuplicateTest(name.to_string()));
        }
        self.cases.push(TestCase { name, body });
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TestCase> {
        self.cases.iter().find(|case| case.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestCase> {
        self.cases.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a TestCase;
    type IntoIter = std::slice::Iter<'a, TestCase>;

    fn into_iter(self) -> Self::IntoIter {
        self.cases.iter()
    }
}

/// Register functions under their own names, in the order listed.
///
/// Expands to `?`-propagating calls, so use it inside a function returning
/// `Result<_, HarnessError>`.
#[macro_export]
macro_rules! register_tests {
    ($registry:expr, [$($test:path),* $(,)?]) => {
        $(
            $registry.register(
                {
                    let path = stringify!($test);
                    match path.rfind("::") {
                        Some(idx) => path[idx + 2..].trim(),
                        None => path,
                    }
                },
                $test,
            )?;
        )*
    };
}
