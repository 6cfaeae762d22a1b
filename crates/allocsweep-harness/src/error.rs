//! Harness setup and I/O errors.
//!
//! Test failures are never reported through this type; they are data
//! ([`crate::driver::FailureKind`]) tallied by the driver.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("test name must not be empty")]
    EmptyTestName,
    #[error("test '{0}' is already registered")]
    DuplicateTest(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
