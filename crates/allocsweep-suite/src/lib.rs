//! # allocsweep-suite
//!
//! Allocation-failure tests for `allocsweep-tree`. Every test is registered
//! with the harness and run twice when it refuses an allocation: once with
//! allocation functions that return null and once with ones that unwind.

pub mod cases;
pub mod host;

use allocsweep_harness::{HarnessError, Registry};

pub use host::TreeHost;

/// Register every suite test, grouped by area, in a fixed order.
pub fn register_all(registry: &mut Registry) -> Result<(), HarnessError> {
    cases::document::register(registry)?;
    cases::parse::register(registry)?;
    cases::file::register(registry)?;
    Ok(())
}

/// A registry holding the full suite.
pub fn registry() -> Result<Registry, HarnessError> {
    let mut registry = Registry::new();
    register_all(&mut registry)?;
    Ok(registry)
}
