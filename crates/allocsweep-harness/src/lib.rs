//! Allocation fault-injection harness.
//!
//! This crate provides:
//! - A tracked heap: live byte/allocation counters over a real allocator
//! - A fault injector that refuses allocations past a cumulative-bytes threshold
//! - Two installable allocator variants: return-null and raise-on-failure
//! - Failure capture: `check!` style assertions that abort only the current test
//! - An ordered test registry and the driver that runs, classifies and replays tests
//! - Structured JSONL logging of every sub-test outcome

pub mod capture;
pub mod config;
pub mod driver;
pub mod error;
#[allow(unsafe_code)]
pub mod fault;
#[allow(unsafe_code)]
pub mod heap;
pub mod host;
pub mod registry;
pub mod structured_log;

pub use capture::{Outcome, fail, run_guarded};
pub use config::HarnessConfig;
pub use driver::{Driver, FailureKind, RunSummary, SubTestReport, Verdict};
pub use error::HarnessError;
pub use fault::{AllocFailure, AllocatorVariant, FaultInjector, HeapSnapshot, TrackedHeap};
pub use heap::{AllocationTracker, RawHeap, SystemHeap};
pub use host::{AllocateFn, AllocatorHooks, AllocatorHost, DeallocateFn, HookSlot, InstalledHooks};
pub use registry::{Registry, TestCase};
