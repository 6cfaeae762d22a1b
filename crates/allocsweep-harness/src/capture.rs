//! Failure capture.
//!
//! A failed check inside a test body must stop that test, and only that
//! test, no matter how deep in the call stack it happens. [`fail`] unwinds
//! with a [`CheckFailure`] payload and [`run_guarded`] is the capture point
//! that turns the unwind back into an [`Outcome`].
//!
//! One capture point is armed at a time, re-armed by every [`run_guarded`]
//! call and consumed by the first [`fail`]. The slot is per thread: an
//! unwind can only be caught on the thread that raised it.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};

use crate::fault::AllocFailure;

thread_local! {
    static ARMED: Cell<bool> = const { Cell::new(false) };
}

/// Unwind payload carried from [`fail`] to [`run_guarded`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFailure {
    pub message: String,
}

/// How a guarded test body ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Returned normally.
    Completed,
    /// Escaped through [`fail`].
    Failed(String),
    /// A raising allocator's refusal propagated out of the body.
    AllocationUnwound { size: usize },
    /// Panicked with a string message.
    Panicked(String),
    /// Unwound with a payload nobody recognizes.
    Unknown,
}

/// Whether a capture point is currently armed.
#[must_use]
pub fn is_armed() -> bool {
    ARMED.get()
}

/// Abort the running test with `message`.
///
/// Outside [`run_guarded`] (e.g. a plain `#[test]`) this is an ordinary
/// panic so the message still reaches the test runner.
pub fn fail(message: impl Into<String>) -> ! {
    let message = message.into();
    if ARMED.replace(false) {
        panic::resume_unwind(Box::new(CheckFailure { message }));
    }
    panic!("{message}");
}

/// Arm the capture point, run `body`, and report how it ended.
pub fn run_guarded(body: impl FnOnce()) -> Outcome {
    ARMED.set(true);
    let result = panic::catch_unwind(AssertUnwindSafe(body));
    ARMED.set(false);
    match result {
        Ok(()) => Outcome::Completed,
        Err(payload) => classify(payload),
    }
}

fn classify(payload: Box<dyn Any + Send>) -> Outcome {
    let payload = match payload.downcast::<CheckFailure>() {
        Ok(failure) => return Outcome::Failed(failure.message),
        Err(payload) => payload,
    };
    if let Some(failure) = payload.downcast_ref::<AllocFailure>() {
        return Outcome::AllocationUnwound { size: failure.size };
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return Outcome::Panicked(message.clone());
    }
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        return Outcome::Panicked((*message).to_string());
    }
    Outcome::Unknown
}

/// Fail the running test unless `cond` holds.
#[macro_export]
macro_rules! check {
    ($cond:expr $(,)?) => {
        if !$cond {
            $crate::capture::fail(format!(
                "{} is false at {}:{}",
                stringify!($cond),
                file!(),
                line!()
            ));
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::capture::fail(format!($($arg)+));
        }
    };
}

/// Fail the running test unless both sides compare equal.
#[macro_export]
macro_rules! check_eq {
    ($left:expr, $right:expr $(,)?) => {
        match (&$left, &$right) {
            (left, right) => {
                if !(*left == *right) {
                    $crate::capture::fail(format!(
                        "{} == {} is false (left: {:?}, right: {:?}) at {}:{}",
                        stringify!($left),
                        stringify!($right),
                        left,
                        right,
                        file!(),
                        line!()
                    ));
                }
            }
        }
    };
}

/// Run the block and require that it had an allocation refused.
///
/// The refusal is acknowledged, so the driver does not report it as an
/// unguarded fault.
#[macro_export]
macro_rules! check_alloc_fail {
    ($($body:tt)*) => {{
        $crate::check!(
            !$crate::fault::fault_pending(),
            "allocation failure already pending at {}:{}",
            file!(),
            line!()
        );
        let _ = { $($body)* };
        $crate::check!(
            $crate::fault::acknowledge(),
            "expected allocation failure did not happen at {}:{}",
            file!(),
            line!()
        );
    }};
}
