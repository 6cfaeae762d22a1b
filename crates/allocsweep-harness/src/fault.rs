//! Fault injection.
//!
//! [`FaultInjector`] sits in front of the [`AllocationTracker`] and refuses
//! any request whose prospective live total would exceed a cumulative-bytes
//! threshold. It does not know how a refusal is reported: the two
//! [`AllocatorVariant`]s layer "return null" and "raise" on top of the same
//! decision.
//!
//! Test bodies talk to the process-wide [`HARNESS_HEAP`] through the free
//! functions in this module ([`set_threshold`], [`acknowledge`],
//! [`sweep_fail_points`], ...).

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use crate::capture;
use crate::heap::{AllocationTracker, RawHeap, SystemHeap};
use crate::host::AllocatorHooks;

/// Upper bound on runs performed by one [`sweep_fail_points`] call.
pub const MAX_SWEEP_STEPS: usize = 100_000;

/// Unwind payload raised by [`AllocatorVariant::Raise`] when a request is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocFailure {
    pub size: usize,
}

/// Threshold-based allocation refusal.
#[derive(Debug, Default)]
pub struct FaultInjector {
    threshold: AtomicUsize,
    triggered: AtomicBool,
    pending: AtomicBool,
    first_demand: AtomicUsize,
}

impl FaultInjector {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            threshold: AtomicUsize::new(0),
            triggered: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            first_demand: AtomicUsize::new(0),
        }
    }

    /// Decide whether a request of `size` bytes may proceed given the
    /// current live total. A refusal marks the injector as triggered.
    pub fn admit(&self, live_bytes: usize, size: usize) -> bool {
        let threshold = self.threshold();
        if threshold == 0 {
            return true;
        }
        let demand = live_bytes.saturating_add(size);
        if demand <= threshold {
            return true;
        }
        self.triggered.store(true, Ordering::Relaxed);
        self.pending.store(true, Ordering::Relaxed);
        let _ = self.first_demand.compare_exchange(
            0,
            demand,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
        false
    }

    /// Cumulative-bytes ceiling; 0 disables injection.
    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold.load(Ordering::Relaxed)
    }

    /// Set the ceiling and forget the first refused demand.
    pub fn set_threshold(&self, threshold: usize) {
        self.threshold.store(threshold, Ordering::Relaxed);
        self.first_demand.store(0, Ordering::Relaxed);
    }

    /// Whether any request was refused since the last reset.
    #[must_use]
    pub fn triggered(&self) -> bool {
        self.triggered.load(Ordering::Relaxed)
    }

    /// Whether a refusal happened that the test has not acknowledged.
    #[must_use]
    pub fn pending(&self) -> bool {
        self.pending.load(Ordering::Relaxed)
    }

    /// Clear the pending flag, returning its previous value.
    /// `triggered` stays set.
    pub fn acknowledge(&self) -> bool {
        self.pending.swap(false, Ordering::Relaxed)
    }

    /// Prospective live total of the first refusal since the threshold was set.
    #[must_use]
    pub fn first_demand(&self) -> Option<usize> {
        match self.first_demand.load(Ordering::Relaxed) {
            0 => None,
            demand => Some(demand),
        }
    }

    /// Disable injection and clear every flag.
    pub fn reset(&self) {
        self.set_threshold(0);
        self.triggered.store(false, Ordering::Relaxed);
        self.pending.store(false, Ordering::Relaxed);
    }
}

/// Point-in-time view of a [`TrackedHeap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeapSnapshot {
    pub live_bytes: usize,
    pub live_count: usize,
    pub threshold: usize,
    pub triggered: bool,
    pub pending: bool,
}

impl HeapSnapshot {
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.live_bytes == 0 && self.live_count == 0
    }
}

/// Fault injector composed in front of an allocation tracker.
#[derive(Debug, Default)]
pub struct TrackedHeap<H> {
    tracker: AllocationTracker<H>,
    injector: FaultInjector,
}

impl<H: RawHeap> TrackedHeap<H> {
    pub const fn new(heap: H) -> Self {
        Self {
            tracker: AllocationTracker::new(heap),
            injector: FaultInjector::new(),
        }
    }

    /// Allocate unless the injector refuses the request.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if !self.injector.admit(self.tracker.live_bytes(), size) {
            return None;
        }
        self.tracker.allocate(size)
    }

    /// # Safety
    /// Same contract as [`AllocationTracker::deallocate`].
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        // SAFETY: forwarded caller contract.
        unsafe { self.tracker.deallocate(ptr) };
    }

    #[must_use]
    pub fn tracker(&self) -> &AllocationTracker<H> {
        &self.tracker
    }

    #[must_use]
    pub fn injector(&self) -> &FaultInjector {
        &self.injector
    }

    /// Zero the counters and disarm the injector.
    pub fn reset(&self) {
        self.tracker.reset();
        self.injector.reset();
    }

    #[must_use]
    pub fn snapshot(&self) -> HeapSnapshot {
        HeapSnapshot {
            live_bytes: self.tracker.live_bytes(),
            live_count: self.tracker.live_count(),
            threshold: self.injector.threshold(),
            triggered: self.injector.triggered(),
            pending: self.injector.pending(),
        }
    }
}

/// The heap behind every hook pair the driver installs.
pub static HARNESS_HEAP: TrackedHeap<SystemHeap> = TrackedHeap::new(SystemHeap);

/// Serializes everything that installs hooks backed by [`HARNESS_HEAP`].
pub(crate) static RUN_LOCK: Mutex<()> = Mutex::new(());

fn allocate_or_null(size: usize) -> *mut u8 {
    HARNESS_HEAP
        .allocate(size)
        .map_or(std::ptr::null_mut(), NonNull::as_ptr)
}

fn allocate_or_raise(size: usize) -> *mut u8 {
    match HARNESS_HEAP.allocate(size) {
        Some(ptr) => ptr.as_ptr(),
        None => std::panic::resume_unwind(Box::new(AllocFailure { size })),
    }
}

fn deallocate_tracked(ptr: *mut u8) {
    let Some(ptr) = NonNull::new(ptr) else {
        panic!("deallocate called with a null pointer");
    };
    // SAFETY: the library under test only hands back blocks it obtained from
    // the paired allocate function.
    unsafe { HARNESS_HEAP.deallocate(ptr) };
}

/// How a refused allocation is reported to the library under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocatorVariant {
    /// Refusals return a null pointer.
    ReturnNull,
    /// Refusals unwind with an [`AllocFailure`] payload.
    Raise,
}

impl AllocatorVariant {
    /// The installable pair for this variant, backed by [`HARNESS_HEAP`].
    #[must_use]
    pub fn hooks(self) -> AllocatorHooks {
        match self {
            Self::ReturnNull => AllocatorHooks::new(allocate_or_null, deallocate_tracked),
            Self::Raise => AllocatorHooks::new(allocate_or_raise, deallocate_tracked),
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ReturnNull => "null",
            Self::Raise => "raise",
        }
    }
}

/// Set the fail threshold for the running test (0 disables).
pub fn set_threshold(bytes: usize) {
    HARNESS_HEAP.injector().set_threshold(bytes);
}

#[must_use]
pub fn threshold() -> usize {
    HARNESS_HEAP.injector().threshold()
}

/// Whether the running test has had an allocation refused.
#[must_use]
pub fn triggered() -> bool {
    HARNESS_HEAP.injector().triggered()
}

/// Whether a refusal is waiting to be acknowledged.
#[must_use]
pub fn fault_pending() -> bool {
    HARNESS_HEAP.injector().pending()
}

/// Mark the pending refusal as expected. Returns whether one was pending.
pub fn acknowledge() -> bool {
    HARNESS_HEAP.injector().acknowledge()
}

#[must_use]
pub fn live_bytes() -> usize {
    HARNESS_HEAP.tracker().live_bytes()
}

#[must_use]
pub fn live_count() -> usize {
    HARNESS_HEAP.tracker().live_count()
}

#[must_use]
pub fn snapshot() -> HeapSnapshot {
    HARNESS_HEAP.snapshot()
}

/// Run `body` once per allocation fail point.
///
/// The first run refuses the first allocation that grows the live total;
/// each later run raises the threshold to exactly the demand refused last
/// time, so that request succeeds and the next one is refused. Stops after
/// a run with no refusal. Every run must release what it allocated, and the
/// refusals the sweep causes are acknowledged on the body's behalf. A refusal
/// already pending on entry fails the test. Returns the number of fail points
/// exercised.
pub fn sweep_fail_points(mut body: impl FnMut()) -> usize {
    let injector = HARNESS_HEAP.injector();
    if injector.pending() {
        capture::fail("allocation failure already pending before fail point sweep");
    }
    let saved = injector.threshold();
    let base_bytes = live_bytes();
    let base_count = live_count();

    let mut threshold = base_bytes.max(1);
    let mut fail_points = 0;
    loop {
        injector.set_threshold(threshold);
        body();
        let fired = injector.acknowledge();
        let demand = injector.first_demand();

        let (bytes, count) = (live_bytes(), live_count());
        if bytes != base_bytes || count != base_count {
            capture::fail(format!(
                "memory leak at fail point {threshold}: {} bytes in {} allocations",
                bytes.wrapping_sub(base_bytes),
                count.wrapping_sub(base_count)
            ));
        }

        match demand {
            Some(demand) if fired => {
                fail_points += 1;
                if fail_points >= MAX_SWEEP_STEPS {
                    capture::fail(format!(
                        "fail point sweep did not finish after {MAX_SWEEP_STEPS} runs"
                    ));
                }
                threshold = demand;
            }
            _ => break,
        }
    }

    injector.set_threshold(saved);
    fail_points
}
