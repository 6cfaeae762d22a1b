//! Replaceable allocation functions.
//!
//! The tree never touches the global allocator for its own storage. Every
//! block comes from the current [`AllocationFunction`] and is released with
//! the [`DeallocationFunction`] that was current when it was allocated, so
//! swapping the pair while documents are alive is sound.
//!
//! An allocation function signals exhaustion by returning null or by
//! unwinding. Public fallible operations run inside [`guard_out_of_memory`],
//! which turns an unwind that started in an allocation function into
//! [`TreeError::OutOfMemory`] and lets every other unwind continue.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;

use parking_lot::RwLock;

use crate::error::TreeError;

/// Returns a block of at least `size` bytes aligned for any primitive, or null.
pub type AllocationFunction = fn(usize) -> *mut u8;
/// Releases a block returned by the paired [`AllocationFunction`].
pub type DeallocationFunction = fn(*mut u8);

#[derive(Clone, Copy)]
struct Functions {
    allocate: AllocationFunction,
    deallocate: DeallocationFunction,
}

static FUNCTIONS: RwLock<Functions> = RwLock::new(Functions {
    allocate: default_allocate,
    deallocate: default_deallocate,
});

thread_local! {
    static ALLOCATION_UNWOUND: Cell<bool> = const { Cell::new(false) };
}

fn default_allocate(size: usize) -> *mut u8 {
    // SAFETY: malloc has no preconditions; zero-byte requests are bumped to
    // one byte so success is always non-null.
    unsafe { libc::malloc(size.max(1)).cast() }
}

fn default_deallocate(ptr: *mut u8) {
    // SAFETY: blocks are only released through the function paired with the
    // one that produced them, so `ptr` came from `default_allocate`.
    unsafe { libc::free(ptr.cast()) }
}

/// Replace the allocation functions used for all later allocations.
///
/// Blocks already allocated keep the deallocation function they were
/// allocated under.
pub fn set_memory_management_functions(
    allocate: AllocationFunction,
    deallocate: DeallocationFunction,
) {
    *FUNCTIONS.write() = Functions {
        allocate,
        deallocate,
    };
}

#[must_use]
pub fn get_memory_allocation_function() -> AllocationFunction {
    FUNCTIONS.read().allocate
}

#[must_use]
pub fn get_memory_deallocation_function() -> DeallocationFunction {
    FUNCTIONS.read().deallocate
}

/// Marks the current thread when dropped during an unwind.
struct UnwindWatch;

impl Drop for UnwindWatch {
    fn drop(&mut self) {
        if std::thread::panicking() {
            ALLOCATION_UNWOUND.with(|flag| flag.set(true));
        }
    }
}

/// Run `op`, converting an unwind out of an allocation function into
/// [`TreeError::OutOfMemory`].
///
/// `op` must not leave shared state half-updated across an allocation:
/// every caller allocates before it mutates.
pub(crate) fn guard_out_of_memory<T>(
    op: impl FnOnce() -> Result<T, TreeError>,
) -> Result<T, TreeError> {
    let outer = ALLOCATION_UNWOUND.with(|flag| flag.replace(false));
    let result = panic::catch_unwind(AssertUnwindSafe(op));
    let unwound = ALLOCATION_UNWOUND.with(|flag| flag.replace(outer));
    match result {
        Ok(result) => result,
        Err(_) if unwound => Err(TreeError::OutOfMemory),
        Err(payload) => panic::resume_unwind(payload),
    }
}

/// One block from the allocation functions, released on drop.
pub(crate) struct RawBlock {
    ptr: NonNull<u8>,
    deallocate: DeallocationFunction,
}

impl RawBlock {
    pub(crate) fn allocate(size: usize) -> Result<Self, TreeError> {
        let functions = *FUNCTIONS.read();
        let ptr = {
            let _watch = UnwindWatch;
            (functions.allocate)(size)
        };
        let ptr = NonNull::new(ptr).ok_or(TreeError::OutOfMemory)?;
        Ok(Self {
            ptr,
            deallocate: functions.deallocate,
        })
    }

    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Drop for RawBlock {
    fn drop(&mut self) {
        (self.deallocate)(self.ptr.as_ptr());
    }
}

// SAFETY: a block is uniquely owned; the raw pointer is not shared.
unsafe impl Send for RawBlock {}
// SAFETY: `RawBlock` exposes no interior mutability.
unsafe impl Sync for RawBlock {}
