//! Tracked heap.
//!
//! [`AllocationTracker`] wraps a real allocator ([`RawHeap`]) and keeps two
//! counters: the usable bytes and the number of blocks currently outstanding.
//! After a balanced sequence of allocate/deallocate calls both counters are
//! back where they started, which is how the driver detects leaks and
//! double frees.

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Alignment of every block handed out by [`SystemHeap`].
pub const BLOCK_ALIGN: usize = 16;

/// Bytes reserved in front of each [`SystemHeap`] block for its size.
const HEADER_SIZE: usize = BLOCK_ALIGN;

/// A real allocator the tracker delegates to.
pub trait RawHeap {
    /// Allocate at least `size` bytes. `None` on failure.
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// Release a block.
    ///
    /// # Safety
    /// `ptr` must come from `allocate` on this heap and must not have been
    /// released already.
    unsafe fn deallocate(&self, ptr: NonNull<u8>);

    /// Usable size of a live block.
    ///
    /// # Safety
    /// `ptr` must be a live block of this heap.
    unsafe fn usable_size(&self, ptr: NonNull<u8>) -> usize;
}

/// [`RawHeap`] over the Rust global allocator.
///
/// Each block carries a header with its usable size, which is the request
/// rounded up to [`BLOCK_ALIGN`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHeap;

impl SystemHeap {
    fn layout_for(usable: usize) -> Option<Layout> {
        let total = usable.checked_add(HEADER_SIZE)?;
        Layout::from_size_align(total, BLOCK_ALIGN).ok()
    }

    fn round_up(size: usize) -> Option<usize> {
        Some(size.checked_add(BLOCK_ALIGN - 1)? & !(BLOCK_ALIGN - 1))
    }
}

impl RawHeap for SystemHeap {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let usable = Self::round_up(size)?;
        let layout = Self::layout_for(usable)?;
        // SAFETY: layout has a non-zero size (header is always present).
        let base = NonNull::new(unsafe { std::alloc::alloc(layout) })?;
        // SAFETY: the header lies inside the block and is suitably aligned.
        unsafe {
            base.cast::<usize>().write(usable);
            Some(base.add(HEADER_SIZE))
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        // SAFETY: caller guarantees `ptr` is a live block of this heap.
        unsafe {
            let base = ptr.sub(HEADER_SIZE);
            let usable = base.cast::<usize>().read();
            let layout = Layout::from_size_align_unchecked(usable + HEADER_SIZE, BLOCK_ALIGN);
            std::alloc::dealloc(base.as_ptr(), layout);
        }
    }

    unsafe fn usable_size(&self, ptr: NonNull<u8>) -> usize {
        // SAFETY: caller guarantees `ptr` is a live block of this heap.
        unsafe { ptr.sub(HEADER_SIZE).cast::<usize>().read() }
    }
}

/// Live byte/count accounting in front of a [`RawHeap`].
///
/// Counters are atomics so a single instance can live in a `static`; the
/// harness itself only ever drives it from one thread at a time.
#[derive(Debug, Default)]
pub struct AllocationTracker<H> {
    heap: H,
    live_bytes: AtomicUsize,
    live_count: AtomicUsize,
}

impl<H: RawHeap> AllocationTracker<H> {
    /// Create a tracker with zeroed counters.
    pub const fn new(heap: H) -> Self {
        Self {
            heap,
            live_bytes: AtomicUsize::new(0),
            live_count: AtomicUsize::new(0),
        }
    }

    /// Allocate `size` bytes, counting the block's usable size on success.
    ///
    /// Counters are untouched when the underlying heap fails.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let ptr = self.heap.allocate(size)?;
        // SAFETY: `ptr` was just returned by this heap.
        let usable = unsafe { self.heap.usable_size(ptr) };
        self.live_bytes.fetch_add(usable, Ordering::Relaxed);
        self.live_count.fetch_add(1, Ordering::Relaxed);
        Some(ptr)
    }

    /// Release a block and subtract it from the counters.
    ///
    /// # Safety
    /// `ptr` must come from [`Self::allocate`] on this tracker and must not
    /// have been released already.
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        // SAFETY: forwarded caller contract.
        let usable = unsafe { self.heap.usable_size(ptr) };
        self.live_bytes.fetch_sub(usable, Ordering::Relaxed);
        self.live_count.fetch_sub(1, Ordering::Relaxed);
        // SAFETY: forwarded caller contract.
        unsafe { self.heap.deallocate(ptr) };
    }

    /// Usable size of a live block.
    ///
    /// # Safety
    /// `ptr` must be a live block of this tracker.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> usize {
        // SAFETY: forwarded caller contract.
        unsafe { self.heap.usable_size(ptr) }
    }

    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live_count.load(Ordering::Relaxed)
    }

    /// True when nothing allocated through this tracker is outstanding.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.live_bytes() == 0 && self.live_count() == 0
    }

    /// Zero both counters. Blocks still outstanding are forgotten, not freed.
    pub fn reset(&self) {
        self.live_bytes.store(0, Ordering::Relaxed);
        self.live_count.store(0, Ordering::Relaxed);
    }
}
