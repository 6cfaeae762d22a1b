//! Allocator installation interface.
//!
//! The library under test exposes a replaceable pair of allocate/deallocate
//! functions. [`AllocatorHost`] is how the driver reaches that pair, and
//! [`InstalledHooks`] brackets one installation so the previous pair comes
//! back on every exit path.

use parking_lot::RwLock;

/// Allocate `size` bytes; null on failure (or unwind, for raising variants).
pub type AllocateFn = fn(usize) -> *mut u8;

/// Release a block previously returned by the paired [`AllocateFn`].
pub type DeallocateFn = fn(*mut u8);

/// An installable allocate/deallocate pair.
#[derive(Debug, Clone, Copy)]
pub struct AllocatorHooks {
    pub allocate: AllocateFn,
    pub deallocate: DeallocateFn,
}

impl AllocatorHooks {
    #[must_use]
    pub const fn new(allocate: AllocateFn, deallocate: DeallocateFn) -> Self {
        Self {
            allocate,
            deallocate,
        }
    }

    /// True when both function pointers match `other`.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        std::ptr::fn_addr_eq(self.allocate, other.allocate)
            && std::ptr::fn_addr_eq(self.deallocate, other.deallocate)
    }
}

/// A library whose memory traffic can be redirected.
pub trait AllocatorHost {
    /// The pair currently installed.
    fn hooks(&self) -> AllocatorHooks;

    /// Replace the installed pair.
    fn set_hooks(&self, hooks: AllocatorHooks);

    /// Exercise the library once with its original allocator before any
    /// replacement, so lazily initialized state is not charged to a test.
    fn warm_up(&self) {}
}

/// Installs a hook pair for the lifetime of the guard.
#[must_use = "hooks are restored as soon as the guard is dropped"]
pub struct InstalledHooks<'a> {
    host: &'a dyn AllocatorHost,
    previous: AllocatorHooks,
}

impl<'a> InstalledHooks<'a> {
    pub fn install(host: &'a dyn AllocatorHost, hooks: AllocatorHooks) -> Self {
        let previous = host.hooks();
        host.set_hooks(hooks);
        Self { host, previous }
    }

    /// The pair that will be restored on drop.
    #[must_use]
    pub fn previous(&self) -> AllocatorHooks {
        self.previous
    }
}

impl Drop for InstalledHooks<'_> {
    fn drop(&mut self) {
        self.host.set_hooks(self.previous);
    }
}

/// A process-wide hook slot for code that has no allocator hook of its own.
///
/// Code routes its allocations through [`HookSlot::allocate`] and
/// [`HookSlot::deallocate`]; the driver swaps the pair through the
/// [`AllocatorHost`] impl.
pub struct HookSlot {
    hooks: RwLock<AllocatorHooks>,
}

impl HookSlot {
    #[must_use]
    pub const fn new(hooks: AllocatorHooks) -> Self {
        Self {
            hooks: RwLock::new(hooks),
        }
    }

    pub fn allocate(&self, size: usize) -> *mut u8 {
        let allocate = self.hooks.read().allocate;
        allocate(size)
    }

    pub fn deallocate(&self, ptr: *mut u8) {
        let deallocate = self.hooks.read().deallocate;
        deallocate(ptr);
    }
}

impl AllocatorHost for HookSlot {
    fn hooks(&self) -> AllocatorHooks {
        *self.hooks.read()
    }

    fn set_hooks(&self, hooks: AllocatorHooks) {
        *self.hooks.write() = hooks;
    }
}
