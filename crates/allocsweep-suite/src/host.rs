//! Connects the harness to the tree's replaceable allocation functions.

use allocsweep_harness::{AllocatorHooks, AllocatorHost};
use allocsweep_tree::{
    Document, get_memory_allocation_function, get_memory_deallocation_function,
    set_memory_management_functions,
};

/// [`AllocatorHost`] for `allocsweep-tree`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeHost;

impl AllocatorHost for TreeHost {
    fn hooks(&self) -> AllocatorHooks {
        AllocatorHooks::new(
            get_memory_allocation_function(),
            get_memory_deallocation_function(),
        )
    }

    fn set_hooks(&self, hooks: AllocatorHooks) {
        set_memory_management_functions(hooks.allocate, hooks.deallocate);
    }

    fn warm_up(&self) {
        let _ = Document::parse("(warm_up \"\")");
    }
}
