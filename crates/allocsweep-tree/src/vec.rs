//! Growable array stored in blocks from the allocation functions.

use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::ptr;

use crate::error::TreeError;
use crate::memory::RawBlock;

/// Alignment every allocation function is required to provide.
pub const BLOCK_ALIGN: usize = 8;

const MIN_CAPACITY: usize = 4;

/// A vector whose growth allocates the new block before touching any
/// existing state, so a failed growth leaves it unchanged.
pub struct HookVec<T> {
    block: Option<RawBlock>,
    len: usize,
    capacity: usize,
    _owns: PhantomData<T>,
}

impl<T> HookVec<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            block: None,
            len: 0,
            capacity: 0,
            _owns: PhantomData,
        }
    }

    pub fn try_with_capacity(capacity: usize) -> Result<Self, TreeError> {
        let mut vec = Self::new();
        vec.try_reserve(capacity)?;
        Ok(vec)
    }

    /// Make room for at least `additional` more elements.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TreeError> {
        const { assert!(align_of::<T>() <= BLOCK_ALIGN) };
        let needed = self
            .len
            .checked_add(additional)
            .ok_or(TreeError::OutOfMemory)?;
        if needed <= self.capacity {
            return Ok(());
        }
        let capacity = needed.max(self.capacity.saturating_mul(2)).max(MIN_CAPACITY);
        let bytes = capacity
            .checked_mul(size_of::<T>())
            .ok_or(TreeError::OutOfMemory)?;
        let block = RawBlock::allocate(bytes)?;
        if let Some(old) = &self.block {
            // SAFETY: the old block holds `len` initialized elements, the new
            // one has room for `capacity >= len`, and they do not overlap.
            unsafe {
                ptr::copy_nonoverlapping(
                    old.as_ptr().cast::<T>(),
                    block.as_ptr().cast::<T>(),
                    self.len,
                );
            }
        }
        // The old block is released without dropping the moved elements.
        self.block = Some(block);
        self.capacity = capacity;
        Ok(())
    }

    /// Append `value`, growing first if needed. On failure the vector is
    /// unchanged and `value` is dropped.
    pub fn try_push(&mut self, value: T) -> Result<(), TreeError> {
        self.try_reserve(1)?;
        let Some(block) = &self.block else {
            return Err(TreeError::OutOfMemory);
        };
        // SAFETY: `try_reserve` guaranteed `len < capacity`.
        unsafe { block.as_ptr().cast::<T>().add(self.len).write(value) };
        self.len += 1;
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        match &self.block {
            // SAFETY: the first `len` elements are initialized.
            Some(block) => unsafe {
                std::slice::from_raw_parts(block.as_ptr().cast::<T>(), self.len)
            },
            None => &[],
        }
    }

    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match &self.block {
            // SAFETY: the first `len` elements are initialized and `&mut self`
            // makes this the only view.
            Some(block) => unsafe {
                std::slice::from_raw_parts_mut(block.as_ptr().cast::<T>(), self.len)
            },
            None => &mut [],
        }
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.as_mut_slice().get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }
}

impl<T> Default for HookVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for HookVec<T> {
    fn drop(&mut self) {
        // SAFETY: drops the `len` initialized elements exactly once; the
        // block itself is released by its own drop afterwards.
        unsafe { ptr::drop_in_place(self.as_mut_slice()) };
    }
}

impl<'a, T> IntoIterator for &'a HookVec<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
