//! Pluggable allocation for the table's two storage components.
//!
//! Both the bucket array and the overflow pool are fixed-length buffers that
//! are provisioned once per rebuild and never resized in place, so the
//! allocator interface only needs two primitives: allocate a block for a
//! layout and release it again.

use core::alloc::Layout;
use core::fmt::Debug;
use core::mem::size_of;
use core::ops::Deref;
use core::ops::DerefMut;
use core::ptr::NonNull;

use crate::error::AllocError;
use crate::error::Result;
use crate::error::TableError;

/// Allocation strategy used by a [`HashTable`] for its storage.
///
/// # Safety
///
/// Implementations must return blocks that are valid for reads and writes of
/// `layout.size()` bytes and aligned to `layout.align()`, and that stay valid
/// until they are passed back to [`release`]. A block must not be handed out
/// again while it is live.
///
/// The table never requests zero-sized layouts.
///
/// [`HashTable`]: crate::HashTable
/// [`release`]: RawAllocator::release
pub unsafe trait RawAllocator {
    /// Allocates a block of memory described by `layout`.
    fn allocate(&self, layout: Layout) -> core::result::Result<NonNull<u8>, AllocError>;

    /// Releases a block previously returned by [`allocate`].
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this allocator with the
    /// same `layout`, and must not be used afterwards.
    ///
    /// [`allocate`]: RawAllocator::allocate
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The global memory allocator.
///
/// This is the default allocator of [`HashTable`]. It forwards to
/// `alloc::alloc::alloc`/`dealloc` and reports null returns as
/// [`AllocError`] instead of aborting.
///
/// [`HashTable`]: crate::HashTable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Global;

// SAFETY: Delegates to the global allocator, which upholds the trait contract
// for non-zero-sized layouts.
unsafe impl RawAllocator for Global {
    #[inline]
    fn allocate(&self, layout: Layout) -> core::result::Result<NonNull<u8>, AllocError> {
        debug_assert!(layout.size() != 0);
        // SAFETY: The table never requests zero-sized layouts.
        NonNull::new(unsafe { alloc::alloc::alloc(layout) }).ok_or(AllocError)
    }

    #[inline]
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Caller guarantees `ptr` came from `allocate` with `layout`.
        unsafe { alloc::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

// SAFETY: Forwards to `A`, which upholds the contract.
unsafe impl<A: RawAllocator + ?Sized> RawAllocator for &A {
    #[inline]
    fn allocate(&self, layout: Layout) -> core::result::Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Caller upholds the contract for the underlying allocator.
        unsafe { (**self).release(ptr, layout) }
    }
}

/// A fixed-length, fully initialized buffer owned through a [`RawAllocator`].
///
/// The buffer does not remember which allocator it came from, so it has no
/// `Drop` impl: the owner must hand it back with [`release_in`]. A buffer that
/// is dropped without being released leaks its memory and contents.
///
/// [`release_in`]: RawBuffer::release_in
pub(crate) struct RawBuffer<T> {
    ptr: NonNull<T>,
    len: usize,
}

// SAFETY: `RawBuffer<T>` uniquely owns its elements, like `Box<[T]>`.
unsafe impl<T: Send> Send for RawBuffer<T> {}
// SAFETY: Shared access only hands out `&T`.
unsafe impl<T: Sync> Sync for RawBuffer<T> {}

impl<T> RawBuffer<T> {
    /// A zero-length buffer that owns no allocation.
    pub(crate) const fn empty() -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
        }
    }

    /// Allocates `len` elements from `alloc` and initializes slot `i` with
    /// `init(i)`.
    pub(crate) fn new_in<A: RawAllocator>(
        len: usize,
        alloc: &A,
        mut init: impl FnMut(usize) -> T,
    ) -> Result<Self> {
        let layout = Layout::array::<T>(len).map_err(|_| TableError::CapacityOverflow)?;
        if layout.size() == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len: if size_of::<T>() == 0 { len } else { 0 },
            });
        }

        let ptr = alloc
            .allocate(layout)
            .map_err(|_| TableError::AllocFailed { layout })?
            .cast::<T>();

        for index in 0..len {
            // SAFETY: `index < len` and the block holds `len` elements of `T`.
            unsafe { ptr.add(index).write(init(index)) };
        }

        Ok(Self { ptr, len })
    }

    fn layout(&self) -> Layout {
        // Cannot fail: the same layout was computed successfully in `new_in`.
        Layout::array::<T>(self.len).unwrap_or_else(|_| Layout::new::<()>())
    }

    /// Number of bytes owned by this buffer.
    #[cfg_attr(not(any(test, feature = "stats")), allow(dead_code))]
    pub(crate) fn byte_len(&self) -> usize {
        self.len * size_of::<T>()
    }

    /// Drops every element and returns the memory to `alloc`, leaving an
    /// empty buffer behind.
    ///
    /// # Safety
    ///
    /// `alloc` must be the allocator this buffer was created with.
    pub(crate) unsafe fn release_in<A: RawAllocator>(&mut self, alloc: &A) {
        let layout = self.layout();
        let ptr = self.ptr;
        let len = self.len;
        *self = Self::empty();

        // SAFETY: All `len` elements were initialized in `new_in` and are
        // dropped exactly once here, since `self` no longer refers to them.
        unsafe {
            core::ptr::drop_in_place(NonNull::slice_from_raw_parts(ptr, len).as_ptr());
        }

        if layout.size() != 0 {
            // SAFETY: Caller guarantees `alloc` produced this block with `layout`.
            unsafe { alloc.release(ptr.cast(), layout) };
        }
    }
}

impl<T> Deref for RawBuffer<T> {
    type Target = [T];

    #[inline(always)]
    fn deref(&self) -> &[T] {
        // SAFETY: `ptr` is valid for `len` initialized elements (or dangling
        // with `len == 0`).
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> DerefMut for RawBuffer<T> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: As in `deref`, and `&mut self` guarantees uniqueness.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Debug> Debug for RawBuffer<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Allocators used by tests to observe and inject allocation behavior.
#[cfg(test)]
pub(crate) mod testing {
    use core::cell::Cell;

    use super::*;

    /// Forwards to [`Global`], counting live blocks and optionally failing once
    /// a budget of successful allocations is used up.
    #[derive(Debug, Default)]
    pub(crate) struct CountingAllocator {
        live: Cell<usize>,
        total: Cell<usize>,
        budget: Cell<Option<usize>>,
    }

    impl CountingAllocator {
        pub(crate) fn with_budget(budget: usize) -> Self {
            let alloc = Self::default();
            alloc.budget.set(Some(budget));
            alloc
        }

        pub(crate) fn set_budget(&self, budget: Option<usize>) {
            self.budget.set(budget);
        }

        pub(crate) fn live(&self) -> usize {
            self.live.get()
        }

        pub(crate) fn total(&self) -> usize {
            self.total.get()
        }
    }

    // SAFETY: Forwards to `Global`.
    unsafe impl RawAllocator for CountingAllocator {
        fn allocate(&self, layout: Layout) -> core::result::Result<NonNull<u8>, AllocError> {
            if let Some(budget) = self.budget.get() {
                if budget == 0 {
                    return Err(AllocError);
                }
                self.budget.set(Some(budget - 1));
            }
            let ptr = Global.allocate(layout)?;
            self.live.set(self.live.get() + 1);
            self.total.set(self.total.get() + 1);
            Ok(ptr)
        }

        unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
            self.live.set(self.live.get() - 1);
            // SAFETY: Caller upholds the contract; blocks come from `Global`.
            unsafe { Global.release(ptr, layout) }
        }
    }
}
