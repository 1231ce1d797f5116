//! Secondary node storage for entries that overflow the probe bound.
//!
//! The pool is an arena of `capacity` nodes, provisioned 1:1 with the bucket
//! array and never resized on its own. Fresh nodes are bump-allocated from
//! the front of the arena; released nodes are threaded onto an intrusive
//! freelist and handed out again before the bump frontier moves. Entries that
//! share a home bucket form a singly-linked chain through `next` indices, so
//! nodes can be recycled without ever leaving a dangling reference behind.

use core::num::NonZeroU32;

use crate::error::Result;
use crate::raw::RawAllocator;
use crate::raw::RawBuffer;

/// Index of a node in the [`OverflowPool`].
///
/// Stored off by one so that `Option<NodeIndex>` fits in four bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeIndex(NonZeroU32);

impl NodeIndex {
    /// Largest pool length whose indices all fit.
    pub(crate) const MAX_POOL_LEN: usize = u32::MAX as usize;

    #[inline(always)]
    pub(crate) fn new(index: usize) -> Self {
        debug_assert!(index < Self::MAX_POOL_LEN);
        match NonZeroU32::new((index as u32).wrapping_add(1)) {
            Some(raw) => NodeIndex(raw),
            None => panic!("overflow node index {index} out of range"),
        }
    }

    #[inline(always)]
    pub(crate) fn get(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

#[derive(Debug)]
pub(crate) struct Node<V> {
    pub(crate) key: u64,
    pub(crate) value: V,
    pub(crate) next: Option<NodeIndex>,
}

#[derive(Debug)]
enum PoolSlot<V> {
    /// Not in use. Released slots link to the next free slot.
    Free { next_free: Option<NodeIndex> },
    Live(Node<V>),
}

impl<V> PoolSlot<V> {
    fn unused(_: usize) -> Self {
        PoolSlot::Free { next_free: None }
    }
}

pub(crate) struct OverflowPool<V> {
    slots: RawBuffer<PoolSlot<V>>,
    /// Bump frontier: slots at or past this index have never been handed out
    /// since the pool was created or cleared.
    heap_ptr: usize,
    free_head: Option<NodeIndex>,
    free_len: usize,
    live: usize,
}

impl<V> OverflowPool<V> {
    /// A pool with no storage.
    pub(crate) const fn empty() -> Self {
        Self {
            slots: RawBuffer::empty(),
            heap_ptr: 0,
            free_head: None,
            free_len: 0,
            live: 0,
        }
    }

    /// Allocates storage for `capacity` nodes from `alloc`.
    pub(crate) fn new_in<A: RawAllocator>(capacity: usize, alloc: &A) -> Result<Self> {
        debug_assert!(capacity <= NodeIndex::MAX_POOL_LEN);
        Ok(Self {
            slots: RawBuffer::new_in(capacity, alloc, PoolSlot::unused)?,
            ..Self::empty()
        })
    }

    /// Drops every live node and returns the storage to `alloc`.
    ///
    /// # Safety
    ///
    /// `alloc` must be the allocator passed to [`OverflowPool::new_in`].
    pub(crate) unsafe fn release_in<A: RawAllocator>(&mut self, alloc: &A) {
        // SAFETY: Forwarded from the caller.
        unsafe { self.slots.release_in(alloc) };
        *self = Self::empty();
    }

    #[cfg_attr(not(any(test, feature = "stats")), allow(dead_code))]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn heap_ptr(&self) -> usize {
        self.heap_ptr
    }

    #[cfg_attr(not(any(test, feature = "stats")), allow(dead_code))]
    pub(crate) fn free_len(&self) -> usize {
        self.free_len
    }

    pub(crate) fn live(&self) -> usize {
        self.live
    }

    #[cfg_attr(not(any(test, feature = "stats")), allow(dead_code))]
    pub(crate) fn byte_len(&self) -> usize {
        self.slots.byte_len()
    }

    /// Stores an entry in a recycled or freshly bumped node linked in front of
    /// `next`.
    ///
    /// When the freelist is empty and the bump frontier has reached the end of
    /// the arena, the entry is handed back and the caller must grow the table.
    pub(crate) fn alloc(
        &mut self,
        key: u64,
        value: V,
        next: Option<NodeIndex>,
    ) -> core::result::Result<NodeIndex, (u64, V)> {
        let index = if let Some(index) = self.free_head {
            let PoolSlot::Free { next_free } = self.slots[index.get()] else {
                unreachable!("freelist entry {} is live", index.get());
            };
            self.free_head = next_free;
            self.free_len -= 1;
            index
        } else if self.heap_ptr < self.slots.len() {
            let index = NodeIndex::new(self.heap_ptr);
            self.heap_ptr += 1;
            index
        } else {
            return Err((key, value));
        };

        self.slots[index.get()] = PoolSlot::Live(Node { key, value, next });
        self.live += 1;
        Ok(index)
    }

    /// Releases a live node onto the freelist and returns its entry.
    pub(crate) fn free(&mut self, index: NodeIndex) -> (u64, V) {
        let released = core::mem::replace(
            &mut self.slots[index.get()],
            PoolSlot::Free {
                next_free: self.free_head,
            },
        );
        let PoolSlot::Live(node) = released else {
            unreachable!("double free of overflow node {}", index.get());
        };

        self.free_head = Some(index);
        self.free_len += 1;
        self.live -= 1;
        (node.key, node.value)
    }

    #[inline]
    pub(crate) fn node(&self, index: NodeIndex) -> &Node<V> {
        match &self.slots[index.get()] {
            PoolSlot::Live(node) => node,
            PoolSlot::Free { .. } => unreachable!("overflow node {} is free", index.get()),
        }
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, index: NodeIndex) -> &mut Node<V> {
        match &mut self.slots[index.get()] {
            PoolSlot::Live(node) => node,
            PoolSlot::Free { .. } => unreachable!("overflow node {} is free", index.get()),
        }
    }

    /// Walks the chain starting at `head` looking for `key`.
    pub(crate) fn find_in_chain(&self, head: Option<NodeIndex>, key: u64) -> Option<NodeIndex> {
        let mut cursor = head;
        while let Some(index) = cursor {
            let node = self.node(index);
            if node.key == key {
                return Some(index);
            }
            cursor = node.next;
        }
        None
    }

    /// Splices `key` out of the chain starting at `head` and frees its node.
    ///
    /// Returns the chain's new head along with the removed entry.
    pub(crate) fn remove_from_chain(
        &mut self,
        head: Option<NodeIndex>,
        key: u64,
    ) -> Option<(Option<NodeIndex>, u64, V)> {
        let mut prev: Option<NodeIndex> = None;
        let mut cursor = head;

        while let Some(index) = cursor {
            let node = self.node(index);
            let next = node.next;
            if node.key == key {
                let new_head = match prev {
                    None => next,
                    Some(prev) => {
                        self.node_mut(prev).next = next;
                        head
                    }
                };
                let (key, value) = self.free(index);
                return Some((new_head, key, value));
            }
            prev = cursor;
            cursor = next;
        }

        None
    }

    /// Frees the head of a chain, returning the rest of the chain and the
    /// entry it held.
    pub(crate) fn pop_front(&mut self, head: NodeIndex) -> (Option<NodeIndex>, u64, V) {
        let next = self.node(head).next;
        let (key, value) = self.free(head);
        (next, key, value)
    }

    /// Iterates the entries of the chain starting at `head`.
    #[cfg(test)]
    pub(crate) fn chain(&self, head: Option<NodeIndex>) -> ChainIter<'_, V> {
        ChainIter { pool: self, cursor: head }
    }

    /// Drops every live node and rewinds the bump frontier.
    pub(crate) fn clear(&mut self) {
        let used = self.heap_ptr;
        for slot in self.slots[..used].iter_mut() {
            *slot = PoolSlot::Free { next_free: None };
        }
        self.heap_ptr = 0;
        self.free_head = None;
        self.free_len = 0;
        self.live = 0;
    }
}

/// Iterator over the entries of one overflow chain.
#[cfg(test)]
pub(crate) struct ChainIter<'a, V> {
    pool: &'a OverflowPool<V>,
    cursor: Option<NodeIndex>,
}

#[cfg(test)]
impl<'a, V> Iterator for ChainIter<'a, V> {
    type Item = &'a Node<V>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.pool.node(self.cursor?);
        self.cursor = node.next;
        Some(node)
    }
}
