//! Primary slot storage with bounded linear probing.
//!
//! Each bucket holds at most one entry plus the head of the overflow chain
//! rooted at that bucket's position. Probing starts at the key's home bucket
//! and visits at most [`probe_limit`] consecutive buckets (wrapping), so a
//! lookup never degrades into a scan of the whole array.
//!
//! Buckets move `Empty -> Occupied <-> Tombstone` and only ever return to
//! `Empty` when the whole array is rebuilt. Reaching an `Empty` bucket while
//! probing therefore proves the key was never pushed past it into the overflow
//! pool.

use core::mem;

use crate::error::Result;
use crate::overflow_pool::NodeIndex;
use crate::raw::RawAllocator;
use crate::raw::RawBuffer;

/// The probe bound is `PROBE_FACTOR * capacity_log` buckets.
pub(crate) const PROBE_FACTOR: usize = 2;

/// Number of buckets a probe may visit in an array of `1 << capacity_log`
/// buckets.
#[inline]
pub(crate) fn probe_limit(capacity_log: u32) -> usize {
    let capacity = 1usize << capacity_log;
    (PROBE_FACTOR * capacity_log.max(1) as usize).min(capacity)
}

/// State of a primary bucket.
#[derive(Debug)]
pub(crate) enum Slot<V> {
    Empty,
    Occupied { key: u64, value: V },
    Tombstone,
}

#[derive(Debug)]
pub(crate) struct Bucket<V> {
    slot: Slot<V>,
    /// Head of the overflow chain for keys whose home is this bucket.
    chain: Option<NodeIndex>,
}

impl<V> Bucket<V> {
    fn vacant(_: usize) -> Self {
        Bucket {
            slot: Slot::Empty,
            chain: None,
        }
    }
}

/// Outcome of probing for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Probe {
    /// The key occupies this bucket.
    Found(usize),
    /// The probe reached an empty bucket. The payload is the first tombstone
    /// passed on the way, or that empty bucket. The key is absent from both
    /// the array and the overflow chain.
    Vacant(usize),
    /// The probe bound was reached without a match. The key may still live in
    /// the overflow chain rooted at its home bucket.
    Exhausted { tombstone: Option<usize> },
}

pub(crate) struct BucketArray<V> {
    buckets: RawBuffer<Bucket<V>>,
    probe_limit: usize,
    occupied: usize,
    tombstones: usize,
}

impl<V> BucketArray<V> {
    /// An array with no buckets and no allocation.
    pub(crate) const fn empty() -> Self {
        Self {
            buckets: RawBuffer::empty(),
            probe_limit: 0,
            occupied: 0,
            tombstones: 0,
        }
    }

    /// Allocates `1 << capacity_log` empty buckets from `alloc`.
    pub(crate) fn new_in<A: RawAllocator>(capacity_log: u32, alloc: &A) -> Result<Self> {
        let buckets = RawBuffer::new_in(1usize << capacity_log, alloc, Bucket::vacant)?;
        Ok(Self {
            buckets,
            probe_limit: probe_limit(capacity_log),
            occupied: 0,
            tombstones: 0,
        })
    }

    /// Drops all entries and returns the storage to `alloc`.
    ///
    /// # Safety
    ///
    /// `alloc` must be the allocator passed to [`BucketArray::new_in`].
    pub(crate) unsafe fn release_in<A: RawAllocator>(&mut self, alloc: &A) {
        // SAFETY: Forwarded from the caller.
        unsafe { self.buckets.release_in(alloc) };
        *self = Self::empty();
    }

    #[inline(always)]
    pub(crate) fn capacity(&self) -> usize {
        self.buckets.len()
    }

    #[inline(always)]
    fn mask(&self) -> usize {
        self.buckets.len().wrapping_sub(1)
    }

    #[inline(always)]
    pub(crate) fn home(&self, hash: u64) -> usize {
        hash as usize & self.mask()
    }

    /// Distance of `slot` from `home` along the probe sequence.
    #[cfg_attr(not(any(test, feature = "stats")), allow(dead_code))]
    #[inline(always)]
    pub(crate) fn distance(&self, home: usize, slot: usize) -> usize {
        slot.wrapping_sub(home) & self.mask()
    }

    #[cfg_attr(not(any(test, feature = "stats")), allow(dead_code))]
    pub(crate) fn probe_limit(&self) -> usize {
        self.probe_limit
    }

    pub(crate) fn occupied(&self) -> usize {
        self.occupied
    }

    pub(crate) fn tombstones(&self) -> usize {
        self.tombstones
    }

    #[cfg_attr(not(any(test, feature = "stats")), allow(dead_code))]
    pub(crate) fn byte_len(&self) -> usize {
        self.buckets.byte_len()
    }

    /// Probes for `key` starting at `home`.
    ///
    /// The array must be non-empty.
    #[inline]
    pub(crate) fn locate(&self, home: usize, key: u64) -> Probe {
        debug_assert!(self.capacity() > 0);
        let mask = self.mask();
        let mut tombstone = None;

        for step in 0..self.probe_limit {
            let slot = (home + step) & mask;
            match &self.buckets[slot].slot {
                Slot::Occupied { key: k, .. } if *k == key => return Probe::Found(slot),
                Slot::Occupied { .. } => {}
                Slot::Tombstone => {
                    tombstone.get_or_insert(slot);
                }
                Slot::Empty => return Probe::Vacant(tombstone.unwrap_or(slot)),
            }
        }

        Probe::Exhausted { tombstone }
    }

    /// Finds the first empty bucket within the probe bound of `home`.
    ///
    /// Used while rebuilding, when the array holds no tombstones and the key
    /// is known to be absent.
    #[inline]
    pub(crate) fn locate_empty(&self, home: usize) -> Option<usize> {
        let mask = self.mask();
        (0..self.probe_limit)
            .map(|step| (home + step) & mask)
            .find(|&slot| matches!(self.buckets[slot].slot, Slot::Empty))
    }

    /// Writes an entry into an empty or tombstoned bucket.
    pub(crate) fn place(&mut self, slot: usize, key: u64, value: V) {
        let bucket = &mut self.buckets[slot];
        match bucket.slot {
            Slot::Empty => {}
            Slot::Tombstone => self.tombstones -= 1,
            Slot::Occupied { .. } => {
                debug_assert!(false, "placing into occupied bucket {slot}");
            }
        }
        bucket.slot = Slot::Occupied { key, value };
        self.occupied += 1;
    }

    /// Removes the entry in `slot`, leaving a tombstone behind.
    pub(crate) fn vacate(&mut self, slot: usize) -> Option<(u64, V)> {
        let bucket = &mut self.buckets[slot];
        if !matches!(bucket.slot, Slot::Occupied { .. }) {
            return None;
        }

        match mem::replace(&mut bucket.slot, Slot::Tombstone) {
            Slot::Occupied { key, value } => {
                self.occupied -= 1;
                self.tombstones += 1;
                Some((key, value))
            }
            _ => None,
        }
    }

    /// Moves the entry out of `slot` during a rebuild, leaving it empty.
    pub(crate) fn take(&mut self, slot: usize) -> Option<(u64, V)> {
        match mem::replace(&mut self.buckets[slot].slot, Slot::Empty) {
            Slot::Occupied { key, value } => {
                self.occupied -= 1;
                Some((key, value))
            }
            Slot::Tombstone => {
                self.tombstones -= 1;
                None
            }
            Slot::Empty => None,
        }
    }

    #[inline]
    pub(crate) fn entry(&self, slot: usize) -> Option<(u64, &V)> {
        match &self.buckets[slot].slot {
            Slot::Occupied { key, value } => Some((*key, value)),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn value_mut(&mut self, slot: usize) -> Option<&mut V> {
        match &mut self.buckets[slot].slot {
            Slot::Occupied { value, .. } => Some(value),
            _ => None,
        }
    }

    #[inline(always)]
    pub(crate) fn chain(&self, slot: usize) -> Option<NodeIndex> {
        self.buckets[slot].chain
    }

    #[inline(always)]
    pub(crate) fn set_chain(&mut self, slot: usize, head: Option<NodeIndex>) {
        self.buckets[slot].chain = head;
    }

    pub(crate) fn take_chain(&mut self, slot: usize) -> Option<NodeIndex> {
        self.buckets[slot].chain.take()
    }

    #[cfg(test)]
    pub(crate) fn is_pristine(&self) -> bool {
        self.buckets
            .iter()
            .all(|b| matches!(b.slot, Slot::Empty) && b.chain.is_none())
    }

    #[cfg(test)]
    pub(crate) fn slot(&self, slot: usize) -> &Slot<V> {
        &self.buckets[slot].slot
    }

    /// Resets every bucket to empty, dropping the entries in place.
    pub(crate) fn clear(&mut self) {
        for bucket in self.buckets.iter_mut() {
            bucket.slot = Slot::Empty;
            bucket.chain = None;
        }
        self.occupied = 0;
        self.tombstones = 0;
    }

    /// One character per bucket: `.` empty, `x` occupied, `+` occupied with a
    /// chain, `~` tombstone, `*` tombstone with a chain.
    pub(crate) fn render_row(&self, row: usize, width: usize) -> alloc::string::String {
        self.buckets
            .iter()
            .skip(row * width)
            .take(width)
            .map(|b| match (&b.slot, b.chain.is_some()) {
                (Slot::Empty, _) => '.',
                (Slot::Occupied { .. }, false) => 'x',
                (Slot::Occupied { .. }, true) => '+',
                (Slot::Tombstone, false) => '~',
                (Slot::Tombstone, true) => '*',
            })
            .collect()
    }
}
