//! The table controller: an integer-keyed hash table that spills entries past
//! a bounded probe into an index-linked overflow pool.

use core::fmt::Debug;
use core::iter::FusedIterator;
use core::mem;

use crate::bucket_array::BucketArray;
use crate::bucket_array::Probe;
use crate::error::Result;
use crate::error::TableError;
use crate::hasher::DefaultKeyHasher;
use crate::hasher::KeyHasher;
use crate::overflow_pool::NodeIndex;
use crate::overflow_pool::OverflowPool;
use crate::raw::Global;
use crate::raw::RawAllocator;

/// Capacity of a newly created table, as a power of two.
pub const DEFAULT_CAPACITY_LOG: u32 = 4;

/// Largest supported capacity, as a power of two.
///
/// Overflow nodes are addressed with 32-bit indices, and the capacity must fit
/// in `usize`.
pub const MAX_CAPACITY_LOG: u32 = if usize::BITS - 1 < 31 {
    usize::BITS - 1
} else {
    31
};

/// The table grows before an insertion would push the load factor past
/// `MAX_LOAD_NUMERATOR / MAX_LOAD_DENOMINATOR`.
pub const MAX_LOAD_NUMERATOR: usize = 3;
/// See [`MAX_LOAD_NUMERATOR`].
pub const MAX_LOAD_DENOMINATOR: usize = 4;

#[inline]
const fn max_load(capacity: usize) -> usize {
    capacity - capacity / MAX_LOAD_DENOMINATOR * (MAX_LOAD_DENOMINATOR - MAX_LOAD_NUMERATOR)
}

/// Smallest capacity log whose load threshold admits `entries` entries.
fn capacity_log_for(entries: usize) -> Result<u32> {
    let mut capacity_log = DEFAULT_CAPACITY_LOG;
    while max_load(1usize << capacity_log) < entries {
        capacity_log += 1;
        if capacity_log > MAX_CAPACITY_LOG {
            return Err(TableError::CapacityOverflow);
        }
    }
    Ok(capacity_log)
}

/// Where a live key is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Primary(usize),
    Overflow { home: usize, index: NodeIndex },
}

/// Debug statistics for hash table analysis.
///
/// Available in tests and with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of entries currently in the table
    pub populated: usize,
    /// Number of primary buckets
    pub capacity: usize,
    /// Population at which the next insertion grows the table
    pub max_load: usize,
    /// Maximum buckets visited by a probe
    pub probe_limit: usize,
    /// Buckets holding an entry
    pub occupied_slots: usize,
    /// Buckets holding a tombstone
    pub tombstones: usize,
    /// Entries stored in overflow chains
    pub overflow_entries: usize,
    /// Bump frontier of the overflow pool
    pub overflow_heap_ptr: usize,
    /// Recycled overflow nodes waiting on the freelist
    pub overflow_free: usize,
    /// Load factor (populated / capacity)
    pub load_factor: f64,
    /// Total memory in bytes used by the table
    pub total_bytes: usize,
    /// Bytes not holding a live key or value
    pub wasted_bytes: usize,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Debug Statistics ===");
        println!(
            "Population: {}/{} ({:.2}% load factor, grows at {})",
            self.populated,
            self.capacity,
            self.load_factor * 100.0,
            self.max_load
        );
        println!(
            "Slot Usage: {} occupied, {} tombstones (probe limit {})",
            self.occupied_slots, self.tombstones, self.probe_limit
        );
        println!(
            "Overflow: {} entries, heap ptr {}, {} free",
            self.overflow_entries, self.overflow_heap_ptr, self.overflow_free
        );
        println!("Total Allocated: {} bytes", self.total_bytes);
        println!(
            "Memory: {} bytes wasted ({:.02}%)",
            self.wasted_bytes,
            if self.total_bytes == 0 {
                0.0
            } else {
                (self.wasted_bytes as f64 / self.total_bytes as f64) * 100.0
            }
        );
    }
}

/// A hash table from `u64` keys to values of type `V`.
///
/// Entries live in a power-of-two array of buckets and are placed by bounded
/// linear probing from their home bucket. When every bucket within the probe
/// bound is taken, the entry spills into an overflow pool as part of a chain
/// rooted at the home bucket. The pool has as many nodes as the array has
/// buckets and recycles released nodes, so insert/remove churn over a fixed key
/// set never grows the table.
///
/// The hash function `H` and the allocator `A` are pluggable. See
/// [`KeyHasher`] and [`RawAllocator`].
///
/// ## Example
///
/// ```rust
/// use spill_hash::HashTable;
///
/// let mut table = HashTable::new();
/// assert_eq!(table.insert(1, "one"), None);
/// assert_eq!(table.insert(1, "uno"), Some("one"));
///
/// assert_eq!(table.find(1), Some(&"uno"));
/// assert!(table.contains(1));
/// assert_eq!(table.size(), 1);
///
/// assert_eq!(table.remove(1), Some("uno"));
/// assert_eq!(table.find(1), None);
/// ```
pub struct HashTable<V, H = DefaultKeyHasher, A: RawAllocator = Global> {
    buckets: BucketArray<V>,
    overflow: OverflowPool<V>,

    populated: usize,
    capacity_log: u32,
    max_pop: usize,

    hasher: H,
    alloc: A,
}

impl<V> HashTable<V> {
    /// Creates an empty table with the default capacity, the default hasher
    /// and the global allocator.
    ///
    /// # Panics
    ///
    /// Diverges through `handle_alloc_error` if the initial storage cannot be
    /// allocated. Use [`HashTable::try_new`] to handle that case.
    pub fn new() -> Self {
        Self::with_hasher(DefaultKeyHasher::default())
    }

    /// Fallible version of [`HashTable::new`].
    pub fn try_new() -> Result<Self> {
        Self::try_with_hasher_in(DefaultKeyHasher::default(), Global)
    }

    /// Creates a table that holds at least `capacity` entries before growing.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use spill_hash::HashTable;
    /// let table: HashTable<u32> = HashTable::with_capacity(100);
    /// assert!(table.capacity() >= 100);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultKeyHasher::default())
    }

    /// Fallible version of [`HashTable::with_capacity`].
    pub fn try_with_capacity(capacity: usize) -> Result<Self> {
        Self::try_with_capacity_and_hasher_in(capacity, DefaultKeyHasher::default(), Global)
    }
}

impl<V, H: KeyHasher> HashTable<V, H> {
    /// Creates an empty table that hashes keys with `hasher`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use spill_hash::HashTable;
    /// // Identity hashing: key `k` lives at bucket `k % capacity`.
    /// let mut table = HashTable::with_hasher(|key: u64| key);
    /// table.insert(3, 'c');
    /// assert_eq!(table.find(3), Some(&'c'));
    /// ```
    pub fn with_hasher(hasher: H) -> Self {
        Self::with_hasher_in(hasher, Global)
    }

    /// Creates a table with room for `capacity` entries that hashes keys with
    /// `hasher`.
    pub fn with_capacity_and_hasher(capacity: usize, hasher: H) -> Self {
        Self::try_with_capacity_and_hasher_in(capacity, hasher, Global)
            .unwrap_or_else(|err| err.handle())
    }
}

impl<V, H: KeyHasher, A: RawAllocator> HashTable<V, H, A> {
    /// Creates an empty table with a custom hasher and allocator.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use spill_hash::HashTable;
    /// # use spill_hash::hasher::mix64;
    /// # use spill_hash::raw::Global;
    /// let mut table = HashTable::with_hasher_in(mix64, Global);
    /// table.insert(10, 100u32);
    /// assert_eq!(table.size(), 1);
    /// ```
    pub fn with_hasher_in(hasher: H, alloc: A) -> Self {
        Self::try_with_hasher_in(hasher, alloc).unwrap_or_else(|err| err.handle())
    }

    /// Fallible version of [`HashTable::with_hasher_in`].
    pub fn try_with_hasher_in(hasher: H, alloc: A) -> Result<Self> {
        Self::try_with_capacity_and_hasher_in(0, hasher, alloc)
    }

    /// Creates a table with room for `capacity` entries, a custom hasher and a
    /// custom allocator, reporting allocation failure.
    pub fn try_with_capacity_and_hasher_in(capacity: usize, hasher: H, alloc: A) -> Result<Self> {
        let mut table = Self::unallocated(hasher, alloc);
        table.rebuild(capacity_log_for(capacity)?)?;
        Ok(table)
    }

    /// Inserts `value` under `key`, returning the value it replaced.
    ///
    /// # Panics
    ///
    /// Diverges through `handle_alloc_error` if growing the table fails. Use
    /// [`HashTable::try_insert`] to handle that case.
    #[inline]
    pub fn insert(&mut self, key: u64, value: V) -> Option<V> {
        self.try_insert(key, value).unwrap_or_else(|err| err.handle())
    }

    /// Inserts `value` under `key`, returning the value it replaced.
    ///
    /// An existing key has its value overwritten in place without changing
    /// [`size`](HashTable::size). A new key may grow the table first. If that
    /// fails the error is returned, `value` is dropped, and the table is left
    /// exactly as it was.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use spill_hash::HashTable;
    /// let mut table = HashTable::new();
    /// assert_eq!(table.try_insert(5, "five"), Ok(None));
    /// assert_eq!(table.try_insert(5, "FIVE"), Ok(Some("five")));
    /// ```
    pub fn try_insert(&mut self, key: u64, value: V) -> Result<Option<V>> {
        if let Some(location) = self.location_of(key) {
            return Ok(Some(mem::replace(self.value_at_mut(location), value)));
        }

        self.reserve_one()?;
        self.insert_new(key, value)?;
        Ok(None)
    }

    /// Returns the value for `key`, inserting the result of `default` first if
    /// the key is absent.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use spill_hash::HashTable;
    /// let mut counts = HashTable::new();
    /// for key in [1, 2, 1, 1] {
    ///     *counts.get_or_insert_with(key, || 0) += 1;
    /// }
    /// assert_eq!(counts.find(1), Some(&3));
    /// assert_eq!(counts.find(2), Some(&1));
    /// ```
    pub fn get_or_insert_with(&mut self, key: u64, default: impl FnOnce() -> V) -> &mut V {
        match self.try_get_or_insert_with(key, default) {
            Ok(value) => value,
            Err(err) => err.handle(),
        }
    }

    /// Fallible version of [`HashTable::get_or_insert_with`].
    pub fn try_get_or_insert_with(
        &mut self,
        key: u64,
        default: impl FnOnce() -> V,
    ) -> Result<&mut V> {
        let location = match self.location_of(key) {
            Some(location) => location,
            None => {
                self.reserve_one()?;
                self.insert_new(key, default())?
            }
        };
        Ok(self.value_at_mut(location))
    }

    /// Returns a reference to the value stored under `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use spill_hash::HashTable;
    /// let mut table = HashTable::new();
    /// table.insert(42, "answer");
    /// assert_eq!(table.find(42), Some(&"answer"));
    /// assert_eq!(table.find(43), None);
    /// ```
    #[inline]
    pub fn find(&self, key: u64) -> Option<&V> {
        if self.buckets.capacity() == 0 {
            return None;
        }

        let home = self.home_of(key);
        match self.buckets.locate(home, key) {
            Probe::Found(slot) => self.buckets.entry(slot).map(|(_, value)| value),
            Probe::Vacant(_) => None,
            Probe::Exhausted { .. } => self.find_overflow(home, key),
        }
    }

    #[cold]
    #[inline(never)]
    fn find_overflow(&self, home: usize, key: u64) -> Option<&V> {
        self.overflow
            .find_in_chain(self.buckets.chain(home), key)
            .map(|index| &self.overflow.node(index).value)
    }

    /// Returns a mutable reference to the value stored under `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use spill_hash::HashTable;
    /// let mut table = HashTable::new();
    /// table.insert(1, 10);
    /// if let Some(value) = table.find_mut(1) {
    ///     *value += 5;
    /// }
    /// assert_eq!(table.find(1), Some(&15));
    /// ```
    pub fn find_mut(&mut self, key: u64) -> Option<&mut V> {
        let location = self.location_of(key)?;
        Some(self.value_at_mut(location))
    }

    /// Returns `true` if `key` is stored in the table.
    #[inline]
    pub fn contains(&self, key: u64) -> bool {
        self.find(key).is_some()
    }

    /// Removes `key` from the table, returning its value.
    ///
    /// Removing an absent key does nothing and returns `None`. The table never
    /// shrinks on removal.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use spill_hash::HashTable;
    /// let mut table = HashTable::new();
    /// table.insert(7, "seven");
    /// assert_eq!(table.remove(7), Some("seven"));
    /// assert_eq!(table.remove(7), None);
    /// assert!(table.is_empty());
    /// ```
    pub fn remove(&mut self, key: u64) -> Option<V> {
        let value = match self.location_of(key)? {
            Location::Primary(slot) => self.buckets.vacate(slot).map(|(_, value)| value)?,
            Location::Overflow { home, .. } => {
                let (head, _, value) = self
                    .overflow
                    .remove_from_chain(self.buckets.chain(home), key)?;
                self.buckets.set_chain(home, head);
                value
            }
        };

        self.populated -= 1;
        Some(value)
    }

    /// Reserves room for at least `additional` more entries.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use spill_hash::HashTable;
    /// let mut table: HashTable<u8> = HashTable::new();
    /// table.reserve(1000);
    /// assert!(table.capacity() >= 1000);
    /// ```
    pub fn reserve(&mut self, additional: usize) {
        self.try_reserve(additional)
            .unwrap_or_else(|err| err.handle())
    }

    /// Fallible version of [`HashTable::reserve`]. On failure the table is
    /// unchanged.
    pub fn try_reserve(&mut self, additional: usize) -> Result<()> {
        let needed = self
            .populated
            .checked_add(additional)
            .ok_or(TableError::CapacityOverflow)?;
        if self.buckets.capacity() != 0 && needed <= self.max_pop {
            return Ok(());
        }

        let capacity_log = capacity_log_for(needed)?.max(self.capacity_log);
        self.rebuild(capacity_log)
    }

    #[inline]
    fn home_of(&self, key: u64) -> usize {
        self.buckets.home(self.hasher.hash_key(key))
    }

    fn location_of(&self, key: u64) -> Option<Location> {
        if self.buckets.capacity() == 0 {
            return None;
        }

        let home = self.home_of(key);
        match self.buckets.locate(home, key) {
            Probe::Found(slot) => Some(Location::Primary(slot)),
            Probe::Vacant(_) => None,
            Probe::Exhausted { .. } => self
                .overflow
                .find_in_chain(self.buckets.chain(home), key)
                .map(|index| Location::Overflow { home, index }),
        }
    }

    /// Makes sure a new entry can be placed without crossing the load
    /// threshold.
    fn reserve_one(&mut self) -> Result<()> {
        if self.buckets.capacity() == 0 {
            return self.rebuild(DEFAULT_CAPACITY_LOG);
        }

        if self.populated + 1 > self.max_pop {
            return self.grow();
        }

        // Tombstones never turn back into empty buckets on their own, and
        // enough of them make every probe run to its bound.
        if self.buckets.tombstones() >= (self.buckets.capacity() / 4).max(1) {
            return self.rebuild(self.capacity_log);
        }

        Ok(())
    }

    /// Places a key known to be absent.
    fn insert_new(&mut self, key: u64, value: V) -> Result<Location> {
        let mut entry = (key, value);

        loop {
            let home = self.home_of(key);
            match self.buckets.locate(home, key) {
                Probe::Found(_) => unreachable!("key {key} is already present"),
                Probe::Vacant(slot)
                | Probe::Exhausted {
                    tombstone: Some(slot),
                } => {
                    self.buckets.place(slot, entry.0, entry.1);
                    self.populated += 1;
                    return Ok(Location::Primary(slot));
                }
                Probe::Exhausted { tombstone: None } => {
                    let head = self.buckets.chain(home);
                    match self.overflow.alloc(entry.0, entry.1, head) {
                        Ok(index) => {
                            log::trace!("key {key} spilled to overflow node {}", index.get());
                            self.buckets.set_chain(home, Some(index));
                            self.populated += 1;
                            return Ok(Location::Overflow { home, index });
                        }
                        // The load threshold keeps live nodes below the
                        // pool length, so this only fires for a pool that is
                        // shorter than the bucket array.
                        Err(rejected) => {
                            log::trace!(
                                "overflow pool exhausted at {} nodes, growing",
                                self.overflow.heap_ptr()
                            );
                            entry = rejected;
                            self.grow()?;
                        }
                    }
                }
            }
        }
    }

    fn grow(&mut self) -> Result<()> {
        self.rebuild(self.capacity_log + 1)
    }

    /// Moves every live entry into freshly allocated storage of
    /// `1 << capacity_log` buckets.
    ///
    /// New storage is acquired before anything is moved, so on error the table
    /// is untouched.
    fn rebuild(&mut self, capacity_log: u32) -> Result<()> {
        if capacity_log > MAX_CAPACITY_LOG {
            return Err(TableError::CapacityOverflow);
        }

        let capacity = 1usize << capacity_log;
        let mut buckets = BucketArray::new_in(capacity_log, &self.alloc)?;
        let overflow = match OverflowPool::new_in(capacity, &self.alloc) {
            Ok(overflow) => overflow,
            Err(err) => {
                // SAFETY: `buckets` was just allocated from `self.alloc`.
                unsafe { buckets.release_in(&self.alloc) };
                return Err(err);
            }
        };

        log::debug!(
            "rebuilding table: {} -> {} buckets, {} entries ({} in overflow, {} tombstones)",
            self.buckets.capacity(),
            capacity,
            self.populated,
            self.overflow.live(),
            self.buckets.tombstones(),
        );

        let buckets = mem::replace(&mut self.buckets, buckets);
        let overflow = mem::replace(&mut self.overflow, overflow);
        self.capacity_log = capacity_log;
        self.max_pop = max_load(capacity);

        let mut drain = Drain {
            table: self,
            buckets,
            overflow,
        };
        for slot in 0..drain.buckets.capacity() {
            if let Some((key, value)) = drain.buckets.take(slot) {
                drain.table.reinsert(key, value);
            }

            let mut cursor = drain.buckets.take_chain(slot);
            while let Some(head) = cursor {
                let (next, key, value) = drain.overflow.pop_front(head);
                drain.table.reinsert(key, value);
                cursor = next;
            }
        }

        Ok(())
    }

    /// Places an entry while rebuilding. The new storage holds no tombstones
    /// and the pool has a node for every entry, so this cannot fail.
    fn reinsert(&mut self, key: u64, value: V) {
        let home = self.home_of(key);
        match self.buckets.locate_empty(home) {
            Some(slot) => self.buckets.place(slot, key, value),
            None => {
                let head = self.buckets.chain(home);
                match self.overflow.alloc(key, value, head) {
                    Ok(index) => self.buckets.set_chain(home, Some(index)),
                    Err(_) => unreachable!("overflow pool smaller than the population"),
                }
            }
        }
    }

    /// Computes a histogram of probe distances for the current table state.
    ///
    /// Available in tests and with the `stats` feature.
    ///
    /// Bin `d` counts primary entries stored `d` buckets past their home, for
    /// `d` in `0..probe_limit`. The final bin counts entries in overflow
    /// chains.
    #[cfg(any(test, feature = "stats"))]
    pub fn probe_histogram(&self) -> alloc::vec::Vec<usize> {
        let limit = self.buckets.probe_limit();
        let mut hist = alloc::vec![0usize; limit + 1];

        for slot in 0..self.buckets.capacity() {
            if let Some((key, _)) = self.buckets.entry(slot) {
                let distance = self.buckets.distance(self.home_of(key), slot);
                hist[distance] += 1;
            }
        }
        hist[limit] += self.overflow.live();

        hist
    }

    /// Pretty-prints the probe-distance histogram as a horizontal bar chart.
    ///
    /// Each row is one probe distance, plus an "OF" row for overflow entries.
    #[cfg(all(any(test, feature = "stats"), feature = "std"))]
    pub fn print_probe_histogram(&self) {
        let hist = self.probe_histogram();
        let max = *hist.iter().max().unwrap_or(&0);
        if max == 0 {
            println!("probe histogram: empty");
            return;
        }

        let max_bar = 60usize;
        let total_units = max_bar * 8;
        println!("probe histogram ({} entries):", self.populated);

        let make_bar = |count: usize| -> alloc::string::String {
            if count == 0 {
                return alloc::string::String::new();
            }
            let units = ((count as u128 * total_units as u128).div_ceil(max as u128)) as usize;
            let mut bar = "█".repeat(units / 8);
            let partial = match units % 8 {
                0 => None,
                1 => Some('▏'),
                2 => Some('▎'),
                3 => Some('▍'),
                4 => Some('▌'),
                5 => Some('▋'),
                6 => Some('▊'),
                _ => Some('▉'),
            };
            bar.extend(partial);
            bar
        };

        let limit = hist.len() - 1;
        for (distance, &count) in hist[..limit].iter().enumerate() {
            println!("{distance:>2} | {} ({count})", make_bar(count));
        }
        println!("OF | {} ({})", make_bar(hist[limit]), hist[limit]);
    }
}

impl<V, H, A: RawAllocator> HashTable<V, H, A> {
    fn unallocated(hasher: H, alloc: A) -> Self {
        Self {
            buckets: BucketArray::empty(),
            overflow: OverflowPool::empty(),
            populated: 0,
            capacity_log: 0,
            max_pop: 0,
            hasher,
            alloc,
        }
    }

    fn value_at_mut(&mut self, location: Location) -> &mut V {
        match location {
            Location::Primary(slot) => match self.buckets.value_mut(slot) {
                Some(value) => value,
                None => unreachable!("bucket {slot} is not occupied"),
            },
            Location::Overflow { index, .. } => &mut self.overflow.node_mut(index).value,
        }
    }

    /// Returns the number of entries in the table.
    #[inline]
    pub fn size(&self) -> usize {
        self.populated
    }

    /// Returns the number of entries in the table. Same as
    /// [`size`](HashTable::size).
    #[inline]
    pub fn len(&self) -> usize {
        self.populated
    }

    /// Returns `true` if the table holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.populated == 0
    }

    /// Returns the number of primary buckets, or 0 once destroyed.
    ///
    /// The table grows when an insertion would push [`size`](HashTable::size)
    /// past three quarters of this.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buckets.capacity()
    }

    /// Returns `log2(capacity)`.
    ///
    /// A destroyed table reports 0 here with a capacity of 0, so
    /// `capacity == 1 << capacity_log` only holds while storage is allocated.
    #[inline]
    pub fn capacity_log(&self) -> u32 {
        self.capacity_log
    }

    /// Returns the bump frontier of the overflow pool: the number of overflow
    /// nodes ever handed out since the last rebuild.
    ///
    /// Never exceeds [`capacity`](HashTable::capacity).
    pub fn overflow_heap_ptr(&self) -> usize {
        self.overflow.heap_ptr()
    }

    /// Returns the number of entries currently stored in overflow chains.
    pub fn overflow_len(&self) -> usize {
        self.overflow.live()
    }

    /// Returns the number of tombstoned primary buckets.
    pub fn tombstones(&self) -> usize {
        self.buckets.tombstones()
    }

    /// Returns the hasher used by this table.
    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Returns the allocator used by this table.
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Removes every entry while keeping the allocated capacity.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use spill_hash::HashTable;
    /// let mut table = HashTable::new();
    /// table.insert(1, "a");
    /// let capacity = table.capacity();
    /// table.clear();
    /// assert!(table.is_empty());
    /// assert_eq!(table.capacity(), capacity);
    /// ```
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.overflow.clear();
        self.populated = 0;
    }

    /// Drops every entry and releases all storage, leaving a zero-capacity
    /// table.
    ///
    /// The table stays usable: lookups miss and the next insertion allocates
    /// the default capacity again.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use spill_hash::HashTable;
    /// let mut table = HashTable::new();
    /// table.insert(1, "a");
    /// table.destroy();
    /// assert_eq!(table.size(), 0);
    /// assert_eq!(table.capacity(), 0);
    ///
    /// table.insert(2, "b");
    /// assert!(table.capacity() > 0);
    /// ```
    pub fn destroy(&mut self) {
        // SAFETY: Both storages were allocated from `self.alloc`, or are empty.
        unsafe {
            self.buckets.release_in(&self.alloc);
            self.overflow.release_in(&self.alloc);
        }
        self.populated = 0;
        self.capacity_log = 0;
        self.max_pop = 0;
    }

    /// An iterator over all `(key, &value)` pairs, in no particular order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use spill_hash::HashTable;
    /// let mut table = HashTable::new();
    /// table.insert(1, 10);
    /// table.insert(2, 20);
    /// let mut pairs: Vec<_> = table.iter().map(|(k, v)| (k, *v)).collect();
    /// pairs.sort();
    /// assert_eq!(pairs, [(1, 10), (2, 20)]);
    /// ```
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            buckets: &self.buckets,
            overflow: &self.overflow,
            slot: 0,
            chain: None,
            remaining: self.populated,
        }
    }

    /// An iterator over all keys, in no particular order.
    pub fn keys(&self) -> Keys<'_, V> {
        Keys { inner: self.iter() }
    }

    /// An iterator over all values, in no particular order.
    pub fn values(&self) -> Values<'_, V> {
        Values { inner: self.iter() }
    }

    /// Returns detailed utilization statistics for debugging.
    ///
    /// Available in tests and with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> DebugStats {
        let capacity = self.buckets.capacity();
        let total_bytes = self.buckets.byte_len() + self.overflow.byte_len();
        let live_bytes = self.populated * (mem::size_of::<u64>() + mem::size_of::<V>());

        DebugStats {
            populated: self.populated,
            capacity,
            max_load: self.max_pop,
            probe_limit: self.buckets.probe_limit(),
            occupied_slots: self.buckets.occupied(),
            tombstones: self.buckets.tombstones(),
            overflow_entries: self.overflow.live(),
            overflow_heap_ptr: self.overflow.heap_ptr(),
            overflow_free: self.overflow.free_len(),
            load_factor: if capacity == 0 {
                0.0
            } else {
                self.populated as f64 / capacity as f64
            },
            total_bytes,
            wasted_bytes: total_bytes.saturating_sub(live_bytes),
        }
    }
}

impl<V> Default for HashTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, H, A: RawAllocator> Debug for HashTable<V, H, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        const ROW: usize = 64;

        let rows = (0..self.buckets.capacity().div_ceil(ROW))
            .map(|row| self.buckets.render_row(row, ROW))
            .collect::<alloc::vec::Vec<_>>();

        f.debug_struct("HashTable")
            .field("buckets", &rows)
            .field("populated", &self.populated)
            .field("capacity", &self.buckets.capacity())
            .field("tombstones", &self.buckets.tombstones())
            .field("overflow", &self.overflow.live())
            .field("overflow_heap_ptr", &self.overflow.heap_ptr())
            .finish()
    }
}

impl<V, H, A> Clone for HashTable<V, H, A>
where
    V: Clone,
    H: KeyHasher + Clone,
    A: RawAllocator + Clone,
{
    fn clone(&self) -> Self {
        let mut table = Self::unallocated(self.hasher.clone(), self.alloc.clone());
        if self.buckets.capacity() == 0 {
            return table;
        }

        table
            .rebuild(self.capacity_log)
            .unwrap_or_else(|err| err.handle());
        for (key, value) in self.iter() {
            table.reinsert(key, value.clone());
            table.populated += 1;
        }

        debug_assert_eq!(table.populated, self.populated);
        table
    }
}

/// Storage a rebuild is moving entries out of.
///
/// Dropping it releases whatever was not moved and recounts the table, so a
/// panicking hasher loses the unmoved entries but leaves `size` accurate.
struct Drain<'a, V, H, A: RawAllocator> {
    table: &'a mut HashTable<V, H, A>,
    buckets: BucketArray<V>,
    overflow: OverflowPool<V>,
}

impl<V, H, A: RawAllocator> Drop for Drain<'_, V, H, A> {
    fn drop(&mut self) {
        // SAFETY: The drained storage was allocated from the table's allocator.
        unsafe {
            self.buckets.release_in(&self.table.alloc);
            self.overflow.release_in(&self.table.alloc);
        }
        self.table.populated = self.table.buckets.occupied() + self.table.overflow.live();
    }
}

impl<V, H, A: RawAllocator> Drop for HashTable<V, H, A> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<V, H: KeyHasher, A: RawAllocator> Extend<(u64, V)> for HashTable<V, H, A> {
    fn extend<I: IntoIterator<Item = (u64, V)>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<V, H, A> FromIterator<(u64, V)> for HashTable<V, H, A>
where
    H: KeyHasher + Default,
    A: RawAllocator + Default,
{
    fn from_iter<I: IntoIterator<Item = (u64, V)>>(iter: I) -> Self {
        let mut table = Self::with_hasher_in(H::default(), A::default());
        table.extend(iter);
        table
    }
}

impl<'a, V, H, A: RawAllocator> IntoIterator for &'a HashTable<V, H, A> {
    type IntoIter = Iter<'a, V>;
    type Item = (u64, &'a V);

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over the entries of a [`HashTable`].
///
/// Visits each bucket in order, followed by the overflow chain rooted there.
/// Created by [`HashTable::iter`].
pub struct Iter<'a, V> {
    buckets: &'a BucketArray<V>,
    overflow: &'a OverflowPool<V>,
    slot: usize,
    chain: Option<NodeIndex>,
    remaining: usize,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (u64, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(index) = self.chain {
                let node = self.overflow.node(index);
                self.chain = node.next;
                self.remaining -= 1;
                return Some((node.key, &node.value));
            }

            if self.slot >= self.buckets.capacity() {
                return None;
            }

            let slot = self.slot;
            self.slot += 1;
            self.chain = self.buckets.chain(slot);
            if let Some(entry) = self.buckets.entry(slot) {
                self.remaining -= 1;
                return Some(entry);
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {}

impl<V> FusedIterator for Iter<'_, V> {}

/// An iterator over the keys of a [`HashTable`]. Created by
/// [`HashTable::keys`].
pub struct Keys<'a, V> {
    inner: Iter<'a, V>,
}

impl<V> Iterator for Keys<'_, V> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        self.inner.next().map(|(key, _)| key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<V> ExactSizeIterator for Keys<'_, V> {}

/// An iterator over the values of a [`HashTable`]. Created by
/// [`HashTable::values`].
pub struct Values<'a, V> {
    inner: Iter<'a, V>,
}

impl<'a, V> Iterator for Values<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<&'a V> {
        self.inner.next().map(|(_, value)| value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<V> ExactSizeIterator for Values<'_, V> {}
