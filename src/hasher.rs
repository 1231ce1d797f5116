//! Key hashing strategies.
//!
//! The table only ever hashes `u64` keys, so the strategy is a single
//! function from key to hash. Any `Fn(u64) -> u64` closure works, as does any
//! [`BuildHasher`] wrapped in [`BuildKeyHasher`].

use core::fmt::Debug;
use core::hash::BuildHasher;

/// Maps a key to the hash used to pick its home bucket.
///
/// Only the low bits of the hash select the home bucket, so implementations
/// should mix entropy into them.
pub trait KeyHasher {
    /// Hashes `key`.
    fn hash_key(&self, key: u64) -> u64;
}

impl<F> KeyHasher for F
where
    F: Fn(u64) -> u64,
{
    #[inline(always)]
    fn hash_key(&self, key: u64) -> u64 {
        self(key)
    }
}

/// Adapts any [`BuildHasher`] into a [`KeyHasher`].
///
/// # Examples
///
/// ```rust
/// use std::collections::hash_map::RandomState;
///
/// use spill_hash::HashTable;
/// use spill_hash::hasher::BuildKeyHasher;
///
/// let mut table = HashTable::with_hasher(BuildKeyHasher(RandomState::new()));
/// table.insert(7, "seven");
/// assert_eq!(table.find(7), Some(&"seven"));
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct BuildKeyHasher<S>(pub S);

impl<S: BuildHasher> KeyHasher for BuildKeyHasher<S> {
    #[inline(always)]
    fn hash_key(&self, key: u64) -> u64 {
        self.0.hash_one(key)
    }
}

/// The built-in integer mixer: the SplitMix64 finalizer.
///
/// A bijection on `u64` with full avalanche, so sequential and strided keys
/// spread across all bucket bits.
#[inline(always)]
pub const fn mix64(key: u64) -> u64 {
    let mut z = key.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// The default key hasher.
        ///
        /// With the `foldhash` feature this is a per-table randomly seeded
        /// foldhash, so an adversary cannot precompute colliding keys.
        #[derive(Clone, Default)]
        pub struct DefaultKeyHasher {
            state: foldhash::fast::RandomState,
        }

        impl KeyHasher for DefaultKeyHasher {
            #[inline(always)]
            fn hash_key(&self, key: u64) -> u64 {
                self.state.hash_one(key)
            }
        }
    } else {
        /// The default key hasher.
        ///
        /// Without the `foldhash` feature this is the unseeded [`mix64`]
        /// integer mixer.
        #[derive(Clone, Default)]
        pub struct DefaultKeyHasher {
            _private: (),
        }

        impl KeyHasher for DefaultKeyHasher {
            #[inline(always)]
            fn hash_key(&self, key: u64) -> u64 {
                mix64(key)
            }
        }
    }
}

impl Debug for DefaultKeyHasher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DefaultKeyHasher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use core::hash::Hasher;

    use siphasher::sip::SipHasher;

    use super::*;

    #[derive(Clone, Default)]
    struct SipBuilder;

    impl BuildHasher for SipBuilder {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> Self::Hasher {
            SipHasher::new_with_keys(1, 2)
        }
    }

    #[test]
    fn closures_are_hashers() {
        let identity = |key: u64| key;
        assert_eq!(identity.hash_key(42), 42);

        let constant = |_: u64| 0u64;
        assert_eq!(constant.hash_key(1), constant.hash_key(2));
    }

    #[test]
    fn build_hasher_adapter_matches_hash_one() {
        let hasher = BuildKeyHasher(SipBuilder);
        let mut sip = SipHasher::new_with_keys(1, 2);
        sip.write_u64(99);
        assert_eq!(hasher.hash_key(99), sip.finish());
    }

    #[test]
    fn mix64_is_not_identity_and_spreads_low_bits() {
        assert_ne!(mix64(0), 0);
        let mut seen = [false; 16];
        for key in 0..64u64 {
            seen[(mix64(key * 16) & 15) as usize] = true;
        }
        assert!(seen.iter().filter(|&&b| b).count() > 8);
    }

    #[test]
    fn default_hasher_is_deterministic_per_instance() {
        let hasher = DefaultKeyHasher::default();
        assert_eq!(hasher.hash_key(12345), hasher.hash_key(12345));
        let cloned = hasher.clone();
        assert_eq!(hasher.hash_key(777), cloned.hash_key(777));
    }
}
