#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod bucket_array;
mod overflow_pool;

pub mod error;

pub mod hash_table;

mod hash_table_proptest;

pub mod hasher;

pub mod raw;

pub use error::TableError;
pub use hash_table::HashTable;
pub use hasher::DefaultKeyHasher;
pub use hasher::KeyHasher;
pub use raw::Global;
pub use raw::RawAllocator;
