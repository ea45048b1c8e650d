#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod macros;

/// Errors reported by fallible table operations.
pub mod error;

/// Hash functions and key comparators pluggable into a [`HashTable`].
pub mod hasher;

pub mod hash_table;

/// A typed map over plain-old-data keys and values.
///
/// This module provides a `HashMap` that wraps the byte-oriented `HashTable`
/// and converts keys and values through `bytemuck`.
pub mod hash_map;

pub use error::Error;
pub use hash_map::HashMap;
pub use hash_table::Cursor;
pub use hash_table::Elem;
pub use hash_table::Handle;
pub use hash_table::HashTable;
pub use hash_table::Pair;
