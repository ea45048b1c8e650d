use core::fmt::Debug;
use core::marker::PhantomData;

use bytemuck::Pod;

use crate::error::Error;
use crate::error::or_alloc_error;
use crate::hash_table::Cursor;
use crate::hash_table::DEFAULT_CAPACITY;
use crate::hash_table::Elem;
use crate::hash_table::HashTable;
use crate::hasher::HashFn;

#[cfg(feature = "std")]
fn default_seed() -> u64 {
    use std::hash::BuildHasher;

    std::collections::hash_map::RandomState::new().hash_one(0x5eed_u64)
}

#[cfg(not(feature = "std"))]
fn default_seed() -> u64 {
    0x9e37_79b9_7f4a_7c15
}

/// A hash map over plain-old-data keys and values, stored in a byte-oriented
/// [`HashTable`].
///
/// Keys and values are copied into the table as their raw bytes, so two keys
/// are equal exactly when their bytes are. `K` must not be zero-sized; a
/// zero-sized `V` is supported and reads back as its zeroed value.
///
/// With the `std` feature, maps built without an explicit seed draw one from
/// the standard library's randomly keyed hasher.
///
/// # Performance Characteristics
///
/// - **Memory**: 9 bytes per bucket overhead, plus the sizes of `K` and `V`,
///   at a load factor of at most 80%.
pub struct HashMap<K, V> {
    table: HashTable,
    _marker: PhantomData<(K, V)>,
}

impl<K, V> Debug for HashMap<K, V>
where
    K: Pod + Debug,
    V: Pod + Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in self.iter() {
            map.entry(&k, &v);
        }
        map.finish()
    }
}

impl<K, V> Clone for HashMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            _marker: PhantomData,
        }
    }
}

impl<K: Pod, V: Pod> Default for HashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Pod, V: Pod> HashMap<K, V> {
    /// Creates an empty map with the default capacity.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_hash::HashMap;
    /// #
    /// let map: HashMap<u32, u64> = HashMap::new();
    /// assert!(map.is_empty());
    /// assert_eq!(map.capacity(), 16);
    /// ```
    pub fn new() -> Self {
        Self::with_capacity_and_seed(DEFAULT_CAPACITY, default_seed())
    }

    /// Creates an empty map with `capacity` buckets.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_seed(capacity, default_seed())
    }

    /// Creates an empty map whose key hash is seeded with `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_capacity_and_seed(DEFAULT_CAPACITY, seed)
    }

    /// Creates an empty map with `capacity` buckets and a seeded key hash.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_hash::HashMap;
    /// #
    /// let mut map: HashMap<u64, u64> = HashMap::with_capacity_and_seed(100, 42);
    /// assert_eq!(map.capacity(), 100);
    /// map.insert(1, 2)?;
    /// assert_eq!(map.get(&1), Some(2));
    /// # Ok::<(), robin_hash::Error>(())
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `K` is zero-sized, and diverts to the allocation error
    /// handler if the storage cannot be allocated.
    pub fn with_capacity_and_seed(capacity: usize, seed: u64) -> Self {
        or_alloc_error(Self::build(capacity, seed, None))
    }

    /// Creates an empty map that hashes keys with `hasher`.
    pub fn with_hasher(seed: u64, hasher: HashFn) -> Self {
        or_alloc_error(Self::build(DEFAULT_CAPACITY, seed, Some(hasher)))
    }

    /// Creates an empty map with `capacity` buckets that hashes keys with
    /// `hasher`, reporting allocation failure instead of aborting.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be allocated.
    pub fn try_with_capacity_and_hasher(
        capacity: usize,
        seed: u64,
        hasher: HashFn,
    ) -> Result<Self, Error> {
        Self::build(capacity, seed, Some(hasher))
    }

    fn build(capacity: usize, seed: u64, hasher: Option<HashFn>) -> Result<Self, Error> {
        assert!(
            core::mem::size_of::<K>() != 0,
            "zero-sized keys are not supported"
        );

        Ok(Self {
            table: HashTable::with_capacity(
                capacity,
                core::mem::size_of::<K>(),
                core::mem::size_of::<V>(),
                seed,
                hasher,
                None,
            )?,
            _marker: PhantomData,
        })
    }

    /// Returns the number of elements in the map.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no elements.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of buckets in the underlying table.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes all elements from the map, keeping its capacity.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Inserts a key-value pair, returning the previous value for the key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_hash::HashMap;
    /// #
    /// let mut map: HashMap<u32, f32> = HashMap::with_seed(7);
    /// assert_eq!(map.insert(1, 0.5)?, None);
    /// assert_eq!(map.insert(1, 1.5)?, Some(0.5));
    /// assert_eq!(map.len(), 1);
    /// # Ok::<(), robin_hash::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the map needed to grow and could not allocate. The
    /// map is left unchanged.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>, Error> {
        let previous = self.get(&key);
        let value = Self::value_elem(&value);
        self.table
            .set(Some(Elem::Bytes(bytemuck::bytes_of(&key))), value)?;
        Ok(previous)
    }

    /// Returns a copy of the value for `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        let value = self.table.get(Some(Elem::Bytes(bytemuck::bytes_of(key))))?;
        Some(match value.and_then(|value| value.as_bytes()) {
            Some(bytes) => bytemuck::pod_read_unaligned(bytes),
            None => V::zeroed(),
        })
    }

    /// Returns `true` if the map contains `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.table
            .exists(Some(Elem::Bytes(bytemuck::bytes_of(key))))
    }

    /// Removes `key`, returning its value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_hash::HashMap;
    /// #
    /// let mut map: HashMap<[u8; 3], u16> = HashMap::new();
    /// map.insert(*b"abc", 9)?;
    /// assert_eq!(map.remove(b"abc"), Some(9));
    /// assert_eq!(map.remove(b"abc"), None);
    /// # Ok::<(), robin_hash::Error>(())
    /// ```
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.get(key)?;
        self.table
            .remove(Some(Elem::Bytes(bytemuck::bytes_of(key))));
        Some(value)
    }

    /// Inserts every entry of `other`, overwriting shared keys.
    ///
    /// # Errors
    ///
    /// Returns an error if a growth fails. Entries merged before the failure
    /// remain.
    pub fn update(&mut self, other: &Self) -> Result<(), Error> {
        self.table.update(&other.table)
    }

    /// Clones the map, reporting allocation failure instead of aborting.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be allocated.
    pub fn try_clone(&self) -> Result<Self, Error> {
        Ok(Self {
            table: self.table.try_clone()?,
            _marker: PhantomData,
        })
    }

    /// Returns an iterator over copies of the key-value pairs.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
            _marker: PhantomData,
        }
    }

    /// Returns an iterator over copies of the keys.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over copies of the values.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Returns the underlying byte table.
    pub fn as_table(&self) -> &HashTable {
        &self.table
    }

    fn value_elem(value: &V) -> Option<Elem<'_>> {
        (core::mem::size_of::<V>() != 0).then(|| Elem::Bytes(bytemuck::bytes_of(value)))
    }
}

impl<'a, K: Pod, V: Pod> IntoIterator for &'a HashMap<K, V> {
    type IntoIter = Iter<'a, K, V>;
    type Item = (K, V);

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over the key-value pairs of a `HashMap`.
pub struct Iter<'a, K, V> {
    inner: Cursor<'a>,
    _marker: PhantomData<(K, V)>,
}

impl<K: Pod, V: Pod> Iterator for Iter<'_, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let pair = self.inner.next()?;
        let key = pair.key.and_then(|key| key.as_bytes())?;
        let value = match pair.value.and_then(|value| value.as_bytes()) {
            Some(bytes) => bytemuck::pod_read_unaligned(bytes),
            None => V::zeroed(),
        };
        Some((bytemuck::pod_read_unaligned(key), value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// An iterator over the keys of a `HashMap`.
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<K: Pod, V: Pod> Iterator for Keys<'_, K, V> {
    type Item = K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }
}

/// An iterator over the values of a `HashMap`.
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<K: Pod, V: Pod> Iterator for Values<'_, K, V> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }
}
