//! A byte-oriented hash table using Robin Hood hashing.
//!
//! Keys and values are fixed-size byte strings whose sizes are chosen when the
//! table is constructed. A size of zero selects store-by-reference: the slot
//! holds an opaque pointer-width [`Handle`] instead of a copy of the element.
//!
//! Collisions are resolved by linear probing with Robin Hood displacement, and
//! removal uses backward-shift deletion, so the table never holds tombstones.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::alloc::Layout;
use core::fmt::Debug;
use core::ops::Range;
use core::ptr::NonNull;

use crate::error::Error;
use crate::error::or_alloc_error;
use crate::hasher::EqFn;
use crate::hasher::HashFn;
use crate::hasher::bytes_eq;
use crate::hasher::fnv1a_mix;
use crate::macros::trace;

/// Number of buckets allocated by [`HashTable::new`].
pub const DEFAULT_CAPACITY: usize = 16;

/// Storage width of a store-by-reference element.
pub const HANDLE_SIZE: usize = core::mem::size_of::<usize>();

/// Metadata marking an empty slot.
const EMPTY_PSL: u64 = 0;

/// Metadata of an entry sitting in its home bucket.
const HOME_PSL: u64 = 1;

/// Reserved metadata of the null-key entry. No probing entry ever reaches this
/// value, so the entry can never be displaced.
const NULL_PSL: u64 = u64::MAX;

/// Largest length a table of `capacity` buckets may hold, `floor(capacity * 0.8)`.
#[inline(always)]
fn resize_threshold(capacity: usize) -> usize {
    capacity / 5 * 4 + (capacity % 5) * 4 / 5
}

#[inline(always)]
fn span(index: usize, stride: usize) -> Range<usize> {
    index * stride..(index + 1) * stride
}

/// An opaque pointer-width word stored by tables whose key or value size is
/// zero.
///
/// The table never dereferences a handle: it hashes and compares the word
/// itself, so two handles are the same key exactly when their words are equal.
/// Ownership of whatever the handle refers to stays with the caller, who may
/// register destructors on the table to be told when a handle is released.
///
/// # Examples
///
/// ```rust
/// use robin_hash::Handle;
///
/// let name = Box::new(String::from("alice"));
/// let handle = Handle::from_ptr(Box::into_raw(name));
///
/// // SAFETY: the handle was created from a leaked box above.
/// let name = unsafe { Box::from_raw(handle.as_mut_ptr::<String>()) };
/// assert_eq!(*name, "alice");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Handle(usize);

impl Handle {
    /// Wraps a raw word.
    pub const fn new(word: usize) -> Self {
        Handle(word)
    }

    /// Returns the raw word.
    pub const fn get(self) -> usize {
        self.0
    }

    /// Wraps the address of `ptr`, exposing its provenance so the pointer can
    /// be recovered with [`Handle::as_ptr`] or [`Handle::as_mut_ptr`].
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Handle(ptr.expose_provenance())
    }

    /// Recovers a pointer previously wrapped with [`Handle::from_ptr`].
    pub fn as_ptr<T>(self) -> *const T {
        core::ptr::with_exposed_provenance(self.0)
    }

    /// Recovers a mutable pointer previously wrapped with
    /// [`Handle::from_ptr`].
    pub fn as_mut_ptr<T>(self) -> *mut T {
        core::ptr::with_exposed_provenance_mut(self.0)
    }
}

/// A key or value passed to or returned from a [`HashTable`].
///
/// Tables with a non-zero element size take and return [`Elem::Bytes`] slices
/// of exactly that size. Tables with an element size of zero take and return
/// [`Elem::Handle`]. Passing the wrong kind, or a slice of the wrong length,
/// panics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Elem<'a> {
    /// An element copied into the table.
    Bytes(&'a [u8]),
    /// An element stored by reference.
    Handle(Handle),
}

impl<'a> Elem<'a> {
    /// Returns the bytes of an inline element.
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match *self {
            Elem::Bytes(bytes) => Some(bytes),
            Elem::Handle(_) => None,
        }
    }

    /// Returns the handle of a store-by-reference element.
    pub fn as_handle(&self) -> Option<Handle> {
        match *self {
            Elem::Bytes(_) => None,
            Elem::Handle(handle) => Some(handle),
        }
    }
}

impl<'a> From<&'a [u8]> for Elem<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Elem::Bytes(bytes)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Elem<'a> {
    fn from(bytes: &'a [u8; N]) -> Self {
        Elem::Bytes(bytes)
    }
}

impl From<Handle> for Elem<'_> {
    fn from(handle: Handle) -> Self {
        Elem::Handle(handle)
    }
}

/// A key and value yielded by a [`Cursor`]. A `None` key is the null key, and a
/// `None` value is an entry stored without a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pair<'a> {
    /// The entry's key.
    pub key: Option<Elem<'a>>,
    /// The entry's value.
    pub value: Option<Elem<'a>>,
}

/// A callback receiving keys or values as the table releases them.
pub type Destructor = Box<dyn FnMut(Elem<'_>)>;

/// How elements of one kind are held in their slot array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Width {
    Inline(usize),
    Handle,
}

impl Width {
    fn from_size(size: usize) -> Self {
        if size == 0 {
            Width::Handle
        } else {
            Width::Inline(size)
        }
    }

    fn size(self) -> usize {
        match self {
            Width::Inline(size) => size,
            Width::Handle => 0,
        }
    }

    fn stride(self) -> usize {
        match self {
            Width::Inline(size) => size,
            Width::Handle => HANDLE_SIZE,
        }
    }

    fn lower(self, elem: Elem<'_>) -> Lowered<'_> {
        match (self, elem) {
            (Width::Inline(size), Elem::Bytes(bytes)) => {
                assert_eq!(
                    bytes.len(),
                    size,
                    "element of {} bytes passed to a table storing {size} bytes",
                    bytes.len()
                );
                Lowered::Bytes(bytes)
            }
            (Width::Handle, Elem::Handle(handle)) => Lowered::Handle(handle.0.to_ne_bytes()),
            (Width::Inline(size), Elem::Handle(_)) => {
                panic!("handle passed to a table storing {size}-byte elements")
            }
            (Width::Handle, Elem::Bytes(_)) => {
                panic!("bytes passed to a table storing elements by reference")
            }
        }
    }

    fn decode(self, stored: &[u8]) -> Elem<'_> {
        match self {
            Width::Inline(_) => Elem::Bytes(stored),
            Width::Handle => {
                let mut word = [0u8; HANDLE_SIZE];
                word.copy_from_slice(stored);
                Elem::Handle(Handle(usize::from_ne_bytes(word)))
            }
        }
    }
}

/// An element in its stored representation.
enum Lowered<'a> {
    Bytes(&'a [u8]),
    Handle([u8; HANDLE_SIZE]),
}

impl Lowered<'_> {
    fn as_bytes(&self) -> &[u8] {
        match self {
            Lowered::Bytes(bytes) => bytes,
            Lowered::Handle(word) => word,
        }
    }
}

/// Element widths plus the hash and key equality used by one table. Fixed at
/// construction.
#[derive(Clone, Copy)]
struct Policy {
    key: Width,
    value: Width,
    seed: u64,
    hasher: HashFn,
    comparator: EqFn,
}

impl Policy {
    #[inline]
    fn home(&self, key: &[u8], capacity: usize) -> usize {
        ((self.hasher)(key, self.seed) % capacity as u64) as usize
    }

    /// Handles compare by identity; the comparator only sees inline keys.
    #[inline]
    fn keys_eq(&self, stored: &[u8], key: &[u8]) -> bool {
        match self.key {
            Width::Inline(_) => (self.comparator)(stored, key),
            Width::Handle => stored == key,
        }
    }
}

#[derive(Default)]
struct Hooks {
    key: Option<Destructor>,
    value: Option<Destructor>,
}

impl Hooks {
    /// Hands the occupant of `index` to the registered destructors.
    fn release(&mut self, policy: &Policy, slots: &Slots<'_>, index: usize) {
        if slots.psl[index] != NULL_PSL {
            if let Some(destroy) = self.key.as_mut() {
                destroy(policy.key.decode(slots.key(index)));
            }
        }
        if slots.present(index) {
            if let Some(destroy) = self.value.as_mut() {
                destroy(policy.value.decode(slots.value(index)));
            }
        }
    }
}

/// Offsets of the parallel arrays inside one table allocation.
///
/// Every array holds `capacity + 1` slots: the probe ring followed by the slot
/// reserved for the null key. The carry slot after them holds the entry in
/// flight during displacement.
#[derive(Debug)]
struct SlotLayout {
    layout: Layout,
    capacity: usize,
    key_stride: usize,
    value_stride: usize,

    keys_offset: usize,
    values_offset: usize,
    flags_offset: usize,
    carry_key_offset: usize,
    carry_value_offset: usize,
}

impl SlotLayout {
    fn new(capacity: usize, key_stride: usize, value_stride: usize) -> Result<Self, Error> {
        let slots = capacity.checked_add(1).ok_or(Error::CapacityOverflow)?;
        let key_bytes = slots
            .checked_mul(key_stride)
            .ok_or(Error::CapacityOverflow)?;
        let value_bytes = slots
            .checked_mul(value_stride)
            .ok_or(Error::CapacityOverflow)?;

        let psl_layout = Layout::array::<u64>(slots)?;
        let (layout, keys_offset) = psl_layout.extend(Layout::array::<u8>(key_bytes)?)?;
        let (layout, values_offset) = layout.extend(Layout::array::<u8>(value_bytes)?)?;
        let (layout, flags_offset) = layout.extend(Layout::array::<u8>(slots)?)?;
        let (layout, carry_key_offset) = layout.extend(Layout::array::<u8>(key_stride)?)?;
        let (layout, carry_value_offset) = layout.extend(Layout::array::<u8>(value_stride)?)?;

        Ok(SlotLayout {
            layout: layout.pad_to_align(),
            capacity,
            key_stride,
            value_stride,
            keys_offset,
            values_offset,
            flags_offset,
            carry_key_offset,
            carry_value_offset,
        })
    }
}

/// The single zero-initialized allocation backing a table.
struct RawSlots {
    layout: SlotLayout,
    alloc: NonNull<u8>,
}

impl RawSlots {
    fn new(capacity: usize, key_stride: usize, value_stride: usize) -> Result<Self, Error> {
        let layout = SlotLayout::new(capacity, key_stride, value_stride)?;

        // SAFETY: The layout always holds at least one metadata word, so its size
        // is non-zero.
        let raw = unsafe { alloc::alloc::alloc_zeroed(layout.layout) };
        let alloc = NonNull::new(raw).ok_or(Error::AllocFailed {
            layout: layout.layout,
        })?;

        Ok(RawSlots { layout, alloc })
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.layout.capacity
    }

    fn parts(&self) -> Slots<'_> {
        let l = &self.layout;
        let slots = l.capacity + 1;
        let base = self.alloc.as_ptr();

        // SAFETY: Every region lies inside the allocation at the offsets computed
        // by `SlotLayout`, and the regions do not overlap. The metadata array sits
        // at offset zero of an allocation aligned for `u64`. The allocation was
        // zero-initialized, so every byte is initialized.
        unsafe {
            Slots {
                psl: core::slice::from_raw_parts(base.cast::<u64>(), slots),
                keys: core::slice::from_raw_parts(
                    base.add(l.keys_offset),
                    slots * l.key_stride,
                ),
                values: core::slice::from_raw_parts(
                    base.add(l.values_offset),
                    slots * l.value_stride,
                ),
                flags: core::slice::from_raw_parts(base.add(l.flags_offset), slots),
                key_stride: l.key_stride,
                value_stride: l.value_stride,
            }
        }
    }

    fn parts_mut(&mut self) -> SlotsMut<'_> {
        let l = &self.layout;
        let slots = l.capacity + 1;
        let base = self.alloc.as_ptr();

        // SAFETY: As in `parts`. The regions are disjoint, so handing out one
        // mutable slice per region does not alias, and `&mut self` guarantees no
        // other view exists.
        unsafe {
            SlotsMut {
                psl: core::slice::from_raw_parts_mut(base.cast::<u64>(), slots),
                keys: core::slice::from_raw_parts_mut(
                    base.add(l.keys_offset),
                    slots * l.key_stride,
                ),
                values: core::slice::from_raw_parts_mut(
                    base.add(l.values_offset),
                    slots * l.value_stride,
                ),
                flags: core::slice::from_raw_parts_mut(base.add(l.flags_offset), slots),
                carry_key: core::slice::from_raw_parts_mut(
                    base.add(l.carry_key_offset),
                    l.key_stride,
                ),
                carry_value: core::slice::from_raw_parts_mut(
                    base.add(l.carry_value_offset),
                    l.value_stride,
                ),
                key_stride: l.key_stride,
                value_stride: l.value_stride,
            }
        }
    }
}

impl Drop for RawSlots {
    fn drop(&mut self) {
        // SAFETY: `alloc` was returned by `alloc_zeroed` with this exact layout.
        unsafe { alloc::alloc::dealloc(self.alloc.as_ptr(), self.layout.layout) }
    }
}

struct Slots<'a> {
    psl: &'a [u64],
    keys: &'a [u8],
    values: &'a [u8],
    flags: &'a [u8],
    key_stride: usize,
    value_stride: usize,
}

impl<'a> Slots<'a> {
    #[inline]
    fn key(&self, index: usize) -> &'a [u8] {
        let keys = self.keys;
        &keys[span(index, self.key_stride)]
    }

    #[inline]
    fn value(&self, index: usize) -> &'a [u8] {
        let values = self.values;
        &values[span(index, self.value_stride)]
    }

    #[inline]
    fn present(&self, index: usize) -> bool {
        self.flags[index] != 0
    }
}

struct SlotsMut<'a> {
    psl: &'a mut [u64],
    keys: &'a mut [u8],
    values: &'a mut [u8],
    flags: &'a mut [u8],
    carry_key: &'a mut [u8],
    carry_value: &'a mut [u8],
    key_stride: usize,
    value_stride: usize,
}

impl SlotsMut<'_> {
    fn value(&self, index: usize) -> &[u8] {
        &self.values[span(index, self.value_stride)]
    }

    fn present(&self, index: usize) -> bool {
        self.flags[index] != 0
    }

    fn write_key(&mut self, index: usize, key: Option<&[u8]>) {
        let slot = &mut self.keys[span(index, self.key_stride)];
        match key {
            Some(key) => slot.copy_from_slice(key),
            None => slot.fill(0),
        }
    }

    fn write_value(&mut self, index: usize, value: Option<&[u8]>) {
        let slot = &mut self.values[span(index, self.value_stride)];
        match value {
            Some(value) => slot.copy_from_slice(value),
            None => slot.fill(0),
        }
        self.flags[index] = value.is_some() as u8;
    }

    fn load_carry(&mut self, key: &[u8], value: Option<&[u8]>) -> bool {
        self.carry_key.copy_from_slice(key);
        match value {
            Some(value) => self.carry_value.copy_from_slice(value),
            None => self.carry_value.fill(0),
        }
        value.is_some()
    }

    /// Exchanges the carried entry with the resident of `index`, returning the
    /// resident's presence flag.
    fn swap_carry(&mut self, index: usize, present: bool) -> bool {
        self.keys[span(index, self.key_stride)].swap_with_slice(self.carry_key);
        self.values[span(index, self.value_stride)].swap_with_slice(self.carry_value);
        let resident = self.flags[index] != 0;
        self.flags[index] = present as u8;
        resident
    }

    fn store_carry(&mut self, index: usize, psl: u64, present: bool) {
        self.keys[span(index, self.key_stride)].copy_from_slice(self.carry_key);
        self.values[span(index, self.value_stride)].copy_from_slice(self.carry_value);
        self.flags[index] = present as u8;
        self.psl[index] = psl;
    }

    fn move_slot(&mut self, from: usize, to: usize) {
        self.keys
            .copy_within(span(from, self.key_stride), to * self.key_stride);
        self.values
            .copy_within(span(from, self.value_stride), to * self.value_stride);
        self.flags[to] = self.flags[from];
    }
}

/// Outcome of walking a key's probe sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    Found(usize),
    Vacant { index: usize, psl: u64 },
}

/// Debug statistics for hash table analysis.
///
/// Compiled with `cfg(test)` or the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of elements currently in the table
    pub populated: usize,
    /// Number of buckets in the probe ring
    pub capacity: usize,
    /// Maximum length before the next insertion grows the table
    pub threshold: usize,
    /// Longest probe sequence length of any ring entry
    pub max_psl: u64,
    /// Mean probe sequence length over ring entries
    pub mean_psl: f64,
    /// Number of entries holding the null key (zero or one)
    pub null_entries: usize,
    /// Load factor (populated / capacity)
    pub load_factor: f64,
    /// Total memory in bytes used by the table
    pub total_bytes: usize,
    /// Memory in bytes held by empty slots
    pub wasted_bytes: usize,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Debug Statistics ===");
        println!(
            "Population: {}/{} ({:.2}% load factor, resize at {})",
            self.populated,
            self.capacity,
            self.load_factor * 100.0,
            self.threshold
        );
        println!(
            "Probe Lengths: max {}, mean {:.3}",
            self.max_psl, self.mean_psl
        );
        println!("Null Key: {} entries", self.null_entries);
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

/// A hash table of fixed-size byte keys and values using Robin Hood hashing.
///
/// Every slot records its probe sequence length (PSL): one plus its distance
/// from the bucket its key hashes to. An insertion that has probed further than
/// a resident takes the resident's slot and carries the resident onward, which
/// keeps probe lengths short and even. Removal shifts the following run back by
/// one slot rather than leaving a tombstone.
///
/// Besides ordinary keys, the table holds at most one entry for the *null key*
/// (`None`), and any entry may be stored without a value. The length counts
/// both. The table grows by half its capacity before its length would exceed
/// 80% of its bucket count.
///
/// ## Example
///
/// ```rust
/// use robin_hash::Elem;
/// use robin_hash::HashTable;
///
/// let mut table = HashTable::new(4, 4, 0x5eed, None, None)?;
///
/// let key = 7u32.to_le_bytes();
/// table.set(Some(Elem::from(&key)), Some(Elem::from(&49u32.to_le_bytes())))?;
/// assert_eq!(
///     table.get(Some(Elem::from(&key))),
///     Some(Some(Elem::Bytes(&49u32.to_le_bytes())))
/// );
///
/// // A key stored without a value is still present.
/// table.set(Some(Elem::from(&8u32.to_le_bytes())), None)?;
/// assert_eq!(table.get(Some(Elem::from(&8u32.to_le_bytes()))), Some(None));
/// assert!(table.exists(Some(Elem::from(&8u32.to_le_bytes()))));
/// assert_eq!(table.len(), 2);
/// # Ok::<(), robin_hash::Error>(())
/// ```
pub struct HashTable {
    slots: RawSlots,
    policy: Policy,
    hooks: Hooks,

    len: usize,
    threshold: usize,
}

impl Debug for HashTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use alloc::format;
        use alloc::string::String;
        use alloc::string::ToString;

        let slots = self.slots.parts();
        let metadata = slots
            .psl
            .chunks(16)
            .map(|row| {
                row.iter()
                    .map(|&psl| match psl {
                        EMPTY_PSL => "..".to_string(),
                        NULL_PSL => "NN".to_string(),
                        psl => format!("{psl:02}"),
                    })
                    .collect::<Vec<String>>()
                    .join(", ")
            })
            .collect::<Vec<_>>();

        f.debug_struct("HashTable")
            .field("metadata", &metadata)
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .field("threshold", &self.threshold)
            .field("key_size", &self.key_size())
            .field("value_size", &self.value_size())
            .finish()
    }
}

impl Clone for HashTable {
    /// Clones the table's entries and configuration. Destructors are not
    /// carried over.
    ///
    /// # Panics
    ///
    /// Diverts to [`alloc::alloc::handle_alloc_error`] if the storage cannot be
    /// allocated.
    fn clone(&self) -> Self {
        or_alloc_error(self.try_clone())
    }
}

impl Drop for HashTable {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl HashTable {
    /// Creates a table of [`DEFAULT_CAPACITY`] buckets.
    ///
    /// A `key_size` or `value_size` of zero stores that element by reference as
    /// a [`Handle`]. `hasher` defaults to [`fnv1a_mix`] and `comparator` to
    /// byte-wise equality; the comparator is not consulted for handle keys,
    /// which compare by identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be allocated.
    pub fn new(
        key_size: usize,
        value_size: usize,
        seed: u64,
        hasher: Option<HashFn>,
        comparator: Option<EqFn>,
    ) -> Result<Self, Error> {
        Self::with_capacity(
            DEFAULT_CAPACITY,
            key_size,
            value_size,
            seed,
            hasher,
            comparator,
        )
    }

    /// Creates a table of `capacity` buckets, raised to one if zero.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_hash::HashTable;
    /// #
    /// let table = HashTable::with_capacity(100, 8, 8, 1, None, None)?;
    /// assert_eq!(table.capacity(), 100);
    /// assert_eq!(table.threshold(), 80);
    /// # Ok::<(), robin_hash::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be allocated.
    pub fn with_capacity(
        capacity: usize,
        key_size: usize,
        value_size: usize,
        seed: u64,
        hasher: Option<HashFn>,
        comparator: Option<EqFn>,
    ) -> Result<Self, Error> {
        let capacity = capacity.max(1);
        let policy = Policy {
            key: Width::from_size(key_size),
            value: Width::from_size(value_size),
            seed,
            hasher: hasher.unwrap_or(fnv1a_mix),
            comparator: comparator.unwrap_or(bytes_eq),
        };
        let slots = RawSlots::new(capacity, policy.key.stride(), policy.value.stride())?;

        trace!(
            "created table: capacity {}, key size {}, value size {}",
            capacity, key_size, value_size
        );

        Ok(HashTable {
            slots,
            policy,
            hooks: Hooks::default(),
            len: 0,
            threshold: resize_threshold(capacity),
        })
    }

    /// Returns the number of entries, including the null-key entry.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of buckets in the probe ring.
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Returns the largest length reachable before the next insertion of a new
    /// key grows the table.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Returns the key size the table was created with. Zero means keys are
    /// stored by reference.
    pub fn key_size(&self) -> usize {
        self.policy.key.size()
    }

    /// Returns the value size the table was created with. Zero means values
    /// are stored by reference.
    pub fn value_size(&self) -> usize {
        self.policy.value.size()
    }

    /// Returns the hash seed.
    pub fn seed(&self) -> u64 {
        self.policy.seed
    }

    /// Registers a callback that receives every key the table releases
    /// through removal, clearing, dropping, or a shrinking resize. Replaces any
    /// previous key destructor.
    pub fn set_key_destructor(&mut self, destructor: impl FnMut(Elem<'_>) + 'static) {
        self.hooks.key = Some(Box::new(destructor));
    }

    /// Registers a callback that receives every value the table releases,
    /// including values replaced by [`set`](Self::set). Replaces any previous
    /// value destructor.
    pub fn set_value_destructor(&mut self, destructor: impl FnMut(Elem<'_>) + 'static) {
        self.hooks.value = Some(Box::new(destructor));
    }

    /// Unregisters and returns the key destructor.
    pub fn take_key_destructor(&mut self) -> Option<Destructor> {
        self.hooks.key.take()
    }

    /// Unregisters and returns the value destructor.
    pub fn take_value_destructor(&mut self) -> Option<Destructor> {
        self.hooks.value.take()
    }

    /// Inserts or overwrites the entry for `key`.
    ///
    /// When `key` is already present its value is replaced in place and a
    /// previously stored value is handed to the value destructor, unless the
    /// new value is byte-identical. Otherwise the entry is added, growing the
    /// table first if the length would pass the threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if a required growth cannot allocate. The table is left
    /// unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `key` or `value` does not match the table's element size.
    pub fn set(&mut self, key: Option<Elem<'_>>, value: Option<Elem<'_>>) -> Result<(), Error> {
        let key = key.map(|key| self.policy.key.lower(key));
        let value = value.map(|value| self.policy.value.lower(value));
        let key = key.as_ref().map(Lowered::as_bytes);
        let value = value.as_ref().map(Lowered::as_bytes);

        loop {
            match self.probe(key) {
                Probe::Found(index) => {
                    self.overwrite(index, value);
                    return Ok(());
                }
                Probe::Vacant { .. } if self.len + 1 > self.threshold => self.grow()?,
                Probe::Vacant { index, psl } => {
                    self.insert_vacant(index, psl, key, value);
                    return Ok(());
                }
            }
        }
    }

    /// Looks up `key`.
    ///
    /// Returns `None` if the key is absent, `Some(None)` if it is present
    /// without a value, and `Some(Some(value))` otherwise.
    ///
    /// # Panics
    ///
    /// Panics if `key` does not match the table's key size.
    pub fn get(&self, key: Option<Elem<'_>>) -> Option<Option<Elem<'_>>> {
        let key = key.map(|key| self.policy.key.lower(key));
        match self.probe(key.as_ref().map(Lowered::as_bytes)) {
            Probe::Found(index) => {
                let slots = self.slots.parts();
                Some(
                    slots
                        .present(index)
                        .then(|| self.policy.value.decode(slots.value(index))),
                )
            }
            Probe::Vacant { .. } => None,
        }
    }

    /// Like [`get`](Self::get), but copies the stored value bytes out of the
    /// table. Handle values are returned as the handle's native-endian word.
    pub fn get_cloned(&self, key: Option<Elem<'_>>) -> Option<Option<Vec<u8>>> {
        let key = key.map(|key| self.policy.key.lower(key));
        match self.probe(key.as_ref().map(Lowered::as_bytes)) {
            Probe::Found(index) => {
                let slots = self.slots.parts();
                Some(slots.present(index).then(|| slots.value(index).to_vec()))
            }
            Probe::Vacant { .. } => None,
        }
    }

    /// Returns `true` if `key` is present, with or without a value.
    pub fn exists(&self, key: Option<Elem<'_>>) -> bool {
        let key = key.map(|key| self.policy.key.lower(key));
        matches!(
            self.probe(key.as_ref().map(Lowered::as_bytes)),
            Probe::Found(_)
        )
    }

    /// Removes the entry for `key`, handing its key and value to the
    /// destructors. Returns `false`, leaving the table untouched, if the key was
    /// absent.
    pub fn remove(&mut self, key: Option<Elem<'_>>) -> bool {
        let key = key.map(|key| self.policy.key.lower(key));
        let Probe::Found(index) = self.probe(key.as_ref().map(Lowered::as_bytes)) else {
            return false;
        };

        self.hooks
            .release(&self.policy, &self.slots.parts(), index);
        self.shift_back(index);
        self.len -= 1;
        true
    }

    /// Removes every entry, handing each to the destructors. The capacity is
    /// retained.
    pub fn clear(&mut self) {
        trace!("clearing {} entries", self.len);

        self.release_all();
        let mut slots = self.slots.parts_mut();
        slots.psl.fill(EMPTY_PSL);
        slots.flags.fill(0);
        self.len = 0;
    }

    /// Sets every entry of `src` into this table; entries of `src` win over
    /// existing entries with the same key.
    ///
    /// # Errors
    ///
    /// Returns an error if a growth fails. Entries merged before the failure
    /// remain.
    ///
    /// # Panics
    ///
    /// Panics if the tables have different key or value sizes.
    pub fn update(&mut self, src: &HashTable) -> Result<(), Error> {
        assert!(
            self.policy.key == src.policy.key && self.policy.value == src.policy.value,
            "cannot merge tables with different element sizes"
        );

        for pair in src.iter() {
            self.set(pair.key, pair.value)?;
        }
        Ok(())
    }

    /// Creates a table with this table's capacity, element sizes, seed, hash
    /// function and comparator, holding the same entries. Destructors are not
    /// copied, so handles are never released twice.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be allocated.
    pub fn try_clone(&self) -> Result<Self, Error> {
        let mut table = HashTable::with_capacity(
            self.capacity(),
            self.key_size(),
            self.value_size(),
            self.policy.seed,
            Some(self.policy.hasher),
            Some(self.policy.comparator),
        )?;
        table.update(self)?;
        Ok(table)
    }

    /// Rebuilds the table with `capacity` buckets, raised to one if zero.
    ///
    /// Entries are migrated in slot order until the length reaches the new
    /// threshold. When shrinking below the current length the remaining
    /// entries are handed to the destructors and dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the new storage cannot be allocated. The table is
    /// left unchanged.
    pub fn resize(&mut self, capacity: usize) -> Result<(), Error> {
        let capacity = capacity.max(1);
        trace!("resizing table from {} to {} buckets", self.capacity(), capacity);
        self.rehash(capacity)
    }

    /// Returns a cursor over the entries in ascending slot order.
    pub fn begin(&self) -> Cursor<'_> {
        Cursor {
            table: self,
            index: 0,
            step: 1,
            yielded: 0,
        }
    }

    /// Returns a cursor over the entries in descending slot order.
    pub fn end(&self) -> Cursor<'_> {
        Cursor {
            table: self,
            index: self.capacity() as isize,
            step: -1,
            yielded: 0,
        }
    }

    /// Returns an iterator over the entries. Equivalent to
    /// [`begin`](Self::begin).
    pub fn iter(&self) -> Cursor<'_> {
        self.begin()
    }

    fn probe(&self, key: Option<&[u8]>) -> Probe {
        let capacity = self.capacity();
        let slots = self.slots.parts();

        let Some(key) = key else {
            return if slots.psl[capacity] == NULL_PSL {
                Probe::Found(capacity)
            } else {
                Probe::Vacant {
                    index: capacity,
                    psl: NULL_PSL,
                }
            };
        };

        let home = self.policy.home(key, capacity);
        let mut index = home;
        let mut psl = HOME_PSL;
        let mut candidate = None;

        // The ring always holds an empty slot since `len <= threshold < capacity`.
        loop {
            let resident = slots.psl[index];
            if candidate.is_none() && psl == HOME_PSL && psl > resident {
                candidate = Some(index);
            }

            if resident == EMPTY_PSL {
                let index = candidate.unwrap_or(home);
                let psl = ((index + capacity - home) % capacity) as u64 + HOME_PSL;
                return Probe::Vacant { index, psl };
            }

            if self.policy.keys_eq(slots.key(index), key) {
                return Probe::Found(index);
            }

            psl += 1;
            index = (index + 1) % capacity;
        }
    }

    fn overwrite(&mut self, index: usize, value: Option<&[u8]>) {
        let mut slots = self.slots.parts_mut();
        if slots.present(index) && value != Some(slots.value(index)) {
            if let Some(destroy) = self.hooks.value.as_mut() {
                destroy(self.policy.value.decode(slots.value(index)));
            }
        }
        slots.write_value(index, value);
    }

    /// Places a new entry at the slot reported by `probe`, displacing richer
    /// residents down the run.
    fn insert_vacant(&mut self, index: usize, psl: u64, key: Option<&[u8]>, value: Option<&[u8]>) {
        let capacity = self.capacity();
        let mut slots = self.slots.parts_mut();

        let Some(key) = key else {
            slots.write_key(index, None);
            slots.write_value(index, value);
            slots.psl[index] = psl;
            self.len += 1;
            return;
        };

        let mut present = slots.load_carry(key, value);
        let mut psl = psl;
        let mut index = index;
        loop {
            let resident = slots.psl[index];
            if resident == EMPTY_PSL {
                slots.store_carry(index, psl, present);
                break;
            }

            if psl > resident {
                present = slots.swap_carry(index, present);
                core::mem::swap(&mut psl, &mut slots.psl[index]);
            }

            psl += 1;
            index = (index + 1) % capacity;
        }

        self.len += 1;
    }

    /// Closes the hole at `hole` by pulling the following run back one slot.
    fn shift_back(&mut self, hole: usize) {
        let capacity = self.capacity();
        let mut slots = self.slots.parts_mut();

        if hole == capacity {
            slots.psl[hole] = EMPTY_PSL;
            slots.flags[hole] = 0;
            return;
        }

        let mut hole = hole;
        loop {
            let next = (hole + 1) % capacity;
            let psl = slots.psl[next];
            if psl <= HOME_PSL {
                break;
            }

            slots.move_slot(next, hole);
            slots.psl[hole] = psl - 1;
            hole = next;
        }

        slots.psl[hole] = EMPTY_PSL;
        slots.flags[hole] = 0;
    }

    fn grow(&mut self) -> Result<(), Error> {
        let mut capacity = self.capacity();
        loop {
            capacity = capacity
                .checked_add(capacity / 2)
                .ok_or(Error::CapacityOverflow)?
                .max(capacity + 1);
            if resize_threshold(capacity) > self.len {
                break;
            }
        }

        trace!("growing table from {} to {} buckets", self.capacity(), capacity);
        self.rehash(capacity)
    }

    fn rehash(&mut self, capacity: usize) -> Result<(), Error> {
        let fresh = RawSlots::new(
            capacity,
            self.policy.key.stride(),
            self.policy.value.stride(),
        )?;
        let old = core::mem::replace(&mut self.slots, fresh);
        self.len = 0;
        self.threshold = resize_threshold(capacity);

        let view = old.parts();
        for index in 0..view.psl.len() {
            let psl = view.psl[index];
            if psl == EMPTY_PSL {
                continue;
            }

            if self.len == self.threshold {
                self.hooks.release(&self.policy, &view, index);
                continue;
            }

            let key = (psl != NULL_PSL).then(|| view.key(index));
            let value = view.present(index).then(|| view.value(index));
            if let Probe::Vacant { index, psl } = self.probe(key) {
                self.insert_vacant(index, psl, key, value);
            }
        }

        Ok(())
    }

    fn release_all(&mut self) {
        if self.len == 0 || (self.hooks.key.is_none() && self.hooks.value.is_none()) {
            return;
        }

        let slots = self.slots.parts();
        for index in 0..slots.psl.len() {
            if slots.psl[index] != EMPTY_PSL {
                self.hooks.release(&self.policy, &slots, index);
            }
        }
    }

    /// Computes a histogram of probe sequence lengths.
    ///
    /// Compiled with `cfg(test)` or the `stats` feature.
    ///
    /// Bin `i` counts ring entries with a PSL of `i + 1`, that is entries
    /// sitting `i` slots past their home bucket. The final bin counts the
    /// null-key entry. An empty table yields a single zero bin.
    #[cfg(any(test, feature = "stats"))]
    pub fn probe_histogram(&self) -> Vec<usize> {
        let slots = self.slots.parts();
        let ring = &slots.psl[..self.capacity()];
        let max_psl = ring
            .iter()
            .copied()
            .filter(|&psl| psl != EMPTY_PSL)
            .max()
            .unwrap_or(EMPTY_PSL);

        let mut hist = alloc::vec![0usize; max_psl as usize + 1];
        for &psl in ring {
            if psl != EMPTY_PSL {
                hist[psl as usize - 1] += 1;
            }
        }
        if slots.psl[self.capacity()] == NULL_PSL {
            hist[max_psl as usize] += 1;
        }

        hist
    }

    /// Returns detailed utilization statistics for debugging.
    ///
    /// Compiled with `cfg(test)` or the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> DebugStats {
        let slots = self.slots.parts();
        let capacity = self.capacity();

        let mut ring_entries = 0usize;
        let mut psl_sum = 0u64;
        let mut max_psl = 0u64;
        for &psl in &slots.psl[..capacity] {
            if psl != EMPTY_PSL {
                ring_entries += 1;
                psl_sum += psl;
                max_psl = max_psl.max(psl);
            }
        }

        let slot_bytes = core::mem::size_of::<u64>()
            + self.slots.layout.key_stride
            + self.slots.layout.value_stride
            + 1;

        DebugStats {
            populated: self.len,
            capacity,
            threshold: self.threshold,
            max_psl,
            mean_psl: if ring_entries == 0 {
                0.0
            } else {
                psl_sum as f64 / ring_entries as f64
            },
            null_entries: self.len - ring_entries,
            load_factor: self.len as f64 / capacity as f64,
            total_bytes: self.slots.layout.layout.size(),
            wasted_bytes: (capacity + 1 - self.len) * slot_bytes,
        }
    }

    /// Pretty-prints the probe-length histogram horizontally using stdout.
    ///
    /// Requires the `std` feature and either `cfg(test)` or the `stats`
    /// feature. Each row is one PSL bin, plus an "NN" row for the null key.
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
        println!("probe histogram ({} entries):", self.len);

        let make_bar = |count: usize| -> alloc::string::String {
            if count == 0 {
                return alloc::string::String::new();
            }
            let units = ((count as u128 * total_units as u128).div_ceil(max as u128)) as usize;
            let mut bar = "█".repeat(units / 8);
            let partial = ['▏', '▎', '▍', '▌', '▋', '▊', '▉'];
            if units % 8 > 0 {
                bar.push(partial[units % 8 - 1]);
            }
            bar
        };

        let (null_count, bins) = hist.split_last().unwrap_or((&0, &[]));
        for (i, &count) in bins.iter().enumerate() {
            println!("{:>2} | {} ({})", i + 1, make_bar(count), count);
        }
        println!("NN | {} ({})", make_bar(*null_count), null_count);
    }
}

impl<'a> IntoIterator for &'a HashTable {
    type IntoIter = Cursor<'a>;
    type Item = Pair<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A cursor over the entries of a [`HashTable`], created by
/// [`HashTable::begin`] or [`HashTable::end`].
///
/// Each advance skips empty slots. The cursor is done once it has yielded as
/// many entries as the table holds or has walked off either end. The null-key
/// entry sits after every ring slot, so it comes last from `begin` and first
/// from `end`.
///
/// # Examples
///
/// ```rust
/// # use robin_hash::Elem;
/// # use robin_hash::HashTable;
/// #
/// let mut table = HashTable::new(1, 1, 0, None, None)?;
/// for b in 0u8..4 {
///     table.set(Some(Elem::from(&[b])), Some(Elem::from(&[b * 10])))?;
/// }
///
/// let mut cursor = table.begin();
/// let mut sum = 0;
/// while let Some(Some(value)) = cursor.next_value() {
///     sum += value.as_bytes().map_or(0, |v| v[0]);
/// }
/// assert!(cursor.is_done());
/// assert_eq!(sum, 60);
/// # Ok::<(), robin_hash::Error>(())
/// ```
pub struct Cursor<'a> {
    table: &'a HashTable,
    index: isize,
    step: isize,
    yielded: usize,
}

impl<'a> Cursor<'a> {
    /// Returns `true` once no further entries will be yielded.
    pub fn is_done(&self) -> bool {
        self.yielded >= self.table.len() || !self.in_bounds()
    }

    /// Advances to the next entry and returns its key.
    pub fn next_key(&mut self) -> Option<Option<Elem<'a>>> {
        self.advance().map(|index| self.key_at(index))
    }

    /// Advances to the next entry and returns its value.
    pub fn next_value(&mut self) -> Option<Option<Elem<'a>>> {
        self.advance().map(|index| self.value_at(index))
    }

    /// Advances to the next entry and returns its key and value.
    pub fn next_pair(&mut self) -> Option<Pair<'a>> {
        self.advance().map(|index| Pair {
            key: self.key_at(index),
            value: self.value_at(index),
        })
    }

    fn in_bounds(&self) -> bool {
        (0..=self.table.capacity() as isize).contains(&self.index)
    }

    fn advance(&mut self) -> Option<usize> {
        if self.yielded >= self.table.len() {
            return None;
        }

        let slots = self.table.slots.parts();
        while self.in_bounds() {
            let index = self.index as usize;
            self.index += self.step;
            if slots.psl[index] != EMPTY_PSL {
                self.yielded += 1;
                return Some(index);
            }
        }
        None
    }

    fn key_at(&self, index: usize) -> Option<Elem<'a>> {
        let table: &'a HashTable = self.table;
        let slots = table.slots.parts();
        (slots.psl[index] != NULL_PSL).then(|| table.policy.key.decode(slots.key(index)))
    }

    fn value_at(&self, index: usize) -> Option<Elem<'a>> {
        let table: &'a HashTable = self.table;
        let slots = table.slots.parts();
        slots
            .present(index)
            .then(|| table.policy.value.decode(slots.value(index)))
    }
}

impl<'a> Iterator for Cursor<'a> {
    type Item = Pair<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_pair()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.table.len().saturating_sub(self.yielded);
        (remaining, Some(remaining))
    }
}
