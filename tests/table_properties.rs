use std::cell::RefCell;
use std::rc::Rc;

use robin_hash::Elem;
use robin_hash::Error;
use robin_hash::Handle;
use robin_hash::HashTable;

fn int_table() -> HashTable {
    HashTable::new(4, 4, 0x1234_5678, None, None).unwrap()
}

fn set(table: &mut HashTable, key: u32, value: u32) {
    table
        .set(
            Some(Elem::from(&key.to_le_bytes())),
            Some(Elem::from(&value.to_le_bytes())),
        )
        .unwrap();
}

fn get(table: &HashTable, key: u32) -> Option<u32> {
    let value = table.get(Some(Elem::from(&key.to_le_bytes())))??;
    Some(u32::from_le_bytes(value.as_bytes()?.try_into().ok()?))
}

fn exists(table: &HashTable, key: u32) -> bool {
    table.exists(Some(Elem::from(&key.to_le_bytes())))
}

fn remove(table: &mut HashTable, key: u32) -> bool {
    table.remove(Some(Elem::from(&key.to_le_bytes())))
}

#[test]
fn last_write_wins() {
    let mut table = int_table();
    set(&mut table, 9, 1);
    set(&mut table, 9, 2);
    assert_eq!(get(&table, 9), Some(2));
    assert_eq!(table.len(), 1);
}

#[test]
fn distinct_keys_below_threshold_are_all_retrievable() {
    let mut table = int_table();
    let n = table.threshold() as u32;
    for k in 0..n {
        set(&mut table, k * 7919, k);
    }
    assert_eq!(table.len(), n as usize);
    assert_eq!(table.capacity(), 16);
    for k in 0..n {
        assert_eq!(get(&table, k * 7919), Some(k));
    }
}

#[test]
fn growth_is_transparent() {
    let mut table = int_table();
    assert_eq!((table.capacity(), table.threshold()), (16, 12));

    for k in 0..20 {
        set(&mut table, k, k);
    }
    assert!(table.capacity() > 16);
    assert_eq!(table.len(), 20);
    for k in 0..20 {
        assert_eq!(get(&table, k), Some(k));
    }
}

#[test]
fn removal_keeps_neighbors_intact() {
    let mut table = int_table();
    for k in 0..20 {
        set(&mut table, k, k);
    }

    assert!(remove(&mut table, 17));
    assert_eq!(table.len(), 19);
    assert!(!exists(&table, 17));
    for k in (0..20).filter(|&k| k != 17) {
        assert_eq!(get(&table, k), Some(k));
    }
}

#[test]
fn null_key_and_absent_value_are_distinct() {
    let mut table = int_table();
    table.set(None, Some(Elem::from(&1u32.to_le_bytes()))).unwrap();
    assert!(table.exists(None));
    assert_eq!(table.get(None), Some(Some(Elem::Bytes(&1u32.to_le_bytes()))));

    table.set(Some(Elem::from(&5u32.to_le_bytes())), None).unwrap();
    assert!(exists(&table, 5));
    assert_eq!(table.get(Some(Elem::from(&5u32.to_le_bytes()))), Some(None));
    assert!(!exists(&table, 6));
    assert_eq!(table.get(Some(Elem::from(&6u32.to_le_bytes()))), None);
}

#[test]
fn update_merges_last_writer_wins() {
    let mut a = int_table();
    let mut b = int_table();
    for k in 1..=3 {
        set(&mut a, k, k);
    }
    set(&mut b, 1, 11);
    set(&mut b, 2, 22);

    a.update(&b).unwrap();
    assert_eq!(a.len(), 3);
    assert_eq!(get(&a, 1), Some(11));
    assert_eq!(get(&a, 2), Some(22));
    assert_eq!(get(&a, 3), Some(3));
    assert_eq!(b.len(), 2);
}

#[test]
fn clones_are_independent() {
    let mut a = int_table();
    for k in 0..10 {
        set(&mut a, k, k);
    }

    let mut b = a.try_clone().unwrap();
    set(&mut b, 100, 100);
    remove(&mut b, 3);
    set(&mut b, 4, 44);

    assert_eq!(a.len(), 10);
    assert_eq!(get(&a, 3), Some(3));
    assert_eq!(get(&a, 4), Some(4));
    assert!(!exists(&a, 100));
}

#[test]
fn removing_absent_key_is_a_no_op() {
    let mut table = int_table();
    set(&mut table, 1, 1);
    assert!(!remove(&mut table, 2));
    assert!(!table.remove(None));
    assert_eq!(table.len(), 1);
}

#[test]
fn failed_resize_is_transactional() {
    let mut table = int_table();
    for k in 0..10 {
        set(&mut table, k, k);
    }

    let err = table.resize(usize::MAX).unwrap_err();
    assert_eq!(err, Error::CapacityOverflow);
    assert_eq!(table.capacity(), 16);
    for k in 0..10 {
        assert_eq!(get(&table, k), Some(k));
    }
}

#[test]
fn handle_tables_hand_back_owned_pointers() {
    let freed = Rc::new(RefCell::new(Vec::new()));
    let mut table = HashTable::new(8, 0, 77, None, None).unwrap();

    let log = freed.clone();
    table.set_value_destructor(move |value| {
        let handle = value.as_handle().unwrap();
        // SAFETY: every handle stored in this table came from `Box::into_raw`.
        let name = unsafe { Box::from_raw(handle.as_mut_ptr::<String>()) };
        log.borrow_mut().push(*name);
    });

    let boxed = |s: &str| Handle::from_ptr(Box::into_raw(Box::new(s.to_string())));
    for (k, name) in [(1u64, "one"), (2, "two"), (3, "three")] {
        table
            .set(Some(Elem::from(&k.to_le_bytes())), Some(boxed(name).into()))
            .unwrap();
    }

    let handle = table
        .get(Some(Elem::from(&2u64.to_le_bytes())))
        .flatten()
        .and_then(|v| v.as_handle())
        .unwrap();
    // SAFETY: the table still owns the string; this only reads it.
    assert_eq!(unsafe { &*handle.as_ptr::<String>() }, "two");

    table
        .set(Some(Elem::from(&2u64.to_le_bytes())), Some(boxed("deux").into()))
        .unwrap();
    assert_eq!(*freed.borrow(), ["two"]);

    assert!(table.remove(Some(Elem::from(&1u64.to_le_bytes()))));
    drop(table);

    let mut freed = freed.borrow().clone();
    freed.sort();
    assert_eq!(freed, ["deux", "one", "three", "two"]);
}

#[test]
fn manual_shrink_discards_through_destructors() {
    let discarded = Rc::new(RefCell::new(0usize));
    let mut table = int_table();
    let count = discarded.clone();
    table.set_key_destructor(move |_| *count.borrow_mut() += 1);

    for k in 0..12 {
        set(&mut table, k, k);
    }
    table.resize(4).unwrap();
    assert_eq!(table.capacity(), 4);
    assert_eq!(table.len(), 3);
    assert_eq!(*discarded.borrow(), 9);

    let destructor = table.take_key_destructor();
    assert!(destructor.is_some());
    table.clear();
    assert_eq!(*discarded.borrow(), 9);
}

#[test]
fn cursor_yields_every_entry_once_in_both_directions() {
    let mut table = int_table();
    for k in 0..30 {
        set(&mut table, k, k * 2);
    }
    table.set(None, None).unwrap();

    let mut cursor = table.begin();
    let mut forward = Vec::new();
    while let Some(pair) = cursor.next_pair() {
        forward.push(pair);
    }
    assert!(cursor.is_done());
    assert_eq!(forward.len(), 31);
    assert_eq!(forward.last().unwrap().key, None);

    let mut backward: Vec<_> = table.end().collect();
    backward.reverse();
    assert_eq!(forward, backward);

    let mut values = table.begin();
    let mut sum = 0u64;
    while let Some(value) = values.next_value() {
        if let Some(value) = value {
            sum += u32::from_le_bytes(value.as_bytes().unwrap().try_into().unwrap()) as u64;
        }
    }
    assert_eq!(sum, (0..30u64).map(|k| k * 2).sum());
}

#[test]
fn custom_comparator_defines_key_equality() {
    fn first_byte_hash(data: &[u8], _seed: u64) -> u64 {
        data[0] as u64
    }
    fn first_byte_eq(a: &[u8], b: &[u8]) -> bool {
        a[0] == b[0]
    }

    let mut table =
        HashTable::new(2, 1, 0, Some(first_byte_hash), Some(first_byte_eq)).unwrap();
    table.set(Some(Elem::from(&[3, 1])), Some(Elem::from(&[1]))).unwrap();
    table.set(Some(Elem::from(&[3, 2])), Some(Elem::from(&[2]))).unwrap();

    assert_eq!(table.len(), 1);
    assert_eq!(
        table.get(Some(Elem::from(&[3, 9]))),
        Some(Some(Elem::Bytes(&[2])))
    );
    let pair = table.iter().next().unwrap();
    assert_eq!(pair.key, Some(Elem::Bytes(&[3, 1])));
}
