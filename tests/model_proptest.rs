use std::collections::HashMap as ModelMap;

use proptest::prelude::*;
use robin_hash::Elem;
use robin_hash::HashTable;

type Model = ModelMap<Option<u16>, Option<u32>>;

fn key_elem(key: &Option<[u8; 2]>) -> Option<Elem<'_>> {
    key.as_ref().map(Elem::from)
}

fn read_value(value: Option<Elem<'_>>) -> Option<u32> {
    value.map(|v| u32::from_le_bytes(v.as_bytes().unwrap().try_into().unwrap()))
}

fn assert_matches_model(table: &HashTable, model: &Model) -> Result<(), TestCaseError> {
    prop_assert_eq!(table.len(), model.len());
    prop_assert!(table.len() <= table.threshold());

    let mut seen = Model::new();
    for pair in table.iter() {
        let key = pair
            .key
            .map(|k| u16::from_le_bytes(k.as_bytes().unwrap().try_into().unwrap()));
        prop_assert!(seen.insert(key, read_value(pair.value)).is_none());
    }
    prop_assert_eq!(&seen, model);
    Ok(())
}

// Drive a table and a std map through the same operations and compare after
// every step. Keys come from a small domain so overwrites and removals of
// present keys are common.
proptest! {
    #[test]
    fn prop_table_matches_model(
        seed in any::<u64>(),
        capacity in 0usize..40,
        ops in proptest::collection::vec((0u8..=3u8, proptest::option::of(0u16..64), proptest::option::of(any::<u32>())), 1..400),
    ) {
        let mut table = HashTable::with_capacity(capacity, 2, 4, seed, None, None).unwrap();
        let mut model = Model::new();

        for (op, key, value) in ops {
            let key_bytes = key.map(u16::to_le_bytes);
            let value_bytes = value.map(u32::to_le_bytes);
            match op {
                // Set, with or without a value
                0 | 1 => {
                    table.set(key_elem(&key_bytes), value_bytes.as_ref().map(Elem::from)).unwrap();
                    model.insert(key, value);
                }
                // Remove
                2 => {
                    let removed = table.remove(key_elem(&key_bytes));
                    prop_assert_eq!(removed, model.remove(&key).is_some());
                }
                // Lookup
                3 => {
                    let expected = model.get(&key).copied();
                    prop_assert_eq!(table.exists(key_elem(&key_bytes)), expected.is_some());
                    prop_assert_eq!(table.get(key_elem(&key_bytes)).map(read_value), expected);
                    let cloned = table.get_cloned(key_elem(&key_bytes));
                    prop_assert_eq!(cloned, expected.map(|v| v.map(|v| v.to_le_bytes().to_vec())));
                }
                _ => unreachable!(),
            }

            assert_matches_model(&table, &model)?;
        }

        // Clones and shrinking resizes agree with the model too.
        let copy = table.try_clone().unwrap();
        assert_matches_model(&copy, &model)?;

        let threshold_before = table.threshold();
        table.resize(table.capacity() * 2).unwrap();
        prop_assert!(table.threshold() >= threshold_before);
        assert_matches_model(&table, &model)?;
    }

    #[test]
    fn prop_typed_map_matches_model(
        ops in proptest::collection::vec((any::<bool>(), 0u32..128, any::<u64>()), 1..300),
    ) {
        let mut map: robin_hash::HashMap<u32, u64> = robin_hash::HashMap::new();
        let mut model = ModelMap::new();

        for (insert, key, value) in ops {
            if insert {
                prop_assert_eq!(map.insert(key, value).unwrap(), model.insert(key, value));
            } else {
                prop_assert_eq!(map.remove(&key), model.remove(&key));
            }
            prop_assert_eq!(map.len(), model.len());
        }

        for (key, value) in map.iter() {
            prop_assert_eq!(model.get(&key), Some(&value));
        }
    }
}
