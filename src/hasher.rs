/// Signature of a pluggable key hash: the key's bytes and the table seed.
pub type HashFn = fn(data: &[u8], seed: u64) -> u64;

/// Signature of a pluggable key comparator. Returns `true` when `a` and `b`
/// denote the same key.
pub type EqFn = fn(a: &[u8], b: &[u8]) -> bool;

/// FNV-1a 64-bit offset basis, the state before the seed is folded in.
const HASH_INIT: u64 = 0xcbf2_9ce4_8422_2325;

const BLOCK_MULTIPLIER: u64 = 0xbf58_476d_1ce4_e5b9;
const TAIL_MULTIPLIER: u64 = 0xd6e8_feb8_6659_fd93;

/// The default key hash: an FNV-1a style mix over 8-byte words.
///
/// Whole words are xored in and multiplied; the trailing 1..=7 bytes are
/// packed above the low length byte and mixed once more. The seed is folded
/// into the initial state, so tables with different seeds place the same
/// keys differently.
///
/// # Examples
///
/// ```rust
/// use robin_hash::hasher::fnv1a_mix;
///
/// assert_eq!(fnv1a_mix(b"key", 7), fnv1a_mix(b"key", 7));
/// assert_ne!(fnv1a_mix(b"key", 7), fnv1a_mix(b"key", 8));
/// ```
pub fn fnv1a_mix(data: &[u8], seed: u64) -> u64 {
    let mut hash = HASH_INIT ^ seed;

    let mut blocks = data.chunks_exact(8);
    for block in &mut blocks {
        let mut word = [0u8; 8];
        word.copy_from_slice(block);
        hash ^= u64::from_le_bytes(word);
        hash = hash.wrapping_mul(BLOCK_MULTIPLIER);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let mut last = data.len() as u64 & 0xff;
        for (i, &byte) in tail.iter().enumerate() {
            last |= (byte as u64) << ((i + 1) * 8);
        }
        hash ^= last;
        hash = hash.wrapping_mul(TAIL_MULTIPLIER);
    }

    hash ^ (hash >> 32)
}

/// The default key comparator: byte-wise equality.
pub fn bytes_eq(a: &[u8], b: &[u8]) -> bool {
    a == b
}

/// A key hash backed by `foldhash`, seeded with the table seed.
#[cfg(feature = "foldhash")]
pub fn foldhash(data: &[u8], seed: u64) -> u64 {
    use core::hash::BuildHasher;

    foldhash::fast::FixedState::with_seed(seed).hash_one(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_equal_input() {
        for len in 0..32usize {
            let data: alloc::vec::Vec<u8> = (0..len as u8).collect();
            assert_eq!(fnv1a_mix(&data, 123456), fnv1a_mix(&data, 123456));
        }
    }

    #[test]
    fn seed_changes_hash() {
        assert_ne!(fnv1a_mix(&42u32.to_ne_bytes(), 1), fnv1a_mix(&42u32.to_ne_bytes(), 2));
        assert_ne!(fnv1a_mix(b"", 1), fnv1a_mix(b"", 2));
    }

    #[test]
    fn length_is_mixed_into_tail() {
        // Zero padding alone must not collide with the shorter input.
        assert_ne!(fnv1a_mix(&[1], 0), fnv1a_mix(&[1, 0], 0));
        assert_ne!(fnv1a_mix(&[0; 8], 0), fnv1a_mix(&[0; 9], 0));
    }

    #[test]
    fn every_tail_byte_matters() {
        let base = [0x11u8, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77];
        let reference = fnv1a_mix(&base, 9);
        for i in 0..base.len() {
            let mut flipped = base;
            flipped[i] ^= 0x80;
            assert_ne!(fnv1a_mix(&flipped, 9), reference, "byte {i}");
        }
    }

    #[test]
    fn small_integers_spread() {
        let mut homes = [0usize; 16];
        for k in 0..1024u32 {
            homes[(fnv1a_mix(&k.to_ne_bytes(), 123456) % 16) as usize] += 1;
        }
        assert!(homes.iter().all(|&n| n > 0), "{homes:?}");
    }

    #[test]
    fn bytes_eq_compares_contents() {
        assert!(bytes_eq(b"abc", b"abc"));
        assert!(!bytes_eq(b"abc", b"abd"));
        assert!(!bytes_eq(b"abc", b"ab"));
    }

    #[cfg(feature = "foldhash")]
    #[test]
    fn foldhash_is_seeded() {
        assert_eq!(foldhash(b"key", 3), foldhash(b"key", 3));
        assert_ne!(foldhash(b"key", 3), foldhash(b"key", 4));
    }
}
