//! Checksum utilities for HotKV
//!
//! Keys in the flat backend are hashed with CRC32C over their 16 bytes.
//! The same function backs a `BuildHasher` so hash maps keyed by [`Key`]
//! share one hashing scheme.

use crate::types::Key;
use std::hash::{BuildHasher, Hasher};

/// CRC32C hash of a key
#[inline]
#[must_use]
pub fn key_hash(key: &Key) -> u32 {
    crc32c::crc32c(key.as_bytes())
}

/// Streaming CRC32C hasher
///
/// `Key` feeds exactly its 16 bytes, so a map keyed by [`Key`] hashes
/// with the same checksum as [`key_hash`].
#[derive(Clone, Debug, Default)]
pub struct KeyHasher {
    crc32c: u32,
}

impl Hasher for KeyHasher {
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        self.crc32c = crc32c::crc32c_append(self.crc32c, bytes);
    }

    #[inline]
    fn finish(&self) -> u64 {
        // Spread the 32-bit checksum over both halves so hashbrown's
        // top-7-bit control bytes see entropy.
        let crc = u64::from(self.crc32c);
        (crc << 32) | crc
    }
}

/// `BuildHasher` producing [`KeyHasher`]s
#[derive(Clone, Copy, Debug, Default)]
pub struct KeyHashBuilder;

impl BuildHasher for KeyHashBuilder {
    type Hasher = KeyHasher;

    fn build_hasher(&self) -> Self::Hasher {
        KeyHasher::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::hash::Hash;

    #[test]
    fn test_key_hash_matches_crc32c() {
        let key = Key::from_str_bytes("hello, world!");
        assert_eq!(key_hash(&key), crc32c::crc32c(key.as_bytes()));
    }

    #[test]
    fn test_key_hash_distinguishes_keys() {
        let a = Key::from_u64(1);
        let b = Key::from_u64(2);
        assert_ne!(key_hash(&a), key_hash(&b));
    }

    #[test]
    fn test_hasher_is_deterministic() {
        let key = Key::from_parts("bid", 42);
        let hash = |k: &Key| {
            let mut h = KeyHashBuilder.build_hasher();
            k.hash(&mut h);
            h.finish()
        };
        assert_eq!(hash(&key), hash(&key));
        assert_ne!(hash(&key), hash(&Key::from_parts("bid", 43)));
    }

    #[test]
    fn test_map_hash_equals_key_hash() {
        for key in [Key::from_u64(7), Key::from_parts("bid", 42), Key::from_str_bytes("hello, world!")] {
            let mut h = KeyHashBuilder.build_hasher();
            key.hash(&mut h);
            assert_eq!(h.finish() & 0xffff_ffff, u64::from(key_hash(&key)));
            assert_eq!(h.finish() >> 32, u64::from(key_hash(&key)));
            assert_eq!(KeyHashBuilder.hash_one(key), h.finish());
        }
    }

    #[test]
    fn test_streaming_equals_one_shot() {
        let key = Key::from_u64(0xdead_beef);
        let mut h = KeyHasher::default();
        h.write(&key.as_bytes()[..5]);
        h.write(&key.as_bytes()[5..]);
        assert_eq!(h.finish() & 0xffff_ffff, u64::from(key_hash(&key)));
    }
}
