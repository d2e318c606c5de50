//! FNV-1a hashes. Unlike `std`'s default hasher these are unseeded, so the
//! output is identical across processes, platforms and restarts.

const FNV32_OFFSET: u32 = 0x811c9dc5;
const FNV32_PRIME: u32 = 0x01000193;

const FNV64_OFFSET: u64 = 0xcbf29ce484222325;
const FNV64_PRIME: u64 = 0x100000001b3;

pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    fnv1a_32_extend(FNV32_OFFSET, bytes)
}

/// Continues a 32-bit hash with more bytes, hashing `a` then `b` equals hashing `a ++ b`.
pub fn fnv1a_32_extend(mut hash: u32, bytes: &[u8]) -> u32 {
    for &byte in bytes {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV32_PRIME);
    }

    hash
}

pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = FNV64_OFFSET;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV64_PRIME);
    }

    hash
}

#[cfg(test)]
mod tests {
    use super::{fnv1a_32, fnv1a_32_extend, fnv1a_64};

    #[test]
    fn fnv1a_32_matches_reference_vectors() {
        assert_eq!(fnv1a_32(b""), 0x811c9dc5);
        assert_eq!(fnv1a_32(b"a"), 0xe40c292c);
        assert_eq!(fnv1a_32(b"foobar"), 0xbf9cf968);
    }

    #[test]
    fn fnv1a_64_matches_reference_vectors() {
        assert_eq!(fnv1a_64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(fnv1a_64(b"foobar"), 0x85944171f73967e8);
    }

    #[test]
    fn extending_is_the_same_as_hashing_the_concatenation() {
        let split = fnv1a_32_extend(fnv1a_32(b"foo/"), b"bar");

        assert_eq!(split, fnv1a_32(b"foo/bar"));
    }
}
