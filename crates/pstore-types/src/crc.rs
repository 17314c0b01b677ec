// Path: crates/pstore-types/src/crc.rs

//! CRC-32 over a byte prefix (§3 header "CRC covering the prefix"). §9 leaves
//! the polynomial implementation-defined provided it is consistent across
//! open and commit; `crc32fast` (castagnoli-accelerated IEEE CRC-32) is used
//! throughout.

#[must_use]
pub fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(checksum(b"hello"), checksum(b"hello"));
        assert_ne!(checksum(b"hello"), checksum(b"hellp"));
    }
}
