// Path: crates/pstore-storage/src/trailer.rs

//! The per-generation trailer (a.k.a. footer): links revisions into a chain
//! via `prev_generation`, records the transaction's logical size, and holds
//! one index-header address per index kind (§3 "Trailer", §4.E "Revisions").
//!
//! This store implements a single index kind ("Main"); the address array is
//! kept at length [`INDEX_KIND_COUNT`] so a future kind only needs a new
//! slot, not a layout change (an Open Question resolution recorded in
//! DESIGN.md).

use pstore_types::{crc, Address, Error, Result};

pub const SIGNATURE1: u64 = 0x4C49_4152_5445_5250; // "PTRAIL" tag, low half
pub const SIGNATURE2: u64 = 0x5F52_4546_4F4F_5400; // trailing tag

/// Number of index-header slots carried per trailer. This store only
/// populates slot 0 ("Main").
pub const INDEX_KIND_COUNT: usize = 1;
pub const MAIN_INDEX_SLOT: usize = 0;

pub const TRAILER_SIZE: u64 = 8 + 8 + 8 + 8 + (8 * INDEX_KIND_COUNT as u64) + 4 + 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer {
    pub generation: u64,
    pub size: u64,
    pub prev_generation: Address,
    pub index_headers: [Address; INDEX_KIND_COUNT],
}

impl Trailer {
    #[must_use]
    pub fn first(size: u64) -> Self {
        Trailer {
            generation: 0,
            size,
            prev_generation: Address::NULL,
            index_headers: [Address::NULL; INDEX_KIND_COUNT],
        }
    }

    #[must_use]
    pub fn next(&self, self_addr: Address, size: u64, index_headers: [Address; INDEX_KIND_COUNT]) -> Self {
        Trailer {
            generation: self.generation + 1,
            size,
            prev_generation: self_addr,
            index_headers,
        }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(TRAILER_SIZE as usize);
        buf.extend_from_slice(&SIGNATURE1.to_le_bytes());
        buf.extend_from_slice(&self.generation.to_le_bytes());
        buf.extend_from_slice(&self.size.to_le_bytes());
        buf.extend_from_slice(&self.prev_generation.as_u64().to_le_bytes());
        for addr in &self.index_headers {
            buf.extend_from_slice(&addr.as_u64().to_le_bytes());
        }
        let sum = crc::checksum(&buf);
        buf.extend_from_slice(&sum.to_le_bytes());
        buf.extend_from_slice(&SIGNATURE2.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if (bytes.len() as u64) < TRAILER_SIZE {
            return Err(Error::IndexCorrupt("truncated trailer".into()));
        }
        let mut pos = 0usize;
        let take8 = |bytes: &[u8], pos: &mut usize| -> Result<u64> {
            let v = u64::from_le_bytes(
                bytes[*pos..*pos + 8]
                    .try_into()
                    .map_err(|_| Error::IndexCorrupt("trailer field".into()))?,
            );
            *pos += 8;
            Ok(v)
        };
        let sig1 = take8(bytes, &mut pos)?;
        if sig1 != SIGNATURE1 {
            return Err(Error::IndexCorrupt("bad trailer signature".into()));
        }
        let generation = take8(bytes, &mut pos)?;
        let size = take8(bytes, &mut pos)?;
        let prev_generation = Address::new(take8(bytes, &mut pos)?);
        let mut index_headers = [Address::NULL; INDEX_KIND_COUNT];
        for slot in &mut index_headers {
            *slot = Address::new(take8(bytes, &mut pos)?);
        }
        let crc_field_start = pos;
        let stored_crc = u32::from_le_bytes(
            bytes[pos..pos + 4]
                .try_into()
                .map_err(|_| Error::IndexCorrupt("trailer crc".into()))?,
        );
        pos += 4;
        let computed = crc::checksum(&bytes[0..crc_field_start]);
        if computed != stored_crc {
            return Err(Error::IndexCorrupt("trailer crc mismatch".into()));
        }
        let sig2 = take8(bytes, &mut pos)?;
        if sig2 != SIGNATURE2 {
            return Err(Error::IndexCorrupt("bad trailer trailing signature".into()));
        }
        Ok(Trailer { generation, size, prev_generation, index_headers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_trailer_has_no_predecessor() {
        let t = Trailer::first(4096);
        assert!(t.prev_generation.is_null());
        assert_eq!(t.generation, 0);
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let t = Trailer::first(4096).next(Address::new(4096), 8192, [Address::new(123); INDEX_KIND_COUNT]);
        let bytes = t.encode();
        let decoded = Trailer::decode(&bytes).unwrap();
        assert_eq!(t, decoded);
    }

    #[test]
    fn corrupted_payload_fails_crc() {
        let t = Trailer::first(4096);
        let mut bytes = t.encode();
        bytes[8] ^= 0xFF;
        assert!(matches!(Trailer::decode(&bytes), Err(Error::IndexCorrupt(_))));
    }
}
