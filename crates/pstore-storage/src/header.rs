// Path: crates/pstore-storage/src/header.rs

//! The store header: file-signature constants, version, UUID, the atomic
//! `footer_pos` pointer, and a CRC over the prefix (§3 "Header", §6 on-disk
//! layout).

use std::fs::File;
#[cfg(unix)]
use std::os::unix::fs::FileExt;

use pstore_types::{crc, Address, Error, Result, StoreUuid};

pub const SIGNATURE1: u64 = 0x5F45_524F_5453_5053; // "PSTORE_" reversed-endian tag
pub const SIGNATURE2: u64 = 0x3130_3030_3030_3030; // "00000001"
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;

/// Size in bytes of the serialised header.
pub const HEADER_SIZE: u32 = 8 + 8 + 2 + 2 + 4 + 16 + 8 + 4;

/// The header occupies the first system page; everything else in the file
/// starts at this offset (§3 "Between header and first trailer: leader pad
/// to a system-page boundary").
pub const LEADER_SIZE: u64 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version_major: u16,
    pub version_minor: u16,
    pub header_size: u32,
    pub uuid: StoreUuid,
    pub footer_pos: u64,
}

impl Header {
    #[must_use]
    pub fn new(uuid: StoreUuid, footer_pos: u64) -> Self {
        Header {
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            header_size: HEADER_SIZE,
            uuid,
            footer_pos,
        }
    }

    fn encode_prefix(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE as usize);
        buf.extend_from_slice(&SIGNATURE1.to_le_bytes());
        buf.extend_from_slice(&SIGNATURE2.to_le_bytes());
        buf.extend_from_slice(&self.version_major.to_le_bytes());
        buf.extend_from_slice(&self.version_minor.to_le_bytes());
        buf.extend_from_slice(&self.header_size.to_le_bytes());
        buf.extend_from_slice(self.uuid.as_bytes());
        buf.extend_from_slice(&self.footer_pos.to_le_bytes());
        buf
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.encode_prefix();
        let sum = crc::checksum(&buf);
        buf.extend_from_slice(&sum.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE as usize {
            return Err(Error::HeaderCorrupt("truncated header".into()));
        }
        let sig1 = u64::from_le_bytes(bytes[0..8].try_into().map_err(|_| Error::HeaderCorrupt("sig1".into()))?);
        let sig2 = u64::from_le_bytes(bytes[8..16].try_into().map_err(|_| Error::HeaderCorrupt("sig2".into()))?);
        if sig1 != SIGNATURE1 || sig2 != SIGNATURE2 {
            return Err(Error::HeaderCorrupt("bad file signature".into()));
        }
        let version_major = u16::from_le_bytes(bytes[16..18].try_into().map_err(|_| Error::HeaderCorrupt("version".into()))?);
        let version_minor = u16::from_le_bytes(bytes[18..20].try_into().map_err(|_| Error::HeaderCorrupt("version".into()))?);
        if version_major != VERSION_MAJOR {
            return Err(Error::HeaderVersionMismatch);
        }
        let header_size = u32::from_le_bytes(bytes[20..24].try_into().map_err(|_| Error::HeaderCorrupt("header_size".into()))?);
        if header_size != HEADER_SIZE {
            return Err(Error::HeaderCorrupt("header_size does not match on-wire layout".into()));
        }
        let mut uuid_bytes = [0u8; 16];
        uuid_bytes.copy_from_slice(&bytes[24..40]);
        let uuid = StoreUuid::from_bytes(uuid_bytes);
        let footer_pos = u64::from_le_bytes(bytes[40..48].try_into().map_err(|_| Error::HeaderCorrupt("footer_pos".into()))?);
        let stored_crc = u32::from_le_bytes(bytes[48..52].try_into().map_err(|_| Error::HeaderCorrupt("crc".into()))?);
        let computed = crc::checksum(&bytes[0..48]);
        if computed != stored_crc {
            return Err(Error::HeaderCorrupt("crc mismatch".into()));
        }
        if footer_pos < LEADER_SIZE {
            return Err(Error::HeaderCorrupt("footer_pos precedes the first trailer".into()));
        }
        Ok(Header { version_major, version_minor, header_size, uuid, footer_pos })
    }
}

/// Reads and atomically updates the header's `footer_pos` field directly
/// against the file, independent of the mmap'd [`crate::region::AddressSpace`]
/// used for everything past `LEADER_SIZE`. This is what lets the header
/// remain writable after [`crate::region::AddressSpace::protect`] has
/// remapped the committed data read-only (§4.C "except the first page").
pub struct HeaderIo {
    file: File,
}

impl HeaderIo {
    #[must_use]
    pub fn new(file: File) -> Self {
        HeaderIo { file }
    }

    pub fn read(&self) -> Result<Header> {
        let mut buf = vec![0u8; HEADER_SIZE as usize];
        #[cfg(unix)]
        self.file.read_exact_at(&mut buf, 0)?;
        #[cfg(not(unix))]
        {
            use std::io::{Read, Seek, SeekFrom};
            let mut f = self.file.try_clone()?;
            f.seek(SeekFrom::Start(0))?;
            f.read_exact(&mut buf)?;
        }
        Header::decode(&buf)
    }

    pub fn write(&self, header: &Header) -> Result<()> {
        let bytes = header.encode();
        #[cfg(unix)]
        self.file.write_all_at(&bytes, 0)?;
        #[cfg(not(unix))]
        {
            use std::io::{Seek, SeekFrom, Write};
            let mut f = self.file.try_clone()?;
            f.seek(SeekFrom::Start(0))?;
            f.write_all(&bytes)?;
        }
        Ok(())
    }

    /// Swaps `footer_pos` to `new_pos`, the commit linearisation point
    /// (§4.E, §5 "Ordering"). Not lock-free across processes; the writer
    /// lock held by an open transaction is the sole serialisation mechanism
    /// (§5 "Scheduling").
    pub fn publish_footer_pos(&self, new_pos: u64) -> Result<()> {
        let mut header = self.read()?;
        header.footer_pos = new_pos;
        self.write(&header)
    }
}

#[must_use]
pub fn address_of_first_trailer() -> Address {
    Address::new(LEADER_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let h = Header::new(StoreUuid::generate(), LEADER_SIZE);
        let bytes = h.encode();
        let decoded = Header::decode(&bytes).unwrap();
        assert_eq!(h, decoded);
    }

    #[test]
    fn bad_signature_is_rejected() {
        let h = Header::new(StoreUuid::generate(), LEADER_SIZE);
        let mut bytes = h.encode();
        bytes[0] ^= 0xFF;
        assert!(matches!(Header::decode(&bytes), Err(Error::HeaderCorrupt(_))));
    }

    #[test]
    fn corrupted_crc_is_rejected() {
        let h = Header::new(StoreUuid::generate(), LEADER_SIZE);
        let mut bytes = h.encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(Header::decode(&bytes), Err(Error::HeaderCorrupt(_))));
    }
}
