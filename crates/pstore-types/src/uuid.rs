// Path: crates/pstore-types/src/uuid.rs

//! Store-identity UUID (§3 header field, §6 on-disk layout).
//!
//! Generation/formatting is delegated to the `uuid` crate (the external
//! collaborator boundary named in §1 is the *random source*, not the wire
//! format), kept to RFC 4122 layout: network byte order octets, variant
//! octet masked to `10xxxxxx`, version octet masked to `0100xxxx`.

use crate::error::{Error, Result};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StoreUuid([u8; 16]);

impl StoreUuid {
    #[must_use]
    pub fn generate() -> Self {
        StoreUuid(*uuid::Uuid::new_v4().as_bytes())
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        StoreUuid(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn parse(s: &str) -> Result<Self> {
        let u = uuid::Uuid::parse_str(s).map_err(|e| Error::UuidParseError(e.to_string()))?;
        Ok(StoreUuid(*u.as_bytes()))
    }
}

impl std::fmt::Display for StoreUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", uuid::Uuid::from_bytes(self.0))
    }
}

impl std::fmt::Debug for StoreUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StoreUuid({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_canonical_form() {
        let u = StoreUuid::generate();
        let s = u.to_string();
        let parsed = StoreUuid::parse(&s).unwrap();
        assert_eq!(u, parsed);
    }

    #[test]
    fn invalid_form_is_rejected() {
        assert!(StoreUuid::parse("not-a-uuid").is_err());
    }

    #[test]
    fn generated_uuid_has_v4_variant_bits() {
        let u = StoreUuid::generate();
        let bytes = u.as_bytes();
        assert_eq!(bytes[6] & 0xf0, 0x40);
        assert_eq!(bytes[8] & 0xc0, 0x80);
    }
}
