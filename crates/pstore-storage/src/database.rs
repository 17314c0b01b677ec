// Path: crates/pstore-storage/src/database.rs

//! The store file as a whole: header validation, the revision chain, and
//! the single-writer transaction gate (§4.E "Revisions", §5 "Ordering").

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use pstore_types::{Address, Error, Result, StoreUuid};

use crate::hamt::HamtPolicy;
use crate::header::{Header, HeaderIo, LEADER_SIZE};
use crate::region::AddressSpace;
use crate::trailer::{Trailer, TRAILER_SIZE};
use crate::transaction::Transaction;

/// A request to look at the store as of a particular point in its history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revision {
    Head,
    Numbered(u64),
}

/// Parses the CLI/HTTP revision spelling: the literal `HEAD`, or a decimal
/// generation number (§6 "revision query parameter").
pub fn parse_revision(s: &str) -> Result<Revision> {
    if s.eq_ignore_ascii_case("head") {
        return Ok(Revision::Head);
    }
    s.parse::<u64>().map(Revision::Numbered).map_err(|_| Error::BadRequest)
}

pub struct Database {
    space: AddressSpace,
    header_io: HeaderIo,
    write_lock: Mutex<()>,
    uuid: StoreUuid,
}

impl Database {
    /// Creates a brand-new, empty store at `path`, writing the header and a
    /// generation-0 trailer with no index (§6 "initial file layout").
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).create_new(true).open(path)?;
        file.set_len(LEADER_SIZE)?;
        let header_file = file.try_clone()?;

        let space = AddressSpace::open(file, LEADER_SIZE)?;
        let trailer_addr = space.allocate(TRAILER_SIZE, 8)?;
        let trailer = Trailer::first(space.logical_size());
        space.write(trailer_addr, &trailer.encode())?;
        space.flush()?;

        let uuid = StoreUuid::generate();
        let header_io = HeaderIo::new(header_file);
        header_io.write(&Header::new(uuid, trailer_addr.as_u64()))?;

        Ok(Database { space, header_io, write_lock: Mutex::new(()), uuid })
    }

    /// Opens an existing store, validating the header and the generation-0
    /// trailer reachable from it.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let header_file = file.try_clone()?;
        let header_io = HeaderIo::new(header_file);
        let header = header_io.read()?;

        let space = AddressSpace::open(file, header.footer_pos + TRAILER_SIZE)?;
        let trailer = Self::read_trailer_at(&space, Address::new(header.footer_pos))?;
        space.adopt_logical_size(trailer.size)?;

        Ok(Database { space, header_io, write_lock: Mutex::new(()), uuid: header.uuid })
    }

    #[must_use]
    pub fn uuid(&self) -> StoreUuid {
        self.uuid
    }

    pub(crate) fn space(&self) -> &AddressSpace {
        &self.space
    }

    pub(crate) fn header_io(&self) -> &HeaderIo {
        &self.header_io
    }

    fn read_trailer_at(space: &AddressSpace, addr: Address) -> Result<Trailer> {
        let bytes = space.getro(addr, TRAILER_SIZE)?;
        Trailer::decode(&bytes)
    }

    /// The most recently committed trailer and its address.
    pub fn latest_trailer(&self) -> Result<(Trailer, Address)> {
        let header = self.header_io.read()?;
        let addr = Address::new(header.footer_pos);
        Ok((Self::read_trailer_at(&self.space, addr)?, addr))
    }

    /// Walks the `prev_generation` chain back to the requested revision
    /// (§4.E "sync"). `Revision::Head` is equivalent to [`Self::latest_trailer`].
    pub fn sync(&self, revision: Revision) -> Result<(Trailer, Address)> {
        let (mut trailer, mut addr) = self.latest_trailer()?;
        let target = match revision {
            Revision::Head => return Ok((trailer, addr)),
            Revision::Numbered(n) => n,
        };
        loop {
            if trailer.generation == target {
                return Ok((trailer, addr));
            }
            if trailer.prev_generation.is_null() {
                return Err(Error::UnknownRevision(target));
            }
            addr = trailer.prev_generation;
            trailer = Self::read_trailer_at(&self.space, addr)?;
        }
    }

    /// Begins a new transaction against the Main index, blocking until any
    /// other open transaction against this database has been committed or
    /// dropped (§4.E "exclusive writer").
    pub fn begin<P: HamtPolicy>(&self) -> Result<Transaction<'_, P>> {
        let guard = self.write_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let (trailer, addr) = self.latest_trailer()?;
        Ok(Transaction::new(self, guard, trailer, addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hamt::HamtPolicy;

    struct StringPolicy;
    impl HamtPolicy for StringPolicy {
        type Key = String;
        type Value = String;

        fn hash_key(key: &Self::Key) -> u64 {
            use std::hash::{Hash, Hasher};
            let mut h = std::collections::hash_map::DefaultHasher::new();
            key.hash(&mut h);
            h.finish()
        }

        fn keys_equal(a: &Self::Key, b: &Self::Key) -> bool {
            a == b
        }

        fn encode_leaf(key: &Self::Key, value: &Self::Value) -> Vec<u8> {
            let mut out = (key.len() as u32).to_le_bytes().to_vec();
            out.extend_from_slice(key.as_bytes());
            out.extend_from_slice(value.as_bytes());
            out
        }

        fn decode_leaf(bytes: &[u8]) -> Result<(Self::Key, Self::Value)> {
            let klen = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
            let key = String::from_utf8_lossy(&bytes[4..4 + klen]).into_owned();
            let value = String::from_utf8_lossy(&bytes[4 + klen..]).into_owned();
            Ok((key, value))
        }
    }

    fn scratch_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.pstore");
        let db = Database::create(&path).unwrap();
        (dir, db)
    }

    #[test]
    fn create_then_reopen_round_trips_uuid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.pstore");
        let uuid = {
            let db = Database::create(&path).unwrap();
            db.uuid()
        };
        let reopened = Database::open(&path).unwrap();
        assert_eq!(reopened.uuid(), uuid);
    }

    #[test]
    fn first_allocation_lands_right_after_generation_zero_trailer() {
        let (_dir, db) = scratch_db();
        let (trailer, trailer_addr) = db.latest_trailer().unwrap();
        assert_eq!(trailer.generation, 0);
        let tx = db.begin::<StringPolicy>().unwrap();
        let a = tx.allocate(16, 1).unwrap();
        assert_eq!(a.as_u64(), trailer_addr.as_u64() + crate::trailer::TRAILER_SIZE);
        let b = tx.allocate(16, 1).unwrap();
        assert_eq!(b.as_u64(), a.as_u64() + 16);
    }

    #[test]
    fn commit_advances_revision_and_is_visible_after_reopen() {
        let (_dir, db) = scratch_db();
        {
            let mut tx = db.begin::<StringPolicy>().unwrap();
            tx.insert_or_assign("hello".to_string(), "world".to_string()).unwrap();
            let gen = tx.commit().unwrap();
            assert_eq!(gen, 1);
        }
        let tx = db.begin::<StringPolicy>().unwrap();
        assert_eq!(tx.find(&"hello".to_string()).unwrap(), Some("world".to_string()));
    }

    #[test]
    fn insert_preserves_the_existing_value_on_a_hit() {
        let (_dir, db) = scratch_db();
        let mut tx = db.begin::<StringPolicy>().unwrap();
        assert!(tx.insert("a".to_string(), "b".to_string()).unwrap());
        assert!(!tx.insert("a".to_string(), "c".to_string()).unwrap());
        assert_eq!(tx.find(&"a".to_string()).unwrap(), Some("b".to_string()));
        tx.rollback();
    }

    #[test]
    fn sync_reaches_earlier_revisions() {
        let (_dir, db) = scratch_db();
        {
            let mut tx = db.begin::<StringPolicy>().unwrap();
            tx.insert_or_assign("a".to_string(), "1".to_string()).unwrap();
            tx.commit().unwrap();
        }
        {
            let mut tx = db.begin::<StringPolicy>().unwrap();
            tx.insert_or_assign("b".to_string(), "2".to_string()).unwrap();
            tx.commit().unwrap();
        }
        let (trailer, _) = db.sync(Revision::Numbered(1)).unwrap();
        assert_eq!(trailer.generation, 1);
        let (head, _) = db.sync(Revision::Head).unwrap();
        assert_eq!(head.generation, 2);
        assert!(matches!(db.sync(Revision::Numbered(99)), Err(Error::UnknownRevision(99))));
    }

    #[test]
    fn parses_head_and_numeric_revisions() {
        assert_eq!(parse_revision("HEAD").unwrap(), Revision::Head);
        assert_eq!(parse_revision("head").unwrap(), Revision::Head);
        assert_eq!(parse_revision("42").unwrap(), Revision::Numbered(42));
        assert!(parse_revision("nope").is_err());
    }
}
