// Path: crates/pstore-storage/src/transaction.rs

//! A single read/write transaction against the "Main" index (§4.E). At most
//! one [`Transaction`] may exist for a [`crate::database::Database`] at a
//! time; [`crate::database::Database::begin`] blocks until any prior one is
//! dropped or committed, which is this store's entire concurrency story —
//! there is no MVCC writer fan-in, only reader fan-out across revisions.

use std::sync::MutexGuard;

use pstore_types::{Address, Result};

use crate::database::Database;
use crate::hamt::{HamtPolicy, HeapArena, Hamt};
use crate::header::LEADER_SIZE;
use crate::trailer::{Trailer, INDEX_KIND_COUNT, MAIN_INDEX_SLOT, TRAILER_SIZE};

pub struct Transaction<'db, P: HamtPolicy> {
    db: &'db Database,
    _guard: MutexGuard<'db, ()>,
    arena: HeapArena,
    index: Hamt<P>,
    base_trailer: Trailer,
    base_trailer_addr: Address,
}

impl<'db, P: HamtPolicy> Transaction<'db, P> {
    pub(crate) fn new(
        db: &'db Database,
        guard: MutexGuard<'db, ()>,
        base_trailer: Trailer,
        base_trailer_addr: Address,
    ) -> Self {
        let index = match base_trailer.index_headers[MAIN_INDEX_SLOT] {
            addr if addr.is_null() => Hamt::empty(),
            addr => Hamt::from_root(addr),
        };
        Transaction { db, _guard: guard, arena: HeapArena::new(), index, base_trailer, base_trailer_addr }
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.base_trailer.generation
    }

    pub fn get_index(&self) -> &Hamt<P> {
        &self.index
    }

    pub fn find(&self, key: &P::Key) -> Result<Option<P::Value>> {
        self.index.find(&self.arena, self.db.space(), key)
    }

    pub fn contains(&self, key: &P::Key) -> Result<bool> {
        self.index.contains(&self.arena, self.db.space(), key)
    }

    pub fn insert_or_assign(&mut self, key: P::Key, value: P::Value) -> Result<()> {
        self.index.insert_or_assign(&mut self.arena, self.db.space(), key, value)
    }

    /// Inserts `key`/`value` only if `key` is not already present, leaving
    /// any existing value untouched. Returns `true` if the key was newly
    /// inserted.
    pub fn insert(&mut self, key: P::Key, value: P::Value) -> Result<bool> {
        self.index.insert(&mut self.arena, self.db.space(), key, value)
    }

    /// Allocates raw, uninterpreted bytes in the transaction's store arena
    /// (§4.E "allocate"), for callers that need storage outside the index
    /// (e.g. blob payloads referenced by a leaf).
    pub fn allocate(&self, size: u64, align: u64) -> Result<Address> {
        self.db.space().allocate(size, align)
    }

    pub fn write(&self, addr: Address, bytes: &[u8]) -> Result<()> {
        self.db.space().write(addr, bytes)
    }

    pub fn read(&self, addr: Address, size: u64) -> Result<Vec<u8>> {
        self.db.space().getro(addr, size)
    }

    /// Flushes the index to the store, appends a new trailer linking back to
    /// the transaction's base generation, publishes it as the header's
    /// `footer_pos`, and write-protects everything committed so far except
    /// the header's own page. Returns the new generation number.
    ///
    /// Refuses the commit with [`pstore_types::Error::IndexNotLatestRevision`]
    /// if the index this transaction mutated was not opened against the
    /// database's current revision (§4.E, §7). The write lock held for the
    /// transaction's whole lifetime makes the database's head generation
    /// unable to move out from under an in-flight transaction today, but the
    /// check stands guard against that guarantee changing and gives the
    /// documented failure mode an actual code path.
    pub fn commit(mut self) -> Result<u64> {
        let (latest, _) = self.db.latest_trailer()?;
        if latest.generation != self.base_trailer.generation {
            return Err(pstore_types::Error::IndexNotLatestRevision);
        }

        let root = self.index.flush(&self.arena, self.db.space())?;
        let mut index_headers = [Address::NULL; INDEX_KIND_COUNT];
        index_headers[MAIN_INDEX_SLOT] = root;

        let trailer_addr = self.db.space().allocate(TRAILER_SIZE, 8)?;
        let new_size = self.db.space().logical_size();
        let trailer = self.base_trailer.next(self.base_trailer_addr, new_size, index_headers);
        self.db.space().write(trailer_addr, &trailer.encode())?;

        self.db.header_io().publish_footer_pos(trailer_addr.as_u64())?;
        self.db.space().flush()?;
        self.db.space().protect(LEADER_SIZE, new_size, LEADER_SIZE)?;

        pstore_telemetry::metrics::inc_transactions_committed();
        Ok(trailer.generation)
    }

    /// Discards every change made through this transaction without touching
    /// the store. Equivalent to dropping the transaction, spelled out for
    /// callers that want the intent to read at the call site.
    pub fn rollback(self) {}
}
