// Path: crates/pstore-storage/src/hamt/mod.rs

//! The hash array mapped trie used for the store's single ("Main") index
//! (§4.D). Six bits of the key's hash select a child at each of up to
//! eleven levels (64 bits / 6); once the hash is exhausted, or two keys
//! collide at the deepest level, a [`pointer::LinearNode`] holds the
//! remaining leaves as a flat, linearly-scanned list.
//!
//! [`HamtPolicy`] collapses the four independent type parameters the
//! original design names (key, value, hasher, equality) into one associated-
//! type trait, the idiomatic Rust shape for a bundle of related choices a
//! caller supplies once (mirrors [`crate::region`]'s `DescriptorTraits`-style
//! sibling in `pstore-os`).

mod codec;
mod iter;
mod pointer;

pub use iter::HamtIter;
pub use pointer::{HeapArena, HeapNode, InternalNode, LinearNode, Slot};

use pstore_types::{Address, Error, Result};

use crate::region::AddressSpace;

/// Bits of hash consumed at each trie level.
const BITS_PER_LEVEL: u32 = 6;
/// Once `depth * BITS_PER_LEVEL >= 64` there are no hash bits left to branch
/// on; further collisions are resolved with a linear scan.
const MAX_BRANCH_DEPTH: u32 = 64u32.div_ceil(BITS_PER_LEVEL);

/// The key/value contract a [`Hamt`] is built over: how to hash a key, test
/// two keys for equality, and serialise a key/value pair to and from a leaf
/// payload.
pub trait HamtPolicy {
    type Key: Clone;
    type Value: Clone;

    fn hash_key(key: &Self::Key) -> u64;
    fn keys_equal(a: &Self::Key, b: &Self::Key) -> bool;
    fn encode_leaf(key: &Self::Key, value: &Self::Value) -> Vec<u8>;
    fn decode_leaf(bytes: &[u8]) -> Result<(Self::Key, Self::Value)>;
}

fn chunk(hash: u64, depth: u32) -> Option<u32> {
    let shift = depth * BITS_PER_LEVEL;
    if shift >= 64 {
        return None;
    }
    let width = BITS_PER_LEVEL.min(64 - shift);
    let mask = (1u64 << width) - 1;
    Some(((hash >> shift) & mask) as u32)
}

enum Resolved<P: HamtPolicy> {
    Empty,
    Leaf { addr: Address, key: P::Key, value: P::Value },
    Internal(InternalNode),
    Linear(LinearNode),
}

fn resolve<P: HamtPolicy>(slot: Slot, arena: &HeapArena, store: &AddressSpace) -> Result<Resolved<P>> {
    match slot {
        Slot::Store(addr) if addr.is_null() => Ok(Resolved::Empty),
        Slot::Store(addr) => match codec::read_node(store, addr)? {
            codec::StoreNode::Leaf(payload) => {
                let (key, value) = P::decode_leaf(&payload)?;
                Ok(Resolved::Leaf { addr, key, value })
            }
            codec::StoreNode::Internal(n) => Ok(Resolved::Internal(n)),
            codec::StoreNode::Linear(n) => Ok(Resolved::Linear(n)),
        },
        Slot::Heap(idx) => match arena.get(idx).clone() {
            HeapNode::Internal(n) => Ok(Resolved::Internal(n)),
            HeapNode::Linear(n) => Ok(Resolved::Linear(n)),
        },
    }
}

fn resolve_leaf_at<P: HamtPolicy>(addr: Address, store: &AddressSpace) -> Result<(P::Key, P::Value)> {
    let payload = codec::read_leaf_payload(store, addr)?;
    P::decode_leaf(&payload)
}

/// An in-progress or committed hash array mapped trie. `P` fixes the key and
/// value types and how they are hashed, compared, and serialised.
pub struct Hamt<P: HamtPolicy> {
    root: Slot,
    _policy: std::marker::PhantomData<fn() -> P>,
}

impl<P: HamtPolicy> Hamt<P> {
    #[must_use]
    pub fn empty() -> Self {
        Hamt { root: Slot::empty(), _policy: std::marker::PhantomData }
    }

    #[must_use]
    pub fn from_root(root: Address) -> Self {
        Hamt { root: Slot::Store(root), _policy: std::marker::PhantomData }
    }

    #[must_use]
    pub fn root(&self) -> Slot {
        self.root
    }

    pub fn contains(&self, arena: &HeapArena, store: &AddressSpace, key: &P::Key) -> Result<bool> {
        Ok(self.find(arena, store, key)?.is_some())
    }

    pub fn find(&self, arena: &HeapArena, store: &AddressSpace, key: &P::Key) -> Result<Option<P::Value>> {
        let hash = P::hash_key(key);
        find_rec::<P>(self.root, arena, store, hash, 0, key)
    }

    /// Inserts, or replaces the value of an existing key. Any node on the
    /// path from the root is copied into the heap arena before being
    /// mutated; nodes already in the arena are mutated in place.
    pub fn insert_or_assign(
        &mut self,
        arena: &mut HeapArena,
        store: &AddressSpace,
        key: P::Key,
        value: P::Value,
    ) -> Result<()> {
        let hash = P::hash_key(&key);
        self.root = insert_rec::<P>(self.root, arena, store, hash, 0, key, value)?;
        Ok(())
    }

    /// Inserts `key`/`value` only if `key` is not already present, leaving
    /// the existing value untouched on a hit. Returns `true` if the key was
    /// newly inserted. A hit does not walk or clone any node on the path
    /// (§4.D "a key encountered twice in insert does not produce a heap
    /// node").
    pub fn insert(
        &mut self,
        arena: &mut HeapArena,
        store: &AddressSpace,
        key: P::Key,
        value: P::Value,
    ) -> Result<bool> {
        if self.contains(arena, store, &key)? {
            return Ok(false);
        }
        self.insert_or_assign(arena, store, key, value)?;
        Ok(true)
    }

    /// Number of key/value pairs in the trie.
    pub fn size(&self, arena: &HeapArena, store: &AddressSpace) -> Result<usize> {
        Ok(self.entries(arena, store)?.len())
    }

    /// Whether the trie holds no entries.
    pub fn is_empty(&self, arena: &HeapArena, store: &AddressSpace) -> Result<bool> {
        Ok(self.size(arena, store)? == 0)
    }

    /// Writes every heap-resident node reachable from the root to the
    /// store, depth first so that a parent is always written after its
    /// children (children must already have store addresses). Returns the
    /// root's final store address.
    pub fn flush(&mut self, arena: &HeapArena, store: &AddressSpace) -> Result<Address> {
        self.root = Slot::Store(flush_rec::<P>(self.root, arena, store)?);
        match self.root {
            Slot::Store(addr) => Ok(addr),
            Slot::Heap(_) => unreachable!("flush_rec always returns a store address"),
        }
    }

    /// Collects every key/value pair in the trie. Intended for the status
    /// server's listing endpoints and for `fsck`; not a lazy iterator, since
    /// index sizes in this store are expected to be modest (§4.D).
    pub fn entries(&self, arena: &HeapArena, store: &AddressSpace) -> Result<Vec<(P::Key, P::Value)>> {
        HamtIter::<P>::new(self.root, arena, store).collect()
    }

    /// Walks the whole trie checking bitmap popcount against child count,
    /// that every internal node's bitmap is non-empty, that every child's
    /// store address precedes its parent's, and that every reachable leaf
    /// decodes cleanly (§4.D "fsck").
    pub fn fsck(&self, arena: &HeapArena, store: &AddressSpace) -> Result<()> {
        fsck_rec::<P>(self.root, None, arena, store)
    }
}

fn find_rec<P: HamtPolicy>(
    slot: Slot,
    arena: &HeapArena,
    store: &AddressSpace,
    hash: u64,
    depth: u32,
    key: &P::Key,
) -> Result<Option<P::Value>> {
    match resolve::<P>(slot, arena, store)? {
        Resolved::Empty => Ok(None),
        Resolved::Leaf { key: k, value, .. } => {
            Ok(if P::keys_equal(&k, key) { Some(value) } else { None })
        }
        Resolved::Internal(node) => {
            let Some(c) = chunk(hash, depth) else {
                return Ok(None);
            };
            let bit = 1u64 << c;
            if node.bitmap & bit == 0 {
                return Ok(None);
            }
            let idx = node.position(bit);
            find_rec::<P>(node.children[idx], arena, store, hash, depth + 1, key)
        }
        Resolved::Linear(node) => {
            for addr in &node.leaves {
                let (k, v) = resolve_leaf_at::<P>(*addr, store)?;
                if P::keys_equal(&k, key) {
                    return Ok(Some(v));
                }
            }
            Ok(None)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn insert_rec<P: HamtPolicy>(
    slot: Slot,
    arena: &mut HeapArena,
    store: &AddressSpace,
    hash: u64,
    depth: u32,
    key: P::Key,
    value: P::Value,
) -> Result<Slot> {
    match resolve::<P>(slot, arena, store)? {
        Resolved::Empty => {
            let addr = codec::write_leaf(store, &P::encode_leaf(&key, &value))?;
            Ok(Slot::Store(addr))
        }
        Resolved::Leaf { addr, key: existing_key, value: existing_value } => {
            if P::keys_equal(&existing_key, &key) {
                let new_addr = codec::write_leaf(store, &P::encode_leaf(&key, &value))?;
                return Ok(Slot::Store(new_addr));
            }
            if depth >= MAX_BRANCH_DEPTH {
                let idx = arena.push(HeapNode::Linear(LinearNode { leaves: vec![addr] }));
                pstore_telemetry::metrics::inc_hamt_heap_promotion();
                return insert_rec::<P>(Slot::Heap(idx), arena, store, hash, depth, key, value);
            }
            // Split: build a fresh internal node and re-insert both leaves
            // one level deeper.
            let idx = arena.push(HeapNode::Internal(InternalNode { bitmap: 0, children: Vec::new() }));
            let existing_hash = P::hash_key(&existing_key);
            let after_existing = insert_rec::<P>(
                Slot::Heap(idx),
                arena,
                store,
                existing_hash,
                depth,
                existing_key,
                existing_value,
            )?;
            insert_rec::<P>(after_existing, arena, store, hash, depth, key, value)
        }
        Resolved::Internal(mut node) => {
            let Some(c) = chunk(hash, depth) else {
                // Hash exhausted while still structurally internal: fall
                // back to a linear scan of this level's children. Should
                // not occur given MAX_BRANCH_DEPTH, kept for defence.
                let leaves = collect_leaves::<P>(Slot::Heap(arena.push(HeapNode::Internal(node))), arena, store)?;
                let idx = arena.push(HeapNode::Linear(LinearNode { leaves }));
                return insert_rec::<P>(Slot::Heap(idx), arena, store, hash, depth, key, value);
            };
            let bit = 1u64 << c;
            let heap_idx = if node.bitmap & bit == 0 {
                let pos = node.position(bit);
                let leaf_addr = codec::write_leaf(store, &P::encode_leaf(&key, &value))?;
                node.bitmap |= bit;
                node.children.insert(pos, Slot::Store(leaf_addr));
                push_or_reuse(slot, arena, HeapNode::Internal(node))
            } else {
                let pos = node.position(bit);
                let child = node.children[pos];
                let new_child = insert_rec::<P>(child, arena, store, hash, depth + 1, key, value)?;
                node.children[pos] = new_child;
                push_or_reuse(slot, arena, HeapNode::Internal(node))
            };
            Ok(Slot::Heap(heap_idx))
        }
        Resolved::Linear(mut node) => {
            for addr in &mut node.leaves {
                let (k, _) = resolve_leaf_at::<P>(*addr, store)?;
                if P::keys_equal(&k, &key) {
                    *addr = codec::write_leaf(store, &P::encode_leaf(&key, &value))?;
                    let idx = push_or_reuse(slot, arena, HeapNode::Linear(node));
                    return Ok(Slot::Heap(idx));
                }
            }
            let new_leaf = codec::write_leaf(store, &P::encode_leaf(&key, &value))?;
            node.leaves.push(new_leaf);
            let idx = push_or_reuse(slot, arena, HeapNode::Linear(node));
            Ok(Slot::Heap(idx))
        }
    }
}

/// Either overwrites the arena slot `slot` already names (no new promotion),
/// or pushes a fresh one, incrementing the heap-promotion counter.
fn push_or_reuse(slot: Slot, arena: &mut HeapArena, node: HeapNode) -> usize {
    match slot {
        Slot::Heap(idx) => {
            *arena.get_mut(idx) = node;
            idx
        }
        Slot::Store(_) => {
            pstore_telemetry::metrics::inc_hamt_heap_promotion();
            arena.push(node)
        }
    }
}

fn collect_leaves<P: HamtPolicy>(slot: Slot, arena: &HeapArena, store: &AddressSpace) -> Result<Vec<Address>> {
    match resolve::<P>(slot, arena, store)? {
        Resolved::Empty => Ok(Vec::new()),
        Resolved::Leaf { addr, .. } => Ok(vec![addr]),
        Resolved::Internal(node) => {
            let mut out = Vec::new();
            for child in node.children {
                out.extend(collect_leaves::<P>(child, arena, store)?);
            }
            Ok(out)
        }
        Resolved::Linear(node) => Ok(node.leaves),
    }
}

fn flush_rec<P: HamtPolicy>(slot: Slot, arena: &HeapArena, store: &AddressSpace) -> Result<Address> {
    match slot {
        Slot::Store(addr) => Ok(addr),
        Slot::Heap(idx) => match arena.get(idx).clone() {
            HeapNode::Internal(node) => {
                let mut child_addrs = Vec::with_capacity(node.children.len());
                for child in &node.children {
                    child_addrs.push(flush_rec::<P>(*child, arena, store)?);
                }
                codec::write_internal(store, &node, &child_addrs)
            }
            HeapNode::Linear(node) => codec::write_linear(store, &node.leaves),
        },
    }
}

/// `parent_addr` is the store address of the node that pointed at `slot`, if
/// any (the store is append-only, so a flushed child must have been written,
/// and so addressed, strictly before its parent). `None` at the root and for
/// any still heap-resident node, since neither has a store address yet.
fn fsck_rec<P: HamtPolicy>(
    slot: Slot,
    parent_addr: Option<Address>,
    arena: &HeapArena,
    store: &AddressSpace,
) -> Result<()> {
    if let (Slot::Store(addr), Some(parent)) = (slot, parent_addr) {
        if addr.as_u64() >= parent.as_u64() {
            return Err(Error::IndexCorrupt("child store address is not before its parent's".into()));
        }
    }
    let this_addr = match slot {
        Slot::Store(addr) if !addr.is_null() => Some(addr),
        _ => None,
    };
    match resolve::<P>(slot, arena, store)? {
        Resolved::Empty => Ok(()),
        Resolved::Leaf { .. } => Ok(()),
        Resolved::Internal(node) => {
            if node.bitmap.count_ones() as usize != node.children.len() {
                return Err(Error::IndexCorrupt("internal node bitmap/children count mismatch".into()));
            }
            if node.bitmap == 0 {
                return Err(Error::IndexCorrupt("internal node has an empty bitmap".into()));
            }
            for child in &node.children {
                fsck_rec::<P>(*child, this_addr, arena, store)?;
            }
            Ok(())
        }
        Resolved::Linear(node) => {
            for addr in &node.leaves {
                if let Some(parent) = this_addr {
                    if addr.as_u64() >= parent.as_u64() {
                        return Err(Error::IndexCorrupt("leaf store address is not before its parent's".into()));
                    }
                }
                resolve_leaf_at::<P>(*addr, store)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;

    struct U64Policy;
    impl HamtPolicy for U64Policy {
        type Key = u64;
        type Value = u64;

        fn hash_key(key: &Self::Key) -> u64 {
            *key
        }

        fn keys_equal(a: &Self::Key, b: &Self::Key) -> bool {
            a == b
        }

        fn encode_leaf(key: &Self::Key, value: &Self::Value) -> Vec<u8> {
            let mut out = key.to_le_bytes().to_vec();
            out.extend_from_slice(&value.to_le_bytes());
            out
        }

        fn decode_leaf(bytes: &[u8]) -> Result<(Self::Key, Self::Value)> {
            let key = u64::from_le_bytes(bytes[0..8].try_into().map_err(|_| Error::IndexCorrupt("key".into()))?);
            let value = u64::from_le_bytes(bytes[8..16].try_into().map_err(|_| Error::IndexCorrupt("value".into()))?);
            Ok((key, value))
        }
    }

    /// A policy whose hash always collides, forcing every insertion through
    /// the linear-node path regardless of depth.
    struct CollidingPolicy;
    impl HamtPolicy for CollidingPolicy {
        type Key = u64;
        type Value = u64;

        fn hash_key(_key: &Self::Key) -> u64 {
            0
        }

        fn keys_equal(a: &Self::Key, b: &Self::Key) -> bool {
            a == b
        }

        fn encode_leaf(key: &Self::Key, value: &Self::Value) -> Vec<u8> {
            U64Policy::encode_leaf(key, value)
        }

        fn decode_leaf(bytes: &[u8]) -> Result<(Self::Key, Self::Value)> {
            U64Policy::decode_leaf(bytes)
        }
    }

    fn scratch_store() -> (tempfile::TempDir, AddressSpace) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hamt.pstore");
        let file = OpenOptions::new().read(true).write(true).create(true).open(&path).unwrap();
        file.set_len(4096).unwrap();
        let space = AddressSpace::open(file, 4096).unwrap();
        (dir, space)
    }

    #[test]
    fn insert_then_find_round_trips() {
        let (_dir, store) = scratch_store();
        let mut arena = HeapArena::new();
        let mut hamt = Hamt::<U64Policy>::empty();
        hamt.insert_or_assign(&mut arena, &store, 1, 100).unwrap();
        hamt.insert_or_assign(&mut arena, &store, 2, 200).unwrap();
        assert_eq!(hamt.find(&arena, &store, &1).unwrap(), Some(100));
        assert_eq!(hamt.find(&arena, &store, &2).unwrap(), Some(200));
        assert_eq!(hamt.find(&arena, &store, &3).unwrap(), None);
    }

    #[test]
    fn insert_overwrites_existing_key() {
        let (_dir, store) = scratch_store();
        let mut arena = HeapArena::new();
        let mut hamt = Hamt::<U64Policy>::empty();
        hamt.insert_or_assign(&mut arena, &store, 1, 100).unwrap();
        hamt.insert_or_assign(&mut arena, &store, 1, 999).unwrap();
        assert_eq!(hamt.find(&arena, &store, &1).unwrap(), Some(999));
    }

    #[test]
    fn flush_then_reload_from_store_preserves_contents() {
        let (_dir, store) = scratch_store();
        let mut arena = HeapArena::new();
        let mut hamt = Hamt::<U64Policy>::empty();
        for i in 0..200u64 {
            hamt.insert_or_assign(&mut arena, &store, i, i * 10).unwrap();
        }
        let root = hamt.flush(&arena, &store).unwrap();
        let reloaded = Hamt::<U64Policy>::from_root(root);
        let empty_arena = HeapArena::new();
        for i in 0..200u64 {
            assert_eq!(reloaded.find(&empty_arena, &store, &i).unwrap(), Some(i * 10));
        }
        reloaded.fsck(&empty_arena, &store).unwrap();
    }

    #[test]
    fn colliding_hashes_fall_back_to_a_linear_node() {
        let (_dir, store) = scratch_store();
        let mut arena = HeapArena::new();
        let mut hamt = Hamt::<CollidingPolicy>::empty();
        hamt.insert_or_assign(&mut arena, &store, 1, 10).unwrap();
        hamt.insert_or_assign(&mut arena, &store, 2, 20).unwrap();
        hamt.insert_or_assign(&mut arena, &store, 3, 30).unwrap();
        assert!(matches!(
            arena.get(arena.len() - 1),
            HeapNode::Linear(_)
        ));
        assert_eq!(hamt.find(&arena, &store, &2).unwrap(), Some(20));
        hamt.fsck(&arena, &store).unwrap();
    }

    #[test]
    fn insert_single_preserves_existing_value_on_hit() {
        let (_dir, store) = scratch_store();
        let mut arena = HeapArena::new();
        let mut hamt = Hamt::<U64Policy>::empty();
        assert!(hamt.insert(&mut arena, &store, 1, 100).unwrap());
        assert!(!hamt.insert(&mut arena, &store, 1, 999).unwrap());
        assert_eq!(hamt.find(&arena, &store, &1).unwrap(), Some(100));
    }

    #[test]
    fn insert_internal_store_preserves_existing_value_on_hit() {
        let (_dir, store) = scratch_store();
        let mut arena = HeapArena::new();
        let mut hamt = Hamt::<U64Policy>::empty();
        assert!(hamt.insert(&mut arena, &store, 1, 100).unwrap());
        assert!(hamt.insert(&mut arena, &store, 2, 200).unwrap());
        hamt.flush(&arena, &store).unwrap();

        let mut arena = HeapArena::new();
        assert!(!hamt.insert(&mut arena, &store, 1, 999).unwrap());
        assert_eq!(hamt.find(&arena, &store, &1).unwrap(), Some(100));
    }

    #[test]
    fn size_and_is_empty_track_the_entry_count() {
        let (_dir, store) = scratch_store();
        let mut arena = HeapArena::new();
        let mut hamt = Hamt::<U64Policy>::empty();
        assert!(hamt.is_empty(&arena, &store).unwrap());
        assert_eq!(hamt.size(&arena, &store).unwrap(), 0);
        for i in 0..5u64 {
            hamt.insert_or_assign(&mut arena, &store, i, i).unwrap();
        }
        assert!(!hamt.is_empty(&arena, &store).unwrap());
        assert_eq!(hamt.size(&arena, &store).unwrap(), 5);
    }

    #[test]
    fn fsck_rejects_an_internal_node_with_an_empty_bitmap() {
        let (_dir, store) = scratch_store();
        let mut arena = HeapArena::new();
        let idx = arena.push(HeapNode::Internal(InternalNode { bitmap: 0, children: Vec::new() }));
        let hamt = Hamt::<U64Policy> { root: Slot::Heap(idx), _policy: std::marker::PhantomData };
        assert!(matches!(hamt.fsck(&arena, &store), Err(Error::IndexCorrupt(_))));
    }

    #[test]
    fn entries_collects_every_pair() {
        let (_dir, store) = scratch_store();
        let mut arena = HeapArena::new();
        let mut hamt = Hamt::<U64Policy>::empty();
        for i in 0..16u64 {
            hamt.insert_or_assign(&mut arena, &store, i, i).unwrap();
        }
        let mut got = hamt.entries(&arena, &store).unwrap();
        got.sort_unstable();
        let want: Vec<(u64, u64)> = (0..16).map(|i| (i, i)).collect();
        assert_eq!(got, want);
    }
}
