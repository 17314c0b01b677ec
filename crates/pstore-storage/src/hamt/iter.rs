// Path: crates/pstore-storage/src/hamt/iter.rs

//! Depth-first traversal over a [`super::Hamt`], used by `entries()` and by
//! `fsck`. An explicit stack rather than recursion so a very deep trie
//! cannot blow the call stack (the store's own revision chain walk in
//! `database.rs` uses the same iterative shape).

use pstore_types::Result;

use super::pointer::{HeapArena, Slot};
use super::{codec, HamtPolicy};
use crate::region::AddressSpace;

pub struct HamtIter<'a, P: HamtPolicy> {
    stack: Vec<Slot>,
    arena: &'a HeapArena,
    store: &'a AddressSpace,
    _policy: std::marker::PhantomData<fn() -> P>,
}

impl<'a, P: HamtPolicy> HamtIter<'a, P> {
    pub(super) fn new(root: Slot, arena: &'a HeapArena, store: &'a AddressSpace) -> Self {
        let stack = if root.is_empty() { Vec::new() } else { vec![root] };
        HamtIter { stack, arena, store, _policy: std::marker::PhantomData }
    }
}

impl<P: HamtPolicy> Iterator for HamtIter<'_, P> {
    type Item = Result<(P::Key, P::Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let slot = self.stack.pop()?;
            let node = match slot {
                Slot::Store(addr) => match codec::read_node(self.store, addr) {
                    Ok(n) => n,
                    Err(e) => return Some(Err(e)),
                },
                Slot::Heap(idx) => match self.arena.get(idx).clone() {
                    super::HeapNode::Internal(n) => {
                        // Pushed in reverse so popping (LIFO) yields children
                        // in ascending bit-position order.
                        for child in n.children.into_iter().rev() {
                            self.stack.push(child);
                        }
                        continue;
                    }
                    super::HeapNode::Linear(n) => {
                        for addr in n.leaves.into_iter().rev() {
                            self.stack.push(Slot::Store(addr));
                        }
                        continue;
                    }
                },
            };
            match node {
                codec::StoreNode::Leaf(payload) => return Some(P::decode_leaf(&payload)),
                codec::StoreNode::Internal(n) => {
                    for child in n.children.into_iter().rev() {
                        self.stack.push(child);
                    }
                }
                codec::StoreNode::Linear(n) => {
                    for addr in n.leaves.into_iter().rev() {
                        self.stack.push(Slot::Store(addr));
                    }
                }
            }
        }
    }
}
