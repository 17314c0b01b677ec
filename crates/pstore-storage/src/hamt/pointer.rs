// Path: crates/pstore-storage/src/hamt/pointer.rs

//! Child pointers and the mutable heap arena a transaction builds nodes in
//! before [`super::Hamt::flush`] writes them to the store (§4.D "heap vs.
//! store node representation").
//!
//! Heap nodes are held in a flat arena addressed by index rather than
//! `Rc`/`RefCell`, the same arena-of-indices shape used by
//! [`crate::romfs`]'s directory table to avoid reference cycles in safe
//! Rust (§9 Design Notes).

use pstore_types::Address;

/// A child reference: either already committed to the store, or a node
/// still under construction in this transaction's [`HeapArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Store(Address),
    Heap(usize),
}

impl Slot {
    #[must_use]
    pub fn empty() -> Self {
        Slot::Store(Address::NULL)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Store(a) if a.is_null())
    }
}

#[derive(Debug, Clone)]
pub struct InternalNode {
    pub bitmap: u64,
    pub children: Vec<Slot>,
}

impl InternalNode {
    #[must_use]
    pub fn position(&self, bit: u64) -> usize {
        (self.bitmap & (bit - 1)).count_ones() as usize
    }
}

/// Holds leaves whose hash bits are exhausted, or that collided at the
/// deepest internal level; scanned linearly on lookup (§4.D "linear nodes").
#[derive(Debug, Clone, Default)]
pub struct LinearNode {
    pub leaves: Vec<Address>,
}

#[derive(Debug, Clone)]
pub enum HeapNode {
    Internal(InternalNode),
    Linear(LinearNode),
}

/// The per-transaction scratch space for nodes that have been touched but
/// not yet written to the store. Cleared (conceptually) once
/// [`super::Hamt::flush`] has walked it.
#[derive(Debug, Default)]
pub struct HeapArena {
    nodes: Vec<HeapNode>,
}

impl HeapArena {
    #[must_use]
    pub fn new() -> Self {
        HeapArena::default()
    }

    pub fn push(&mut self, node: HeapNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> &HeapNode {
        &self.nodes[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut HeapNode {
        &mut self.nodes[idx]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
