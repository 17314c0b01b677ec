// Path: crates/pstore-storage/src/hamt/codec.rs

//! On-disk node framing. Every node (leaf, internal, linear) begins with a
//! one-byte kind tag at its own address; a child pointer is a plain `u64`
//! store offset, resolved by peeking that tag at the target (§9 Design
//! Notes: "do not rely on low-bit pointer tagging across languages", the
//! self-describing-header form used here instead).

use pstore_types::{Address, Error, Result};

use super::pointer::{InternalNode, LinearNode};
use crate::region::AddressSpace;

const TAG_LEAF: u8 = 0;
const TAG_INTERNAL: u8 = 1;
const TAG_LINEAR: u8 = 2;

pub enum StoreNode {
    Leaf(Vec<u8>),
    Internal(InternalNode),
    Linear(LinearNode),
}

fn advance(addr: Address, n: u64) -> Result<Address> {
    addr.checked_add(n).ok_or(Error::BadAddress)
}

fn read_u8(store: &AddressSpace, addr: Address) -> Result<u8> {
    let bytes = store.getro(addr, 1)?;
    Ok(bytes[0])
}

fn read_u32(store: &AddressSpace, addr: Address) -> Result<u32> {
    let bytes = store.getro(addr, 4)?;
    Ok(u32::from_le_bytes(bytes.try_into().map_err(|_| Error::IndexCorrupt("u32 field".into()))?))
}

fn read_u64(store: &AddressSpace, addr: Address) -> Result<u64> {
    let bytes = store.getro(addr, 8)?;
    Ok(u64::from_le_bytes(bytes.try_into().map_err(|_| Error::IndexCorrupt("u64 field".into()))?))
}

pub fn write_leaf(store: &AddressSpace, payload: &[u8]) -> Result<Address> {
    let total = 1 + 4 + payload.len() as u64;
    let addr = store.allocate(total, 8)?;
    let mut buf = Vec::with_capacity(total as usize);
    buf.push(TAG_LEAF);
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);
    store.write(addr, &buf)?;
    Ok(addr)
}

pub fn write_internal(store: &AddressSpace, node: &InternalNode, children: &[Address]) -> Result<Address> {
    let count = children.len() as u64;
    let total = 1 + 8 + 4 + count * 8;
    let addr = store.allocate(total, 8)?;
    let mut buf = Vec::with_capacity(total as usize);
    buf.push(TAG_INTERNAL);
    buf.extend_from_slice(&node.bitmap.to_le_bytes());
    buf.extend_from_slice(&(children.len() as u32).to_le_bytes());
    for c in children {
        buf.extend_from_slice(&c.as_u64().to_le_bytes());
    }
    store.write(addr, &buf)?;
    Ok(addr)
}

pub fn write_linear(store: &AddressSpace, leaves: &[Address]) -> Result<Address> {
    let count = leaves.len() as u64;
    let total = 1 + 4 + count * 8;
    let addr = store.allocate(total, 8)?;
    let mut buf = Vec::with_capacity(total as usize);
    buf.push(TAG_LINEAR);
    buf.extend_from_slice(&(leaves.len() as u32).to_le_bytes());
    for l in leaves {
        buf.extend_from_slice(&l.as_u64().to_le_bytes());
    }
    store.write(addr, &buf)?;
    Ok(addr)
}

pub fn read_node(store: &AddressSpace, addr: Address) -> Result<StoreNode> {
    let tag = read_u8(store, addr)?;
    let mut cursor = advance(addr, 1)?;
    match tag {
        TAG_LEAF => {
            let len = read_u32(store, cursor)?;
            cursor = advance(cursor, 4)?;
            let payload = store.getro(cursor, u64::from(len))?;
            Ok(StoreNode::Leaf(payload))
        }
        TAG_INTERNAL => {
            let bitmap = read_u64(store, cursor)?;
            cursor = advance(cursor, 8)?;
            let count = read_u32(store, cursor)?;
            cursor = advance(cursor, 4)?;
            let mut children = Vec::with_capacity(count as usize);
            for _ in 0..count {
                children.push(super::pointer::Slot::Store(Address::new(read_u64(store, cursor)?)));
                cursor = advance(cursor, 8)?;
            }
            Ok(StoreNode::Internal(InternalNode { bitmap, children }))
        }
        TAG_LINEAR => {
            let count = read_u32(store, cursor)?;
            cursor = advance(cursor, 4)?;
            let mut leaves = Vec::with_capacity(count as usize);
            for _ in 0..count {
                leaves.push(Address::new(read_u64(store, cursor)?));
                cursor = advance(cursor, 8)?;
            }
            Ok(StoreNode::Linear(LinearNode { leaves }))
        }
        other => Err(Error::IndexCorrupt(format!("unknown node tag {other}"))),
    }
}

/// Reads the payload of a leaf node, failing if `addr` does not name one.
pub fn read_leaf_payload(store: &AddressSpace, addr: Address) -> Result<Vec<u8>> {
    match read_node(store, addr)? {
        StoreNode::Leaf(payload) => Ok(payload),
        _ => Err(Error::IndexCorrupt("expected a leaf node".into())),
    }
}
