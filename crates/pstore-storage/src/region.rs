// Path: crates/pstore-storage/src/region.rs

//! The file-backed, segmented address space with lazy region mapping
//! (§4.C). A [`Region`] is a contiguous mapped byte range backing exactly
//! one segment; [`AddressSpace`] owns the backing file and maps segments on
//! first touch, growing the file as needed.

use std::fs::File;
use std::sync::RwLock;

use memmap2::{Mmap, MmapMut};
use pstore_types::{Address, Error, Result, SEGMENT_SIZE};

/// A single mapped segment. Starts out writable; [`AddressSpace::protect`]
/// swaps it to a read-only mapping once its data has been committed.
enum Region {
    Writable(MmapMut),
    ReadOnly(Mmap),
}

impl Region {
    fn as_slice(&self) -> &[u8] {
        match self {
            Region::Writable(m) => &m[..],
            Region::ReadOnly(m) => &m[..],
        }
    }

    fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        match self {
            Region::Writable(m) => Some(&mut m[..]),
            Region::ReadOnly(_) => None,
        }
    }
}

/// The logical 64-bit address space backing the store file.
pub struct AddressSpace {
    file: File,
    regions: RwLock<Vec<Option<Region>>>,
    /// Bytes of the file that are meaningfully populated; accesses beyond
    /// this fail with `BadAddress` even if the segment is mapped.
    logical_size: RwLock<u64>,
}

impl AddressSpace {
    pub fn open(file: File, logical_size: u64) -> Result<Self> {
        let space = AddressSpace {
            file,
            regions: RwLock::new(Vec::new()),
            logical_size: RwLock::new(logical_size),
        };
        space.ensure_mapped_through(logical_size.max(1) - 1)?;
        Ok(space)
    }

    #[must_use]
    pub fn logical_size(&self) -> u64 {
        *self.logical_size.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Re-synchronises the logical size to match a trailer just read back
    /// from disk (used when [`crate::database::Database::open`] discovers
    /// how far a previously-committed generation actually extends).
    pub(crate) fn adopt_logical_size(&self, size: u64) -> Result<()> {
        self.ensure_mapped_through(size.max(1) - 1)?;
        self.set_logical_size(size);
        Ok(())
    }

    fn set_logical_size(&self, size: u64) {
        let mut guard = self.logical_size.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = size;
    }

    fn segment_index(addr: Address) -> usize {
        addr.segment() as usize
    }

    /// Grows the file and maps segments so that byte offset `last_byte` is
    /// resident. Newly mapped segments beyond the previous file length are
    /// zero-filled by `set_len`.
    fn ensure_mapped_through(&self, last_byte: u64) -> Result<()> {
        let needed_segment = (last_byte / SEGMENT_SIZE) as usize;
        let mut regions = self.regions.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        if regions.len() <= needed_segment {
            let new_len = (needed_segment as u64 + 1) * SEGMENT_SIZE;
            let current_len = self.file.metadata()?.len();
            if new_len > current_len {
                self.file.set_len(new_len)?;
            }
            regions.resize_with(needed_segment + 1, || None);
        }
        if regions[needed_segment].is_none() {
            // SAFETY: the file is exclusively owned by this `AddressSpace`
            // for the lifetime of the mapping; no other process writes it.
            let mmap = unsafe {
                memmap2::MmapOptions::new()
                    .offset(needed_segment as u64 * SEGMENT_SIZE)
                    .len(SEGMENT_SIZE as usize)
                    .map_mut(&self.file)?
            };
            regions[needed_segment] = Some(Region::Writable(mmap));
        }
        Ok(())
    }

    /// Returns the base pointer of `segment` if it is currently mapped.
    #[must_use]
    pub fn segment_base(&self, segment: u32) -> bool {
        let regions = self.regions.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        matches!(regions.get(segment as usize), Some(Some(_)))
    }

    fn check_bounds(&self, addr: Address, size: u64) -> Result<()> {
        if addr.is_null() {
            return Err(Error::BadAddress);
        }
        let end = addr.checked_add(size).ok_or(Error::BadAddress)?;
        if end.as_u64() > self.logical_size() {
            return Err(Error::BadAddress);
        }
        Ok(())
    }

    /// Obtains a read-only copy of the `size` bytes at `addr`. The copy
    /// avoids holding the regions lock across the caller's use of the data,
    /// mirroring the spec's `getro`/`getrou` (this crate does not
    /// distinguish shared vs. unique views; both return owned bytes).
    pub fn getro(&self, addr: Address, size: u64) -> Result<Vec<u8>> {
        self.check_bounds(addr, size)?;
        self.ensure_mapped_through(addr.as_u64() + size.saturating_sub(1))?;
        let regions = self.regions.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let seg = addr.segment() as usize;
        let region = regions.get(seg).and_then(|r| r.as_ref()).ok_or(Error::BadAddress)?;
        let off = addr.offset() as usize;
        let len = size as usize;
        let slice = region.as_slice();
        slice.get(off..off + len).map(<[u8]>::to_vec).ok_or(Error::BadAddress)
    }

    /// Writes `bytes` at `addr`. Callers must only invoke this for an
    /// address within the currently-open transaction's allocation range
    /// (enforced by [`crate::transaction::Transaction`]).
    pub fn write(&self, addr: Address, bytes: &[u8]) -> Result<()> {
        self.check_bounds(addr, bytes.len() as u64)?;
        self.ensure_mapped_through(addr.as_u64() + bytes.len().saturating_sub(1) as u64)?;
        let mut regions = self.regions.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let seg = addr.segment() as usize;
        let region = regions.get_mut(seg).and_then(|r| r.as_mut()).ok_or(Error::BadAddress)?;
        let off = addr.offset() as usize;
        let dst = region.as_mut_slice().ok_or(Error::BadAddress)?;
        let dst = dst.get_mut(off..off + bytes.len()).ok_or(Error::BadAddress)?;
        dst.copy_from_slice(bytes);
        Ok(())
    }

    /// Allocates `size` bytes aligned to `align` by growing the logical size.
    /// Returns the newly-allocated address.
    pub fn allocate(&self, size: u64, align: u64) -> Result<Address> {
        let align = align.max(1);
        let current = self.logical_size();
        let padded = current.div_ceil(align) * align;
        let end = padded.checked_add(size).ok_or(Error::BadAddress)?;
        self.ensure_mapped_through(end.max(1) - 1)?;
        self.set_logical_size(end);
        pstore_telemetry::metrics::inc_bytes_allocated(end - current);
        Ok(Address::new(padded))
    }

    /// After a commit, remaps `[lo, hi)` read-only except for the first page
    /// (which holds the mutable header).
    pub fn protect(&self, lo: u64, hi: u64, page_size: u64) -> Result<()> {
        let lo = lo.max(page_size);
        if hi <= lo {
            return Ok(());
        }
        let first_seg = (lo / SEGMENT_SIZE) as usize;
        let last_seg = ((hi - 1) / SEGMENT_SIZE) as usize;
        let mut regions = self.regions.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        for seg in first_seg..=last_seg {
            if let Some(Some(Region::Writable(_))) = regions.get(seg) {
                if let Some(slot) = regions.get_mut(seg) {
                    if let Some(Region::Writable(mmap)) = slot.take() {
                        let ro = mmap.make_read_only()?;
                        *slot = Some(Region::ReadOnly(ro));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        let regions = self.regions.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        for region in regions.iter().flatten() {
            if let Region::Writable(m) = region {
                m.flush()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;

    fn scratch_space() -> (tempfile::TempDir, AddressSpace) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.pstore");
        let file = OpenOptions::new().read(true).write(true).create(true).open(&path).unwrap();
        file.set_len(4096).unwrap();
        let space = AddressSpace::open(file, 4096).unwrap();
        (dir, space)
    }

    #[test]
    fn allocate_then_write_then_read_round_trips() {
        let (_dir, space) = scratch_space();
        let addr = space.allocate(16, 1).unwrap();
        space.write(addr, b"0123456789abcdef").unwrap();
        let got = space.getro(addr, 16).unwrap();
        assert_eq!(got, b"0123456789abcdef");
    }

    #[test]
    fn allocate_respects_alignment() {
        let (_dir, space) = scratch_space();
        let _ = space.allocate(1, 1).unwrap();
        let a = space.allocate(8, 8).unwrap();
        assert_eq!(a.as_u64() % 8, 0);
    }

    #[test]
    fn out_of_range_read_is_bad_address() {
        let (_dir, space) = scratch_space();
        let addr = space.allocate(16, 1).unwrap();
        assert_eq!(space.getro(addr, 1000).unwrap_err(), Error::BadAddress);
    }

    #[test]
    fn protect_makes_committed_bytes_read_only() {
        let (_dir, space) = scratch_space();
        let addr = space.allocate(16, 1).unwrap();
        space.write(addr, b"0123456789abcdef").unwrap();
        space.protect(0, addr.as_u64() + 16, 4096).unwrap();
        assert!(space.write(addr, b"xxxxxxxxxxxxxxxx").is_err());
    }
}
