// Path: crates/pstore-romfs/src/directory.rs

//! A directory is an array of [`Dirent`]s sorted by name, always containing
//! `.` and `..` (§3, §4.B). Directories are addressed by index into a flat
//! table rather than by pointer (§9 redesign guidance), so the whole graph
//! is cycle-free by construction except for the `.`/`..` self/parent edges.

use crate::dirent::Dirent;

#[derive(Debug, Clone, Copy)]
pub struct Directory {
    pub entries: &'static [Dirent],
}

impl Directory {
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&'static Dirent> {
        self.entries.iter().find(|d| d.name == name)
    }

    #[must_use]
    pub fn is_sorted_by_name(&self) -> bool {
        self.entries.windows(2).all(|w| w[0].name <= w[1].name)
    }
}
