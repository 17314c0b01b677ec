// Path: crates/pstore-romfs/src/romfs.rs

//! Path resolution and the `stat`/`open`/`opendir`/`chdir`/`getcwd`
//! operations over the compile-time directory graph (§4.B). Each [`Romfs`]
//! instance owns its own "current directory" — per-instance, not per-OS, as
//! §4.B requires.

use std::sync::Mutex;

use pstore_types::error::{Error, Result};

use crate::dirent::{Content, Dirent, Stat};
use crate::table::{self, DIRECTORIES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

pub struct Romfs {
    cwd: Mutex<usize>,
}

impl Default for Romfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Romfs {
    #[must_use]
    pub fn new() -> Self {
        Romfs { cwd: Mutex::new(table::ROOT) }
    }

    fn start_dir(&self, path: &str) -> usize {
        if path.starts_with('/') {
            table::ROOT
        } else {
            *self.cwd.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    fn dot_of(idx: usize) -> Result<Dirent> {
        DIRECTORIES
            .get(idx)
            .and_then(|d| d.find("."))
            .copied()
            .ok_or(Error::Enoent)
    }

    /// Resolves `path` to the [`Dirent`] it names. Non-final components must
    /// be directories; `.` and `..` are honoured via the directory's own
    /// entries.
    pub fn resolve(&self, path: &str) -> Result<Dirent> {
        let mut dir_idx = self.start_dir(path);
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        if components.is_empty() {
            return Self::dot_of(dir_idx);
        }
        let mut found: Option<Dirent> = None;
        let last = components.len() - 1;
        for (i, comp) in components.iter().enumerate() {
            let dir = DIRECTORIES.get(dir_idx).ok_or(Error::Enoent)?;
            let entry = *dir.find(comp).ok_or(Error::Enoent)?;
            if i != last {
                match entry.content {
                    Content::Dir(next) => dir_idx = next,
                    Content::File(_) => return Err(Error::Enotdir),
                }
            }
            found = Some(entry);
        }
        found.ok_or(Error::Enoent)
    }

    pub fn stat(&self, path: &str) -> Result<Stat> {
        self.resolve(path).map(|d| d.stat)
    }

    pub fn open(&self, path: &str) -> Result<FileHandle> {
        let entry = self.resolve(path)?;
        match entry.content {
            Content::File(data) => Ok(FileHandle { data, pos: 0, stat: entry.stat }),
            Content::Dir(_) => Err(Error::Enotdir),
        }
    }

    pub fn opendir(&self, path: &str) -> Result<DirHandle> {
        let entry = self.resolve(path)?;
        match entry.content {
            Content::Dir(idx) => Ok(DirHandle { dir_idx: idx, pos: 0 }),
            Content::File(_) => Err(Error::Enotdir),
        }
    }

    pub fn chdir(&self, path: &str) -> Result<()> {
        let entry = self.resolve(path)?;
        match entry.content {
            Content::Dir(idx) => {
                let mut cwd = self.cwd.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                *cwd = idx;
                Ok(())
            }
            Content::File(_) => Err(Error::Enotdir),
        }
    }

    #[must_use]
    pub fn getcwd(&self) -> String {
        let mut components: Vec<&'static str> = Vec::new();
        let mut current = *self.cwd.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        while current != table::ROOT {
            let Some(dir) = DIRECTORIES.get(current) else { break };
            let Some(dotdot) = dir.find("..") else { break };
            let Content::Dir(parent) = dotdot.content else { break };
            let Some(parent_dir) = DIRECTORIES.get(parent) else { break };
            let name = parent_dir
                .entries
                .iter()
                .find(|e| e.name != "." && e.name != ".." && matches!(e.content, Content::Dir(i) if i == current))
                .map_or("?", |e| e.name);
            components.push(name);
            current = parent;
        }
        components.reverse();
        if components.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", components.join("/"))
        }
    }

    /// Walks the whole tree verifying sort order, `.`/`..` invariants, and
    /// the absence of cycles other than the `.`/`..` self/parent edges
    /// (§4.B "fsck").
    pub fn fsck(&self) -> Result<()> {
        fn visit(idx: usize, stack: &mut Vec<usize>) -> Result<()> {
            if stack.contains(&idx) {
                return Err(Error::IndexCorrupt("cycle detected in romfs directory graph".into()));
            }
            stack.push(idx);
            let dir = DIRECTORIES.get(idx).ok_or(Error::Enoent)?;
            if !dir.is_sorted_by_name() {
                return Err(Error::IndexCorrupt("romfs directory entries are not sorted by name".into()));
            }
            let dot = dir.find(".").ok_or_else(|| Error::IndexCorrupt("missing '.' entry".into()))?;
            if !matches!(dot.content, Content::Dir(i) if i == idx) {
                return Err(Error::IndexCorrupt("'.' does not self-reference its directory".into()));
            }
            let dotdot = dir.find("..").ok_or_else(|| Error::IndexCorrupt("missing '..' entry".into()))?;
            if !matches!(dotdot.content, Content::Dir(_)) {
                return Err(Error::IndexCorrupt("'..' does not reference a directory".into()));
            }
            for entry in dir.entries {
                if entry.name == "." || entry.name == ".." {
                    continue;
                }
                if let Content::Dir(child) = entry.content {
                    visit(child, stack)?;
                }
            }
            stack.pop();
            Ok(())
        }
        visit(table::ROOT, &mut Vec::new())
    }
}

pub struct FileHandle {
    data: &'static [u8],
    pos: usize,
    stat: Stat,
}

impl FileHandle {
    /// Reads into `buf`, returning the number of bytes transferred (0 at
    /// EOF).
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let remaining = self.data.len().saturating_sub(self.pos);
        let n = remaining.min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    /// Seeks, disallowing a negative resulting position; seeking past EOF is
    /// allowed (subsequent reads return 0).
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let base: i64 = match whence {
            Whence::Set => 0,
            Whence::Cur => i64::try_from(self.pos).map_err(|_| Error::Einval)?,
            Whence::End => i64::try_from(self.data.len()).map_err(|_| Error::Einval)?,
        };
        let new_pos = base.checked_add(offset).ok_or(Error::Einval)?;
        if new_pos < 0 {
            return Err(Error::Einval);
        }
        self.pos = usize::try_from(new_pos).map_err(|_| Error::Einval)?;
        Ok(self.pos as u64)
    }

    #[must_use]
    pub fn stat(&self) -> Stat {
        self.stat
    }
}

pub struct DirHandle {
    dir_idx: usize,
    pos: usize,
}

impl DirHandle {
    pub fn read(&mut self) -> Option<&'static Dirent> {
        let dir = DIRECTORIES.get(self.dir_idx)?;
        let entry = dir.entries.get(self.pos)?;
        self.pos += 1;
        Some(entry)
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_index_html_matches_embedded_size_and_mtime() {
        let fs = Romfs::new();
        let st = fs.stat("/index.html").unwrap();
        assert!(!st.is_dir);
        assert_eq!(st.mtime, 1_556_010_627);
        assert_eq!(st.size, include_bytes!("../assets/index.html").len() as u64);
    }

    #[test]
    fn open_and_read_whole_file() {
        let fs = Romfs::new();
        let mut f = fs.open("/index.html").unwrap();
        let mut buf = vec![0u8; 4096];
        let n = f.read(&mut buf);
        assert_eq!(&buf[..n], include_bytes!("../assets/index.html"));
        assert_eq!(f.read(&mut buf), 0);
    }

    #[test]
    fn seek_past_eof_then_read_returns_zero() {
        let fs = Romfs::new();
        let mut f = fs.open("/status.js").unwrap();
        f.seek(1_000_000, Whence::Set).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(f.read(&mut buf), 0);
    }

    #[test]
    fn seek_negative_is_einval() {
        let fs = Romfs::new();
        let mut f = fs.open("/status.js").unwrap();
        assert_eq!(f.seek(-1, Whence::Set), Err(Error::Einval));
    }

    #[test]
    fn nonexistent_path_is_enoent() {
        let fs = Romfs::new();
        assert_eq!(fs.stat("/nope.txt").unwrap_err(), Error::Enoent);
    }

    #[test]
    fn open_through_a_file_component_is_enotdir() {
        let fs = Romfs::new();
        assert_eq!(fs.stat("/index.html/x").unwrap_err(), Error::Enotdir);
    }

    #[test]
    fn opendir_root_lists_dot_dotdot_and_children_sorted() {
        let fs = Romfs::new();
        let mut d = fs.opendir("/").unwrap();
        let mut names = Vec::new();
        while let Some(e) = d.read() {
            names.push(e.name);
        }
        assert_eq!(names, vec![".", "..", "css", "index.html", "status.js"]);
    }

    #[test]
    fn chdir_and_getcwd_round_trip() {
        let fs = Romfs::new();
        assert_eq!(fs.getcwd(), "/");
        fs.chdir("/css").unwrap();
        assert_eq!(fs.getcwd(), "/css");
        fs.chdir("..").unwrap();
        assert_eq!(fs.getcwd(), "/");
    }

    #[test]
    fn fsck_passes_on_the_embedded_tree() {
        let fs = Romfs::new();
        fs.fsck().unwrap();
    }
}
