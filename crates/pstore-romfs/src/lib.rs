// Path: crates/pstore-romfs/src/lib.rs

#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::unimplemented, clippy::todo)
)]

//! The compile-time read-only filesystem serving the embedded status-server
//! assets (§4.B). Asset bytes live under `assets/` and are embedded via
//! `include_bytes!` in [`table`]; [`romfs::Romfs`] provides the mutable
//! "current directory" cursor and path-resolution operations over that
//! immutable graph.

pub mod dirent;
pub mod directory;
pub mod romfs;
pub mod table;

pub use dirent::{Content, Dirent, Stat};
pub use directory::Directory;
pub use romfs::{DirHandle, FileHandle, Romfs, Whence};
