// Path: crates/pstore-romfs/src/table.rs

//! The compile-time directory/dirent graph. Asset bytes are embedded with
//! `include_bytes!`; the indices below are fixed at compile time and form
//! the flat directory table described in §9.

use crate::dirent::{Content, Dirent, Stat};
use crate::directory::Directory;

const INDEX_HTML: &[u8] = include_bytes!("../assets/index.html");
const STATUS_JS: &[u8] = include_bytes!("../assets/status.js");
const STYLE_CSS: &[u8] = include_bytes!("../assets/css/style.css");

/// A fixed build-time mtime for all embedded assets (no embedded filesystem
/// metadata survives `include_bytes!`).
const MTIME: u64 = 1_556_010_627;

const ROOT_INDEX: usize = 0;
const CSS_INDEX: usize = 1;

static CSS_ENTRIES: &[Dirent] = &[
    Dirent {
        name: ".",
        stat: Stat { size: 0, mtime: MTIME, is_dir: true },
        content: Content::Dir(CSS_INDEX),
    },
    Dirent {
        name: "..",
        stat: Stat { size: 0, mtime: MTIME, is_dir: true },
        content: Content::Dir(ROOT_INDEX),
    },
    Dirent {
        name: "style.css",
        stat: Stat { size: STYLE_CSS.len() as u64, mtime: MTIME, is_dir: false },
        content: Content::File(STYLE_CSS),
    },
];

static ROOT_ENTRIES: &[Dirent] = &[
    Dirent {
        name: ".",
        stat: Stat { size: 0, mtime: MTIME, is_dir: true },
        content: Content::Dir(ROOT_INDEX),
    },
    Dirent {
        name: "..",
        stat: Stat { size: 0, mtime: MTIME, is_dir: true },
        content: Content::Dir(ROOT_INDEX),
    },
    Dirent {
        name: "css",
        stat: Stat { size: 0, mtime: MTIME, is_dir: true },
        content: Content::Dir(CSS_INDEX),
    },
    Dirent {
        name: "index.html",
        stat: Stat { size: INDEX_HTML.len() as u64, mtime: MTIME, is_dir: false },
        content: Content::File(INDEX_HTML),
    },
    Dirent {
        name: "status.js",
        stat: Stat { size: STATUS_JS.len() as u64, mtime: MTIME, is_dir: false },
        content: Content::File(STATUS_JS),
    },
];

/// Index 0 is always the root directory.
pub static DIRECTORIES: &[Directory] = &[
    Directory { entries: ROOT_ENTRIES },
    Directory { entries: CSS_ENTRIES },
];

pub const ROOT: usize = ROOT_INDEX;
