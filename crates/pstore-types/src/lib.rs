// Path: crates/pstore-types/src/lib.rs

#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo
    )
)]

//! Core data structures and error types for pstore: the [`Address`] space
//! primitives, the shared [`Error`] vocabulary, the store-identity
//! [`uuid::StoreUuid`], and the header/trailer CRC helper. Kept dependency-light
//! (mirrors the teacher's `ioi-types` crate, which stays minimal "to remain
//! stable") since every other crate in the workspace depends on it.

pub mod address;
pub mod crc;
pub mod error;
pub mod uuid;

pub use address::{Address, TypedAddress, OFFSET_BITS, SEGMENT_SIZE};
pub use error::{Error, Result};
pub use uuid::StoreUuid;
