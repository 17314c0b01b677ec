// Path: crates/pstore-os/src/lib.rs

#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::unimplemented, clippy::todo)
)]

//! Cross-platform RAII handles and the signal-safe wake primitive (§4.A).

pub mod descriptor;
pub mod signal_cv;
pub mod socket;

pub use descriptor::{Descriptor, DescriptorTraits};
pub use signal_cv::SignalNotifier;
pub use socket::Socket;
