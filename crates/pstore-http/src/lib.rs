// Path: crates/pstore-http/src/lib.rs

#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::unimplemented, clippy::todo)
)]

//! Hand-rolled HTTP/1.1 request parsing and response building, RFC 6455
//! WebSocket framing, and the romfs/`cmd` content dispatch that sit behind
//! the status server's accept loop (§4.H–§4.J).

pub mod dispatch;
pub mod http_date;
pub mod request;
pub mod response;
pub mod server;
pub mod wrap;
pub mod ws;

pub use dispatch::{CommandRegistry, DynamicResponse};
pub use request::RequestInfo;
pub use response::report_error;
pub use server::{run, ServerConfig, Shutdown};
