// Path: crates/pstore-types/src/error.rs

//! The shared error vocabulary (§7 "Error handling design"). Every fallible
//! core operation returns `Result<T, Error>`; nothing in non-test code
//! panics on a reachable condition.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // -- address / store --
    #[error("address out of range or crosses the live logical size")]
    BadAddress,
    #[error("store header is corrupt: {0}")]
    HeaderCorrupt(String),
    #[error("store header version is not recognised")]
    HeaderVersionMismatch,
    #[error("revision {0} does not exist")]
    UnknownRevision(u64),
    #[error("index was retrieved from a revision older than the database's current revision")]
    IndexNotLatestRevision,
    #[error("index structure is corrupt: {0}")]
    IndexCorrupt(String),
    #[error("did not read the number of bytes requested")]
    DidNotReadNumberOfBytesRequested,
    #[error("could not parse UUID: {0}")]
    UuidParseError(String),
    #[error("bad message part number")]
    BadMessagePartNumber,

    // -- romfs --
    #[error("no such file or directory")]
    Enoent,
    #[error("not a directory")]
    Enotdir,
    #[error("invalid argument")]
    Einval,

    // -- http --
    #[error("bad request")]
    BadRequest,
    #[error("unsupported websocket version")]
    BadWebsocketVersion,
    #[error("method not implemented")]
    NotImplemented,
    #[error("header or request line too long")]
    StringTooLong,
    #[error("refill callback read out of the requested range")]
    RefillOutOfRange,

    // -- websocket --
    #[error("reserved bit set in frame header")]
    ReservedBitSet,
    #[error("frame payload length exceeds the protocol maximum")]
    PayloadTooLong,
    #[error("client frame was not masked")]
    UnmaskedFrame,
    #[error("outgoing message exceeds the protocol maximum")]
    MessageTooLong,
    #[error("peer closed the connection mid-frame")]
    InsufficientData,

    // -- io / misc --
    #[error(transparent)]
    Io(#[from] IoErrorWrapper),
}

/// `std::io::Error` does not implement `PartialEq`/`Eq`/`Clone`; this wrapper
/// carries only what the core needs to propagate (kind + message) so `Error`
/// itself can stay comparable, which the HAMT/transaction test suites rely on.
#[derive(Debug, Clone)]
pub struct IoErrorWrapper {
    pub kind: std::io::ErrorKind,
    pub message: String,
}

impl PartialEq for IoErrorWrapper {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}
impl Eq for IoErrorWrapper {}

impl std::fmt::Display for IoErrorWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl std::error::Error for IoErrorWrapper {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(IoErrorWrapper {
            kind: e.kind(),
            message: e.to_string(),
        })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
