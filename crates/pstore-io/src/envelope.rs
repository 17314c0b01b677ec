// Path: crates/pstore-io/src/envelope.rs

//! The spec's `error_or<T>`/`error_or_n<A, B, ...>` I/O envelope (§4.G).
//! Rust's `Result<T, pstore_types::Error>` already *is* that envelope —
//! `?` is its bind (`>>=`) — so this module only adds the multi-value form,
//! which bundles a handle (or any context value) alongside the payload the
//! way `error_or_n` bundles the I/O handle with one or more results.

use pstore_types::Result;

/// A result paired with the handle (or other context) that produced it,
/// so a continuation can keep threading it through without re-deriving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithHandle<H, T> {
    pub handle: H,
    pub value: T,
}

impl<H, T> WithHandle<H, T> {
    pub fn new(handle: H, value: T) -> Self {
        WithHandle { handle, value }
    }

    /// Applies `f` to the payload, keeping the handle, short-circuiting on
    /// error exactly as `error_or_n::operator>>=` does.
    pub fn bind<U>(self, f: impl FnOnce(T) -> Result<U>) -> Result<WithHandle<H, U>> {
        f(self.value).map(|v| WithHandle::new(self.handle, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_chains_while_propagating_the_handle() {
        let r = WithHandle::new("conn-1", 2).bind(|v| Ok::<_, pstore_types::Error>(v * 10));
        let r = r.unwrap().bind(|v| Ok::<_, pstore_types::Error>(v + 1));
        let r = r.unwrap();
        assert_eq!(r.handle, "conn-1");
        assert_eq!(r.value, 21);
    }

    #[test]
    fn bind_short_circuits_on_error() {
        let r: Result<WithHandle<&str, i32>> =
            WithHandle::new("conn-1", 2).bind(|_| Err(pstore_types::Error::BadRequest));
        assert!(r.is_err());
    }
}
