// Path: crates/pstore-os/src/socket.rs

//! The socket-style [`Descriptor`] instantiation: a raw socket/file handle
//! closed with the platform's socket-close call.

use crate::descriptor::{Descriptor, DescriptorTraits};

#[cfg(unix)]
pub type RawSocket = std::os::unix::io::RawFd;
#[cfg(windows)]
pub type RawSocket = std::os::windows::io::RawSocket;

pub struct SocketTraits;

#[cfg(unix)]
impl DescriptorTraits for SocketTraits {
    type Raw = RawSocket;
    const INVALID: Self::Raw = -1;

    unsafe fn close(raw: Self::Raw) {
        libc::close(raw);
    }
}

#[cfg(windows)]
impl DescriptorTraits for SocketTraits {
    type Raw = RawSocket;
    const INVALID: Self::Raw = windows_sys::Win32::Networking::WinSock::INVALID_SOCKET as RawSocket;

    unsafe fn close(raw: Self::Raw) {
        windows_sys::Win32::Networking::WinSock::closesocket(raw as _);
    }
}

pub type Socket = Descriptor<SocketTraits>;

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn invalid_socket_is_invalid() {
        let s = Socket::invalid();
        assert!(!s.is_valid());
    }

    #[test]
    fn release_does_not_close() {
        // A duplicate of stdin's fd so closing it (if it happened) would be observable only
        // via a second close failing; release() must not close it at all.
        let fd = unsafe { libc::dup(0) };
        assert!(fd >= 0);
        let s = Socket::new(fd);
        let released = s.release();
        assert_eq!(released, fd);
        unsafe { libc::close(fd) };
    }
}
