// Path: crates/pstore-os/src/signal_cv.rs

//! A condition-variable-like object whose wait uses the OS readiness
//! mechanism, so a signal handler can wake a waiter using only
//! async-signal-safe calls (§4.A, §9 "Signal-safe wake primitive → OS
//! provided edge").
//!
//! POSIX: the self-pipe trick. `notify` performs a single `write(2)` of one
//! byte to the pipe's write end — the only call it makes, and `write` on a
//! non-blocking pipe is async-signal-safe. `wait` reads (drains) the read
//! end, which is registered non-blocking so a spurious extra byte never
//! blocks a subsequent drain.
//!
//! Windows: a manual-reset `Event`. `notify` calls `SetEvent`; `wait` calls
//! `WaitForSingleObject`; `reset` calls `ResetEvent`.

use std::io;

#[cfg(unix)]
mod imp {
    use super::*;
    use std::os::unix::io::RawFd;

    pub struct SignalNotifier {
        read_fd: RawFd,
        write_fd: RawFd,
    }

    impl SignalNotifier {
        pub fn new() -> io::Result<Self> {
            let mut fds = [0i32; 2];
            // SAFETY: `fds` is a valid 2-element buffer for pipe2 to fill.
            let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(SignalNotifier {
                read_fd: fds[0],
                write_fd: fds[1],
            })
        }

        /// Async-signal-safe: the single syscall it issues is `write(2)` on
        /// a non-blocking descriptor.
        pub fn notify(&self) {
            let byte: u8 = 1;
            // SAFETY: write_fd is open for the notifier's lifetime; a short
            // write or EAGAIN (pipe already has a pending byte) is fine —
            // the wake is edge-triggered, not counted.
            unsafe {
                libc::write(self.write_fd, (&byte as *const u8).cast(), 1);
            }
        }

        /// Blocks until `notify` has been called at least once since the
        /// last `wait`/`reset`.
        pub fn wait(&self) -> io::Result<()> {
            let mut pollfd = libc::pollfd {
                fd: self.read_fd,
                events: libc::POLLIN,
                revents: 0,
            };
            loop {
                // SAFETY: pollfd is a valid single-element array for poll(2).
                let rc = unsafe { libc::poll(&mut pollfd, 1, -1) };
                if rc < 0 {
                    let e = io::Error::last_os_error();
                    if e.kind() == io::ErrorKind::Interrupted {
                        continue;
                    }
                    return Err(e);
                }
                break;
            }
            self.reset();
            Ok(())
        }

        /// Drains pending wake bytes without blocking.
        pub fn reset(&self) {
            let mut buf = [0u8; 64];
            loop {
                // SAFETY: buf is a valid 64-byte destination buffer.
                let n = unsafe { libc::read(self.read_fd, buf.as_mut_ptr().cast(), buf.len()) };
                if n <= 0 {
                    break;
                }
            }
        }

        pub fn wait_descriptor(&self) -> RawFd {
            self.read_fd
        }
    }

    impl Drop for SignalNotifier {
        fn drop(&mut self) {
            unsafe {
                libc::close(self.read_fd);
                libc::close(self.write_fd);
            }
        }
    }
}

#[cfg(windows)]
mod imp {
    use super::*;
    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, WAIT_FAILED};
    use windows_sys::Win32::System::Threading::{
        CreateEventW, ResetEvent, SetEvent, WaitForSingleObject, INFINITE,
    };

    pub struct SignalNotifier {
        event: HANDLE,
    }

    // SAFETY: a Win32 event HANDLE may be used from any thread.
    unsafe impl Send for SignalNotifier {}
    unsafe impl Sync for SignalNotifier {}

    impl SignalNotifier {
        pub fn new() -> io::Result<Self> {
            // SAFETY: all arguments are valid per CreateEventW's contract
            // (manual-reset, initially unset, unnamed).
            let event = unsafe { CreateEventW(std::ptr::null(), 1, 0, std::ptr::null()) };
            if event == 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(SignalNotifier { event })
        }

        pub fn notify(&self) {
            // SAFETY: `event` is a live handle owned by `self`.
            unsafe {
                SetEvent(self.event);
            }
        }

        pub fn wait(&self) -> io::Result<()> {
            // SAFETY: `event` is a live handle owned by `self`.
            let rc = unsafe { WaitForSingleObject(self.event, INFINITE) };
            if rc == WAIT_FAILED {
                return Err(io::Error::last_os_error());
            }
            self.reset();
            Ok(())
        }

        pub fn reset(&self) {
            // SAFETY: `event` is a live handle owned by `self`.
            unsafe {
                ResetEvent(self.event);
            }
        }

        pub fn wait_descriptor(&self) -> HANDLE {
            self.event
        }
    }

    impl Drop for SignalNotifier {
        fn drop(&mut self) {
            // SAFETY: `event` is a live handle owned by `self`, closed once.
            unsafe {
                CloseHandle(self.event);
            }
        }
    }
}

pub use imp::SignalNotifier;

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn notify_before_wait_is_not_lost() {
        let n = SignalNotifier::new().unwrap();
        n.notify();
        n.wait().unwrap();
    }

    #[test]
    fn repeated_notify_does_not_deadlock() {
        let n = Arc::new(SignalNotifier::new().unwrap());
        n.notify();
        n.notify();
        n.notify();
        n.wait().unwrap();

        let n2 = Arc::clone(&n);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            n2.notify();
        });
        n.wait().unwrap();
        handle.join().unwrap();
    }
}
