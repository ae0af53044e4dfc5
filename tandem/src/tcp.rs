//! Socket-level tuning for dispatcher-owned TCP streams.

#![allow(unsafe_code)]

use std::io;
use std::mem::ManuallyDrop;

/// Disable Nagle's algorithm on `stream`.
///
/// Messages are small and latency bound; coalescing is done by the
/// dispatcher's writer instead.
pub(crate) fn set_nodelay(stream: &compio::net::TcpStream) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::io::{AsRawFd, FromRawFd};
        // SAFETY: the fd stays owned by `stream`; ManuallyDrop keeps socket2
        // from closing it.
        let sock = ManuallyDrop::new(unsafe { socket2::Socket::from_raw_fd(stream.as_raw_fd()) });
        sock.set_nodelay(true)
    }

    #[cfg(windows)]
    {
        use std::os::windows::io::{AsRawSocket, FromRawSocket};
        // SAFETY: as above, ownership of the handle is not transferred.
        let sock = ManuallyDrop::new(unsafe {
            socket2::Socket::from_raw_socket(stream.as_raw_socket())
        });
        sock.set_nodelay(true)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = stream;
        Ok(())
    }
}
