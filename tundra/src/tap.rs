//! Wraps an externally-provided TAP file descriptor (spec §6: descriptor
//! creation is an environmental service) as a [`TapPort`]. One whole frame
//! per `read`/`write`, matching a TAP device's packet-oriented semantics.

use std::io;
use std::os::fd::{AsRawFd, RawFd};

use tokio::io::unix::AsyncFd;
use tundra_core::engine::TapPort;

struct OwnedTapFd(RawFd);

impl AsRawFd for OwnedTapFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

impl Drop for OwnedTapFd {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}

pub struct Tap {
    inner: AsyncFd<OwnedTapFd>,
}

impl Tap {
    /// Takes ownership of `fd`: set non-blocking, register with the
    /// reactor. `fd` must already be an open TAP descriptor.
    pub fn from_raw_fd(fd: RawFd) -> io::Result<Self> {
        set_nonblocking(fd)?;
        Ok(Self { inner: AsyncFd::new(OwnedTapFd(fd))? })
    }
}

impl TapPort for Tap {
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.inner.readable().await?;
            let result = guard.try_io(|inner| {
                let n = unsafe { libc::read(inner.get_ref().as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });
            match result {
                Ok(res) => return res,
                Err(_would_block) => continue,
            }
        }
    }

    async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.inner.writable().await?;
            let result = guard.try_io(|inner| {
                let n = unsafe { libc::write(inner.get_ref().as_raw_fd(), buf.as_ptr().cast(), buf.len()) };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });
            match result {
                Ok(res) => return res,
                Err(_would_block) => continue,
            }
        }
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let ret = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
