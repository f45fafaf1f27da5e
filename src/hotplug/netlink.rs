//! Kernel uevent listener over a netlink socket.

use super::{parse_uevent, HotplugError, HotplugEvent, HotplugSource};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;

/// Multicast group carrying events straight from the kernel.
const KERNEL_GROUP: u32 = 1;
/// Large enough for any uevent the kernel emits.
const RECV_BUFFER: usize = 8192;

/// Receives device events from `NETLINK_KOBJECT_UEVENT`.
#[derive(Debug)]
pub struct NetlinkHotplugSource {
    fd: OwnedFd,
    buf: Vec<u8>,
}

impl NetlinkHotplugSource {
    /// Opens and binds the uevent socket.
    pub fn open() -> Result<Self, HotplugError> {
        // SAFETY: plain socket(2) call, the result is checked below.
        let raw = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_DGRAM | libc::SOCK_CLOEXEC,
                libc::NETLINK_KOBJECT_UEVENT,
            )
        };
        if raw < 0 {
            return Err(io::Error::last_os_error().into());
        }
        // SAFETY: `raw` is a freshly created descriptor nobody else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // SAFETY: sockaddr_nl is plain old data; all-zero is a valid value.
        let mut addr: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        addr.nl_pid = 0;
        addr.nl_groups = KERNEL_GROUP;

        // SAFETY: addr outlives the call and the length matches its type.
        let rc = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error().into());
        }

        tracing::info!("Listening for kernel uevents");
        Ok(Self {
            fd,
            buf: vec![0; RECV_BUFFER],
        })
    }
}

impl HotplugSource for NetlinkHotplugSource {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<HotplugEvent>, HotplugError> {
        let mut pfd = libc::pollfd {
            fd: self.fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        // SAFETY: one valid pollfd, count matches.
        let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(None);
            }
            return Err(err.into());
        }
        if ready == 0 {
            return Ok(None);
        }

        // SAFETY: buf is valid for writes of buf.len() bytes.
        let received = unsafe {
            libc::recv(
                self.fd.as_raw_fd(),
                self.buf.as_mut_ptr() as *mut libc::c_void,
                self.buf.len(),
                libc::MSG_DONTWAIT,
            )
        };
        if received < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ENOBUFS) {
                // Socket buffer overran during an event burst. The socket
                // stays usable; only the overflowed events are gone.
                tracing::warn!("Kernel uevent buffer overflowed, some hot-plug events were lost");
                return Ok(None);
            }
            return match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(None),
                _ => Err(err.into()),
            };
        }

        Ok(parse_uevent(&self.buf[..received as usize]))
    }
}
