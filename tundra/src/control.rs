//! Control channel to the parent process (spec §4.9, §6): a client
//! relays overlay config changes over a Unix datagram socket; a server
//! never produces one, so it gets a no-op sink.

use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::Path;

use tundra_core::engine::ControlPort;

pub enum ControlChannel {
    Sink(std::io::Sink),
    Unix(UnixControl),
}

impl ControlPort for ControlChannel {
    fn send(&mut self, msg: &[u8]) -> io::Result<()> {
        match self {
            ControlChannel::Sink(sink) => ControlPort::send(sink, msg),
            ControlChannel::Unix(unix) => unix.send(msg),
        }
    }
}

pub struct UnixControl {
    socket: UnixDatagram,
}

impl UnixControl {
    pub fn connect(path: &Path) -> io::Result<Self> {
        let socket = UnixDatagram::unbound()?;
        socket.set_nonblocking(true)?;
        socket.connect(path)?;
        Ok(Self { socket })
    }
}

impl ControlPort for UnixControl {
    fn send(&mut self, msg: &[u8]) -> io::Result<()> {
        self.socket.send(msg).map(|_| ())
    }
}
