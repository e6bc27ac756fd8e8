//! Blocking socket wrappers used by the client transports (spec.md §4.8).
//!
//! Grounded on `examples/original_source/src/socket.cpp`'s `Socket` /
//! `TcpSocket` / `UdpSocket`, with one deliberate split: the server side
//! needs to watch many sockets at once and does that with `mio`'s
//! non-blocking `Poll` directly on `mio::net::TcpStream` (see
//! `connection.rs`), the way `examples/SleepingPills-bushhammer`'s own
//! `Endpoint` holds its listener. The client only ever has one connection
//! in flight at a time, so it is simpler and just as faithful to the
//! original's per-call timeout budget to use a single blocking stream with
//! `set_read_timeout`/`set_write_timeout`, rather than hand-rolling a
//! wait-readable/wait-writable loop around a non-blocking socket.

use anyrpc::error::{AnyRpcError, ErrorKind, Result};
use socket2::{SockRef, TcpKeepalive};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

fn io_err(e: std::io::Error) -> AnyRpcError {
    AnyRpcError::new(ErrorKind::TransportError, e.to_string())
}

/// A connected TCP socket with the timeout/keepalive/nodelay knobs every
/// transport needs, matching `TcpSocket`.
pub struct TcpSocket {
    stream: TcpStream,
    timeout: Duration,
}

impl TcpSocket {
    /// Connects to `host:port`, applying `timeout` to the connect attempt
    /// itself as well as every subsequent send/receive.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(io_err)?
            .next()
            .ok_or_else(|| AnyRpcError::new(ErrorKind::TransportError, "could not resolve host"))?;
        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(io_err)?;
        let socket = TcpSocket { stream, timeout };
        socket.set_tcp_nodelay(true)?;
        Ok(socket)
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
        let _ = self.stream.set_read_timeout(Some(timeout));
        let _ = self.stream.set_write_timeout(Some(timeout));
    }

    pub fn set_tcp_nodelay(&self, enabled: bool) -> Result<()> {
        self.stream.set_nodelay(enabled).map_err(io_err)
    }

    pub fn set_keepalive(&self, interval: Duration) -> Result<()> {
        let sock = SockRef::from(&self.stream);
        let keepalive = TcpKeepalive::new().with_time(interval).with_interval(interval);
        sock.set_tcp_keepalive(&keepalive).map_err(io_err)
    }

    /// Sends the whole buffer, applying the remaining call budget as the
    /// write timeout. Returns `true` if a timeout was hit before the full
    /// buffer was written.
    pub fn send(&mut self, buf: &[u8], remaining: Duration) -> Result<bool> {
        let _ = self.stream.set_write_timeout(Some(remaining.max(Duration::from_millis(1))));
        match self.stream.write_all(buf) {
            Ok(()) => Ok(false),
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => Ok(true),
            Err(e) => Err(io_err(e)),
        }
    }

    /// Reads up to `buf.len()` bytes. Returns `(bytes_read, timed_out,
    /// eof)`; `eof` is set on a zero-length read, matching `Receive`'s
    /// close detection.
    pub fn receive(&mut self, buf: &mut [u8], remaining: Duration) -> Result<(usize, bool, bool)> {
        let _ = self.stream.set_read_timeout(Some(remaining.max(Duration::from_millis(1))));
        match self.stream.read(buf) {
            Ok(0) => Ok((0, false, true)),
            Ok(n) => Ok((n, false, false)),
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
                Ok((0, true, false))
            }
            Err(e) => Err(io_err(e)),
        }
    }

    pub fn peer_info(&self) -> Result<(String, u16)> {
        let addr = self.stream.peer_addr().map_err(io_err)?;
        Ok((addr.ip().to_string(), addr.port()))
    }

    pub fn sock_info(&self) -> Result<(String, u16)> {
        let addr = self.stream.local_addr().map_err(io_err)?;
        Ok((addr.ip().to_string(), addr.port()))
    }

    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

/// Loopback wake signal used by [`crate::server::ServerTp`]: a worker
/// thread sends a one-byte datagram to this socket when it finishes a
/// connection, which causes the main thread's `mio` select to return
/// immediately even though the work happened on another thread (spec.md
/// §4.10).
pub struct UdpSocket {
    inner: std::net::UdpSocket,
}

impl UdpSocket {
    pub fn bind_loopback(port: u16) -> Result<Self> {
        let inner = std::net::UdpSocket::bind(("127.0.0.1", port)).map_err(io_err)?;
        inner.set_nonblocking(true).map_err(io_err)?;
        Ok(UdpSocket { inner })
    }

    pub fn wake(&self, port: u16) -> Result<()> {
        self.inner.send_to(&[0u8], ("127.0.0.1", port)).map_err(io_err)?;
        Ok(())
    }

    /// Drains any pending wake datagrams so the next `mio` readiness event
    /// doesn't immediately refire on stale data.
    pub fn drain(&self) {
        let mut scratch = [0u8; 64];
        loop {
            match self.inner.recv_from(&mut scratch) {
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    }

    pub fn local_port(&self) -> Result<u16> {
        self.inner.local_addr().map_err(io_err).map(|a| a.port())
    }

    pub fn try_clone(&self) -> Result<Self> {
        Ok(UdpSocket {
            inner: self.inner.try_clone().map_err(io_err)?,
        })
    }
}
