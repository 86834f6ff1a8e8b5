//! TCP link to the printer.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::error::LinkError;
use super::protocol::{MAX_RESPONSE, decode_response};

/// Blocking TCP connection to a Finder printer.
///
/// Knows nothing about the upload protocol: it sends bytes and reads one
/// bounded response. The socket is closed when the link is dropped.
pub struct DeviceLink {
    stream: TcpStream,
    peer: SocketAddr,
}

impl DeviceLink {
    /// Connect to `host:port`.
    ///
    /// `timeout` bounds the connect and is also used as read/write timeout.
    ///
    /// # Errors
    /// `HostUnresolvable` when the name does not resolve, `Timeout` when no
    /// address answers in time, `Other` for anything else.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, LinkError> {
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|e| LinkError::HostUnresolvable(format!("{host}: {e}")))?
            .collect();

        if addrs.is_empty() {
            return Err(LinkError::HostUnresolvable(format!("{host}: no addresses")));
        }

        let mut last_err = None;
        for addr in addrs {
            info!("Connecting to printer at {addr} (timeout={timeout:?})");
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(timeout))
                        .and_then(|()| stream.set_write_timeout(Some(timeout)))
                        .map_err(|e| LinkError::Other(format!("{addr}: {e}")))?;
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("Could not set TCP_NODELAY: {e}");
                    }
                    info!("Connected to {addr}");
                    return Ok(Self { stream, peer: addr });
                }
                Err(e) => {
                    warn!("Connect to {addr} failed: {e}");
                    last_err = Some(map_connect_error(addr, e));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| LinkError::Other(format!("{host}: no addresses"))))
    }

    /// Send `request` and read a single response of up to 128 bytes.
    ///
    /// An empty string means the device closed the connection without
    /// answering. There is no retry.
    pub fn exchange(&mut self, request: &[u8]) -> Result<String, LinkError> {
        self.stream
            .write_all(request)
            .map_err(|e| LinkError::Other(format!("Write failed: {e}")))?;

        let mut buf = [0u8; MAX_RESPONSE];
        let n = self
            .stream
            .read(&mut buf)
            .map_err(|e| LinkError::Other(format!("Read failed: {e}")))?;

        let response = decode_response(&buf[..n]);
        debug!("TX {} bytes, RX {n} bytes: {response:?}", request.len());
        Ok(response)
    }

    /// Address of the connected printer.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        debug!("Closing link to {}", self.peer);
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

fn map_connect_error(addr: SocketAddr, e: io::Error) -> LinkError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => LinkError::Timeout(format!("{addr}: {e}")),
        _ => LinkError::Other(format!("{addr}: {e}")),
    }
}
