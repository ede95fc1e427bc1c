//! Plain TCP transport for hosted targets.
//!
//! Useful for talking to a local broker during development and in the
//! live-broker integration test. It performs no TLS.

use super::Transport;
use super::error::Error;
use std::io::{ErrorKind, Read as StdRead, Write as StdWrite};
use std::net::TcpStream;
use std::string::String;
use std::time::Duration;

/// A [`Transport`] over a blocking [`TcpStream`].
#[derive(Debug)]
pub struct TcpTransport {
    address: String,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Create a transport that connects to `address` (`host:port`).
    pub fn new(address: &str) -> Self {
        Self {
            address: String::from(address),
            stream: None,
        }
    }

    fn stream(&mut self) -> Result<&mut TcpStream, Error> {
        self.stream.as_mut().ok_or(Error::NotOpen)
    }
}

fn deadline(timeout_ms: u32) -> Option<Duration> {
    // A zero duration means "block forever" to std, so clamp to 1 ms.
    Some(Duration::from_millis(u64::from(timeout_ms.max(1))))
}

impl Transport for TcpTransport {
    fn connect(&mut self) -> Result<(), Error> {
        let stream = TcpStream::connect(self.address.as_str()).map_err(|e| match e.kind() {
            ErrorKind::ConnectionRefused => Error::ConnectionRefused,
            ErrorKind::InvalidInput => Error::InvalidAddress,
            _ => Error::ConnectFailed,
        })?;
        stream.set_nodelay(true).map_err(|_| Error::ConnectFailed)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Error> {
        let stream = self.stream()?;
        stream
            .set_read_timeout(deadline(timeout_ms))
            .map_err(|_| Error::ReadError)?;
        match stream.read(buf) {
            Ok(0) if !buf.is_empty() => Err(Error::ConnectionClosed),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(0),
            Err(_) => Err(Error::ReadError),
        }
    }

    fn write(&mut self, buf: &[u8], timeout_ms: u32) -> Result<usize, Error> {
        let stream = self.stream()?;
        stream
            .set_write_timeout(deadline(timeout_ms))
            .map_err(|_| Error::WriteError)?;
        match stream.write(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Err(Error::Timeout)
            }
            Err(_) => Err(Error::WriteError),
        }
    }

    fn disconnect(&mut self) -> Result<(), Error> {
        match self.stream.take() {
            Some(stream) => stream
                .shutdown(std::net::Shutdown::Both)
                .map_err(|_| Error::ConnectionClosed),
            None => Ok(()),
        }
    }

    fn is_connected(&mut self) -> bool {
        // No physical-layer probe exists for plain TCP.
        true
    }

    fn destroy(&mut self) -> Result<(), Error> {
        self.stream = None;
        Ok(())
    }
}
