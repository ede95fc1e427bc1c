//! Network abstraction layer for embedded systems
//!
//! The MQTT engine never touches sockets or TLS directly. Everything it needs
//! from the link is expressed by the [`Transport`] trait below, which a board
//! support crate implements on top of its TCP/TLS stack.
//!

#![deny(unsafe_code)]

/// Transport error kinds
pub mod error;

/// Application protocols layered on a [`Transport`]
pub mod application;

/// Blocking TCP transport for hosted targets
#[cfg(feature = "std")]
pub mod tcp;

/// Re-exports of common traits
pub mod prelude {
    pub use super::Transport;
    pub use super::error::Error as TransportError;
}

use error::Error;

pub use error::Error as TransportError;

/// A reconnectable byte-stream transport.
///
/// The transport owns its own remote address and credentials; `connect` may be
/// called again after `disconnect` to re-establish the same link. All timeouts
/// are in milliseconds and express the time left on the caller's deadline.
pub trait Transport {
    /// Open the link (socket connect plus any security handshake).
    fn connect(&mut self) -> Result<(), Error>;

    /// Read up to `buf.len()` bytes.
    ///
    /// Returns `Ok(0)` when nothing is available before `timeout_ms` elapses;
    /// that is not an error.
    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Error>;

    /// Write up to `buf.len()` bytes, returning how many were accepted.
    fn write(&mut self, buf: &[u8], timeout_ms: u32) -> Result<usize, Error>;

    /// Close the link.
    fn disconnect(&mut self) -> Result<(), Error>;

    /// Whether the physical layer is currently up.
    ///
    /// Used by the reconnect logic to decide whether a reconnect attempt is
    /// worth making at all.
    fn is_connected(&mut self) -> bool;

    /// Release every resource held for the link.
    fn destroy(&mut self) -> Result<(), Error>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn connect(&mut self) -> Result<(), Error> {
        (**self).connect()
    }

    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Error> {
        (**self).read(buf, timeout_ms)
    }

    fn write(&mut self, buf: &[u8], timeout_ms: u32) -> Result<usize, Error> {
        (**self).write(buf, timeout_ms)
    }

    fn disconnect(&mut self) -> Result<(), Error> {
        (**self).disconnect()
    }

    fn is_connected(&mut self) -> bool {
        (**self).is_connected()
    }

    fn destroy(&mut self) -> Result<(), Error> {
        (**self).destroy()
    }
}
