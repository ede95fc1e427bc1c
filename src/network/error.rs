//! Transport error kinds

/// Errors reported by a [`Transport`](super::Transport) implementation.
///
/// Each variant names the point in the transport lifecycle that failed so the
/// MQTT engine can surface a distinct code per failure point. It is designed
/// to be small and `Copy` for `no_std` targets.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// An operation was attempted on a transport that is not open.
    NotOpen,
    /// Establishing the underlying socket failed.
    ConnectFailed,
    /// The security handshake (TLS or similar) failed.
    HandshakeFailed,
    /// The remote end refused the connection.
    ConnectionRefused,
    /// An error occurred during a write operation.
    WriteError,
    /// An error occurred during a read operation.
    ReadError,
    /// The operation did not finish before its deadline.
    Timeout,
    /// The remote end closed the connection.
    ConnectionClosed,
    /// The configured remote address could not be used.
    InvalidAddress,
    /// Releasing transport resources failed.
    DestroyFailed,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            Error::NotOpen => "transport not open",
            Error::ConnectFailed => "transport connect failed",
            Error::HandshakeFailed => "transport handshake failed",
            Error::ConnectionRefused => "connection refused",
            Error::WriteError => "transport write failed",
            Error::ReadError => "transport read failed",
            Error::Timeout => "transport timed out",
            Error::ConnectionClosed => "connection closed by peer",
            Error::InvalidAddress => "invalid remote address",
            Error::DestroyFailed => "transport teardown failed",
        };
        f.write_str(text)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::NotOpen => defmt::write!(f, "NotOpen"),
            Error::ConnectFailed => defmt::write!(f, "ConnectFailed"),
            Error::HandshakeFailed => defmt::write!(f, "HandshakeFailed"),
            Error::ConnectionRefused => defmt::write!(f, "ConnectionRefused"),
            Error::WriteError => defmt::write!(f, "WriteError"),
            Error::ReadError => defmt::write!(f, "ReadError"),
            Error::Timeout => defmt::write!(f, "Timeout"),
            Error::ConnectionClosed => defmt::write!(f, "ConnectionClosed"),
            Error::InvalidAddress => defmt::write!(f, "InvalidAddress"),
            Error::DestroyFailed => defmt::write!(f, "DestroyFailed"),
        }
    }
}
