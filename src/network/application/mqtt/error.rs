//! Error types for the MQTT engine

use crate::network::error::Error as TransportError;

/// Outcome carried by a CONNACK that did not accept the connection.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConnackCode {
    /// The broker does not support protocol level 4.
    UnacceptableProtocolVersion,
    /// The client identifier is not allowed.
    IdentifierRejected,
    /// The MQTT service is unavailable.
    ServerUnavailable,
    /// Malformed username or password.
    BadCredentials,
    /// The client is not authorized to connect.
    NotAuthorized,
    /// Any return code outside the MQTT 3.1.1 table.
    Unknown(u8),
}

impl ConnackCode {
    /// Map a CONNACK return code byte; `0` (accepted) yields `None`.
    pub fn from_return_code(code: u8) -> Option<Self> {
        match code {
            0 => None,
            1 => Some(ConnackCode::UnacceptableProtocolVersion),
            2 => Some(ConnackCode::IdentifierRejected),
            3 => Some(ConnackCode::ServerUnavailable),
            4 => Some(ConnackCode::BadCredentials),
            5 => Some(ConnackCode::NotAuthorized),
            other => Some(ConnackCode::Unknown(other)),
        }
    }
}

/// Errors returned by [`Client`](super::Client) operations.
///
/// The variants split into three groups so callers can decide whether a retry
/// is safe: the request was never sent (`InvalidArgument`, `ClientNotIdle`,
/// `NetworkDisconnected`, ...), it was sent but no valid answer arrived
/// (`RequestTimeout`, decode errors), or the broker refused it
/// (`ConnectionRefused`, `SubscriptionRefused`).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// A required argument was empty or out of range. No I/O was attempted.
    InvalidArgument,
    /// The transport failed; the inner value names the failure point.
    Network(TransportError),
    /// The client is not connected, or the connection was just lost.
    NetworkDisconnected,
    /// The application disconnected the client.
    NetworkManuallyDisconnected,
    /// `connect` was called on a client that is already connected.
    NetworkAlreadyConnected,
    /// Auto-reconnect gave up after the backoff ceiling was exceeded.
    ReconnectTimedOut,
    /// The expected response did not arrive before the command timeout.
    RequestTimeout,
    /// A state transition found the client in an unexpected state.
    UnexpectedClientState,
    /// Another operation is in progress.
    ClientNotIdle,
    /// An inbound packet had a type the client does not accept.
    InvalidPacketType,
    /// An inbound packet did not fit the RX buffer and was drained and dropped.
    MessageTooLarge,
    /// The outbound packet does not fit the TX buffer.
    TxBufferTooShort,
    /// Every subscription slot is in use.
    MaxSubscriptionsReached,
    /// The remaining-length field needed more than four bytes.
    DecodeRemainingLength,
    /// An inbound packet was truncated or structurally invalid.
    MalformedPacket,
    /// The broker refused the connection.
    ConnectionRefused(ConnackCode),
    /// The broker answered a SUBSCRIBE with the failure return code.
    SubscriptionRefused,
    /// `unsubscribe` named a topic filter that is not subscribed.
    NoSuchSubscription,
    /// A guarded resource is held elsewhere and the lock policy is try-once.
    LockBusy,
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Network(e)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::InvalidArgument => f.write_str("invalid argument"),
            Error::Network(e) => write!(f, "network error: {}", e),
            Error::NetworkDisconnected => f.write_str("network disconnected"),
            Error::NetworkManuallyDisconnected => f.write_str("network manually disconnected"),
            Error::NetworkAlreadyConnected => f.write_str("network already connected"),
            Error::ReconnectTimedOut => f.write_str("reconnect timed out"),
            Error::RequestTimeout => f.write_str("request timed out"),
            Error::UnexpectedClientState => f.write_str("unexpected client state"),
            Error::ClientNotIdle => f.write_str("client not idle"),
            Error::InvalidPacketType => f.write_str("invalid packet type"),
            Error::MessageTooLarge => f.write_str("message too large, dropped"),
            Error::TxBufferTooShort => f.write_str("tx buffer too short"),
            Error::MaxSubscriptionsReached => f.write_str("max subscriptions reached"),
            Error::DecodeRemainingLength => f.write_str("bad remaining length"),
            Error::MalformedPacket => f.write_str("malformed packet"),
            Error::ConnectionRefused(code) => write!(f, "connection refused: {:?}", code),
            Error::SubscriptionRefused => f.write_str("subscription refused"),
            Error::NoSuchSubscription => f.write_str("no such subscription"),
            Error::LockBusy => f.write_str("lock busy"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConnackCode {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ConnackCode::UnacceptableProtocolVersion => {
                defmt::write!(f, "UnacceptableProtocolVersion")
            }
            ConnackCode::IdentifierRejected => defmt::write!(f, "IdentifierRejected"),
            ConnackCode::ServerUnavailable => defmt::write!(f, "ServerUnavailable"),
            ConnackCode::BadCredentials => defmt::write!(f, "BadCredentials"),
            ConnackCode::NotAuthorized => defmt::write!(f, "NotAuthorized"),
            ConnackCode::Unknown(code) => defmt::write!(f, "Unknown({=u8})", code),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::InvalidArgument => defmt::write!(f, "InvalidArgument"),
            Error::Network(e) => defmt::write!(f, "Network({})", e),
            Error::NetworkDisconnected => defmt::write!(f, "NetworkDisconnected"),
            Error::NetworkManuallyDisconnected => defmt::write!(f, "NetworkManuallyDisconnected"),
            Error::NetworkAlreadyConnected => defmt::write!(f, "NetworkAlreadyConnected"),
            Error::ReconnectTimedOut => defmt::write!(f, "ReconnectTimedOut"),
            Error::RequestTimeout => defmt::write!(f, "RequestTimeout"),
            Error::UnexpectedClientState => defmt::write!(f, "UnexpectedClientState"),
            Error::ClientNotIdle => defmt::write!(f, "ClientNotIdle"),
            Error::InvalidPacketType => defmt::write!(f, "InvalidPacketType"),
            Error::MessageTooLarge => defmt::write!(f, "MessageTooLarge"),
            Error::TxBufferTooShort => defmt::write!(f, "TxBufferTooShort"),
            Error::MaxSubscriptionsReached => defmt::write!(f, "MaxSubscriptionsReached"),
            Error::DecodeRemainingLength => defmt::write!(f, "DecodeRemainingLength"),
            Error::MalformedPacket => defmt::write!(f, "MalformedPacket"),
            Error::ConnectionRefused(code) => defmt::write!(f, "ConnectionRefused({})", code),
            Error::SubscriptionRefused => defmt::write!(f, "SubscriptionRefused"),
            Error::NoSuchSubscription => defmt::write!(f, "NoSuchSubscription"),
            Error::LockBusy => defmt::write!(f, "LockBusy"),
        }
    }
}
