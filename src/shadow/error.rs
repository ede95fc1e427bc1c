//! Error types for the shadow layer

use crate::network::application::mqtt::Error as MqttError;

/// Errors returned by [`Shadow`](super::Shadow) operations and the document
/// builder.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// The underlying MQTT operation failed.
    Mqtt(MqttError),
    /// Every acknowledgement slot is taken; nothing was published.
    AckPoolFull,
    /// The document or token did not fit its buffer.
    BufferTruncated,
    /// The document buffer has no room left to start a new section.
    DocumentError,
    /// Every delta field slot is taken.
    DeltaTableFull,
    /// The MQTT client is not connected.
    NotConnected,
    /// A name or argument was empty or too long.
    InvalidArgument,
}

impl From<MqttError> for Error {
    fn from(e: MqttError) -> Self {
        Error::Mqtt(e)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Mqtt(e) => write!(f, "mqtt: {}", e),
            Error::AckPoolFull => f.write_str("no free acknowledgement slot"),
            Error::BufferTruncated => f.write_str("buffer truncated"),
            Error::DocumentError => f.write_str("json document error"),
            Error::DeltaTableFull => f.write_str("delta table full"),
            Error::NotConnected => f.write_str("not connected"),
            Error::InvalidArgument => f.write_str("invalid argument"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Mqtt(e) => defmt::write!(f, "Mqtt({})", e),
            Error::AckPoolFull => defmt::write!(f, "AckPoolFull"),
            Error::BufferTruncated => defmt::write!(f, "BufferTruncated"),
            Error::DocumentError => defmt::write!(f, "DocumentError"),
            Error::DeltaTableFull => defmt::write!(f, "DeltaTableFull"),
            Error::NotConnected => defmt::write!(f, "NotConnected"),
            Error::InvalidArgument => defmt::write!(f, "InvalidArgument"),
        }
    }
}
