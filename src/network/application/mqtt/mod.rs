//! MQTT 3.1.1 client engine for embedded systems.
//!
//! A synchronous, allocation-free MQTT client written against the
//! [`Transport`](crate::network::Transport), [`Clock`](crate::system::timer::Clock)
//! and [`Lock`](crate::system::lock::Lock) abstractions. All buffers and tables
//! are fixed size and owned by the [`Client`].
//!
//! # Protocol Overview
//!
//! - **Connect** sends CONNECT and blocks for CONNACK
//! - **Publish** at QoS 0 returns once the packet is written; QoS 1 blocks for
//!   the next PUBACK
//! - **Subscribe**/**Unsubscribe** block for SUBACK/UNSUBACK and maintain a
//!   bounded table of topic filters and handlers
//! - **Yield** is the only place inbound publishes are read, keep-alive pings
//!   are sent and lost connections are re-established
//!
//! QoS 2 is not supported. PUBREC and PUBCOMP are read and ignored.
//!
//! # State machine
//!
//! Every command moves the client from [`ClientState::ConnectedIdle`] into an
//! in-progress state and back again when it returns, whether it succeeds or
//! fails. A command issued while another is in progress fails with
//! [`Error::ClientNotIdle`] and has no side effects.
//!
//! # Usage
//!
//! ```rust,no_run
//! use libshadow::network::application::mqtt::{Client, InitParams, Message, Options, QoS};
//! # use libshadow::network::{Transport, TransportError};
//! # use libshadow::system::timer::Clock;
//! # struct MockTransport;
//! # impl Transport for MockTransport {
//! #     fn connect(&mut self) -> Result<(), TransportError> { Ok(()) }
//! #     fn read(&mut self, _buf: &mut [u8], _timeout_ms: u32) -> Result<usize, TransportError> { Ok(0) }
//! #     fn write(&mut self, buf: &[u8], _timeout_ms: u32) -> Result<usize, TransportError> { Ok(buf.len()) }
//! #     fn disconnect(&mut self) -> Result<(), TransportError> { Ok(()) }
//! #     fn is_connected(&mut self) -> bool { true }
//! #     fn destroy(&mut self) -> Result<(), TransportError> { Ok(()) }
//! # }
//! # struct MockClock;
//! # impl Clock for MockClock { fn now_ms(&self) -> u64 { 0 } }
//! # fn main() -> Result<(), libshadow::network::application::mqtt::Error> {
//! let on_command = |topic: &str, message: &Message<'_>| {
//!     let _ = (topic, message.payload);
//! };
//!
//! let mut client: Client<'_, _, _> = Client::new(MockTransport, MockClock, InitParams::default())?;
//! client.connect(Some(Options::new("sensor_node_1")))?;
//! client.subscribe("devices/node1/commands/+", QoS::AtLeastOnce, &on_command)?;
//! client.publish("devices/node1/status", b"online", QoS::AtMostOnce, false)?;
//!
//! loop {
//!     client.yield_for(100)?;
//! }
//! # }
//! ```

use core::fmt;

pub mod client;
pub mod config;
mod connect;
pub mod error;
mod keepalive;
pub mod packet;
mod publish;
pub mod state;
mod subscribe;
pub mod topic;

pub use client::Client;
pub use config::{InitParams, Options, Will};
pub use error::{ConnackCode, Error};
pub use keepalive::YieldStatus;
pub use state::ClientState;

/// Quality of Service levels supported by this client.
///
/// ```rust
/// use libshadow::network::application::mqtt::QoS;
///
/// assert_eq!(QoS::AtLeastOnce as u8, 1);
/// assert_eq!(QoS::from_u8(2), None);
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QoS {
    /// **QoS 0**: fire and forget.
    #[default]
    AtMostOnce = 0,
    /// **QoS 1**: acknowledged with PUBACK, duplicates possible.
    AtLeastOnce = 1,
}

impl QoS {
    /// Map the two QoS bits of a header; QoS 2 and the reserved value yield `None`.
    pub fn from_u8(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            _ => None,
        }
    }
}

/// An application message, inbound or outbound.
///
/// The payload borrows the client's RX buffer when delivered to a handler, so
/// handlers must copy out anything they want to keep.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Message<'m> {
    /// Delivery QoS.
    pub qos: QoS,
    /// Retain flag.
    pub retain: bool,
    /// Duplicate delivery flag.
    pub dup: bool,
    /// Packet identifier; `0` for QoS 0.
    pub id: u16,
    /// Raw payload.
    pub payload: &'m [u8],
}

/// Receives publishes that match a subscription.
///
/// Implemented for every `Fn(&str, &Message)` closure.
pub trait MessageHandler {
    /// Called from inside `yield_for` (or a blocking command) for each matching
    /// publish.
    fn on_message(&self, topic: &str, message: &Message<'_>);
}

impl<F> MessageHandler for F
where
    F: Fn(&str, &Message<'_>),
{
    fn on_message(&self, topic: &str, message: &Message<'_>) {
        self(topic, message)
    }
}

/// Notified when the engine tears the connection down on error.
pub trait DisconnectHandler {
    /// The connection was lost.
    fn on_disconnect(&self);
}

impl<F> DisconnectHandler for F
where
    F: Fn(),
{
    fn on_disconnect(&self) {
        self()
    }
}

/// Internal routing key for subscriptions owned by a layer built on the client.
pub(crate) type RouteId = u8;

/// Where a matching publish is delivered.
#[derive(Clone, Copy)]
pub(crate) enum Dispatch<'a> {
    /// An application handler.
    Handler(&'a dyn MessageHandler),
    /// A route served by the caller's [`Router`].
    Route(RouteId),
}

impl fmt::Debug for Dispatch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatch::Handler(_) => f.write_str("Handler"),
            Dispatch::Route(id) => write!(f, "Route({})", id),
        }
    }
}

/// Serves [`Dispatch::Route`] subscriptions during a read cycle.
pub(crate) trait Router {
    fn route(&mut self, route: RouteId, topic: &str, message: &Message<'_>);
}

/// Router for the public API, which never registers routes.
pub(crate) struct NoRoute;

impl Router for NoRoute {
    fn route(&mut self, _route: RouteId, _topic: &str, _message: &Message<'_>) {}
}
