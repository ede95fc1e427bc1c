//! Compile-time capacities and runtime configuration for the MQTT client.

use super::{DisconnectHandler, QoS};
use crate::system::lock::LockPolicy;

/// Size of the outbound packet buffer.
pub const TX_BUF_LEN: usize = 512;
/// Size of the inbound packet buffer. Packets whose remaining length reaches
/// this value are drained and dropped.
pub const RX_BUF_LEN: usize = 512;
/// Number of subscription slots.
pub const NUM_SUBSCRIBE_HANDLERS: usize = 5;
/// Longest topic filter a subscription slot can hold.
pub const MAX_TOPIC_LEN: usize = 128;
/// Initial auto-reconnect back-off.
pub const MIN_RECONNECT_WAIT_INTERVAL_MS: u32 = 1_000;
/// Back-off ceiling. Auto-reconnect gives up once the doubled interval exceeds it.
pub const MAX_RECONNECT_WAIT_INTERVAL_MS: u32 = 128_000;

/// Client initialization parameters.
///
/// ```rust
/// use libshadow::network::application::mqtt::InitParams;
///
/// let params = InitParams {
///     auto_reconnect: true,
///     ..InitParams::default()
/// };
/// assert_eq!(params.command_timeout_ms, 20_000);
/// ```
#[derive(Clone, Copy)]
pub struct InitParams<'a> {
    /// Reconnect with back-off from inside `yield_for` after a network loss.
    pub auto_reconnect: bool,
    /// Budget for reading the rest of a packet once its first byte arrived.
    pub packet_timeout_ms: u32,
    /// Budget for a command's request/response exchange.
    pub command_timeout_ms: u32,
    /// How the state, TX and RX locks are acquired.
    pub lock_policy: LockPolicy,
    /// Called whenever the engine tears the connection down on error.
    pub disconnect_handler: Option<&'a dyn DisconnectHandler>,
}

impl Default for InitParams<'_> {
    fn default() -> Self {
        Self {
            auto_reconnect: false,
            packet_timeout_ms: 5_000,
            command_timeout_ms: 20_000,
            lock_policy: LockPolicy::TryOnce,
            disconnect_handler: None,
        }
    }
}

impl core::fmt::Debug for InitParams<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InitParams")
            .field("auto_reconnect", &self.auto_reconnect)
            .field("packet_timeout_ms", &self.packet_timeout_ms)
            .field("command_timeout_ms", &self.command_timeout_ms)
            .field("lock_policy", &self.lock_policy)
            .field("disconnect_handler", &self.disconnect_handler.is_some())
            .finish()
    }
}

/// Last-will message published by the broker if the client vanishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Will<'a> {
    /// Topic the will is published to.
    pub topic: &'a str,
    /// Will payload.
    pub message: &'a [u8],
    /// Delivery QoS of the will.
    pub qos: QoS,
    /// Whether the broker retains the will.
    pub retain: bool,
}

/// Connection options sent in CONNECT.
///
/// The client keeps a copy and reuses it for every reconnect.
///
/// ```rust
/// use libshadow::network::application::mqtt::Options;
///
/// let options = Options {
///     keep_alive_seconds: 120,
///     username: Some("device"),
///     ..Options::new("sensor_node_1")
/// };
/// assert!(options.clean_session);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options<'a> {
    /// Client identifier, unique per broker.
    pub client_id: &'a str,
    /// Keep-alive interval in seconds; `0` disables pings.
    pub keep_alive_seconds: u16,
    /// Discard any previous session state on the broker.
    pub clean_session: bool,
    /// Optional last-will message.
    pub will: Option<Will<'a>>,
    /// Optional user name.
    pub username: Option<&'a str>,
    /// Optional password.
    pub password: Option<&'a str>,
}

impl<'a> Options<'a> {
    /// Options with a 60 second keep-alive, a clean session, no will and no
    /// credentials.
    pub const fn new(client_id: &'a str) -> Self {
        Self {
            client_id,
            keep_alive_seconds: 60,
            clean_session: true,
            will: None,
            username: None,
            password: None,
        }
    }
}
