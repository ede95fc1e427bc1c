//! The MQTT client session object and its read cycle.
//!
//! [`Client`] owns the transport, the TX and RX buffers and the subscription
//! table. Commands are implemented across the sibling `connect`, `publish`,
//! `subscribe` and `keepalive` modules; this module holds the pieces they
//! share: packet I/O under the TX/RX locks, the read cycle that classifies
//! inbound packets, and delivery of publishes to subscribers.

use core::fmt;

use heapless::String;

use super::config::{InitParams, Options, MAX_TOPIC_LEN, NUM_SUBSCRIBE_HANDLERS, RX_BUF_LEN, TX_BUF_LEN};
use super::error::Error;
use super::packet::{self, FixedHeader, PacketType, MAX_REMAINING_LENGTH_BYTES};
use super::state::ClientState;
use super::{topic, DisconnectHandler, Dispatch, QoS, Router};
use crate::network::{Transport, TransportError};
use crate::system::lock::{Lock, LockPolicy, NoLock};
use crate::system::timer::{Clock, Timer};

/// One occupied slot of the subscription table.
#[derive(Debug)]
pub(super) struct Subscription<'a> {
    pub(super) filter: String<MAX_TOPIC_LEN>,
    pub(super) qos: QoS,
    pub(super) dispatch: Dispatch<'a>,
}

/// The connection state together with the lock that guards it.
#[derive(Debug)]
pub(super) struct StateSlot<L: Lock> {
    lock: L,
    state: ClientState,
}

impl<L: Lock> StateSlot<L> {
    fn get(&self) -> ClientState {
        self.state
    }

    /// Compare-and-set under the state lock.
    fn swap(&mut self, policy: LockPolicy, expected: ClientState, new: ClientState) -> Result<(), Error> {
        let _guard = self.lock.acquire(policy).map_err(|_| Error::LockBusy)?;
        if self.state != expected {
            return Err(Error::UnexpectedClientState);
        }
        log::debug!("client state {:?} -> {:?}", expected, new);
        self.state = new;
        Ok(())
    }

    /// Unconditional transition used by teardown paths.
    fn force(&mut self, new: ClientState) {
        log::debug!("client state {:?} => {:?}", self.state, new);
        self.state = new;
    }
}

/// An MQTT 3.1.1 client.
///
/// # Type Parameters
///
/// * `T` - the byte-stream [`Transport`] to the broker
/// * `C` - the millisecond [`Clock`] all timers run on
/// * `L` - the [`Lock`] guarding state, TX and RX; [`NoLock`] by default
///
/// Handlers registered with [`subscribe`](Client::subscribe) and the options
/// passed to [`connect`](Client::connect) are borrowed for `'a`.
///
/// # Examples
///
/// ```rust,no_run
/// use libshadow::network::application::mqtt::{Client, InitParams, Options};
/// use libshadow::system::lock::SpinLock;
/// # use libshadow::network::{Transport, TransportError};
/// # use libshadow::system::timer::Clock;
/// # struct MockTransport;
/// # impl Transport for MockTransport {
/// #     fn connect(&mut self) -> Result<(), TransportError> { Ok(()) }
/// #     fn read(&mut self, _buf: &mut [u8], _timeout_ms: u32) -> Result<usize, TransportError> { Ok(0) }
/// #     fn write(&mut self, buf: &[u8], _timeout_ms: u32) -> Result<usize, TransportError> { Ok(buf.len()) }
/// #     fn disconnect(&mut self) -> Result<(), TransportError> { Ok(()) }
/// #     fn is_connected(&mut self) -> bool { true }
/// #     fn destroy(&mut self) -> Result<(), TransportError> { Ok(()) }
/// # }
/// # struct MockClock;
/// # impl Clock for MockClock { fn now_ms(&self) -> u64 { 0 } }
/// # fn main() -> Result<(), libshadow::network::application::mqtt::Error> {
/// static STATE: SpinLock = SpinLock::new();
/// static TX: SpinLock = SpinLock::new();
/// static RX: SpinLock = SpinLock::new();
///
/// let mut client = Client::with_locks(MockTransport, MockClock, &STATE, &TX, &RX, InitParams::default())?;
/// client.connect(Some(Options::new("weather_station")))?;
/// # Ok(())
/// # }
/// ```
pub struct Client<'a, T: Transport, C: Clock, L: Lock = NoLock> {
    pub(super) transport: T,
    pub(super) clock: C,
    pub(super) state: StateSlot<L>,
    pub(super) tx_lock: L,
    pub(super) rx_lock: L,
    pub(super) lock_policy: LockPolicy,
    pub(super) auto_reconnect: bool,
    pub(super) ping_outstanding: bool,
    pub(super) next_packet_id: u16,
    pub(super) keep_alive_seconds: u16,
    pub(super) packet_timeout_ms: u32,
    pub(super) command_timeout_ms: u32,
    pub(super) options: Option<Options<'a>>,
    pub(super) subscriptions: [Option<Subscription<'a>>; NUM_SUBSCRIBE_HANDLERS],
    pub(super) disconnect_handler: Option<&'a dyn DisconnectHandler>,
    pub(super) disconnect_count: u32,
    pub(super) ping_timer: Timer,
    pub(super) reconnect_timer: Timer,
    pub(super) reconnect_interval_ms: u32,
    pub(super) tx_buf: [u8; TX_BUF_LEN],
    pub(super) rx_buf: [u8; RX_BUF_LEN],
}

impl<'a, T: Transport, C: Clock, L: Lock + Default> Client<'a, T, C, L> {
    /// Create a client with default-constructed locks.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if either timeout in `params` is zero.
    pub fn new(transport: T, clock: C, params: InitParams<'a>) -> Result<Self, Error> {
        Self::with_locks(transport, clock, L::default(), L::default(), L::default(), params)
    }
}

impl<'a, T: Transport, C: Clock, L: Lock> Client<'a, T, C, L> {
    /// Create a client with explicit state, TX and RX locks.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if either timeout in `params` is zero.
    pub fn with_locks(
        transport: T,
        clock: C,
        state_lock: L,
        tx_lock: L,
        rx_lock: L,
        params: InitParams<'a>,
    ) -> Result<Self, Error> {
        if params.packet_timeout_ms == 0 || params.command_timeout_ms == 0 {
            return Err(Error::InvalidArgument);
        }
        Ok(Self {
            transport,
            clock,
            state: StateSlot {
                lock: state_lock,
                state: ClientState::Initialized,
            },
            tx_lock,
            rx_lock,
            lock_policy: params.lock_policy,
            auto_reconnect: params.auto_reconnect,
            ping_outstanding: false,
            next_packet_id: 1,
            keep_alive_seconds: 0,
            packet_timeout_ms: params.packet_timeout_ms,
            command_timeout_ms: params.command_timeout_ms,
            options: None,
            subscriptions: [const { None }; NUM_SUBSCRIBE_HANDLERS],
            disconnect_handler: params.disconnect_handler,
            disconnect_count: 0,
            ping_timer: Timer::new(),
            reconnect_timer: Timer::new(),
            reconnect_interval_ms: 0,
            tx_buf: [0; TX_BUF_LEN],
            rx_buf: [0; RX_BUF_LEN],
        })
    }

    /// Current connection state.
    pub fn state(&self) -> ClientState {
        self.state.get()
    }

    /// Whether the broker session is up.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Whether `yield_for` reconnects after a network loss.
    pub fn is_auto_reconnect_enabled(&self) -> bool {
        self.auto_reconnect
    }

    /// Enable or disable auto-reconnect.
    pub fn set_auto_reconnect(&mut self, enabled: bool) {
        self.auto_reconnect = enabled;
    }

    /// Replace the disconnect handler.
    pub fn set_disconnect_handler(&mut self, handler: Option<&'a dyn DisconnectHandler>) {
        self.disconnect_handler = handler;
    }

    /// Store options for the next `connect(None)` or reconnect.
    pub fn set_connect_options(&mut self, options: Options<'a>) {
        self.options = Some(options);
    }

    /// The options the next reconnect will use.
    pub fn connect_options(&self) -> Option<&Options<'a>> {
        self.options.as_ref()
    }

    /// Number of times the connection was lost since the last reset.
    pub fn network_disconnect_count(&self) -> u32 {
        self.disconnect_count
    }

    /// Reset the network-loss counter.
    pub fn reset_network_disconnect_count(&mut self) {
        self.disconnect_count = 0;
    }

    /// Command timeout in milliseconds.
    pub fn command_timeout_ms(&self) -> u32 {
        self.command_timeout_ms
    }

    /// Number of occupied subscription slots.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.iter().flatten().count()
    }

    /// Whether `filter` occupies a subscription slot.
    pub fn is_subscribed(&self, filter: &str) -> bool {
        self.subscriptions
            .iter()
            .flatten()
            .any(|s| s.filter.as_str() == filter)
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The clock timers run on.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Tear the client down and hand back the transport.
    ///
    /// The transport's `destroy` is called; a failure is logged.
    pub fn free(mut self) -> T {
        if let Err(e) = self.transport.destroy() {
            log::error!("transport destroy failed: {:?}", e);
        }
        self.state.force(ClientState::Invalid);
        self.transport
    }

    pub(super) fn set_state(&mut self, expected: ClientState, new: ClientState) -> Result<(), Error> {
        self.state.swap(self.lock_policy, expected, new)
    }

    pub(super) fn force_state(&mut self, new: ClientState) {
        self.state.force(new);
    }

    /// Pre-incrementing packet id that wraps from 65535 back to 1.
    pub(super) fn next_packet_id(&mut self) -> u16 {
        self.next_packet_id = if self.next_packet_id == u16::MAX {
            1
        } else {
            self.next_packet_id + 1
        };
        self.next_packet_id
    }

    pub(super) fn command_timer(&self) -> Timer {
        Timer::after_ms(&self.clock, self.command_timeout_ms)
    }

    /// Write the first `len` bytes of the TX buffer before `timer` expires.
    pub(super) fn send_packet(&mut self, len: usize, timer: &Timer) -> Result<(), Error> {
        let _tx = self.tx_lock.acquire(self.lock_policy).map_err(|_| Error::LockBusy)?;
        let mut sent = 0;
        while sent < len {
            if timer.has_expired(&self.clock) {
                return Err(Error::Network(TransportError::Timeout));
            }
            sent += self
                .transport
                .write(&self.tx_buf[sent..len], timer.left_ms(&self.clock))?;
        }
        log::debug!("sent {:#04x} ({} bytes)", self.tx_buf[0], len);
        Ok(())
    }

    /// Read one whole packet into the RX buffer.
    ///
    /// Returns `Ok(None)` when no packet has started before `timer` ran out.
    /// Once the first byte has arrived, the rest of the packet is read under
    /// the packet timeout instead.
    pub(super) fn read_packet(&mut self, timer: &Timer) -> Result<Option<PacketType>, Error> {
        let _rx = self.rx_lock.acquire(self.lock_policy).map_err(|_| Error::LockBusy)?;

        if self.transport.read(&mut self.rx_buf[..1], timer.left_ms(&self.clock))? == 0 {
            return Ok(None);
        }

        let packet_timer = Timer::after_ms(&self.clock, self.packet_timeout_ms);
        let transport = &mut self.transport;
        let clock = &self.clock;
        let remaining_length = packet::decode_remaining_length_with(|| {
            let mut byte = [0u8; 1];
            read_exact(&mut *transport, clock, &mut byte, &packet_timer)?;
            Ok(byte[0])
        })?;

        let mut encoded = [0u8; MAX_REMAINING_LENGTH_BYTES];
        let len_bytes = packet::encode_remaining_length(remaining_length, &mut encoded)?;
        let header_len = 1 + len_bytes;
        if remaining_length >= RX_BUF_LEN || header_len + remaining_length > RX_BUF_LEN {
            log::warn!(
                "dropping packet {:#04x} with remaining length {}",
                self.rx_buf[0],
                remaining_length
            );
            drain(transport, clock, &mut self.rx_buf, remaining_length, &packet_timer)?;
            return Err(Error::MessageTooLarge);
        }

        self.rx_buf[1..header_len].copy_from_slice(&encoded[..len_bytes]);
        read_exact(
            transport,
            clock,
            &mut self.rx_buf[header_len..header_len + remaining_length],
            &packet_timer,
        )?;

        let header = FixedHeader::from_byte(self.rx_buf[0])?;
        log::debug!("received {:?} ({} bytes)", header.packet_type, header_len + remaining_length);
        Ok(Some(header.packet_type))
    }

    /// Read and act on at most one inbound packet.
    pub(super) fn cycle_read(&mut self, timer: &Timer, router: &mut dyn Router) -> Result<Option<PacketType>, Error> {
        let Some(packet_type) = self.read_packet(timer)? else {
            return Ok(None);
        };

        match packet_type {
            PacketType::Connack | PacketType::Puback | PacketType::Suback | PacketType::Unsuback => {}
            PacketType::Publish => self.handle_publish(router)?,
            PacketType::Pubrec | PacketType::Pubcomp => {}
            PacketType::Pingresp => {
                self.ping_outstanding = false;
                self.ping_timer
                    .countdown_sec(&self.clock, u32::from(self.keep_alive_seconds));
            }
            other => {
                log::warn!("unexpected packet {:?}", other);
                return Err(Error::InvalidPacketType);
            }
        }
        Ok(Some(packet_type))
    }

    /// Run read cycles until a packet of type `expected` arrives.
    ///
    /// Errors other than a lost connection do not end the wait; only the
    /// timer does.
    pub(super) fn wait_for_read(
        &mut self,
        expected: PacketType,
        timer: &Timer,
        router: &mut dyn Router,
    ) -> Result<(), Error> {
        loop {
            if timer.has_expired(&self.clock) {
                return Err(Error::RequestTimeout);
            }
            match self.cycle_read(timer, router) {
                Ok(Some(packet_type)) if packet_type == expected => return Ok(()),
                Err(e @ (Error::NetworkDisconnected | Error::Network(_))) => return Err(e),
                Err(e) => log::debug!("waiting for {:?}: {:?}", expected, e),
                Ok(_) => {}
            }
        }
    }

    fn handle_publish(&mut self, router: &mut dyn Router) -> Result<(), Error> {
        let publish = packet::deserialize_publish(&self.rx_buf)?;
        let qos = publish.message.qos;
        let id = publish.message.id;

        let prior = self.state.get();
        let entered = self
            .state
            .swap(self.lock_policy, prior, ClientState::ConnectedWaitForCbReturn)
            .is_ok();
        for subscription in self.subscriptions.iter().flatten() {
            if topic::matches(&subscription.filter, publish.topic) {
                match subscription.dispatch {
                    Dispatch::Handler(handler) => handler.on_message(publish.topic, &publish.message),
                    Dispatch::Route(route) => router.route(route, publish.topic, &publish.message),
                }
            }
        }
        if entered {
            self.state
                .swap(self.lock_policy, ClientState::ConnectedWaitForCbReturn, prior)?;
        }

        if qos == QoS::AtMostOnce {
            return Ok(());
        }
        let timer = self.command_timer();
        let len = packet::serialize_ack(&mut self.tx_buf, PacketType::Puback, false, id)?;
        self.send_packet(len, &timer)
    }
}

impl<T: Transport, C: Clock, L: Lock> fmt::Debug for Client<'_, T, C, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state.get())
            .field("auto_reconnect", &self.auto_reconnect)
            .field("ping_outstanding", &self.ping_outstanding)
            .field("subscriptions", &self.subscription_count())
            .field("disconnect_count", &self.disconnect_count)
            .finish_non_exhaustive()
    }
}

fn read_exact<T: Transport, C: Clock>(
    transport: &mut T,
    clock: &C,
    buf: &mut [u8],
    timer: &Timer,
) -> Result<(), Error> {
    let mut filled = 0;
    while filled < buf.len() {
        if timer.has_expired(clock) {
            return Err(Error::Network(TransportError::Timeout));
        }
        filled += transport.read(&mut buf[filled..], timer.left_ms(clock))?;
    }
    Ok(())
}

/// Discard `remaining` bytes in chunks of at most `buf.len()`.
fn drain<T: Transport, C: Clock>(
    transport: &mut T,
    clock: &C,
    buf: &mut [u8],
    mut remaining: usize,
    timer: &Timer,
) -> Result<(), Error> {
    while remaining > 0 {
        let chunk = remaining.min(buf.len());
        read_exact(transport, clock, &mut buf[..chunk], timer)?;
        remaining -= chunk;
    }
    Ok(())
}
