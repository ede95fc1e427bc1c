//! Device shadow synchronization over MQTT.
//!
//! A [`Shadow`] owns an MQTT [`Client`] and everything needed to keep a
//! device's JSON state document in step with its cloud-side copy:
//!
//! - **Requests**: [`get`](Shadow::get), [`update`](Shadow::update) and
//!   [`delete`](Shadow::delete) publish on `things/<thing>/shadow/<action>`.
//!   When the document carries a client token and a callback is given, the
//!   matching `accepted`/`rejected` response (or a timeout) is reported to
//!   the callback exactly once.
//! - **Deltas**: fields registered with [`register_delta`](Shadow::register_delta)
//!   are updated from `things/<thing>/shadow/update/delta`. Deltas whose
//!   version is not newer than the last one seen are dropped unless
//!   [`disable_discard_old_delta`](Shadow::disable_discard_old_delta) was called.
//!
//! Responses, deltas and timeouts are only processed inside
//! [`yield_for`](Shadow::yield_for) and the other blocking calls.
//!
//! # Usage
//!
//! ```rust,no_run
//! use libshadow::shadow::{
//!     AckStatus, ConnectParams, FieldValue, InitParams, JsonField, Shadow, ShadowAction, UpdateDocument,
//! };
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
//! # fn main() -> Result<(), libshadow::shadow::Error> {
//! let on_window = |raw: &str, _field: &JsonField<'_>| {
//!     let _ = raw;
//! };
//! let window = JsonField::with_callback("windowOpen", FieldValue::Bool(false), &on_window);
//! let temperature = JsonField::new("temperature", FieldValue::F32(21.5));
//! let on_ack = |_thing: &str, _action: ShadowAction, status: AckStatus, _doc: Option<&str>| {
//!     let _ = status;
//! };
//!
//! let mut shadow: Shadow<'_, _, _> = Shadow::new(MockTransport, MockClock, InitParams::default())?;
//! shadow.connect(ConnectParams::new("room_sensor", "room_sensor_client"))?;
//! shadow.register_delta(&window)?;
//!
//! loop {
//!     let mut doc = UpdateDocument::<256>::new()?;
//!     doc.add_reported(&[&temperature, &window])?;
//!     shadow.finalize_document(&mut doc)?;
//!     shadow.update("room_sensor", doc.as_str(), Some(&on_ack), 4, true)?;
//!     shadow.yield_for(200)?;
//! }
//! # }
//! ```

use core::fmt;

mod actions;
pub mod config;
mod delta;
pub mod document;
pub mod error;
mod field;
mod session;
pub mod topic;

pub use document::{request_body, ClientTokens, UpdateDocument};
pub use error::Error;
pub use field::{DeltaCallback, FieldValue, JsonField};

use heapless::String;

use self::config::{COMMAND_TIMEOUT_MS, KEEP_ALIVE_SECONDS, MAX_CLIENT_ID_LEN, PACKET_TIMEOUT_MS};
use self::session::Session;
use crate::network::application::mqtt::{
    self, Client, DisconnectHandler, Dispatch, MessageHandler, Options, QoS, YieldStatus,
};
use crate::network::Transport;
use crate::system::lock::{Lock, NoLock};
use crate::system::timer::Clock;

/// The three shadow requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ShadowAction {
    /// Fetch the document.
    Get,
    /// Change reported and/or desired state.
    Update,
    /// Delete the document.
    Delete,
}

impl ShadowAction {
    /// The topic segment of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShadowAction::Get => "get",
            ShadowAction::Update => "update",
            ShadowAction::Delete => "delete",
        }
    }
}

/// How a tracked request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AckStatus {
    /// No response before the request's timeout.
    Timeout,
    /// The response came on the `rejected` topic.
    Rejected,
    /// The response came on the `accepted` topic.
    Accepted,
}

/// Receives the outcome of a tracked request.
///
/// Implemented for every `Fn(&str, ShadowAction, AckStatus, Option<&str>)`
/// closure.
pub trait ActionCallback {
    /// `document` is the response body, or `None` on timeout.
    fn on_ack(&self, thing_name: &str, action: ShadowAction, status: AckStatus, document: Option<&str>);
}

impl<F> ActionCallback for F
where
    F: Fn(&str, ShadowAction, AckStatus, Option<&str>),
{
    fn on_ack(&self, thing_name: &str, action: ShadowAction, status: AckStatus, document: Option<&str>) {
        self(thing_name, action, status, document)
    }
}

/// Shadow session initialization parameters.
#[derive(Clone, Copy, Default)]
pub struct InitParams<'a> {
    /// Reconnect with back-off from inside `yield_for`.
    pub auto_reconnect: bool,
    /// Called whenever the connection is torn down on error.
    pub disconnect_handler: Option<&'a dyn DisconnectHandler>,
}

impl fmt::Debug for InitParams<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitParams")
            .field("auto_reconnect", &self.auto_reconnect)
            .field("disconnect_handler", &self.disconnect_handler.is_some())
            .finish()
    }
}

/// Shadow connection parameters.
#[derive(Clone, Copy)]
pub struct ConnectParams<'a> {
    /// The local thing; deltas and versions are tracked for it.
    pub thing_name: &'a str,
    /// MQTT client id, also the prefix of generated client tokens.
    pub client_id: &'a str,
    /// If set, subscribed at QoS 1 to `things/<thing>/shadow/delete/accepted`.
    pub delete_handler: Option<&'a dyn MessageHandler>,
}

impl<'a> ConnectParams<'a> {
    /// Parameters without a delete handler.
    pub const fn new(thing_name: &'a str, client_id: &'a str) -> Self {
        Self {
            thing_name,
            client_id,
            delete_handler: None,
        }
    }
}

impl fmt::Debug for ConnectParams<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("thing_name", &self.thing_name)
            .field("client_id", &self.client_id)
            .field("delete_handler", &self.delete_handler.is_some())
            .finish()
    }
}

/// A shadow session: an MQTT client plus request and delta tracking.
pub struct Shadow<'a, T: Transport, C: Clock, L: Lock = NoLock> {
    client: Client<'a, T, C, L>,
    session: Session<'a>,
}

impl<'a, T: Transport, C: Clock, L: Lock + Default> Shadow<'a, T, C, L> {
    /// Create the session and its client with a 5 s packet timeout and a 20 s
    /// command timeout.
    pub fn new(transport: T, clock: C, params: InitParams<'a>) -> Result<Self, Error> {
        let client = Client::new(
            transport,
            clock,
            mqtt::InitParams {
                auto_reconnect: params.auto_reconnect,
                packet_timeout_ms: PACKET_TIMEOUT_MS,
                command_timeout_ms: COMMAND_TIMEOUT_MS,
                disconnect_handler: params.disconnect_handler,
                ..mqtt::InitParams::default()
            },
        )?;
        Ok(Self {
            client,
            session: Session::new(),
        })
    }
}

impl<'a, T: Transport, C: Clock, L: Lock> Shadow<'a, T, C, L> {
    /// Connect with a 600 s keep-alive, a clean session and no will, then
    /// subscribe the delete handler if one is given.
    ///
    /// All pending requests and subscription records are forgotten.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] - empty or overlong thing name or client id
    /// * [`Error::Mqtt`] - the connect or the delete subscription failed
    pub fn connect(&mut self, params: ConnectParams<'a>) -> Result<(), Error> {
        if params.thing_name.is_empty() || params.client_id.is_empty() || params.client_id.len() > MAX_CLIENT_ID_LEN {
            return Err(Error::InvalidArgument);
        }
        self.session.thing_name = String::try_from(params.thing_name).map_err(|_| Error::InvalidArgument)?;
        self.session.client_tokens = ClientTokens::new(params.client_id)?;

        let options = Options {
            keep_alive_seconds: KEEP_ALIVE_SECONDS,
            clean_session: true,
            ..Options::new(params.client_id)
        };
        self.client
            .connect_routed(Some(options), &mut self.session)?;
        self.session.reset_records();

        if let Some(handler) = params.delete_handler {
            let topic = topic::ack_topic(params.thing_name, ShadowAction::Delete, topic::AckKind::Accepted)?;
            self.client
                .subscribe_routed(&topic, QoS::AtLeastOnce, Dispatch::Handler(handler), &mut self.session)?;
        }
        Ok(())
    }

    /// Report timed-out requests, then give the client `timeout_ms` of
    /// processing time.
    ///
    /// # Errors
    ///
    /// Whatever [`Client::yield_for`] returns.
    pub fn yield_for(&mut self, timeout_ms: u32) -> Result<YieldStatus, Error> {
        self.session.sweep_expired(self.client.clock());
        actions::drain_releases(&mut self.client, &mut self.session);
        let status = self.client.yield_routed(timeout_ms, &mut self.session);
        actions::drain_releases(&mut self.client, &mut self.session);
        Ok(status?)
    }

    /// Disconnect the client.
    pub fn disconnect(&mut self) -> Result<(), Error> {
        Ok(self.client.disconnect()?)
    }

    /// Publish `document` on `things/<thing>/shadow/update`.
    ///
    /// If `document` carries a `clientToken` and `callback` is set, the
    /// callback gets the response or, after `timeout_sec`, a timeout. A
    /// `sticky` request leaves its accepted/rejected subscriptions in place.
    ///
    /// # Errors
    ///
    /// * [`Error::NotConnected`] - the client is not connected
    /// * [`Error::AckPoolFull`] - too many tracked requests; nothing was sent
    /// * [`Error::Mqtt`] - subscribing or publishing failed
    pub fn update(
        &mut self,
        thing: &str,
        document: &str,
        callback: Option<&'a dyn ActionCallback>,
        timeout_sec: u32,
        sticky: bool,
    ) -> Result<(), Error> {
        self.request(thing, ShadowAction::Update, document, callback, timeout_sec, sticky)
    }

    /// Request the document of `thing`. See [`update`](Shadow::update).
    pub fn get(
        &mut self,
        thing: &str,
        callback: Option<&'a dyn ActionCallback>,
        timeout_sec: u32,
        sticky: bool,
    ) -> Result<(), Error> {
        let body = request_body(&mut self.session.client_tokens)?;
        self.request(thing, ShadowAction::Get, &body, callback, timeout_sec, sticky)
    }

    /// Delete the document of `thing`. See [`update`](Shadow::update).
    pub fn delete(
        &mut self,
        thing: &str,
        callback: Option<&'a dyn ActionCallback>,
        timeout_sec: u32,
        sticky: bool,
    ) -> Result<(), Error> {
        let body = request_body(&mut self.session.client_tokens)?;
        self.request(thing, ShadowAction::Delete, &body, callback, timeout_sec, sticky)
    }

    fn request(
        &mut self,
        thing: &str,
        action: ShadowAction,
        document: &str,
        callback: Option<&'a dyn ActionCallback>,
        timeout_sec: u32,
        sticky: bool,
    ) -> Result<(), Error> {
        if !self.client.is_connected() {
            return Err(Error::NotConnected);
        }
        actions::perform(
            &mut self.client,
            &mut self.session,
            thing,
            action,
            document,
            callback,
            timeout_sec,
            sticky,
        )
    }

    /// Have deltas update `field` and run its callback.
    ///
    /// The first registration subscribes to the delta topic of the local
    /// thing.
    ///
    /// # Errors
    ///
    /// * [`Error::NotConnected`] - the client is not connected
    /// * [`Error::DeltaTableFull`] - no room for another field
    /// * [`Error::Mqtt`] - the delta subscription failed
    pub fn register_delta(&mut self, field: &'a JsonField<'a>) -> Result<(), Error> {
        let rc = delta::register(&mut self.client, &mut self.session, field);
        actions::drain_releases(&mut self.client, &mut self.session);
        rc
    }

    /// Close `document` with the next client token.
    pub fn finalize_document<const N: usize>(&mut self, document: &mut UpdateDocument<N>) -> Result<(), Error> {
        document.finalize(&mut self.session.client_tokens)
    }

    /// Write the next client token into `out`.
    pub fn fill_client_token<const N: usize>(&mut self, out: &mut String<N>) -> Result<(), Error> {
        out.clear();
        self.session.client_tokens.write_next(out)
    }

    /// The newest version seen on a delta or a `get/accepted` of the local thing.
    pub fn last_received_version(&self) -> u32 {
        self.session.version
    }

    /// Forget the last received version.
    pub fn reset_last_received_version(&mut self) {
        self.session.version = 0;
    }

    /// Drop deltas that are not newer than the last received version. This is
    /// the default.
    pub fn enable_discard_old_delta(&mut self) {
        self.session.discard_old_delta = true;
    }

    /// Apply every delta regardless of its version.
    pub fn disable_discard_old_delta(&mut self) {
        self.session.discard_old_delta = false;
    }

    /// Enable or disable auto-reconnect on the client.
    pub fn set_auto_reconnect(&mut self, enabled: bool) {
        self.client.set_auto_reconnect(enabled);
    }

    /// Number of requests waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.session.acks.iter().flatten().count()
    }

    /// The local thing name given to [`connect`](Shadow::connect).
    pub fn thing_name(&self) -> &str {
        &self.session.thing_name
    }

    /// The underlying client.
    pub fn client(&self) -> &Client<'a, T, C, L> {
        &self.client
    }

    /// The underlying client, mutably. Publishes on shadow topics made through
    /// it bypass request tracking.
    pub fn client_mut(&mut self) -> &mut Client<'a, T, C, L> {
        &mut self.client
    }

    /// Tear the session down and hand back the transport.
    pub fn free(self) -> T {
        self.client.free()
    }
}

impl<T: Transport, C: Clock, L: Lock> fmt::Debug for Shadow<'_, T, C, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shadow")
            .field("client", &self.client)
            .field("thing_name", &self.session.thing_name)
            .field("version", &self.session.version)
            .field("pending_requests", &self.pending_requests())
            .field("delta_fields", &self.session.fields.len())
            .finish_non_exhaustive()
    }
}
