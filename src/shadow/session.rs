//! State of one shadow session that lives next to its MQTT client.

use heapless::{String, Vec};

use super::actions::{AckWait, SubscriptionRecord};
use super::config::{MAX_ACKS_IN_FLIGHT, MAX_DELTA_FIELDS, MAX_JSON_TOKENS, MAX_SUBSCRIPTION_RECORDS, MAX_THING_NAME_LEN};
use super::document::ClientTokens;
use super::field::JsonField;
use crate::json::Token;
use crate::network::application::mqtt::{Message, RouteId, Router};

/// Route of the accepted/rejected subscriptions.
pub(super) const ROUTE_ACK: RouteId = 0;
/// Route of the delta subscription.
pub(super) const ROUTE_DELTA: RouteId = 1;

/// Everything the shadow layer tracks besides the client itself.
///
/// Serves as the client's [`Router`], so inbound acknowledgements and deltas
/// are handled while the client is mid read cycle. Unsubscribes that result
/// from them are only marked there and carried out once the client is free.
pub(super) struct Session<'a> {
    pub(super) thing_name: String<MAX_THING_NAME_LEN>,
    pub(super) client_tokens: ClientTokens,
    pub(super) version: u32,
    pub(super) discard_old_delta: bool,
    pub(super) acks: [Option<AckWait<'a>>; MAX_ACKS_IN_FLIGHT],
    pub(super) records: [Option<SubscriptionRecord>; MAX_SUBSCRIPTION_RECORDS],
    pub(super) fields: Vec<&'a JsonField<'a>, MAX_DELTA_FIELDS>,
    pub(super) delta_subscribed: bool,
    pub(super) scratch: [Token; MAX_JSON_TOKENS],
}

impl<'a> Session<'a> {
    pub(super) fn new() -> Self {
        Self {
            thing_name: String::new(),
            client_tokens: ClientTokens::default(),
            version: 0,
            discard_old_delta: true,
            acks: [const { None }; MAX_ACKS_IN_FLIGHT],
            records: [const { None }; MAX_SUBSCRIPTION_RECORDS],
            fields: Vec::new(),
            delta_subscribed: false,
            scratch: [Token::default(); MAX_JSON_TOKENS],
        }
    }

    /// Forget every pending acknowledgement and subscription record.
    pub(super) fn reset_records(&mut self) {
        self.acks = [const { None }; MAX_ACKS_IN_FLIGHT];
        self.records = [const { None }; MAX_SUBSCRIPTION_RECORDS];
    }

    /// Keep `version` if it is newer than the last one seen.
    pub(super) fn observe_version(&mut self, version: u32) {
        if version > self.version {
            log::debug!("shadow version {} -> {}", self.version, version);
            self.version = version;
        }
    }
}

impl Router for Session<'_> {
    fn route(&mut self, route: RouteId, topic: &str, message: &Message<'_>) {
        match route {
            ROUTE_ACK => self.on_ack(topic, message.payload),
            ROUTE_DELTA => self.on_delta(topic, message.payload),
            other => log::warn!("publish on {} for unknown route {}", topic, other),
        }
    }
}

/// The payload as JSON text, or `None` if it is too large or not UTF-8.
pub(super) fn payload_text<'p>(topic: &str, payload: &'p [u8]) -> Option<&'p str> {
    if payload.len() >= super::config::SHADOW_RX_BUF_LEN {
        log::warn!("payload on {} larger than the shadow RX buffer ({} bytes)", topic, payload.len());
        return None;
    }
    match core::str::from_utf8(payload) {
        Ok(text) => Some(text),
        Err(_) => {
            log::warn!("payload on {} is not UTF-8", topic);
            None
        }
    }
}
