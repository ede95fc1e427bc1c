//! Delta dispatch to registered fields.

use super::error::Error;
use super::field::JsonField;
use super::session::{payload_text, Session, ROUTE_DELTA};
use super::topic::delta_topic;
use crate::json::Document;
use crate::network::application::mqtt::{Client, Dispatch, QoS};
use crate::network::Transport;
use crate::system::lock::Lock;
use crate::system::timer::Clock;

impl Session<'_> {
    /// Handle a publish on the delta topic.
    ///
    /// With old-delta discarding on, a document whose `version` is not newer
    /// than the last one seen is ignored. Every registered field whose key the
    /// document carries is updated, then its callback gets the raw value.
    pub(super) fn on_delta(&mut self, topic: &str, payload: &[u8]) {
        let Some(json) = payload_text(topic, payload) else {
            return;
        };
        let doc = match Document::parse(json, &mut self.scratch) {
            Ok(doc) => doc,
            Err(e) => {
                log::warn!("invalid delta JSON: {:?}", e);
                return;
            }
        };

        if self.discard_old_delta {
            if let Some(version) = doc.version() {
                if version <= self.version {
                    log::warn!("old delta ignored: received {} local {}", version, self.version);
                    return;
                }
                self.version = version;
            }
        }

        for field in self.fields.iter() {
            let Some(token) = doc.find(field.key()) else {
                continue;
            };
            if let Err(e) = field.update_from(&doc, token) {
                log::warn!("delta value for {} not applied: {:?}", field.key(), e);
            }
            if let Some(callback) = field.callback() {
                callback.on_delta(doc.text(token), field);
            }
        }
    }
}

/// Add `field` to the delta table, subscribing to the delta topic on first use.
pub(super) fn register<'a, T: Transport, C: Clock, L: Lock>(
    client: &mut Client<'a, T, C, L>,
    session: &mut Session<'a>,
    field: &'a JsonField<'a>,
) -> Result<(), Error> {
    if !client.is_connected() {
        return Err(Error::NotConnected);
    }
    if session.fields.is_full() {
        return Err(Error::DeltaTableFull);
    }
    if !session.delta_subscribed {
        let topic = delta_topic(&session.thing_name)?;
        client.subscribe_routed(&topic, QoS::AtMostOnce, Dispatch::Route(ROUTE_DELTA), session)?;
        session.delta_subscribed = true;
    }
    session
        .fields
        .push(field)
        .map_err(|_| Error::DeltaTableFull)?;
    log::debug!("delta field {} registered", field.key());
    Ok(())
}
