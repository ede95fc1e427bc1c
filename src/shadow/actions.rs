//! Get, update and delete requests correlated with their accepted/rejected
//! responses.
//!
//! A tracked request holds an acknowledgement slot until the response with its
//! client token arrives or its timer runs out, and keeps the accepted/rejected
//! subscription pair of its thing and action alive through a reference count.

use heapless::String;

use super::config::{MAX_CLIENT_TOKEN_LEN, MAX_THING_NAME_LEN, SUBSCRIBE_SETTLING_TIME_MS};
use super::error::Error;
use super::session::{payload_text, Session, ROUTE_ACK};
use super::topic::{self, ack_topic, action_topic, AckKind, Topic};
use super::{AckStatus, ActionCallback, ShadowAction};
use crate::json::{Document, Token};
use crate::network::application::mqtt::{Client, Dispatch, Error as MqttError, QoS};
use crate::network::Transport;
use crate::system::lock::Lock;
use crate::system::timer::{Clock, Timer};

/// A request waiting for its response.
pub(super) struct AckWait<'a> {
    pub(super) token: String<MAX_CLIENT_TOKEN_LEN>,
    pub(super) thing: String<MAX_THING_NAME_LEN>,
    pub(super) action: ShadowAction,
    pub(super) callback: &'a dyn ActionCallback,
    pub(super) timer: Timer,
}

/// One accepted or rejected subscription and the number of requests using it.
///
/// A record whose count dropped to zero is marked `release_pending` until the
/// unsubscribe has been sent.
#[derive(Debug)]
pub(super) struct SubscriptionRecord {
    pub(super) topic: Topic,
    pub(super) count: u8,
    pub(super) sticky: bool,
    pub(super) release_pending: bool,
}

/// The `clientToken` of `document`, if it is a JSON object that has one.
fn extract_client_token(
    scratch: &mut [Token],
    document: &str,
) -> Result<Option<String<MAX_CLIENT_TOKEN_LEN>>, Error> {
    let doc = match Document::parse(document, scratch) {
        Ok(doc) => doc,
        Err(e) => {
            log::debug!("request document not parsed ({:?}); sending untracked", e);
            return Ok(None);
        }
    };
    match doc.client_token() {
        Some(token) => String::try_from(token)
            .map(Some)
            .map_err(|_| Error::BufferTruncated),
        None => Ok(None),
    }
}

impl Session<'_> {
    fn find_record(&self, topic: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.as_ref().is_some_and(|r| r.topic.as_str() == topic))
    }

    /// Whether both subscriptions of `thing`/`action` are recorded.
    pub(super) fn pair_present(&self, thing: &str, action: ShadowAction) -> Result<bool, Error> {
        let accepted = ack_topic(thing, action, AckKind::Accepted)?;
        let rejected = ack_topic(thing, action, AckKind::Rejected)?;
        Ok(self.find_record(&accepted).is_some() && self.find_record(&rejected).is_some())
    }

    /// Count one more request on an existing pair. The latest request decides
    /// stickiness.
    pub(super) fn retain_pair(&mut self, thing: &str, action: ShadowAction, sticky: bool) -> Result<(), Error> {
        for kind in [AckKind::Accepted, AckKind::Rejected] {
            let topic = ack_topic(thing, action, kind)?;
            for record in self.records.iter_mut().flatten() {
                if record.topic == topic {
                    record.count = record.count.saturating_add(1);
                    record.sticky = sticky;
                    record.release_pending = false;
                }
            }
        }
        Ok(())
    }

    /// Drop one request from a pair. A non-sticky subscription whose last
    /// request is gone is marked for unsubscribing.
    pub(super) fn release_pair(&mut self, thing: &str, action: ShadowAction) {
        for kind in [AckKind::Accepted, AckKind::Rejected] {
            let Ok(topic) = ack_topic(thing, action, kind) else {
                continue;
            };
            let Some(index) = self.find_record(&topic) else {
                continue;
            };
            if let Some(record) = self.records[index].as_mut() {
                if !record.sticky && record.count == 1 {
                    record.count = 0;
                    record.release_pending = true;
                } else if record.count > 1 {
                    record.count -= 1;
                }
            }
        }
    }

    fn free_ack_slot(&self) -> Option<usize> {
        self.acks.iter().position(Option::is_none)
    }

    /// Handle a publish on an accepted or rejected topic.
    pub(super) fn on_ack(&mut self, topic: &str, payload: &[u8]) {
        let Some(kind) = topic::ack_kind(topic) else {
            log::warn!("ignoring publish on {}: not an accepted or rejected topic", topic);
            return;
        };
        let Some(json) = payload_text(topic, payload) else {
            return;
        };
        let (version, token) = match Document::parse(json, &mut self.scratch) {
            Ok(doc) => (doc.version(), doc.client_token()),
            Err(e) => {
                log::warn!("invalid JSON on {}: {:?}", topic, e);
                return;
            }
        };

        if topic::carries_version(topic, &self.thing_name) {
            if let Some(version) = version {
                self.observe_version(version);
            }
        }

        let Some(token) = token else {
            return;
        };
        let Some(slot) = self
            .acks
            .iter()
            .position(|a| a.as_ref().is_some_and(|a| a.token.as_str() == token))
        else {
            log::debug!("no request waiting for token {}", token);
            return;
        };
        let Some(ack) = self.acks[slot].take() else {
            return;
        };

        let status = match kind {
            AckKind::Accepted => AckStatus::Accepted,
            AckKind::Rejected => AckStatus::Rejected,
        };
        log::debug!("{:?} for {} on {}", status, token, topic);
        ack.callback.on_ack(&ack.thing, ack.action, status, Some(json));
        self.release_pair(&ack.thing, ack.action);
    }

    /// Fire the timeout status for every request whose timer ran out.
    pub(super) fn sweep_expired<C: Clock>(&mut self, clock: &C) {
        for slot in 0..self.acks.len() {
            if !self.acks[slot]
                .as_ref()
                .is_some_and(|a| a.timer.has_expired(clock))
            {
                continue;
            }
            if let Some(ack) = self.acks[slot].take() {
                log::debug!("request {} timed out", ack.token);
                ack.callback
                    .on_ack(&ack.thing, ack.action, AckStatus::Timeout, None);
                self.release_pair(&ack.thing, ack.action);
            }
        }
    }
}

/// Publish `document` on the action topic, tracking the response when the
/// document has a client token and a callback is given.
#[allow(clippy::too_many_arguments)]
pub(super) fn perform<'a, T: Transport, C: Clock, L: Lock>(
    client: &mut Client<'a, T, C, L>,
    session: &mut Session<'a>,
    thing: &str,
    action: ShadowAction,
    document: &str,
    callback: Option<&'a dyn ActionCallback>,
    timeout_sec: u32,
    sticky: bool,
) -> Result<(), Error> {
    if thing.is_empty() || document.is_empty() {
        return Err(Error::InvalidArgument);
    }
    let thing_name = String::<MAX_THING_NAME_LEN>::try_from(thing).map_err(|_| Error::InvalidArgument)?;
    let topic = action_topic(thing, action)?;

    let token = extract_client_token(&mut session.scratch, document)?;
    let tracked = match (token, callback) {
        (Some(token), Some(callback)) => Some((token, callback)),
        _ => None,
    };

    let slot = match tracked {
        Some(_) => {
            let slot = session.free_ack_slot().ok_or(Error::AckPoolFull)?;
            if session.pair_present(thing, action)? {
                session.retain_pair(thing, action, sticky)?;
            } else {
                subscribe_pair(client, session, thing, action, sticky)?;
            }
            Some(slot)
        }
        None => None,
    };

    if let Err(e) = client.publish_routed(&topic, document.as_bytes(), QoS::AtMostOnce, false, session) {
        if slot.is_some() {
            session.release_pair(thing, action);
        }
        drain_releases(client, session);
        return Err(e.into());
    }

    if let (Some(slot), Some((token, callback))) = (slot, tracked) {
        let mut timer = Timer::new();
        timer.countdown_sec(client.clock(), timeout_sec);
        log::debug!("waiting {}s for {} on {:?}", timeout_sec, token, action);
        session.acks[slot] = Some(AckWait {
            token,
            thing: thing_name,
            action,
            callback,
            timer,
        });
    }
    drain_releases(client, session);
    Ok(())
}

/// Subscribe the accepted and rejected topics of `thing`/`action` and record
/// them with a count of one.
fn subscribe_pair<'a, T: Transport, C: Clock, L: Lock>(
    client: &mut Client<'a, T, C, L>,
    session: &mut Session<'a>,
    thing: &str,
    action: ShadowAction,
    sticky: bool,
) -> Result<(), Error> {
    let accepted = ack_topic(thing, action, AckKind::Accepted)?;
    let rejected = ack_topic(thing, action, AckKind::Rejected)?;

    let (accepted_slot, rejected_slot) = {
        let mut free = session
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_none())
            .map(|(i, _)| i);
        match (free.next(), free.next()) {
            (Some(a), Some(r)) => (a, r),
            _ => return Err(Error::Mqtt(MqttError::MaxSubscriptionsReached)),
        }
    };

    client.subscribe_routed(&accepted, QoS::AtMostOnce, Dispatch::Route(ROUTE_ACK), session)?;
    if let Err(e) = client.subscribe_routed(&rejected, QoS::AtMostOnce, Dispatch::Route(ROUTE_ACK), session) {
        if let Err(u) = client.unsubscribe_routed(&accepted, session) {
            log::warn!("could not roll back {}: {:?}", accepted.as_str(), u);
        }
        return Err(e.into());
    }

    session.records[accepted_slot] = Some(SubscriptionRecord {
        topic: accepted,
        count: 1,
        sticky,
        release_pending: false,
    });
    session.records[rejected_slot] = Some(SubscriptionRecord {
        topic: rejected,
        count: 1,
        sticky,
        release_pending: false,
    });

    // Give the broker time to apply the subscriptions before the request goes out.
    client.clock().delay_ms(SUBSCRIBE_SETTLING_TIME_MS);
    Ok(())
}

/// Unsubscribe every record marked by [`Session::release_pair`].
///
/// Nothing happens while the client is disconnected; the marks stay for the
/// next call. A failed unsubscribe keeps the record with a count of one.
pub(super) fn drain_releases<T: Transport, C: Clock, L: Lock>(
    client: &mut Client<'_, T, C, L>,
    session: &mut Session<'_>,
) {
    if !client.is_connected() {
        return;
    }
    while let Some(index) = session
        .records
        .iter()
        .position(|r| r.as_ref().is_some_and(|r| r.release_pending))
    {
        let Some(record) = session.records[index].as_mut() else {
            break;
        };
        record.release_pending = false;
        let topic = record.topic.clone();

        match client.unsubscribe_routed(&topic, session) {
            Ok(()) | Err(MqttError::NoSuchSubscription) => session.records[index] = None,
            Err(e) => {
                log::warn!("unsubscribe from {} failed: {:?}", topic.as_str(), e);
                if let Some(record) = session.records[index].as_mut() {
                    record.count = 1;
                }
            }
        }
    }
}
