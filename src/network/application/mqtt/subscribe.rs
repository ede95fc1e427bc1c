//! SUBSCRIBE, UNSUBSCRIBE and re-subscription after a reconnect.

use heapless::String;

use super::client::{Client, Subscription};
use super::config::MAX_TOPIC_LEN;
use super::error::Error;
use super::packet::{self, PacketType, SUBACK_FAILURE};
use super::state::{ClientState, StateGuard};
use super::{Dispatch, MessageHandler, NoRoute, QoS, Router};
use crate::network::Transport;
use crate::system::lock::Lock;
use crate::system::timer::Clock;

const COMMAND_STATES: [ClientState; 2] = [ClientState::ConnectedIdle, ClientState::ConnectedWaitForCbReturn];

impl<'a, T: Transport, C: Clock, L: Lock> Client<'a, T, C, L> {
    /// Subscribe to `filter` and route matching publishes to `handler`.
    ///
    /// A subscription slot is reserved before anything is sent and only filled
    /// in once the broker has acknowledged the request.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] - `filter` is empty or longer than
    ///   [`MAX_TOPIC_LEN`](super::config::MAX_TOPIC_LEN)
    /// * [`Error::NetworkDisconnected`] - not connected
    /// * [`Error::ClientNotIdle`] - another command is in progress
    /// * [`Error::MaxSubscriptionsReached`] - every slot is taken; nothing was sent
    /// * [`Error::SubscriptionRefused`] - the broker returned the failure code
    /// * [`Error::RequestTimeout`] - no SUBACK in time
    pub fn subscribe(&mut self, filter: &str, qos: QoS, handler: &'a dyn MessageHandler) -> Result<(), Error> {
        self.subscribe_routed(filter, qos, Dispatch::Handler(handler), &mut NoRoute)
    }

    pub(crate) fn subscribe_routed(
        &mut self,
        filter: &str,
        qos: QoS,
        dispatch: Dispatch<'a>,
        router: &mut dyn Router,
    ) -> Result<(), Error> {
        if filter.is_empty() {
            return Err(Error::InvalidArgument);
        }
        let stored = String::try_from(filter).map_err(|_| Error::InvalidArgument)?;
        if !self.is_connected() {
            return Err(Error::NetworkDisconnected);
        }
        let mut guard = StateGuard::enter(self, &COMMAND_STATES, ClientState::ConnectedSubscribeInProgress)?;
        guard.subscribe_inner(stored, qos, dispatch, router)
    }

    fn subscribe_inner(
        &mut self,
        filter: String<MAX_TOPIC_LEN>,
        qos: QoS,
        dispatch: Dispatch<'a>,
        router: &mut dyn Router,
    ) -> Result<(), Error> {
        let timer = self.command_timer();
        let id = self.next_packet_id();
        let len = packet::serialize_subscribe(&mut self.tx_buf, false, id, &[(filter.as_str(), qos)])?;

        let slot = self
            .subscriptions
            .iter()
            .position(Option::is_none)
            .ok_or(Error::MaxSubscriptionsReached)?;

        if let Some(pos) = filter.find('#') {
            if pos + 1 != filter.len() {
                log::warn!("'#' is not the last level of {}; matched literally", filter.as_str());
            }
        }

        self.send_packet(len, &timer)?;
        self.wait_for_read(PacketType::Suback, &timer, router)?;

        let mut granted = [0u8; 1];
        let (acked, _) = packet::deserialize_suback(&self.rx_buf, &mut granted)?;
        if acked != id {
            log::warn!("SUBACK for {} while waiting on {}", acked, id);
        }
        if granted[0] == SUBACK_FAILURE {
            return Err(Error::SubscriptionRefused);
        }

        log::debug!("subscribed to {} (granted {})", filter.as_str(), granted[0]);
        self.subscriptions[slot] = Some(Subscription { filter, qos, dispatch });
        Ok(())
    }

    /// Unsubscribe from `filter`.
    ///
    /// `filter` must exactly equal a subscribed filter. Once the broker
    /// acknowledges, every slot holding that filter is freed.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] - `filter` is empty
    /// * [`Error::NetworkDisconnected`] - not connected
    /// * [`Error::ClientNotIdle`] - another command is in progress
    /// * [`Error::NoSuchSubscription`] - `filter` is not subscribed; nothing was sent
    /// * [`Error::RequestTimeout`] - no UNSUBACK in time
    pub fn unsubscribe(&mut self, filter: &str) -> Result<(), Error> {
        self.unsubscribe_routed(filter, &mut NoRoute)
    }

    pub(crate) fn unsubscribe_routed(&mut self, filter: &str, router: &mut dyn Router) -> Result<(), Error> {
        if filter.is_empty() {
            return Err(Error::InvalidArgument);
        }
        if !self.is_connected() {
            return Err(Error::NetworkDisconnected);
        }
        let mut guard = StateGuard::enter(self, &COMMAND_STATES, ClientState::ConnectedUnsubscribeInProgress)?;
        guard.unsubscribe_inner(filter, router)
    }

    fn unsubscribe_inner(&mut self, filter: &str, router: &mut dyn Router) -> Result<(), Error> {
        if !self.is_subscribed(filter) {
            return Err(Error::NoSuchSubscription);
        }

        let timer = self.command_timer();
        let id = self.next_packet_id();
        let len = packet::serialize_unsubscribe(&mut self.tx_buf, false, id, &[filter])?;
        self.send_packet(len, &timer)?;
        self.wait_for_read(PacketType::Unsuback, &timer, router)?;

        let acked = packet::deserialize_unsuback(&self.rx_buf)?;
        if acked != id {
            log::warn!("UNSUBACK for {} while waiting on {}", acked, id);
        }

        for slot in self.subscriptions.iter_mut() {
            if slot.as_ref().is_some_and(|s| s.filter.as_str() == filter) {
                *slot = None;
            }
        }
        log::debug!("unsubscribed from {}", filter);
        Ok(())
    }

    /// Re-issue one SUBSCRIBE per occupied slot, as done after a reconnect.
    ///
    /// Each request gets its own command timeout. Granted QoS codes are not
    /// checked.
    ///
    /// # Errors
    ///
    /// * [`Error::NetworkDisconnected`] - not connected
    /// * [`Error::ClientNotIdle`] - another command is in progress
    /// * [`Error::RequestTimeout`] - a SUBACK did not arrive in time
    pub fn resubscribe(&mut self) -> Result<(), Error> {
        self.resubscribe_routed(&mut NoRoute)
    }

    pub(crate) fn resubscribe_routed(&mut self, router: &mut dyn Router) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::NetworkDisconnected);
        }
        let mut guard = StateGuard::enter(
            self,
            &[ClientState::ConnectedIdle],
            ClientState::ConnectedResubscribeInProgress,
        )?;
        guard.resubscribe_inner(router)
    }

    fn resubscribe_inner(&mut self, router: &mut dyn Router) -> Result<(), Error> {
        for index in 0..self.subscriptions.len() {
            if self.subscriptions[index].is_none() {
                continue;
            }
            let timer = self.command_timer();
            let id = self.next_packet_id();
            let len = match &self.subscriptions[index] {
                Some(s) => packet::serialize_subscribe(&mut self.tx_buf, false, id, &[(s.filter.as_str(), s.qos)])?,
                None => continue,
            };
            self.send_packet(len, &timer)?;
            self.wait_for_read(PacketType::Suback, &timer, router)?;

            let mut granted = [0u8; 1];
            packet::deserialize_suback(&self.rx_buf, &mut granted)?;
            log::debug!("resubscribed slot {} (granted {})", index, granted[0]);
        }
        Ok(())
    }
}
