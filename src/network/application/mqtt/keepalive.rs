//! Yield, keep-alive pings and reconnection with exponential back-off.

use super::client::Client;
use super::config::{MAX_RECONNECT_WAIT_INTERVAL_MS, MIN_RECONNECT_WAIT_INTERVAL_MS};
use super::error::Error;
use super::packet::{self, PacketType};
use super::state::ClientState;
use super::{NoRoute, Router};
use crate::network::Transport;
use crate::system::lock::Lock;
use crate::system::timer::{Clock, Timer};

/// Non-error outcome of [`Client::yield_for`] and [`Client::attempt_reconnect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum YieldStatus {
    /// The time slice was used for normal processing.
    Success,
    /// The connection was re-established and subscriptions restored.
    Reconnected,
    /// The connection is down and an auto-reconnect is scheduled.
    AttemptingReconnect,
}

impl<'a, T: Transport, C: Clock, L: Lock> Client<'a, T, C, L> {
    /// Give the client `timeout_ms` of processing time.
    ///
    /// Reads and dispatches inbound packets, sends keep-alive pings and, when
    /// auto-reconnect is enabled, re-establishes a lost connection with
    /// exponential back-off. At least one iteration always runs; the time
    /// budget is checked after each one.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] - `timeout_ms` is zero
    /// * [`Error::NetworkManuallyDisconnected`] - [`disconnect`](Client::disconnect) was called
    /// * [`Error::NetworkDisconnected`] - the connection is down and auto-reconnect is off
    /// * [`Error::ClientNotIdle`] - another command is in progress
    /// * [`Error::ReconnectTimedOut`] - the back-off ceiling was exceeded
    /// * [`Error::MessageTooLarge`] - an inbound packet was dropped
    pub fn yield_for(&mut self, timeout_ms: u32) -> Result<YieldStatus, Error> {
        self.yield_routed(timeout_ms, &mut NoRoute)
    }

    pub(crate) fn yield_routed(&mut self, timeout_ms: u32, router: &mut dyn Router) -> Result<YieldStatus, Error> {
        if timeout_ms == 0 {
            return Err(Error::InvalidArgument);
        }
        let state = self.state();
        if state == ClientState::DisconnectedManually {
            return Err(Error::NetworkManuallyDisconnected);
        }
        if state != ClientState::PendingReconnect {
            if !state.is_connected() {
                return Err(Error::NetworkDisconnected);
            }
            if state != ClientState::ConnectedIdle {
                return Err(Error::ClientNotIdle);
            }
            self.set_state(ClientState::ConnectedIdle, ClientState::ConnectedYieldInProgress)?;
        }

        let rc = self.yield_loop(timeout_ms, router);
        if matches!(
            rc,
            Err(Error::NetworkDisconnected) | Ok(YieldStatus::AttemptingReconnect)
        ) {
            return rc;
        }
        let restored = self.set_state(ClientState::ConnectedYieldInProgress, ClientState::ConnectedIdle);
        match (rc, restored) {
            (Ok(_), Err(e)) => Err(e),
            (rc, _) => rc,
        }
    }

    fn yield_loop(&mut self, timeout_ms: u32, router: &mut dyn Router) -> Result<YieldStatus, Error> {
        let timer = Timer::after_ms(&self.clock, timeout_ms);
        loop {
            let rc = if self.state() == ClientState::PendingReconnect {
                if self.reconnect_interval_ms > MAX_RECONNECT_WAIT_INTERVAL_MS {
                    return Err(Error::ReconnectTimedOut);
                }
                self.handle_reconnect(router)
            } else {
                let rc = match self.cycle_read(&timer, router) {
                    Ok(_) => self.keep_alive().map(|()| YieldStatus::Success),
                    Err(Error::Network(e)) => {
                        log::warn!("transport failure while reading: {:?}", e);
                        Err(self.handle_disconnect())
                    }
                    Err(e) => Err(e),
                };
                match rc {
                    Err(Error::NetworkDisconnected) => {
                        self.disconnect_count = self.disconnect_count.saturating_add(1);
                        if !self.auto_reconnect {
                            return rc;
                        }
                        self.set_state(ClientState::DisconnectedError, ClientState::PendingReconnect)?;
                        self.reconnect_interval_ms = MIN_RECONNECT_WAIT_INTERVAL_MS;
                        self.reconnect_timer
                            .countdown_ms(&self.clock, self.reconnect_interval_ms);
                        log::info!("connection lost, reconnecting in {} ms", self.reconnect_interval_ms);
                        Ok(YieldStatus::AttemptingReconnect)
                    }
                    Err(e) => return Err(e),
                    ok => ok,
                }
            };
            if timer.has_expired(&self.clock) {
                return rc;
            }
        }
    }

    /// Send a PINGREQ when the keep-alive interval has elapsed, or declare the
    /// connection dead if the previous one was never answered.
    fn keep_alive(&mut self) -> Result<(), Error> {
        if self.keep_alive_seconds == 0 || !self.ping_timer.has_expired(&self.clock) {
            return Ok(());
        }
        if self.ping_outstanding {
            log::warn!("no PINGRESP within {}s", self.keep_alive_seconds);
            return Err(self.handle_disconnect());
        }

        let timer = self.command_timer();
        let len = packet::serialize_zero(&mut self.tx_buf, PacketType::Pingreq)?;
        if let Err(e) = self.send_packet(len, &timer) {
            log::warn!("PINGREQ not sent: {:?}", e);
            return Err(self.handle_disconnect());
        }
        self.ping_outstanding = true;
        self.ping_timer
            .countdown_sec(&self.clock, u32::from(self.keep_alive_seconds));
        Ok(())
    }

    fn handle_reconnect(&mut self, router: &mut dyn Router) -> Result<YieldStatus, Error> {
        if !self.reconnect_timer.has_expired(&self.clock) {
            return Ok(YieldStatus::AttemptingReconnect);
        }

        if self.transport.is_connected() {
            match self.attempt_reconnect_routed(router) {
                Ok(YieldStatus::Reconnected) => {
                    self.set_state(ClientState::ConnectedIdle, ClientState::ConnectedYieldInProgress)?;
                    return Ok(YieldStatus::Reconnected);
                }
                Ok(_) => {}
                Err(e) => log::warn!("reconnect attempt failed: {:?}", e),
            }
        }

        self.reconnect_interval_ms = self.reconnect_interval_ms.saturating_mul(2);
        if self.reconnect_interval_ms > MAX_RECONNECT_WAIT_INTERVAL_MS {
            return Err(Error::ReconnectTimedOut);
        }
        log::debug!("next reconnect attempt in {} ms", self.reconnect_interval_ms);
        self.reconnect_timer
            .countdown_ms(&self.clock, self.reconnect_interval_ms);
        Ok(YieldStatus::AttemptingReconnect)
    }

    /// Reconnect once with the stored options and restore subscriptions.
    ///
    /// Returns [`YieldStatus::Reconnected`] on success, or
    /// [`YieldStatus::AttemptingReconnect`] with the client left in
    /// [`PendingReconnect`](ClientState::PendingReconnect) if the connect
    /// failed.
    ///
    /// # Errors
    ///
    /// * [`Error::NetworkAlreadyConnected`] - the client is connected
    /// * any error from [`resubscribe`](Client::resubscribe)
    pub fn attempt_reconnect(&mut self) -> Result<YieldStatus, Error> {
        self.attempt_reconnect_routed(&mut NoRoute)
    }

    pub(crate) fn attempt_reconnect_routed(&mut self, router: &mut dyn Router) -> Result<YieldStatus, Error> {
        if self.is_connected() {
            return Err(Error::NetworkAlreadyConnected);
        }

        if let Err(e) = self.connect_routed(None, router) {
            log::debug!("reconnect failed: {:?}", e);
        }
        if self.state() != ClientState::ConnectedIdle {
            let _ = self.set_state(ClientState::DisconnectedError, ClientState::PendingReconnect);
            return Ok(YieldStatus::AttemptingReconnect);
        }

        self.resubscribe_routed(router)?;
        log::info!("reconnected");
        Ok(YieldStatus::Reconnected)
    }
}
