//! CONNECT and DISCONNECT.

use super::client::Client;
use super::config::Options;
use super::error::{ConnackCode, Error};
use super::packet::{self, PacketType};
use super::state::ClientState;
use super::{NoRoute, Router};
use crate::network::Transport;
use crate::system::lock::Lock;
use crate::system::timer::Clock;

impl<'a, T: Transport, C: Clock, L: Lock> Client<'a, T, C, L> {
    /// Open the transport and perform the MQTT handshake.
    ///
    /// `Some(options)` replaces the stored options; `None` reuses the ones from
    /// the previous call. On success the client is
    /// [`ConnectedIdle`](ClientState::ConnectedIdle) and the keep-alive timer is
    /// armed. On failure the transport is torn down and the client is left in
    /// [`DisconnectedError`](ClientState::DisconnectedError).
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] - no options were ever supplied
    /// * [`Error::NetworkAlreadyConnected`] - the client is connected or mid-connect
    /// * [`Error::ConnectionRefused`] - the broker answered with a non-zero return code
    /// * [`Error::RequestTimeout`] - no CONNACK within the command timeout
    /// * [`Error::Network`] - the transport failed
    pub fn connect(&mut self, options: Option<Options<'a>>) -> Result<(), Error> {
        self.connect_routed(options, &mut NoRoute)
    }

    pub(crate) fn connect_routed(&mut self, options: Option<Options<'a>>, router: &mut dyn Router) -> Result<(), Error> {
        if options.is_none() && self.options.is_none() {
            return Err(Error::InvalidArgument);
        }
        let state = self.state();
        if !matches!(
            state,
            ClientState::Initialized
                | ClientState::DisconnectedError
                | ClientState::DisconnectedManually
                | ClientState::PendingReconnect
        ) {
            return Err(Error::NetworkAlreadyConnected);
        }
        self.set_state(state, ClientState::Connecting)?;
        if let Some(options) = options {
            self.options = Some(options);
        }

        match self.connect_inner(router) {
            Ok(()) => {
                log::info!("connected, keep-alive {}s", self.keep_alive_seconds);
                self.set_state(ClientState::Connecting, ClientState::ConnectedIdle)
            }
            Err(e) => {
                log::warn!("connect failed: {:?}", e);
                // Best effort; the link may never have come up.
                let _ = self.transport.disconnect();
                let destroyed = self.transport.destroy();
                self.force_state(ClientState::DisconnectedError);
                match destroyed {
                    Ok(()) => Err(e),
                    Err(d) => {
                        log::error!("transport destroy failed: {:?}", d);
                        Err(Error::NetworkDisconnected)
                    }
                }
            }
        }
    }

    fn connect_inner(&mut self, router: &mut dyn Router) -> Result<(), Error> {
        let options = self.options.ok_or(Error::InvalidArgument)?;
        let timer = self.command_timer();

        self.transport.connect()?;
        self.keep_alive_seconds = options.keep_alive_seconds;

        let len = packet::serialize_connect(&mut self.tx_buf, &options)?;
        self.send_packet(len, &timer)?;
        self.wait_for_read(PacketType::Connack, &timer, router)?;

        let connack = packet::deserialize_connack(&self.rx_buf)?;
        if let Some(code) = ConnackCode::from_return_code(connack.return_code) {
            return Err(Error::ConnectionRefused(code));
        }
        log::debug!("session present: {}", connack.session_present);

        self.ping_outstanding = false;
        self.ping_timer
            .countdown_sec(&self.clock, u32::from(self.keep_alive_seconds));
        Ok(())
    }

    /// Send DISCONNECT and close the transport.
    ///
    /// The DISCONNECT packet is best effort; the transport is closed either
    /// way and the client ends up
    /// [`DisconnectedManually`](ClientState::DisconnectedManually).
    ///
    /// # Errors
    ///
    /// * [`Error::NetworkDisconnected`] - the client was not connected
    /// * [`Error::Network`] - the transport could not be destroyed; the prior
    ///   state is kept
    pub fn disconnect(&mut self) -> Result<(), Error> {
        let state = self.state();
        if !state.is_connected() {
            return Err(Error::NetworkDisconnected);
        }
        self.set_state(state, ClientState::Disconnecting)?;

        match self.disconnect_inner() {
            Ok(()) => {
                log::info!("disconnected");
                self.force_state(ClientState::DisconnectedManually);
                Ok(())
            }
            Err(e) => {
                self.force_state(state);
                Err(e)
            }
        }
    }

    fn disconnect_inner(&mut self) -> Result<(), Error> {
        let timer = self.command_timer();
        let len = packet::serialize_zero(&mut self.tx_buf, PacketType::Disconnect)?;
        if let Err(e) = self.send_packet(len, &timer) {
            log::debug!("DISCONNECT not sent: {:?}", e);
        }
        let _ = self.transport.disconnect();
        self.transport.destroy()?;
        Ok(())
    }

    /// Tear down after a lost connection and notify the disconnect handler.
    ///
    /// Always leaves the client in `DisconnectedError` and returns
    /// [`Error::NetworkDisconnected`] for the caller to propagate.
    pub(super) fn handle_disconnect(&mut self) -> Error {
        if let Err(e) = self.disconnect() {
            log::error!("clean disconnect failed ({:?}), forcing teardown", e);
            self.force_state(ClientState::DisconnectedError);
            let _ = self.transport.disconnect();
            let _ = self.transport.destroy();
        }
        if let Some(handler) = self.disconnect_handler {
            handler.on_disconnect();
        }
        self.force_state(ClientState::DisconnectedError);
        Error::NetworkDisconnected
    }
}
