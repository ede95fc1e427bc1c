//! PUBLISH.

use super::client::Client;
use super::error::Error;
use super::packet::{self, PacketType};
use super::state::{ClientState, StateGuard};
use super::{NoRoute, QoS, Router};
use crate::network::Transport;
use crate::system::lock::Lock;
use crate::system::timer::Clock;

impl<'a, T: Transport, C: Clock, L: Lock> Client<'a, T, C, L> {
    /// Publish `payload` to `topic`.
    ///
    /// QoS 0 returns once the packet is written. QoS 1 blocks until the next
    /// PUBACK arrives or the command timeout expires. Either way the client
    /// returns to the state it was in.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] - `topic` is empty
    /// * [`Error::NetworkDisconnected`] - not connected
    /// * [`Error::ClientNotIdle`] - another command is in progress
    /// * [`Error::TxBufferTooShort`] - the packet does not fit the TX buffer
    /// * [`Error::RequestTimeout`] - no PUBACK in time (QoS 1 only)
    pub fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Result<(), Error> {
        self.publish_routed(topic, payload, qos, retain, &mut NoRoute)
    }

    pub(crate) fn publish_routed(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
        router: &mut dyn Router,
    ) -> Result<(), Error> {
        if topic.is_empty() {
            return Err(Error::InvalidArgument);
        }
        if !self.is_connected() {
            return Err(Error::NetworkDisconnected);
        }
        let mut guard = StateGuard::enter(
            self,
            &[ClientState::ConnectedIdle, ClientState::ConnectedWaitForCbReturn],
            ClientState::ConnectedPublishInProgress,
        )?;
        guard.publish_inner(topic, payload, qos, retain, router)
    }

    fn publish_inner(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
        router: &mut dyn Router,
    ) -> Result<(), Error> {
        let timer = self.command_timer();
        let id = match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => self.next_packet_id(),
        };

        let len = packet::serialize_publish(&mut self.tx_buf, topic, payload, qos, retain, false, id)?;
        self.send_packet(len, &timer)?;
        log::debug!("published {} bytes to {} ({:?})", payload.len(), topic, qos);

        if qos == QoS::AtLeastOnce {
            self.wait_for_read(PacketType::Puback, &timer, router)?;
            let (_, _, acked) = packet::deserialize_ack(&self.rx_buf)?;
            if acked != id {
                log::warn!("PUBACK for {} while waiting on {}", acked, id);
            }
        }
        Ok(())
    }
}
