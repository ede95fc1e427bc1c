//! Client connection states and the scoped guard that restores them.

use core::ops::{Deref, DerefMut};

use super::client::Client;
use super::error::Error;
use crate::network::Transport;
use crate::system::lock::Lock;
use crate::system::timer::Clock;

/// Connection state of a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClientState {
    /// Not initialized.
    Invalid,
    /// Initialized, never connected.
    Initialized,
    /// CONNECT sent, waiting for CONNACK.
    Connecting,
    /// Connected with no command in progress.
    ConnectedIdle,
    /// Inside `yield_for`.
    ConnectedYieldInProgress,
    /// Inside `publish`.
    ConnectedPublishInProgress,
    /// Inside `subscribe`.
    ConnectedSubscribeInProgress,
    /// Inside `unsubscribe`.
    ConnectedUnsubscribeInProgress,
    /// Re-issuing subscriptions after a reconnect.
    ConnectedResubscribeInProgress,
    /// A message handler is running.
    ConnectedWaitForCbReturn,
    /// Tearing the connection down.
    Disconnecting,
    /// The connection was lost or failed.
    DisconnectedError,
    /// The application disconnected.
    DisconnectedManually,
    /// Waiting for the next auto-reconnect attempt.
    PendingReconnect,
}

impl ClientState {
    /// Whether the broker session is up.
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            ClientState::ConnectedIdle
                | ClientState::ConnectedYieldInProgress
                | ClientState::ConnectedPublishInProgress
                | ClientState::ConnectedSubscribeInProgress
                | ClientState::ConnectedUnsubscribeInProgress
                | ClientState::ConnectedResubscribeInProgress
                | ClientState::ConnectedWaitForCbReturn
        )
    }
}

/// Holds a client in an in-progress state for the duration of a command.
///
/// Dropping the guard moves the client back to the state it was entered from,
/// but only if nothing else changed the state in the meantime. A command that
/// lost the connection leaves `DisconnectedError` in place.
pub(crate) struct StateGuard<'g, 'a, T: Transport, C: Clock, L: Lock> {
    client: &'g mut Client<'a, T, C, L>,
    prior: ClientState,
    entered: ClientState,
}

impl<'g, 'a, T: Transport, C: Clock, L: Lock> StateGuard<'g, 'a, T, C, L> {
    /// Move from any of `allowed` into `entered`.
    pub(crate) fn enter(
        client: &'g mut Client<'a, T, C, L>,
        allowed: &[ClientState],
        entered: ClientState,
    ) -> Result<Self, Error> {
        let prior = client.state();
        if !allowed.contains(&prior) {
            return Err(Error::ClientNotIdle);
        }
        client.set_state(prior, entered).map_err(|e| match e {
            Error::UnexpectedClientState => Error::ClientNotIdle,
            other => other,
        })?;
        Ok(Self {
            client,
            prior,
            entered,
        })
    }
}

impl<'a, T: Transport, C: Clock, L: Lock> Deref for StateGuard<'_, 'a, T, C, L> {
    type Target = Client<'a, T, C, L>;

    fn deref(&self) -> &Self::Target {
        self.client
    }
}

impl<T: Transport, C: Clock, L: Lock> DerefMut for StateGuard<'_, '_, T, C, L> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.client
    }
}

impl<T: Transport, C: Clock, L: Lock> Drop for StateGuard<'_, '_, T, C, L> {
    fn drop(&mut self) {
        if self.client.state() == self.entered
            && self.client.set_state(self.entered, self.prior).is_err()
        {
            log::warn!("could not restore client state {:?}", self.prior);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ClientState;

    #[test]
    fn connected_states() {
        assert!(ClientState::ConnectedIdle.is_connected());
        assert!(ClientState::ConnectedWaitForCbReturn.is_connected());
        assert!(!ClientState::Connecting.is_connected());
        assert!(!ClientState::Disconnecting.is_connected());
        assert!(!ClientState::PendingReconnect.is_connected());
    }
}
