/*
 *  Copyright (C) 2025 Michael Bachmann
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU Affero General Public License for more details.
 *
 *  You should have received a copy of the GNU Affero General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! The connection state machine (`spec` §4.4.7), generalized from the
//! teacher's subsystem create/run/shutdown lifecycle.

use crate::fifo::state_change_signal;
use tokio::sync::watch;

/// `Init -> WaitingForPeer -> Connected -> Draining -> Closed`. Producing
/// payloads is gated on `Connected`; payloads produced while disconnected
/// are discarded without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Init,
    WaitingForPeer,
    Connected,
    Draining,
    Closed,
}

impl ConnectionState {
    pub fn can_produce_payloads(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Publish/subscribe handle for `connection_state_change` (`spec` §5):
/// written by the transport connection callback, read by every worker
/// waiting on a state transition.
pub struct ConnectionStateSignal {
    tx: watch::Sender<ConnectionState>,
}

impl ConnectionStateSignal {
    pub fn new(initial: ConnectionState) -> (Self, watch::Receiver<ConnectionState>) {
        let (tx, rx) = state_change_signal(initial);
        (ConnectionStateSignal { tx }, rx)
    }

    pub fn set(&self, state: ConnectionState) {
        self.tx.send_replace(state);
    }

    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connected_permits_payload_production() {
        assert!(!ConnectionState::Init.can_produce_payloads());
        assert!(!ConnectionState::WaitingForPeer.can_produce_payloads());
        assert!(ConnectionState::Connected.can_produce_payloads());
        assert!(!ConnectionState::Draining.can_produce_payloads());
        assert!(!ConnectionState::Closed.can_produce_payloads());
    }

    #[test]
    fn signal_publishes_latest_state() {
        let (signal, mut rx) = ConnectionStateSignal::new(ConnectionState::Init);
        signal.set(ConnectionState::WaitingForPeer);
        assert_eq!(signal.get(), ConnectionState::WaitingForPeer);
        rx.mark_changed();
        assert_eq!(*rx.borrow_and_update(), ConnectionState::WaitingForPeer);
    }
}
