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

//! The connection's actor-message API, grounded on
//! `vsc::VirtualSoundCardApi`/`VscApiMessage`'s mpsc+oneshot request/reply
//! pattern.

use crate::bridge::state::ConnectionState;
use crate::monitoring::BridgeStatsSnapshot;
use tokio::sync::oneshot;

pub enum ConnectionApiMessage {
    Stats(oneshot::Sender<BridgeStatsSnapshot>),
    State(oneshot::Sender<ConnectionState>),
    Stop(oneshot::Sender<()>),
}

/// Handle returned by `Connection::spawn`. Cloneable; every clone talks to
/// the same connection driver task.
#[derive(Clone)]
pub struct ConnectionApi {
    api_tx: tokio::sync::mpsc::Sender<ConnectionApiMessage>,
}

impl ConnectionApi {
    pub(crate) fn new(api_tx: tokio::sync::mpsc::Sender<ConnectionApiMessage>) -> Self {
        ConnectionApi { api_tx }
    }

    pub async fn stats(&self) -> Option<BridgeStatsSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.api_tx.send(ConnectionApiMessage::Stats(tx)).await.ok()?;
        rx.await.ok()
    }

    pub async fn state(&self) -> Option<ConnectionState> {
        let (tx, rx) = oneshot::channel();
        self.api_tx.send(ConnectionApiMessage::State(tx)).await.ok()?;
        rx.await.ok()
    }

    pub async fn stop(&self) {
        let (tx, rx) = oneshot::channel();
        if self.api_tx.send(ConnectionApiMessage::Stop(tx)).await.is_ok() {
            rx.await.ok();
        }
    }
}
