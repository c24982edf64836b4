// This file is part of Relayer.
//
// Relayer is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Relayer is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Relayer.
// If not, see https://www.gnu.org/licenses/.

use anyhow::Context;
use relayer_types::builder::{BuilderError, BuilderResult, SentBundle};
use tokio::sync::{mpsc, oneshot};

/// Receives the result of a manually triggered cycle
pub(crate) type Responder = oneshot::Sender<BuilderResult<Option<SentBundle>>>;

/// Channel for manual triggers.
///
/// Holds at most one pending trigger, further triggers are refused until it is
/// picked up.
pub(crate) fn new_trigger_channel() -> (TriggerSender, TriggerReceiver) {
    let (trigger, trigger_recv) = mpsc::channel(1);
    (
        TriggerSender { trigger },
        TriggerReceiver {
            trigger: trigger_recv,
        },
    )
}

#[derive(Debug, Clone)]
pub(crate) struct TriggerSender {
    trigger: mpsc::Sender<Responder>,
}

#[derive(Debug)]
pub(crate) struct TriggerReceiver {
    trigger: mpsc::Receiver<Responder>,
}

impl TriggerSender {
    pub(crate) fn trigger(&self, responder: Responder) -> BuilderResult<()> {
        self.trigger.try_send(responder).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => BuilderError::Busy,
            mpsc::error::TrySendError::Closed(_) => BuilderError::Shutdown,
        })
    }
}

impl TriggerReceiver {
    pub(crate) async fn wait_for_trigger(&mut self) -> anyhow::Result<Responder> {
        self.trigger.recv().await.context("trigger stream closed")
    }
}
