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

use std::sync::Arc;

use async_trait::async_trait;
use relayer_types::builder::{Builder, BuilderError, BuilderResult, BundlingMode, SentBundle};
use tokio::sync::{oneshot, watch};

use crate::trigger::TriggerSender;

/// Handle to a builder task running in this process
#[derive(Debug, Clone)]
pub struct LocalBuilderHandle {
    trigger: TriggerSender,
    mode: Arc<watch::Sender<BundlingMode>>,
}

impl LocalBuilderHandle {
    pub(crate) fn new(trigger: TriggerSender, mode: Arc<watch::Sender<BundlingMode>>) -> Self {
        Self { trigger, mode }
    }
}

#[async_trait]
impl Builder for LocalBuilderHandle {
    async fn debug_send_bundle_now(&self) -> BuilderResult<Option<SentBundle>> {
        let (responder, response) = oneshot::channel();
        self.trigger.trigger(responder)?;
        response.await.map_err(|_| BuilderError::Shutdown)?
    }

    async fn debug_set_bundling_mode(&self, mode: BundlingMode) -> BuilderResult<()> {
        self.mode.send_replace(mode);
        Ok(())
    }
}
