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
use relayer_task::Task;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::mempool::HourlyMovingAverageReputation;

/// Background maintenance of the pool: hourly reputation decay.
pub struct PoolTask {
    reputation: Arc<HourlyMovingAverageReputation>,
}

impl PoolTask {
    /// Create a new pool task
    pub fn new(reputation: Arc<HourlyMovingAverageReputation>) -> Self {
        Self { reputation }
    }

    /// Convert this task into a boxed [`Task`]
    pub fn boxed(self) -> Box<dyn Task> {
        Box::new(self)
    }
}

#[async_trait]
impl Task for PoolTask {
    fn name(&self) -> &'static str {
        "pool"
    }

    async fn run(self: Box<Self>, shutdown_token: CancellationToken) -> anyhow::Result<()> {
        tokio::select! {
            _ = self.reputation.run() => {}
            _ = shutdown_token.cancelled() => {
                info!("Pool task shutting down");
            }
        }
        Ok(())
    }
}
