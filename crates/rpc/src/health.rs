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
use jsonrpsee::{core::RpcResult, proc_macros::rpc};
use relayer_types::pool::Pool;

#[rpc(server, namespace = "system")]
pub(crate) trait SystemApi {
    #[method(name = "health")]
    async fn get_health(&self) -> RpcResult<String>;
}

/// Answers `GET /health` while the server is up, reporting the pool size
pub(crate) struct HealthChecker<P> {
    pool: Arc<P>,
}

impl<P> HealthChecker<P> {
    pub(crate) fn new(pool: Arc<P>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl<P: Pool> SystemApiServer for HealthChecker<P> {
    async fn get_health(&self) -> RpcResult<String> {
        Ok(format!("ok, {} ops pooled", self.pool.size()))
    }
}
