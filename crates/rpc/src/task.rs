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

use std::{sync::Arc, time::Duration};

use anyhow::bail;
use async_trait::async_trait;
use jsonrpsee::{
    server::{middleware::http::ProxyGetRequestLayer, ServerBuilder},
    RpcModule,
};
use relayer_task::{server, Task};
use relayer_types::{
    builder::Builder,
    pool::{Pool, ReputationManager},
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    debug::{DebugApi, DebugApiServer},
    eth::{EthApi, EthApiServer, EthApiSettings},
    health::{HealthChecker, SystemApiServer},
    types::ApiNamespace,
};

/// RPC server arguments.
#[derive(Debug)]
pub struct Args {
    /// Port to listen on.
    pub port: u16,
    /// Host to listen on.
    pub host: String,
    /// List of API namespaces to enable.
    pub api_namespaces: Vec<ApiNamespace>,
    /// eth_ API settings.
    pub eth_api_settings: EthApiSettings,
    /// RPC timeout.
    pub rpc_timeout: Duration,
    /// Max number of connections.
    pub max_connections: u32,
}

/// JSON-RPC server task.
pub struct RpcTask<P, R, B> {
    args: Args,
    pool: Arc<P>,
    reputation: Arc<R>,
    builder: B,
}

#[async_trait]
impl<P, R, B> Task for RpcTask<P, R, B>
where
    P: Pool,
    R: ReputationManager,
    B: Builder + Clone,
{
    fn name(&self) -> &'static str {
        "rpc"
    }

    async fn run(self: Box<Self>, shutdown_token: CancellationToken) -> anyhow::Result<()> {
        let addr = server::parse_socket_addr(&self.args.host, self.args.port)?;
        info!("Starting rpc server on {}", addr);

        let mut module = RpcModule::new(());
        self.attach_namespaces(&mut module)?;
        module.merge(HealthChecker::new(Arc::clone(&self.pool)).into_rpc())?;

        let service_builder = tower::ServiceBuilder::new()
            // Proxy `GET /health` requests to internal `system_health` method.
            .layer(ProxyGetRequestLayer::new("/health", "system_health")?)
            .timeout(self.args.rpc_timeout);

        let server = ServerBuilder::default()
            .set_http_middleware(service_builder)
            .max_connections(self.args.max_connections)
            .http_only()
            .build(addr)
            .await?;
        let handle = server.start(module);

        info!("Started RPC server");

        tokio::select! {
            _ = handle.clone().stopped() => {
                tracing::error!("RPC server stopped unexpectedly");
                bail!("RPC server stopped unexpectedly")
            }
            _ = shutdown_token.cancelled() => {
                let _ = handle.stop();
                info!("Server shutdown");
                Ok(())
            }
        }
    }
}

impl<P, R, B> RpcTask<P, R, B>
where
    P: Pool,
    R: ReputationManager,
    B: Builder + Clone,
{
    /// Creates a new RPC server task.
    pub fn new(args: Args, pool: Arc<P>, reputation: Arc<R>, builder: B) -> Self {
        Self {
            args,
            pool,
            reputation,
            builder,
        }
    }

    /// Converts the task into a boxed trait object.
    pub fn boxed(self) -> Box<dyn Task> {
        Box::new(self)
    }

    fn attach_namespaces(&self, module: &mut RpcModule<()>) -> anyhow::Result<()> {
        for api in &self.args.api_namespaces {
            match api {
                ApiNamespace::Eth => module.merge(
                    EthApi::new(self.args.eth_api_settings, Arc::clone(&self.pool)).into_rpc(),
                )?,
                ApiNamespace::Debug => module.merge(
                    DebugApi::new(
                        Arc::clone(&self.pool),
                        Arc::clone(&self.reputation),
                        self.builder.clone(),
                    )
                    .into_rpc(),
                )?,
            }
        }

        Ok(())
    }
}
