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

use alloy_primitives::Address;
use anyhow::Context;
use async_trait::async_trait;
use jsonrpsee::{core::RpcResult, proc_macros::rpc};
use relayer_types::{
    builder::{Builder, BuilderError, BundlingMode, SentBundle},
    pool::{Pool, ReputationManager},
};

use crate::{
    eth::{EthResult, EthRpcError},
    types::{RpcReputationInput, RpcReputationOutput, RpcUserOperation},
    utils::{self, InternalRpcResult},
};

/// Debug API
#[rpc(client, server, namespace = "debug")]
pub trait DebugApi {
    /// Clears the pool and all reputation data.
    #[method(name = "bundler_clearState")]
    async fn bundler_clear_state(&self) -> RpcResult<String>;

    /// Dumps the mempool in inclusion order.
    #[method(name = "bundler_dumpMempool")]
    async fn bundler_dump_mempool(&self, entry_point: Address) -> RpcResult<Vec<RpcUserOperation>>;

    /// Runs a bundle cycle now, returning the sent bundle if any.
    #[method(name = "bundler_sendBundleNow")]
    async fn bundler_send_bundle_now(&self) -> RpcResult<Option<SentBundle>>;

    /// Sets the bundling mode.
    #[method(name = "bundler_setBundlingMode")]
    async fn bundler_set_bundling_mode(&self, mode: BundlingMode) -> RpcResult<String>;

    /// Sets the reputations of entities on the given entry point.
    #[method(name = "bundler_setReputation")]
    async fn bundler_set_reputation(
        &self,
        reputations: Vec<RpcReputationInput>,
        entry_point: Address,
    ) -> RpcResult<String>;

    /// Dumps the reputations of entities from the given entry point.
    #[method(name = "bundler_dumpReputation")]
    async fn bundler_dump_reputation(
        &self,
        entry_point: Address,
    ) -> RpcResult<Vec<RpcReputationOutput>>;
}

pub(crate) struct DebugApi<P, R, B> {
    pool: Arc<P>,
    reputation: Arc<R>,
    builder: B,
}

impl<P, R, B> DebugApi<P, R, B> {
    pub(crate) fn new(pool: Arc<P>, reputation: Arc<R>, builder: B) -> Self {
        Self {
            pool,
            reputation,
            builder,
        }
    }
}

#[async_trait]
impl<P, R, B> DebugApiServer for DebugApi<P, R, B>
where
    P: Pool,
    R: ReputationManager,
    B: Builder,
{
    async fn bundler_clear_state(&self) -> RpcResult<String> {
        utils::safe_call_rpc_handler("bundler_clearState", DebugApi::bundler_clear_state(self))
            .await
    }

    async fn bundler_dump_mempool(&self, entry_point: Address) -> RpcResult<Vec<RpcUserOperation>> {
        utils::safe_call_rpc_handler(
            "bundler_dumpMempool",
            DebugApi::bundler_dump_mempool(self, entry_point),
        )
        .await
    }

    async fn bundler_send_bundle_now(&self) -> RpcResult<Option<SentBundle>> {
        utils::safe_call_rpc_handler(
            "bundler_sendBundleNow",
            DebugApi::bundler_send_bundle_now(self),
        )
        .await
    }

    async fn bundler_set_bundling_mode(&self, mode: BundlingMode) -> RpcResult<String> {
        utils::safe_call_rpc_handler(
            "bundler_setBundlingMode",
            DebugApi::bundler_set_bundling_mode(self, mode),
        )
        .await
    }

    async fn bundler_set_reputation(
        &self,
        reputations: Vec<RpcReputationInput>,
        entry_point: Address,
    ) -> RpcResult<String> {
        utils::safe_call_rpc_handler(
            "bundler_setReputation",
            DebugApi::bundler_set_reputation(self, reputations, entry_point),
        )
        .await
    }

    async fn bundler_dump_reputation(
        &self,
        entry_point: Address,
    ) -> RpcResult<Vec<RpcReputationOutput>> {
        utils::safe_call_rpc_handler(
            "bundler_dumpReputation",
            DebugApi::bundler_dump_reputation(self, entry_point),
        )
        .await
    }
}

impl<P, R, B> DebugApi<P, R, B>
where
    P: Pool,
    R: ReputationManager,
    B: Builder,
{
    async fn bundler_clear_state(&self) -> InternalRpcResult<String> {
        self.pool.clear();
        self.reputation.clear();
        Ok("ok".to_string())
    }

    async fn bundler_dump_mempool(&self, entry_point: Address) -> EthResult<Vec<RpcUserOperation>> {
        self.check_entry_point(entry_point)?;
        Ok(self
            .pool
            .sorted_for_inclusion()
            .into_iter()
            .map(|po| po.uo.clone().into())
            .collect())
    }

    async fn bundler_send_bundle_now(&self) -> EthResult<Option<SentBundle>> {
        tracing::debug!("Sending bundle");

        match self.builder.debug_send_bundle_now().await {
            Ok(sent) => Ok(sent),
            Err(error @ (BuilderError::Busy | BuilderError::Shutdown)) => {
                Err(EthRpcError::OperationRejected(error.to_string()))
            }
            Err(BuilderError::Other(error)) => {
                tracing::error!("Error sending bundle {error:?}");
                Err(EthRpcError::Internal(error))
            }
        }
    }

    async fn bundler_set_bundling_mode(&self, mode: BundlingMode) -> InternalRpcResult<String> {
        tracing::debug!("Setting bundling mode to {mode}");

        self.builder
            .debug_set_bundling_mode(mode)
            .await
            .context("should set bundling mode")?;

        Ok("ok".to_string())
    }

    async fn bundler_set_reputation(
        &self,
        reputations: Vec<RpcReputationInput>,
        entry_point: Address,
    ) -> EthResult<String> {
        self.check_entry_point(entry_point)?;
        for r in reputations {
            self.reputation
                .set_reputation(r.address, r.ops_seen.to(), r.ops_included.to());
        }
        Ok("ok".to_string())
    }

    async fn bundler_dump_reputation(
        &self,
        entry_point: Address,
    ) -> EthResult<Vec<RpcReputationOutput>> {
        self.check_entry_point(entry_point)?;
        Ok(self
            .reputation
            .dump_reputation()
            .into_iter()
            .map(Into::into)
            .collect())
    }

    fn check_entry_point(&self, entry_point: Address) -> EthResult<()> {
        if entry_point != self.pool.entry_point() {
            return Err(EthRpcError::InvalidParams(format!(
                "entry point {entry_point} is not supported"
            )));
        }
        Ok(())
    }
}
