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

use alloy_json_rpc::{RpcRecv, RpcSend};
use alloy_primitives::{Address, Bytes, TxHash, B256, U256};
use alloy_provider::Provider as AlloyProvider;
use alloy_rpc_types_eth::{
    state::StateOverride, AccessListResult, BlockId, BlockNumberOrTag, Filter, Log,
    TransactionReceipt, TransactionRequest,
};
use anyhow::Context;
use tracing::instrument;

use crate::{ConditionalOptions, EvmProvider, ProviderResult};

/// Evm Provider implementation using [alloy-provider](https://github.com/alloy-rs/alloy-rs)
#[derive(Clone, Debug)]
pub struct AlloyEvmProvider<AP> {
    inner: AP,
}

impl<AP> AlloyEvmProvider<AP> {
    /// Create a new `AlloyEvmProvider`
    pub fn new(inner: AP) -> Self {
        Self { inner }
    }
}

#[async_trait::async_trait]
impl<AP> EvmProvider for AlloyEvmProvider<AP>
where
    AP: AlloyProvider + 'static,
{
    async fn request<P, R>(&self, method: &'static str, params: P) -> ProviderResult<R>
    where
        P: RpcSend + 'static,
        R: RpcRecv + 'static,
    {
        Ok(self.inner.raw_request(method.into(), params).await?)
    }

    #[instrument(skip_all)]
    async fn call(
        &self,
        tx: &TransactionRequest,
        block: Option<BlockId>,
        state_override: &StateOverride,
    ) -> ProviderResult<Bytes> {
        let mut call = self.inner.call(tx.clone());
        if let Some(block) = block {
            call = call.block(block);
        }
        if !state_override.is_empty() {
            call = call.overrides(state_override.clone());
        }

        Ok(call.await?)
    }

    async fn get_block_number(&self) -> ProviderResult<u64> {
        Ok(self.inner.get_block_number().await?)
    }

    async fn get_balance(&self, address: Address, block: Option<BlockId>) -> ProviderResult<U256> {
        let mut call = self.inner.get_balance(address);
        if let Some(block) = block {
            call = call.block_id(block);
        }

        Ok(call.await?)
    }

    async fn get_transaction_count(&self, address: Address) -> ProviderResult<u64> {
        Ok(self.inner.get_transaction_count(address).await?)
    }

    async fn get_code(&self, address: Address, block: Option<BlockId>) -> ProviderResult<Bytes> {
        let mut call = self.inner.get_code_at(address);
        if let Some(block) = block {
            call = call.block_id(block);
        }

        Ok(call.await?)
    }

    async fn get_storage_at(
        &self,
        address: Address,
        slot: B256,
        block: Option<BlockId>,
    ) -> ProviderResult<B256> {
        let mut call = self
            .inner
            .get_storage_at(address, U256::from_be_bytes(slot.0));
        if let Some(block) = block {
            call = call.block_id(block);
        }

        let value = call.await?;
        Ok(B256::from(value.to_be_bytes::<32>()))
    }

    async fn get_storage_root(&self, address: Address) -> ProviderResult<B256> {
        Ok(self.inner.get_proof(address, vec![]).await?.storage_hash)
    }

    #[instrument(skip_all)]
    async fn create_access_list(
        &self,
        tx: &TransactionRequest,
        block: Option<BlockId>,
    ) -> ProviderResult<AccessListResult> {
        let mut call = self.inner.create_access_list(tx);
        if let Some(block) = block {
            call = call.block_id(block);
        }

        Ok(call.await?)
    }

    async fn get_logs(&self, filter: &Filter) -> ProviderResult<Vec<Log>> {
        Ok(self.inner.get_logs(filter).await?)
    }

    async fn get_pending_base_fee(&self) -> ProviderResult<u128> {
        let block = self
            .inner
            .get_block_by_number(BlockNumberOrTag::Pending)
            .await?
            .context("pending block should exist")?;
        let base_fee = block
            .header
            .base_fee_per_gas
            .context("pending block should have a nonempty base fee")?;
        Ok(u128::from(base_fee))
    }

    async fn get_max_priority_fee(&self) -> ProviderResult<u128> {
        Ok(self.inner.get_max_priority_fee_per_gas().await?)
    }

    async fn get_transaction_receipt(
        &self,
        tx: TxHash,
    ) -> ProviderResult<Option<TransactionReceipt>> {
        Ok(self.inner.get_transaction_receipt(tx).await?)
    }

    #[instrument(skip_all)]
    async fn send_raw_transaction(&self, tx: Bytes) -> ProviderResult<TxHash> {
        self.request("eth_sendRawTransaction", (tx,)).await
    }

    #[instrument(skip_all)]
    async fn send_raw_transaction_conditional(
        &self,
        tx: Bytes,
        options: ConditionalOptions,
    ) -> ProviderResult<TxHash> {
        self.request("eth_sendRawTransactionConditional", (tx, options))
            .await
    }
}
