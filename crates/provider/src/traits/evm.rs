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

//! Trait for interacting with chain data and contracts.

use alloy_json_rpc::{RpcRecv, RpcSend};
use alloy_primitives::{Address, Bytes, TxHash, B256, U256};
use alloy_rpc_types_eth::{
    state::StateOverride, AccessListResult, BlockId, Filter, Log, TransactionReceipt,
    TransactionRequest,
};
#[cfg(feature = "test-utils")]
use mockall::automock;
use relayer_types::StorageMap;
use serde::Serialize;

use super::error::ProviderResult;

/// Options of `eth_sendRawTransactionConditional`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalOptions {
    /// Expected storage of the accounts touched by the transaction
    pub known_accounts: StorageMap,
}

/// Trait for interacting with chain data and contracts.
#[cfg_attr(feature = "test-utils", automock)]
#[async_trait::async_trait]
pub trait EvmProvider: Send + Sync + 'static {
    /// Make an arbitrary JSON RPC request to the provider
    async fn request<P, R>(&self, method: &'static str, params: P) -> ProviderResult<R>
    where
        P: RpcSend + 'static,
        R: RpcRecv + 'static;

    /// Simulate a transaction via an eth_call
    async fn call(
        &self,
        tx: &TransactionRequest,
        block: Option<BlockId>,
        state_override: &StateOverride,
    ) -> ProviderResult<Bytes>;

    /// Get the current block number
    async fn get_block_number(&self) -> ProviderResult<u64>;

    /// Get the balance of an address
    async fn get_balance(&self, address: Address, block: Option<BlockId>) -> ProviderResult<U256>;

    /// Get the nonce/transaction count of an address
    async fn get_transaction_count(&self, address: Address) -> ProviderResult<u64>;

    /// Get the code at an address
    async fn get_code(&self, address: Address, block: Option<BlockId>) -> ProviderResult<Bytes>;

    /// Get the value of a storage slot
    async fn get_storage_at(
        &self,
        address: Address,
        slot: B256,
        block: Option<BlockId>,
    ) -> ProviderResult<B256>;

    /// Get the storage root of an account from `eth_getProof`
    async fn get_storage_root(&self, address: Address) -> ProviderResult<B256>;

    /// Create the access list of a transaction
    async fn create_access_list(
        &self,
        tx: &TransactionRequest,
        block: Option<BlockId>,
    ) -> ProviderResult<AccessListResult>;

    /// Get the logs matching a filter
    async fn get_logs(&self, filter: &Filter) -> ProviderResult<Vec<Log>>;

    /// Get the base fee per gas of the pending block
    async fn get_pending_base_fee(&self) -> ProviderResult<u128>;

    /// Get the max priority fee per gas as reported by the node's RPC
    async fn get_max_priority_fee(&self) -> ProviderResult<u128>;

    /// Get transaction receipt by hash
    async fn get_transaction_receipt(
        &self,
        tx: TxHash,
    ) -> ProviderResult<Option<TransactionReceipt>>;

    /// Broadcast a signed transaction
    async fn send_raw_transaction(&self, tx: Bytes) -> ProviderResult<TxHash>;

    /// Broadcast a signed transaction that is only valid while the
    /// expected account storage holds
    async fn send_raw_transaction_conditional(
        &self,
        tx: Bytes,
        options: ConditionalOptions,
    ) -> ProviderResult<TxHash>;
}
