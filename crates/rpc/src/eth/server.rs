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

use alloy_primitives::{Address, B256, U64};
use jsonrpsee::core::RpcResult;
use relayer_types::pool::Pool;

use super::{api::EthApi, EthApiServer};
use crate::{
    types::{RpcUserOperation, RpcUserOperationByHash},
    utils,
};

#[async_trait::async_trait]
impl<P> EthApiServer for EthApi<P>
where
    P: Pool,
{
    async fn send_user_operation(
        &self,
        op: RpcUserOperation,
        entry_point: Address,
    ) -> RpcResult<B256> {
        utils::safe_call_rpc_handler(
            "eth_sendUserOperation",
            EthApi::send_user_operation(self, op, entry_point),
        )
        .await
    }

    async fn get_user_operation_by_hash(
        &self,
        hash: B256,
    ) -> RpcResult<Option<RpcUserOperationByHash>> {
        utils::safe_call_rpc_handler(
            "eth_getUserOperationByHash",
            EthApi::get_user_operation_by_hash(self, hash),
        )
        .await
    }

    async fn supported_entry_points(&self) -> RpcResult<Vec<String>> {
        utils::safe_call_rpc_handler(
            "eth_supportedEntryPoints",
            EthApi::supported_entry_points(self),
        )
        .await
    }

    async fn chain_id(&self) -> RpcResult<U64> {
        utils::safe_call_rpc_handler("eth_chainId", EthApi::chain_id(self)).await
    }
}
