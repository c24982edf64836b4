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

use alloy_primitives::{Address, Bytes, U256};
use alloy_rpc_types_eth::{BlockId, TransactionRequest};
#[cfg(feature = "test-utils")]
use mockall::automock;
use relayer_types::{GasFees, UserOperation};

use super::error::ProviderResult;

/// Result of an entry point handle ops call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandleOpsOut {
    /// Call succeeded
    Success,
    /// Call failed due to a failed operation at index `usize` with reason `String`
    FailedOp(usize, String),
    /// Call reverted with data that is not an entry point error
    Revert(Bytes),
}

/// Result of `simulateValidation` that matters to the relay
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimulationReturn {
    /// Gas used by validation, including pre-verification gas
    pub pre_op_gas: u128,
    /// Prefund required from the payer
    pub prefund: U256,
}

/// Reason `simulateValidation` reverted
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationRevert {
    /// The entry point rejected the operation, reason is `AAxx` prefixed
    #[error("{0}")]
    EntryPoint(String),
    /// A plain `Error(string)` or panic revert
    #[error("{0}")]
    Reason(String),
    /// Revert data that could not be decoded
    #[error("unknown revert data {0}")]
    Unknown(Bytes),
}

/// Trait for interacting with a v0.7 entry point contract.
#[cfg_attr(feature = "test-utils", automock)]
#[async_trait::async_trait]
pub trait EntryPoint: Send + Sync + 'static {
    /// Get the address of the entry point contract
    fn address(&self) -> Address;

    /// Get the deposit of an address held by the entry point
    async fn balance_of(&self, address: Address, block_id: Option<BlockId>)
        -> ProviderResult<U256>;

    /// Build the `simulateValidation` call for an operation
    fn simulate_validation_request(&self, op: &UserOperation, gas_limit: u64)
        -> TransactionRequest;

    /// Call `simulateValidation` for an operation
    async fn simulate_validation(
        &self,
        op: UserOperation,
        gas_limit: u64,
    ) -> ProviderResult<Result<SimulationReturn, ValidationRevert>>;

    /// Dry-run `handleOps` with an `eth_call` from `sender_eoa`
    async fn call_handle_ops(
        &self,
        ops: Vec<UserOperation>,
        beneficiary: Address,
        sender_eoa: Address,
        gas_limit: u64,
        gas_fees: GasFees,
    ) -> ProviderResult<HandleOpsOut>;

    /// Construct the transaction to send a bundle of operations to the entry point contract
    fn get_send_bundle_transaction(
        &self,
        ops: Vec<UserOperation>,
        beneficiary: Address,
        gas_limit: u64,
        gas_fees: GasFees,
    ) -> TransactionRequest;

    /// Decode the revert data of a `handleOps` call
    fn decode_handle_ops_revert(&self, revert_data: &Bytes) -> HandleOpsOut;
}
