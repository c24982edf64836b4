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

use alloy_primitives::{Address, Bytes, B256, U128, U256, U64};
use relayer_types::{
    pool::{Reputation, ReputationStatus},
    UserOperation, UserOperationBuilder, UserOperationRequiredFields,
};
use serde::{Deserialize, Serialize};

use crate::eth::EthRpcError;

/// API namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ApiNamespace {
    /// `eth_` user operation methods
    Eth,
    /// `debug_bundler_` controls
    Debug,
}

/// User operation definition for RPC inputs, entry point v0.7 layout
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RpcUserOperation {
    sender: Address,
    nonce: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    factory: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    factory_data: Option<Bytes>,
    call_data: Bytes,
    call_gas_limit: U128,
    verification_gas_limit: U128,
    pre_verification_gas: U128,
    max_fee_per_gas: U128,
    max_priority_fee_per_gas: U128,
    #[serde(skip_serializing_if = "Option::is_none")]
    paymaster: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    paymaster_verification_gas_limit: Option<U128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    paymaster_post_op_gas_limit: Option<U128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    paymaster_data: Option<Bytes>,
    signature: Bytes,
}

impl From<UserOperation> for RpcUserOperation {
    fn from(op: UserOperation) -> Self {
        let factory_data = op.factory.map(|_| op.factory_data.clone());
        let (paymaster_verification_gas_limit, paymaster_post_op_gas_limit, paymaster_data) =
            match op.paymaster {
                Some(_) => (
                    Some(U128::from(op.paymaster_verification_gas_limit)),
                    Some(U128::from(op.paymaster_post_op_gas_limit)),
                    Some(op.paymaster_data.clone()),
                ),
                None => (None, None, None),
            };

        RpcUserOperation {
            sender: op.sender,
            nonce: op.nonce,
            factory: op.factory,
            factory_data,
            call_data: op.call_data,
            call_gas_limit: U128::from(op.call_gas_limit),
            verification_gas_limit: U128::from(op.verification_gas_limit),
            pre_verification_gas: U128::from(op.pre_verification_gas),
            max_fee_per_gas: U128::from(op.max_fee_per_gas),
            max_priority_fee_per_gas: U128::from(op.max_priority_fee_per_gas),
            paymaster: op.paymaster,
            paymaster_verification_gas_limit,
            paymaster_post_op_gas_limit,
            paymaster_data,
            signature: op.signature,
        }
    }
}

impl RpcUserOperation {
    /// Convert into an operation hashed for `entry_point` on `chain_id`
    pub(crate) fn into_user_operation(
        self,
        entry_point: Address,
        chain_id: u64,
    ) -> Result<UserOperation, EthRpcError> {
        if self.factory.is_none() && self.factory_data.as_ref().is_some_and(|d| !d.is_empty()) {
            return Err(EthRpcError::InvalidParams(
                "factoryData requires a factory".to_string(),
            ));
        }
        let has_paymaster_fields = self.paymaster_verification_gas_limit.is_some()
            || self.paymaster_post_op_gas_limit.is_some()
            || self.paymaster_data.as_ref().is_some_and(|d| !d.is_empty());
        if self.paymaster.is_none() && has_paymaster_fields {
            return Err(EthRpcError::InvalidParams(
                "paymaster fields require a paymaster".to_string(),
            ));
        }

        let mut builder = UserOperationBuilder::new(
            entry_point,
            chain_id,
            UserOperationRequiredFields {
                sender: self.sender,
                nonce: self.nonce,
                call_data: self.call_data,
                call_gas_limit: self.call_gas_limit.to(),
                verification_gas_limit: self.verification_gas_limit.to(),
                pre_verification_gas: self.pre_verification_gas.to(),
                max_priority_fee_per_gas: self.max_priority_fee_per_gas.to(),
                max_fee_per_gas: self.max_fee_per_gas.to(),
                signature: self.signature,
            },
        );
        if let Some(factory) = self.factory {
            builder = builder.factory(factory, self.factory_data.unwrap_or_default());
        }
        if let Some(paymaster) = self.paymaster {
            builder = builder.paymaster(
                paymaster,
                self.paymaster_verification_gas_limit
                    .unwrap_or_default()
                    .to(),
                self.paymaster_post_op_gas_limit.unwrap_or_default().to(),
                self.paymaster_data.unwrap_or_default(),
            );
        }
        Ok(builder.build())
    }
}

/// User operation with additional metadata
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RpcUserOperationByHash {
    /// The full user operation
    pub(crate) user_operation: RpcUserOperation,
    /// The entry point address this operation was sent to
    pub(crate) entry_point: Address,
    /// The number of the block this operation was included in
    pub(crate) block_number: Option<U256>,
    /// The hash of the block this operation was included in
    pub(crate) block_hash: Option<B256>,
    /// The hash of the transaction this operation was included in
    pub(crate) transaction_hash: Option<B256>,
}

/// Reputation of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReputationInput {
    /// Entity address
    pub address: Address,
    /// Number of operations seen in this interval
    pub ops_seen: U64,
    /// Number of operations included in this interval
    pub ops_included: U64,
}

/// Reputation of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReputationOutput {
    /// Entity address
    pub address: Address,
    /// Number of operations seen in this interval
    pub ops_seen: U64,
    /// Number of operations included in this interval
    pub ops_included: U64,
    /// Reputation status
    pub status: ReputationStatus,
}

impl From<Reputation> for RpcReputationOutput {
    fn from(reputation: Reputation) -> Self {
        Self {
            address: reputation.address,
            ops_seen: U64::from(reputation.ops_seen),
            ops_included: U64::from(reputation.ops_included),
            status: reputation.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, bytes};

    use super::*;

    const ENTRY_POINT: Address = address!("0000000071727de22e5e9d8baf0edac6f37da032");

    fn json_op() -> serde_json::Value {
        serde_json::json!({
            "sender": "0x1111111111111111111111111111111111111111",
            "nonce": "0x1",
            "factory": "0x2222222222222222222222222222222222222222",
            "factoryData": "0xabcd",
            "callData": "0x",
            "callGasLimit": "0x186a0",
            "verificationGasLimit": "0x186a0",
            "preVerificationGas": "0xc350",
            "maxFeePerGas": "0x3b9aca00",
            "maxPriorityFeePerGas": "0x5f5e100",
            "paymaster": "0x3333333333333333333333333333333333333333",
            "paymasterVerificationGasLimit": "0x7530",
            "paymasterPostOpGasLimit": "0x0",
            "paymasterData": "0x01",
            "signature": "0xff"
        })
    }

    #[test]
    fn parses_packed_fields() {
        let rpc: RpcUserOperation = serde_json::from_value(json_op()).unwrap();
        let op = rpc.into_user_operation(ENTRY_POINT, 1).unwrap();

        assert_eq!(op.nonce, U256::from(1));
        assert_eq!(op.call_gas_limit, 100_000);
        assert_eq!(op.max_fee_per_gas, 1_000_000_000);
        assert_eq!(
            op.factory,
            Some(address!("2222222222222222222222222222222222222222"))
        );
        assert_eq!(op.factory_data, bytes!("abcd"));
        assert_eq!(op.paymaster_verification_gas_limit, 30_000);
        assert_eq!(op.paymaster_data, bytes!("01"));
    }

    #[test]
    fn output_matches_input() {
        let rpc: RpcUserOperation = serde_json::from_value(json_op()).unwrap();
        let op = rpc.clone().into_user_operation(ENTRY_POINT, 1).unwrap();
        assert_eq!(RpcUserOperation::from(op), rpc);
    }

    #[test]
    fn hash_depends_on_chain() {
        let rpc: RpcUserOperation = serde_json::from_value(json_op()).unwrap();
        let a = rpc.clone().into_user_operation(ENTRY_POINT, 1).unwrap();
        let b = rpc.into_user_operation(ENTRY_POINT, 137).unwrap();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn paymaster_fields_without_paymaster() {
        let mut value = json_op();
        value.as_object_mut().unwrap().remove("paymaster");
        let rpc: RpcUserOperation = serde_json::from_value(value).unwrap();
        assert!(matches!(
            rpc.into_user_operation(ENTRY_POINT, 1),
            Err(EthRpcError::InvalidParams(_))
        ));
    }

    #[test]
    fn omits_absent_optionals() {
        let mut value = json_op();
        let obj = value.as_object_mut().unwrap();
        for key in [
            "factory",
            "factoryData",
            "paymaster",
            "paymasterVerificationGasLimit",
            "paymasterPostOpGasLimit",
            "paymasterData",
        ] {
            obj.remove(key);
        }
        let rpc: RpcUserOperation = serde_json::from_value(value).unwrap();
        let op = rpc.into_user_operation(ENTRY_POINT, 1).unwrap();
        let out = serde_json::to_value(RpcUserOperation::from(op)).unwrap();
        assert!(out.get("factory").is_none());
        assert!(out.get("paymasterData").is_none());
    }
}
