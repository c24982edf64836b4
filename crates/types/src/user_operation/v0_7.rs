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

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use relayer_contracts::v0_7::PackedUserOperation;

use super::UserOperationId;
use crate::{Entity, GasFees};

/// User operation for the v0.7 entry point.
///
/// Offchain version, must be packed before sending onchain. The hash is
/// computed once at build time for the entry point and chain it was built for.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UserOperation {
    /// Sender
    pub sender: Address,
    /// Semi-abstracted nonce
    pub nonce: U256,
    /// Factory, only set if the sender still needs to be deployed
    pub factory: Option<Address>,
    /// Factory data
    pub factory_data: Bytes,
    /// Call data
    pub call_data: Bytes,
    /// Call gas limit
    pub call_gas_limit: u128,
    /// Verification gas limit
    pub verification_gas_limit: u128,
    /// Pre-verification gas
    pub pre_verification_gas: u128,
    /// Max priority fee per gas
    pub max_priority_fee_per_gas: u128,
    /// Max fee per gas
    pub max_fee_per_gas: u128,
    /// Paymaster
    pub paymaster: Option<Address>,
    /// Paymaster verification gas limit
    pub paymaster_verification_gas_limit: u128,
    /// Paymaster post-op gas limit
    pub paymaster_post_op_gas_limit: u128,
    /// Paymaster data
    pub paymaster_data: Bytes,
    /// Signature
    pub signature: Bytes,

    hash: B256,
    packed: PackedUserOperation,
}

impl UserOperation {
    /// Hash of the operation, bound to its entry point and chain
    pub fn hash(&self) -> B256 {
        self.hash
    }

    /// Sender and nonce pair identifying this operation
    pub fn id(&self) -> UserOperationId {
        UserOperationId {
            sender: self.sender,
            nonce: self.nonce,
        }
    }

    /// Fees offered by this operation
    pub fn gas_fees(&self) -> GasFees {
        GasFees {
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
        }
    }

    /// Non-sender entities of this operation
    pub fn staked_entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.factory
            .map(Entity::factory)
            .into_iter()
            .chain(self.paymaster.map(Entity::paymaster))
    }

    /// All entities of this operation, starting with the sender
    pub fn entities(&self) -> Vec<Entity> {
        let mut ret = vec![Entity::account(self.sender)];
        ret.extend(self.staked_entities());
        ret
    }

    /// Verification gas limit including the paymaster's
    pub fn total_verification_gas_limit(&self) -> u128 {
        self.verification_gas_limit
            .saturating_add(self.paymaster_verification_gas_limit)
    }

    /// Heap memory held by the variable length fields
    pub fn heap_size(&self) -> usize {
        self.factory_data.len()
            + self.call_data.len()
            + self.paymaster_data.len()
            + self.signature.len()
            + self.packed.initCode.len()
            + self.packed.callData.len()
            + self.packed.paymasterAndData.len()
            + self.packed.signature.len()
    }

    /// Packed form as passed to the entry point
    pub fn packed(&self) -> &PackedUserOperation {
        &self.packed
    }

    /// Consume into the packed form
    pub fn pack(self) -> PackedUserOperation {
        self.packed
    }
}

/// Builder for [`UserOperation`]
#[derive(Debug)]
pub struct UserOperationBuilder {
    // required fields for hash
    entry_point: Address,
    chain_id: u64,

    required: UserOperationRequiredFields,

    factory: Option<Address>,
    factory_data: Bytes,
    paymaster: Option<Address>,
    paymaster_verification_gas_limit: u128,
    paymaster_post_op_gas_limit: u128,
    paymaster_data: Bytes,
}

/// Fields every user operation must set
#[derive(Debug, Clone, Default)]
pub struct UserOperationRequiredFields {
    /// Sender
    pub sender: Address,
    /// Nonce
    pub nonce: U256,
    /// Call data
    pub call_data: Bytes,
    /// Call gas limit
    pub call_gas_limit: u128,
    /// Verification gas limit
    pub verification_gas_limit: u128,
    /// Pre-verification gas
    pub pre_verification_gas: u128,
    /// Max priority fee per gas
    pub max_priority_fee_per_gas: u128,
    /// Max fee per gas
    pub max_fee_per_gas: u128,
    /// Signature
    pub signature: Bytes,
}

impl UserOperationBuilder {
    /// Start a builder for an operation targeting `entry_point` on `chain_id`
    pub fn new(entry_point: Address, chain_id: u64, required: UserOperationRequiredFields) -> Self {
        Self {
            entry_point,
            chain_id,
            required,
            factory: None,
            factory_data: Bytes::new(),
            paymaster: None,
            paymaster_verification_gas_limit: 0,
            paymaster_post_op_gas_limit: 0,
            paymaster_data: Bytes::new(),
        }
    }

    /// Set the factory and its data
    pub fn factory(mut self, factory: Address, factory_data: Bytes) -> Self {
        self.factory = Some(factory);
        self.factory_data = factory_data;
        self
    }

    /// Set the paymaster with its gas limits and data
    pub fn paymaster(
        mut self,
        paymaster: Address,
        paymaster_verification_gas_limit: u128,
        paymaster_post_op_gas_limit: u128,
        paymaster_data: Bytes,
    ) -> Self {
        self.paymaster = Some(paymaster);
        self.paymaster_verification_gas_limit = paymaster_verification_gas_limit;
        self.paymaster_post_op_gas_limit = paymaster_post_op_gas_limit;
        self.paymaster_data = paymaster_data;
        self
    }

    /// Build the operation, packing and hashing it
    pub fn build(self) -> UserOperation {
        let mut uo = UserOperation {
            sender: self.required.sender,
            nonce: self.required.nonce,
            factory: self.factory,
            factory_data: self.factory_data,
            call_data: self.required.call_data,
            call_gas_limit: self.required.call_gas_limit,
            verification_gas_limit: self.required.verification_gas_limit,
            pre_verification_gas: self.required.pre_verification_gas,
            max_priority_fee_per_gas: self.required.max_priority_fee_per_gas,
            max_fee_per_gas: self.required.max_fee_per_gas,
            paymaster: self.paymaster,
            paymaster_verification_gas_limit: self.paymaster_verification_gas_limit,
            paymaster_post_op_gas_limit: self.paymaster_post_op_gas_limit,
            paymaster_data: self.paymaster_data,
            signature: self.required.signature,
            hash: B256::ZERO,
            packed: PackedUserOperation::default(),
        };

        uo.packed = pack_user_operation(&uo);
        uo.hash = hash_packed_user_operation(&uo.packed, self.entry_point, self.chain_id);
        uo
    }
}

fn pack_user_operation(uo: &UserOperation) -> PackedUserOperation {
    let init_code = match uo.factory {
        Some(factory) => {
            let mut init_code = factory.to_vec();
            init_code.extend_from_slice(&uo.factory_data);
            Bytes::from(init_code)
        }
        None => Bytes::new(),
    };

    let paymaster_and_data = match uo.paymaster {
        Some(paymaster) => {
            let mut paymaster_and_data = paymaster.to_vec();
            paymaster_and_data
                .extend_from_slice(&uo.paymaster_verification_gas_limit.to_be_bytes());
            paymaster_and_data.extend_from_slice(&uo.paymaster_post_op_gas_limit.to_be_bytes());
            paymaster_and_data.extend_from_slice(&uo.paymaster_data);
            Bytes::from(paymaster_and_data)
        }
        None => Bytes::new(),
    };

    PackedUserOperation {
        sender: uo.sender,
        nonce: uo.nonce,
        initCode: init_code,
        callData: uo.call_data.clone(),
        accountGasLimits: concat_128(uo.verification_gas_limit, uo.call_gas_limit),
        preVerificationGas: U256::from(uo.pre_verification_gas),
        gasFees: concat_128(uo.max_priority_fee_per_gas, uo.max_fee_per_gas),
        paymasterAndData: paymaster_and_data,
        signature: uo.signature.clone(),
    }
}

fn hash_packed_user_operation(
    puo: &PackedUserOperation,
    entry_point: Address,
    chain_id: u64,
) -> B256 {
    let encoded = (
        puo.sender,
        puo.nonce,
        keccak256(&puo.initCode),
        keccak256(&puo.callData),
        puo.accountGasLimits,
        puo.preVerificationGas,
        puo.gasFees,
        keccak256(&puo.paymasterAndData),
    )
        .abi_encode();

    keccak256((keccak256(encoded), entry_point, U256::from(chain_id)).abi_encode())
}

/// Two 128 bit values packed high then low into a 32 byte word
fn concat_128(high: u128, low: u128) -> B256 {
    let mut word = [0u8; 32];
    word[..16].copy_from_slice(&high.to_be_bytes());
    word[16..].copy_from_slice(&low.to_be_bytes());
    B256::from(word)
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, bytes};

    use super::*;

    fn required() -> UserOperationRequiredFields {
        UserOperationRequiredFields {
            sender: address!("b292Cf4a8E1fF21Ac27C4f94071Cd02C022C414b"),
            nonce: U256::from(1),
            call_data: bytes!("e9ae5c53"),
            call_gas_limit: 0x2dbf8,
            verification_gas_limit: 0x1fe14,
            pre_verification_gas: 0xdb25,
            max_priority_fee_per_gas: 0xf4240,
            max_fee_per_gas: 0x2fb1f4a5,
            signature: bytes!("bb8e1e9b5d6c3f1e"),
        }
    }

    #[test]
    fn packs_gas_limits_big_endian() {
        let uo = UserOperationBuilder::new(Address::ZERO, 1, required()).build();
        let packed = uo.packed();
        assert_eq!(&packed.accountGasLimits[13..16], &[0x01, 0xfe, 0x14]);
        assert_eq!(&packed.accountGasLimits[29..32], &[0x02, 0xdb, 0xf8]);
        assert!(packed.accountGasLimits[..13].iter().all(|b| *b == 0));
        assert_eq!(&packed.gasFees[12..16], &[0x00, 0x0f, 0x42, 0x40]);
        assert_eq!(&packed.gasFees[28..32], &[0x2f, 0xb1, 0xf4, 0xa5]);
        assert!(packed.initCode.is_empty());
        assert!(packed.paymasterAndData.is_empty());
    }

    #[test]
    fn packs_factory_and_paymaster() {
        let factory = Address::repeat_byte(0xfa);
        let paymaster = Address::repeat_byte(0xbb);
        let uo = UserOperationBuilder::new(Address::ZERO, 1, required())
            .factory(factory, bytes!("1234"))
            .paymaster(paymaster, 7, 9, bytes!("ff"))
            .build();
        let packed = uo.packed();

        assert_eq!(&packed.initCode[..20], factory.as_slice());
        assert_eq!(&packed.initCode[20..], &[0x12, 0x34]);
        assert_eq!(packed.paymasterAndData.len(), 20 + 16 + 16 + 1);
        assert_eq!(packed.paymasterAndData[35], 7);
        assert_eq!(packed.paymasterAndData[51], 9);
        assert_eq!(uo.entities().len(), 3);
    }

    #[test]
    fn hash_binds_entry_point_and_chain() {
        let ep = Address::repeat_byte(1);
        let a = UserOperationBuilder::new(ep, 1, required()).build();
        let b = UserOperationBuilder::new(ep, 1, required()).build();
        let other_chain = UserOperationBuilder::new(ep, 2, required()).build();
        let other_ep = UserOperationBuilder::new(Address::repeat_byte(2), 1, required()).build();

        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), other_chain.hash());
        assert_ne!(a.hash(), other_ep.hash());
    }
}
