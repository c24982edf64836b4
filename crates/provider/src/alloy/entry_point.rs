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
use alloy_rpc_types_eth::{
    state::{AccountOverride, StateOverride},
    BlockId, TransactionRequest,
};
use alloy_sol_types::{ContractError, SolCall, SolInterface, SolValue};
use relayer_contracts::v0_7::{
    IEntryPoint::{self, FailedOp, FailedOpWithRevert, IEntryPointErrors},
    IEntryPointSimulations::{self, ValidationResult},
};
use relayer_types::{GasFees, UserOperation};
use relayer_utils::math;
use tracing::instrument;

use crate::{
    EntryPoint, EvmProvider, HandleOpsOut, ProviderResult, SimulationReturn, ValidationRevert,
};

/// Entry point provider for the v0.7 ABI
#[derive(Clone, Debug)]
pub struct EntryPointProvider<P> {
    address: Address,
    chain_id: u64,
    provider: P,
    simulations_code: Option<Bytes>,
}

impl<P> EntryPointProvider<P> {
    /// Create a new entry point provider.
    ///
    /// When `simulations_code` is set it replaces the entry point code during
    /// `simulateValidation` calls.
    pub fn new(
        address: Address,
        chain_id: u64,
        provider: P,
        simulations_code: Option<Bytes>,
    ) -> Self {
        Self {
            address,
            chain_id,
            provider,
            simulations_code,
        }
    }

    /// Chain the entry point is deployed on
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn simulation_overrides(&self) -> StateOverride {
        let mut overrides = StateOverride::default();
        if let Some(code) = &self.simulations_code {
            overrides.insert(
                self.address,
                AccountOverride {
                    code: Some(code.clone()),
                    ..Default::default()
                },
            );
        }
        overrides
    }
}

#[async_trait::async_trait]
impl<P> EntryPoint for EntryPointProvider<P>
where
    P: EvmProvider,
{
    fn address(&self) -> Address {
        self.address
    }

    #[instrument(skip(self))]
    async fn balance_of(
        &self,
        address: Address,
        block_id: Option<BlockId>,
    ) -> ProviderResult<U256> {
        let tx = TransactionRequest::default()
            .to(self.address)
            .input(Bytes::from(IEntryPoint::balanceOfCall { account: address }.abi_encode()).into());
        let ret = self
            .provider
            .call(&tx, block_id, &StateOverride::default())
            .await?;
        let balance = <U256 as SolValue>::abi_decode(&ret)
            .map_err(|e| anyhow::anyhow!("failed to decode balanceOf result: {e}"))?;
        Ok(balance)
    }

    fn simulate_validation_request(
        &self,
        op: &UserOperation,
        gas_limit: u64,
    ) -> TransactionRequest {
        let data = IEntryPointSimulations::simulateValidationCall {
            userOp: op.packed().clone(),
        }
        .abi_encode();
        TransactionRequest::default()
            .to(self.address)
            .gas_limit(gas_limit)
            .input(Bytes::from(data).into())
    }

    #[instrument(skip_all)]
    async fn simulate_validation(
        &self,
        op: UserOperation,
        gas_limit: u64,
    ) -> ProviderResult<Result<SimulationReturn, ValidationRevert>> {
        let tx = self.simulate_validation_request(&op, gas_limit);
        let result = self
            .provider
            .call(&tx, None, &self.simulation_overrides())
            .await;

        match result {
            Ok(output) => {
                let out = <ValidationResult as SolValue>::abi_decode(&output).map_err(|e| {
                    anyhow::anyhow!("failed to decode validation result: {e}")
                })?;
                Ok(Ok(SimulationReturn {
                    pre_op_gas: math::saturating_u128(out.returnInfo.preOpGas),
                    prefund: out.returnInfo.prefund,
                }))
            }
            Err(err) => match err.revert_data() {
                Some(revert) => Ok(Err(decode_validation_revert(revert))),
                None => Err(err),
            },
        }
    }

    #[instrument(skip_all, fields(ops = ops.len()))]
    async fn call_handle_ops(
        &self,
        ops: Vec<UserOperation>,
        beneficiary: Address,
        sender_eoa: Address,
        gas_limit: u64,
        gas_fees: GasFees,
    ) -> ProviderResult<HandleOpsOut> {
        let tx = self
            .get_send_bundle_transaction(ops, beneficiary, gas_limit, gas_fees)
            .from(sender_eoa);
        match self
            .provider
            .call(&tx, None, &StateOverride::default())
            .await
        {
            Ok(_) => Ok(HandleOpsOut::Success),
            Err(err) => match err.revert_data() {
                Some(revert) => Ok(decode_handle_ops_revert(revert)),
                None => Err(err),
            },
        }
    }

    fn get_send_bundle_transaction(
        &self,
        ops: Vec<UserOperation>,
        beneficiary: Address,
        gas_limit: u64,
        gas_fees: GasFees,
    ) -> TransactionRequest {
        let data = IEntryPoint::handleOpsCall {
            ops: ops.into_iter().map(UserOperation::pack).collect(),
            beneficiary,
        }
        .abi_encode();

        TransactionRequest::default()
            .to(self.address)
            .gas_limit(gas_limit)
            .max_fee_per_gas(gas_fees.max_fee_per_gas)
            .max_priority_fee_per_gas(gas_fees.max_priority_fee_per_gas)
            .input(Bytes::from(data).into())
    }

    fn decode_handle_ops_revert(&self, revert_data: &Bytes) -> HandleOpsOut {
        decode_handle_ops_revert(revert_data)
    }
}

/// Decode the revert data of a `simulateValidation` call
pub fn decode_validation_revert(err_bytes: &Bytes) -> ValidationRevert {
    match ContractError::<IEntryPointErrors>::abi_decode(err_bytes) {
        Ok(ContractError::CustomError(IEntryPointErrors::FailedOp(FailedOp { reason, .. }))) => {
            ValidationRevert::EntryPoint(reason)
        }
        Ok(ContractError::CustomError(IEntryPointErrors::FailedOpWithRevert(
            FailedOpWithRevert { reason, inner, .. },
        ))) => ValidationRevert::EntryPoint(format!("{reason}:{inner}")),
        Ok(ContractError::Revert(r)) => ValidationRevert::Reason(r.reason),
        Ok(ContractError::Panic(p)) => ValidationRevert::Reason(p.to_string()),
        Err(_) => ValidationRevert::Unknown(err_bytes.clone()),
    }
}

/// Decode the revert data of a `handleOps` call
pub fn decode_handle_ops_revert(revert_data: &Bytes) -> HandleOpsOut {
    match IEntryPointErrors::abi_decode(revert_data) {
        Ok(IEntryPointErrors::FailedOp(FailedOp { opIndex, reason })) => {
            HandleOpsOut::FailedOp(opIndex.try_into().unwrap_or(usize::MAX), reason)
        }
        Ok(IEntryPointErrors::FailedOpWithRevert(FailedOpWithRevert {
            opIndex,
            reason,
            inner,
        })) => HandleOpsOut::FailedOp(
            opIndex.try_into().unwrap_or(usize::MAX),
            format!("{reason}:{inner}"),
        ),
        Err(_) => HandleOpsOut::Revert(revert_data.clone()),
    }
}
