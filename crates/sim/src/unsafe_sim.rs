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

use std::{collections::BTreeSet, time::Instant};

use alloy_primitives::{keccak256, Address, B256};
use futures_util::future::try_join_all;
use metrics::{Counter, Histogram};
use metrics_derive::Metrics;
use relayer_provider::{EntryPoint, EvmProvider, ValidationRevert};
use relayer_types::{
    ReferencedContracts, StorageMap, UserOperation, ValidationError, ValidationOutput,
};
use tracing::{debug, instrument};

use crate::{validator::Settings, Validator};

/// A validator that runs `simulateValidation` with a plain `eth_call`.
///
/// WARNING: This is "unsafe" for a reason. None of the ERC-7562 opcode or
/// storage rules are checked. Touched storage is taken from `eth_createAccessList`
/// of the same call, excluding the entry point's own storage.
pub struct UnsafeValidator<P, E> {
    provider: P,
    entry_point: E,
    settings: Settings,
    metrics: ValidatorMetrics,
}

impl<P, E> UnsafeValidator<P, E> {
    /// Creates a new unsafe validator
    pub fn new(provider: P, entry_point: E, settings: Settings) -> Self {
        Self {
            provider,
            entry_point,
            settings,
            metrics: ValidatorMetrics::default(),
        }
    }
}

impl<P, E> UnsafeValidator<P, E>
where
    P: EvmProvider,
    E: EntryPoint,
{
    async fn code_hash(&self, addresses: &BTreeSet<Address>) -> anyhow::Result<B256> {
        let codes = try_join_all(
            addresses
                .iter()
                .map(|address| self.provider.get_code(*address, None)),
        )
        .await?;
        Ok(keccak256(codes.concat()))
    }

    async fn touched_storage(
        &self,
        op: &UserOperation,
    ) -> anyhow::Result<(StorageMap, BTreeSet<Address>)> {
        let entry_point = self.entry_point.address();
        let tx = self
            .entry_point
            .simulate_validation_request(op, self.settings.max_verification_gas);
        let access_list = self.provider.create_access_list(&tx, None).await?;

        let mut addresses: BTreeSet<Address> =
            op.entities().into_iter().map(|e| e.address).collect();
        let mut reads = vec![];
        for item in access_list.access_list.0 {
            if item.address == entry_point {
                continue;
            }
            addresses.insert(item.address);
            reads.extend(item.storage_keys.into_iter().map(|slot| (item.address, slot)));
        }

        let values = try_join_all(
            reads
                .iter()
                .map(|(address, slot)| self.provider.get_storage_at(*address, *slot, None)),
        )
        .await?;

        let mut storage_map = StorageMap::new();
        for ((address, slot), value) in reads.into_iter().zip(values) {
            storage_map.insert_slot(address, slot, value);
        }
        Ok((storage_map, addresses))
    }
}

#[async_trait::async_trait]
impl<P, E> Validator for UnsafeValidator<P, E>
where
    P: EvmProvider,
    E: EntryPoint,
{
    #[instrument(skip_all, fields(op_hash = %op.hash(), second_pass = is_second_pass))]
    async fn validate(
        &self,
        op: UserOperation,
        referenced_contracts: Option<ReferencedContracts>,
        is_second_pass: bool,
    ) -> Result<ValidationOutput, ValidationError> {
        let start = Instant::now();
        self.metrics.validations.increment(1);

        let max_verification_gas = u128::from(self.settings.max_verification_gas);
        let verification_gas = op.total_verification_gas_limit();
        if verification_gas > max_verification_gas {
            self.metrics.rejections.increment(1);
            return Err(ValidationError::VerificationGasLimitTooHigh(
                verification_gas,
                max_verification_gas,
            ));
        }

        let simulation = self
            .entry_point
            .simulate_validation(op.clone(), self.settings.max_verification_gas)
            .await
            .map_err(anyhow::Error::from)?;
        let simulation = match simulation {
            Ok(simulation) => simulation,
            Err(revert) => {
                self.metrics.rejections.increment(1);
                debug!("Validation reverted: {revert}");
                return Err(match revert {
                    ValidationRevert::EntryPoint(reason) | ValidationRevert::Reason(reason) => {
                        ValidationError::Revert { reason }
                    }
                    ValidationRevert::Unknown(data) => ValidationError::UnknownRevert(data),
                });
            }
        };

        if is_second_pass {
            if let Some(previous) = &referenced_contracts {
                if self.code_hash(&previous.addresses).await? != previous.code_hash {
                    self.metrics.rejections.increment(1);
                    return Err(ValidationError::CodeHashChanged);
                }
            }
        }

        let (storage_map, addresses) = self.touched_storage(&op).await?;
        let code_hash = self.code_hash(&addresses).await?;

        self.metrics
            .validation_time_ms
            .record(start.elapsed().as_millis() as f64);

        Ok(ValidationOutput {
            pre_op_gas: simulation.pre_op_gas,
            required_prefund: simulation.prefund,
            storage_map,
            referenced_contracts: ReferencedContracts {
                addresses,
                code_hash,
            },
        })
    }
}

#[derive(Metrics)]
#[metrics(scope = "validator")]
struct ValidatorMetrics {
    #[metric(describe = "the count of validations started.")]
    validations: Counter,
    #[metric(describe = "the count of operations rejected by validation.")]
    rejections: Counter,
    #[metric(describe = "the duration of a successful validation in ms.")]
    validation_time_ms: Histogram,
}
