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

use std::collections::BTreeSet;

use alloy_primitives::{Address, Bytes, B256, U256};

use crate::StorageMap;

/// Contracts touched while validating an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferencedContracts {
    /// Addresses accessed during validation
    pub addresses: BTreeSet<Address>,
    /// Hash of the concatenated code of `addresses`, in address order
    pub code_hash: B256,
}

/// Result of a successful validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOutput {
    /// Gas used by validation and pre-verification
    pub pre_op_gas: u128,
    /// Amount the payer must have on deposit for this operation
    pub required_prefund: U256,
    /// Storage read during validation, keyed by account
    pub storage_map: StorageMap,
    /// Contracts touched during validation
    pub referenced_contracts: ReferencedContracts,
}

impl ValidationOutput {
    /// Gas counted against the bundle ceiling for an operation with `call_gas_limit`
    pub fn bundle_gas(&self, call_gas_limit: u128) -> u128 {
        self.pre_op_gas.saturating_add(call_gas_limit)
    }
}

/// Validation failure
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// The entry point rejected the operation
    #[error("operation reverted during validation: {reason}")]
    Revert {
        /// Revert reason, `AAxx` prefixed when raised by the entry point
        reason: String,
    },
    /// Validation reverted with data that could not be decoded
    #[error("operation reverted during validation with unknown data: {0}")]
    UnknownRevert(Bytes),
    /// Code of a referenced contract changed since the first validation
    #[error("code of referenced contracts changed since first validation")]
    CodeHashChanged,
    /// The verification gas limit is above the configured maximum
    #[error("verification gas limit {0} exceeds the maximum of {1}")]
    VerificationGasLimitTooHigh(u128, u128),
    /// Some other error occurred, such as a provider failure
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ValidationError {
    /// Whether the operation itself was rejected, as opposed to the validation
    /// being unable to run.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, ValidationError::Other(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_failures_are_not_rejections() {
        assert!(ValidationError::CodeHashChanged.is_rejection());
        assert!(ValidationError::Revert {
            reason: "AA23 reverted".to_string()
        }
        .is_rejection());
        assert!(!ValidationError::Other(anyhow::anyhow!("timeout")).is_rejection());
    }
}
