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

use alloy_primitives::Address;
use jsonrpsee::types::{
    error::{INTERNAL_ERROR_CODE, INVALID_PARAMS_CODE},
    ErrorObjectOwned,
};
use relayer_types::{pool::MempoolError, Entity, ValidationError};
use serde::Serialize;

use crate::error::{rpc_err, rpc_err_with_data};

// Error codes borrowed from jsonrpsee
// INVALID_PARAMS_CODE = -32602
// INTERNAL_ERROR_CODE = -32603

// Custom ERC-4337 error codes
const ENTRYPOINT_VALIDATION_REJECTED_CODE: i32 = -32500;
const THROTTLED_OR_BANNED_CODE: i32 = -32504;

pub(crate) type EthResult<T> = Result<T, EthRpcError>;

/// Error returned by the RPC server eth namespace
#[derive(Debug, thiserror::Error)]
pub enum EthRpcError {
    /// Internal error
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
    /// Invalid parameters
    #[error("{0}")]
    InvalidParams(String),
    /// Validation rejected the operation in the entry point
    #[error("{0}")]
    EntryPointValidationRejected(String),
    /// Entity throttled or banned
    #[error("{} {} throttled or banned", .0.kind, .0.address)]
    ThrottledOrBanned(Entity),
    /// Max operations reached for this sender
    #[error("Max operations ({0}) reached for sender {1}")]
    MaxOperationsReached(usize, Address),
    /// Replacement underpriced
    #[error("replacement underpriced")]
    ReplacementUnderpriced(ReplacementUnderpricedData),
    /// Operation already known
    #[error("already known")]
    OperationAlreadyKnown,
    /// The pool refused the operation for a reason other than validation
    #[error("operation rejected by mempool: {0}")]
    OperationRejected(String),
}

/// Fees a replacement must beat
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementUnderpricedData {
    /// Priority fee of the pooled operation
    pub current_max_priority_fee: u128,
    /// Max fee of the pooled operation
    pub current_max_fee: u128,
}

impl From<MempoolError> for EthRpcError {
    fn from(value: MempoolError) -> Self {
        match value {
            MempoolError::Other(e) => Self::Internal(e),
            MempoolError::OperationAlreadyKnown => Self::OperationAlreadyKnown,
            MempoolError::ReplacementUnderpriced(priority_fee, fee) => {
                Self::ReplacementUnderpriced(ReplacementUnderpricedData {
                    current_max_priority_fee: priority_fee,
                    current_max_fee: fee,
                })
            }
            MempoolError::MaxOperationsReached(count, sender) => {
                Self::MaxOperationsReached(count, sender)
            }
            MempoolError::EntityBanned(entity) => Self::ThrottledOrBanned(entity),
            MempoolError::DiscardedOnInsert => {
                Self::OperationRejected("discarded on insert".to_owned())
            }
            MempoolError::UnknownEntryPoint(a) => {
                Self::InvalidParams(format!("unknown entry point: {a}"))
            }
            MempoolError::Validation(error) => error.into(),
        }
    }
}

impl From<ValidationError> for EthRpcError {
    fn from(value: ValidationError) -> Self {
        match value {
            ValidationError::Other(e) => Self::Internal(e),
            error @ ValidationError::VerificationGasLimitTooHigh(..) => {
                Self::InvalidParams(error.to_string())
            }
            error => Self::EntryPointValidationRejected(error.to_string()),
        }
    }
}

impl From<EthRpcError> for ErrorObjectOwned {
    fn from(error: EthRpcError) -> Self {
        let msg = error.to_string();

        match error {
            EthRpcError::Internal(_) => rpc_err(INTERNAL_ERROR_CODE, msg),
            EthRpcError::InvalidParams(_)
            | EthRpcError::OperationAlreadyKnown
            | EthRpcError::OperationRejected(_) => rpc_err(INVALID_PARAMS_CODE, msg),
            EthRpcError::EntryPointValidationRejected(_) => {
                rpc_err(ENTRYPOINT_VALIDATION_REJECTED_CODE, msg)
            }
            EthRpcError::ThrottledOrBanned(data) => {
                rpc_err_with_data(THROTTLED_OR_BANNED_CODE, msg, data)
            }
            EthRpcError::MaxOperationsReached(_, _) => rpc_err(THROTTLED_OR_BANNED_CODE, msg),
            EthRpcError::ReplacementUnderpriced(data) => {
                rpc_err_with_data(INVALID_PARAMS_CODE, msg, data)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(error: impl Into<EthRpcError>) -> i32 {
        ErrorObjectOwned::from(error.into()).code()
    }

    #[test]
    fn mempool_error_codes() {
        assert_eq!(
            code(MempoolError::EntityBanned(Entity::paymaster(Address::ZERO))),
            THROTTLED_OR_BANNED_CODE
        );
        assert_eq!(code(MempoolError::OperationAlreadyKnown), INVALID_PARAMS_CODE);
        assert_eq!(
            code(MempoolError::ReplacementUnderpriced(1, 2)),
            INVALID_PARAMS_CODE
        );
        assert_eq!(
            code(MempoolError::Other(anyhow::anyhow!("db down"))),
            INTERNAL_ERROR_CODE
        );
    }

    #[test]
    fn validation_error_codes() {
        assert_eq!(
            code(MempoolError::Validation(ValidationError::Revert {
                reason: "AA21 didn't pay prefund".to_string()
            })),
            ENTRYPOINT_VALIDATION_REJECTED_CODE
        );
        assert_eq!(
            code(ValidationError::VerificationGasLimitTooHigh(10, 5)),
            INVALID_PARAMS_CODE
        );
    }

    #[test]
    fn revert_reason_in_message() {
        let error: ErrorObjectOwned = EthRpcError::from(ValidationError::Revert {
            reason: "AA33 reverted".to_string(),
        })
        .into();
        assert!(error.message().contains("AA33 reverted"));
    }
}
