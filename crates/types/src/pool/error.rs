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

use crate::{Entity, ValidationError};

/// Result of a mempool operation
pub type MempoolResult<T> = std::result::Result<T, MempoolError>;

/// Mempool error type.
#[derive(Debug, thiserror::Error)]
pub enum MempoolError {
    /// Some other error occurred
    #[error(transparent)]
    Other(#[from] anyhow::Error),
    /// Operation with the same hash already in pool
    #[error("Operation already known")]
    OperationAlreadyKnown,
    /// Operation with same sender/nonce already in pool
    /// and the replacement operation does not raise both fees enough.
    #[error("Replacement operation underpriced. Existing priority fee: {0}. Existing fee: {1}")]
    ReplacementUnderpriced(u128, u128),
    /// Max operations reached for a sender
    #[error("Max operations ({0}) reached for sender {1}")]
    MaxOperationsReached(usize, Address),
    /// An entity associated with the operation is banned.
    #[error("Entity {0} is banned")]
    EntityBanned(Entity),
    /// Operation was discarded on inserting due to size limit
    #[error("Operation was discarded on inserting")]
    DiscardedOnInsert,
    /// An unknown entry point was specified
    #[error("Unknown entry point {0}")]
    UnknownEntryPoint(Address),
    /// The operation failed validation
    #[error(transparent)]
    Validation(ValidationError),
}

impl From<ValidationError> for MempoolError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::Other(e) => Self::Other(e),
            _ => Self::Validation(error),
        }
    }
}
