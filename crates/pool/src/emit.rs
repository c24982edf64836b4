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

use std::{fmt::Display, time::Duration};

use alloy_primitives::B256;
use relayer_types::UserOperation;

/// Event type for the pool
#[derive(Clone, Debug)]
pub enum PoolEvent {
    /// An operation was received and added to the pool
    ReceivedOp {
        /// Operation hash
        op_hash: B256,
        /// The full operation
        op: UserOperation,
    },
    /// An operation was removed from the pool
    RemovedOp {
        /// Operation hash
        op_hash: B256,
        /// Removal reason
        reason: OpRemovalReason,
    },
}

/// Reason an operation was removed from the pool
#[derive(Clone, Debug)]
pub enum OpRemovalReason {
    /// Removal was requested
    Requested,
    /// Replaced by an operation with the same sender and nonce
    Replaced {
        /// Hash of the replacement
        by: B256,
    },
    /// Evicted to keep the pool under its size limit
    Evicted,
    /// Op stayed in the pool longer than the maximum age
    Expired {
        /// Time the op spent in the pool
        age: Duration,
    },
    /// Pool was cleared through the debug API
    Cleared,
}

impl Display for PoolEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolEvent::ReceivedOp { op_hash, op } => {
                let entities = op
                    .staked_entities()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>();
                write!(
                    f,
                    concat!(
                        "Received op",
                        "    Op hash: {:?}",
                        "    Sender: {:?}",
                        "    Nonce: {}",
                        "    Entities: {}",
                    ),
                    op_hash,
                    op.sender,
                    op.nonce,
                    if entities.is_empty() {
                        "none".to_string()
                    } else {
                        entities.join(", ")
                    },
                )
            }
            PoolEvent::RemovedOp { op_hash, reason } => {
                write!(f, "Removed op    Op hash: {op_hash:?}    Reason: {reason}")
            }
        }
    }
}

impl Display for OpRemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpRemovalReason::Requested => write!(f, "requested"),
            OpRemovalReason::Replaced { by } => write!(f, "replaced by {by:?}"),
            OpRemovalReason::Evicted => write!(f, "evicted"),
            OpRemovalReason::Expired { age } => write!(f, "expired after {}s", age.as_secs()),
            OpRemovalReason::Cleared => write!(f, "cleared"),
        }
    }
}
