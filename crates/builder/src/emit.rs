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

use std::{fmt::Display, sync::Arc};

use alloy_primitives::{Address, B256, U256};
use relayer_types::{Entity, GasFees, StorageConflict};

/// Builder event
#[derive(Clone, Debug)]
pub enum BuilderEvent {
    /// A bundle transaction was accepted by the node
    BundleSent {
        /// Transaction hash
        tx_hash: B256,
        /// Nonce of the bundle transaction
        nonce: u64,
        /// Recipient of the bundle fees
        beneficiary: Address,
        /// Fees the transaction was priced at
        fees: GasFees,
        /// Hashes of the included operations
        op_hashes: Arc<Vec<B256>>,
    },
    /// The bundle reverted, either in the dry run or on chain
    BundleReverted {
        /// Transaction hash, `None` when the dry run failed
        tx_hash: Option<B256>,
        /// Revert reason reported by the entry point
        reason: Arc<String>,
    },
    /// An operation was skipped in the bundle
    SkippedOp {
        /// Operation hash
        op_hash: B256,
        /// Reason for skipping
        reason: SkipReason,
    },
    /// An operation was rejected from the bundle and removed from the pool
    RejectedOp {
        /// Operation hash
        op_hash: B256,
        /// Reason for rejection
        reason: OpRejectionReason,
    },
    /// An entity was blamed for a failed bundle
    EntityCrashed {
        /// Hash of the operation that failed
        op_hash: B256,
        /// The blamed entity
        entity: Entity,
    },
}

/// Reason for skipping an operation in a bundle.
///
/// Skipped operations stay in the pool.
#[derive(Clone, Debug)]
pub enum SkipReason {
    /// A paymaster or factory is throttled or has used its share of the bundle
    Throttled {
        /// The throttled entity
        entity: Entity,
    },
    /// The sender already has an operation in the bundle
    SenderInBundle,
    /// Operation accessed the storage of another pooled sender
    AccessedOtherSender {
        /// The other sender
        other_sender: Address,
    },
    /// Bundle gas ceiling reached, later operations are not considered
    BundleGasLimit,
    /// The paymaster deposit left for this bundle does not cover the prefund
    InsufficientDeposit {
        /// Paymaster address
        paymaster: Address,
        /// Prefund required by the operation
        required: U256,
        /// Deposit left in this bundle
        remaining: U256,
    },
    /// Expected storage conflicts with an operation already in the bundle
    StorageConflict(StorageConflict),
    /// Other reason, typically internal errors
    Other {
        /// Description
        reason: Arc<String>,
    },
}

/// Reason for rejecting an operation from a bundle
#[derive(Clone, Debug)]
pub enum OpRejectionReason {
    /// A paymaster or factory of the operation is banned
    EntityBanned {
        /// The banned entity
        entity: Entity,
    },
    /// Operation failed its second validation
    FailedRevalidation {
        /// Validation error message
        error: Arc<String>,
    },
    /// Operation failed inside the bundle
    FailedInBundle {
        /// Revert reason
        message: Arc<String>,
    },
}

impl Display for BuilderEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuilderEvent::BundleSent {
                tx_hash,
                nonce,
                beneficiary,
                fees,
                op_hashes,
            } => write!(
                f,
                concat!(
                    "Bundle transaction sent!",
                    "    Transaction hash: {:?}",
                    "    Nonce: {}",
                    "    Beneficiary: {:?}",
                    "    maxFeePerGas: {}",
                    "    maxPriorityFeePerGas: {}",
                    "    Ops: {:?}",
                ),
                tx_hash,
                nonce,
                beneficiary,
                fees.max_fee_per_gas,
                fees.max_priority_fee_per_gas,
                op_hashes,
            ),
            BuilderEvent::BundleReverted { tx_hash, reason } => match tx_hash {
                Some(tx_hash) => write!(
                    f,
                    "Bundle transaction reverted.    Transaction hash: {tx_hash:?}    Reason: {reason}"
                ),
                None => write!(f, "Bundle failed dry run, not sent.    Reason: {reason}"),
            },
            BuilderEvent::SkippedOp { op_hash, reason } => write!(
                f,
                "Op skipped in bundle (but remains in pool).    Op hash: {op_hash:?}    Reason: {reason}"
            ),
            BuilderEvent::RejectedOp { op_hash, reason } => write!(
                f,
                "Op rejected from bundle and removed from pool.    Op hash: {op_hash:?}    Reason: {reason}"
            ),
            BuilderEvent::EntityCrashed { op_hash, entity } => write!(
                f,
                "Entity blamed for failed bundle.    Entity: {entity}    Op hash: {op_hash:?}"
            ),
        }
    }
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Throttled { entity } => write!(f, "{entity} is throttled"),
            SkipReason::SenderInBundle => write!(f, "sender already in bundle"),
            SkipReason::AccessedOtherSender { other_sender } => {
                write!(f, "accessed storage of sender {other_sender:?}")
            }
            SkipReason::BundleGasLimit => write!(f, "bundle gas limit reached"),
            SkipReason::InsufficientDeposit {
                paymaster,
                required,
                remaining,
            } => write!(
                f,
                "paymaster {paymaster:?} deposit {remaining} below prefund {required}"
            ),
            SkipReason::StorageConflict(conflict) => write!(f, "{conflict}"),
            SkipReason::Other { reason } => write!(f, "{reason}"),
        }
    }
}

impl Display for OpRejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpRejectionReason::EntityBanned { entity } => write!(f, "{entity} is banned"),
            OpRejectionReason::FailedRevalidation { error } => {
                write!(f, "failed revalidation: {error}")
            }
            OpRejectionReason::FailedInBundle { message } => {
                write!(f, "failed in bundle: {message}")
            }
        }
    }
}
