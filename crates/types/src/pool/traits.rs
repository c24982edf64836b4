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

use std::{collections::HashSet, sync::Arc};

use alloy_primitives::{Address, B256};
#[cfg(feature = "test-utils")]
use mockall::automock;

use super::{
    error::MempoolResult,
    types::{PoolOperation, Reputation, ReputationStatus},
};
use crate::UserOperation;

/// Pending user operations for a single entry point
#[cfg_attr(feature = "test-utils", automock)]
#[async_trait::async_trait]
pub trait Pool: Send + Sync + 'static {
    /// Entry point served by this pool
    fn entry_point(&self) -> Address;

    /// Validate and add an operation to the pool, returning its hash
    async fn add_op(&self, op: UserOperation) -> MempoolResult<B256>;

    /// Snapshot of the pool in inclusion order.
    ///
    /// The order is total, so the same pool contents always yield the same sequence.
    fn sorted_for_inclusion(&self) -> Vec<Arc<PoolOperation>>;

    /// Senders with at least one pooled operation
    fn known_senders(&self) -> HashSet<Address>;

    /// Get an operation by hash
    fn get_op_by_hash(&self, hash: B256) -> Option<Arc<PoolOperation>>;

    /// Remove an operation by hash. Returns false if it was not pooled.
    fn remove_op(&self, hash: B256) -> bool;

    /// Remove operations that have outlived the pool's maximum age, returning their hashes
    fn remove_expired(&self) -> Vec<B256>;

    /// Number of pooled operations
    fn size(&self) -> usize;

    /// Remove every operation, used for debug methods
    fn clear(&self);
}

/// Reputation of the entities that use the relay
#[cfg_attr(feature = "test-utils", automock)]
pub trait ReputationManager: Send + Sync + 'static {
    /// Current status of an address
    fn status(&self, address: Address) -> ReputationStatus;

    /// Record that an operation using this entity was seen
    fn add_seen(&self, address: Address);

    /// Record that an operation using this entity was included on chain
    fn add_included(&self, address: Address);

    /// Record that this entity caused a bundle to revert
    fn report_crash(&self, address: Address);

    /// Dump all tracked reputations, used for debug methods
    fn dump_reputation(&self) -> Vec<Reputation>;

    /// Overwrite the counters of an address, used for debug methods
    fn set_reputation(&self, address: Address, ops_seen: u64, ops_included: u64);

    /// Drop all reputation data, used for debug methods
    fn clear(&self);
}

/// Brings the pool in line with confirmed chain state.
#[cfg_attr(feature = "test-utils", automock)]
#[async_trait::async_trait]
pub trait ChainReconciler: Send + Sync + 'static {
    /// Remove operations already included on chain and drop aged entries.
    ///
    /// Returns the number of operations removed.
    async fn reconcile(&self) -> anyhow::Result<usize>;
}
