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

use std::{
    cmp::Ordering,
    collections::{hash_map::Entry, BTreeSet, HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use alloy_primitives::{Address, B256};
use relayer_types::{
    pool::{MempoolError, MempoolResult, PoolOperation},
    UserOperation, UserOperationId,
};
use tracing::info;

use super::PoolConfig;

#[derive(Debug, Clone)]
pub(crate) struct PoolInnerConfig {
    entry_point: Address,
    max_size_of_pool_bytes: usize,
    min_replacement_fee_increase_percentage: u32,
    same_sender_mempool_count: usize,
}

impl From<&PoolConfig> for PoolInnerConfig {
    fn from(config: &PoolConfig) -> Self {
        Self {
            entry_point: config.entry_point,
            max_size_of_pool_bytes: config.max_size_of_pool_bytes,
            min_replacement_fee_increase_percentage: config.min_replacement_fee_increase_percentage,
            same_sender_mempool_count: config.same_sender_mempool_count,
        }
    }
}

/// Result of inserting an operation
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Inserted {
    pub(crate) hash: B256,
    /// Operation with the same id that was replaced
    pub(crate) replaced: Option<B256>,
    /// Operations dropped to make room
    pub(crate) evicted: Vec<B256>,
}

/// Pool of user operations
#[derive(Debug)]
pub(crate) struct PoolInner {
    /// Pool settings
    config: PoolInnerConfig,
    /// Operations by hash
    by_hash: HashMap<B256, OrderedPoolOperation>,
    /// Operations by operation ID
    by_id: HashMap<UserOperationId, OrderedPoolOperation>,
    /// Best operations, sorted by gas price
    best: BTreeSet<OrderedPoolOperation>,
    /// Count of pooled operations by sender
    count_by_sender: HashMap<Address, usize>,
    /// Submission ID counter
    submission_id: u64,
    /// keeps track of the size of the pool in bytes
    pool_size: usize,
}

impl PoolInner {
    pub(crate) fn new(config: PoolInnerConfig) -> Self {
        Self {
            config,
            by_hash: HashMap::new(),
            by_id: HashMap::new(),
            best: BTreeSet::new(),
            count_by_sender: HashMap::new(),
            submission_id: 0,
            pool_size: 0,
        }
    }

    /// Returns hash of operation to replace if operation is a replacement
    pub(crate) fn check_replacement(&self, op: &UserOperation) -> MempoolResult<Option<B256>> {
        // Check if operation already known
        if self.by_hash.contains_key(&op.hash()) {
            return Err(MempoolError::OperationAlreadyKnown);
        }

        let Some(pool_op) = self.by_id.get(&op.id()) else {
            return Ok(None);
        };

        let existing = pool_op.uo().gas_fees();
        if !op
            .gas_fees()
            .can_replace(&existing, self.config.min_replacement_fee_increase_percentage)
        {
            return Err(MempoolError::ReplacementUnderpriced(
                existing.max_priority_fee_per_gas,
                existing.max_fee_per_gas,
            ));
        }

        Ok(Some(pool_op.uo().hash()))
    }

    /// Checks that the operation either replaces an existing one or its sender is under the cap
    pub(crate) fn check_sender_count(&self, op: &UserOperation) -> MempoolResult<()> {
        if self.by_id.contains_key(&op.id()) {
            return Ok(());
        }
        if self.sender_count(&op.sender) >= self.config.same_sender_mempool_count {
            return Err(MempoolError::MaxOperationsReached(
                self.config.same_sender_mempool_count,
                op.sender,
            ));
        }
        Ok(())
    }

    pub(crate) fn add_operation(&mut self, op: PoolOperation) -> MempoolResult<Inserted> {
        let ret = self.add_operation_internal(Arc::new(op));
        self.update_metrics();
        ret
    }

    pub(crate) fn best_operations(&self) -> Vec<Arc<PoolOperation>> {
        self.best.iter().map(|o| o.po.clone()).collect()
    }

    pub(crate) fn senders(&self) -> HashSet<Address> {
        self.count_by_sender.keys().copied().collect()
    }

    pub(crate) fn sender_count(&self, sender: &Address) -> usize {
        self.count_by_sender.get(sender).copied().unwrap_or(0)
    }

    pub(crate) fn get_operation_by_hash(&self, hash: B256) -> Option<Arc<PoolOperation>> {
        self.by_hash.get(&hash).map(|o| o.po.clone())
    }

    pub(crate) fn remove_operation_by_hash(&mut self, hash: B256) -> Option<Arc<PoolOperation>> {
        let ret = self.remove_operation_internal(hash);
        self.update_metrics();
        ret
    }

    /// Removes all operations added more than `max_age` before `now`.
    ///
    /// NOTE: This method is O(n) where n is the number of operations in the pool.
    pub(crate) fn remove_expired(&mut self, max_age: Duration, now: Instant) -> Vec<(B256, Duration)> {
        let expired = self
            .by_hash
            .iter()
            .filter_map(|(hash, op)| {
                let age = now.saturating_duration_since(op.po.added_at);
                (age > max_age).then_some((*hash, age))
            })
            .collect::<Vec<_>>();
        for (hash, _) in &expired {
            self.remove_operation_internal(*hash);
        }
        self.update_metrics();
        expired
    }

    pub(crate) fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub(crate) fn clear(&mut self) -> Vec<B256> {
        let hashes = self.by_hash.keys().copied().collect();
        self.by_hash.clear();
        self.by_id.clear();
        self.best.clear();
        self.count_by_sender.clear();
        self.pool_size = 0;
        self.update_metrics();
        hashes
    }

    fn enforce_size(&mut self) -> Vec<B256> {
        let mut removed = Vec::new();

        while self.pool_size > self.config.max_size_of_pool_bytes {
            let Some(worst) = self.best.last() else {
                break;
            };
            let hash = worst.uo().hash();
            self.remove_operation_internal(hash);
            removed.push(hash);
        }

        removed
    }

    fn add_operation_internal(&mut self, op: Arc<PoolOperation>) -> MempoolResult<Inserted> {
        // Check if operation already known or replacing an existing operation
        // if replacing, remove the existing operation
        let replaced = self.check_replacement(&op.uo)?;
        if let Some(hash) = replaced {
            self.remove_operation_internal(hash);
        } else {
            self.check_sender_count(&op.uo)?;
        }

        let pool_op = OrderedPoolOperation {
            po: op,
            submission_id: self.next_submission_id(),
        };

        *self.count_by_sender.entry(pool_op.uo().sender).or_default() += 1;

        let hash = pool_op.uo().hash();
        self.pool_size += pool_op.mem_size();
        self.by_hash.insert(hash, pool_op.clone());
        self.by_id.insert(pool_op.uo().id(), pool_op.clone());
        self.best.insert(pool_op);

        let evicted = self.enforce_size();
        if evicted.contains(&hash) {
            info!(
                "Operation {hash:?} discarded on insert, {} others evicted",
                evicted.len() - 1
            );
            Err(MempoolError::DiscardedOnInsert)?;
        }

        Ok(Inserted {
            hash,
            replaced,
            evicted,
        })
    }

    fn remove_operation_internal(&mut self, hash: B256) -> Option<Arc<PoolOperation>> {
        let op = self.by_hash.remove(&hash)?;
        self.by_id.remove(&op.uo().id());
        self.best.remove(&op);

        if let Entry::Occupied(mut count_entry) = self.count_by_sender.entry(op.uo().sender) {
            *count_entry.get_mut() = count_entry.get().saturating_sub(1);
            if *count_entry.get() == 0 {
                count_entry.remove_entry();
            }
        }

        self.pool_size = self.pool_size.saturating_sub(op.mem_size());
        Some(op.po)
    }

    fn next_submission_id(&mut self) -> u64 {
        let id = self.submission_id;
        self.submission_id += 1;
        id
    }

    fn update_metrics(&self) {
        PoolMetrics::set_pool_metrics(self.by_hash.len(), self.pool_size, self.config.entry_point);
    }
}

/// Wrapper around PoolOperation that adds a submission ID to implement
/// a custom ordering for the best operations
#[derive(Debug, Clone)]
struct OrderedPoolOperation {
    po: Arc<PoolOperation>,
    submission_id: u64,
}

impl OrderedPoolOperation {
    fn uo(&self) -> &UserOperation {
        &self.po.uo
    }

    fn mem_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.po.mem_size()
    }
}

impl Eq for OrderedPoolOperation {}

impl Ord for OrderedPoolOperation {
    fn cmp(&self, other: &Self) -> Ordering {
        // Sort by gas price descending then by id ascending
        other
            .uo()
            .max_fee_per_gas
            .cmp(&self.uo().max_fee_per_gas)
            .then_with(|| self.submission_id.cmp(&other.submission_id))
    }
}

impl PartialOrd for OrderedPoolOperation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OrderedPoolOperation {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

struct PoolMetrics {}

impl PoolMetrics {
    fn set_pool_metrics(num_ops: usize, size_bytes: usize, entry_point: Address) {
        metrics::gauge!("op_pool_num_ops_in_pool", "entry_point" => entry_point.to_string())
            .set(num_ops as f64);
        metrics::gauge!("op_pool_size_bytes", "entry_point" => entry_point.to_string())
            .set(size_bytes as f64);
    }
}
