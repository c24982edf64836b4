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

use std::{collections::HashSet, sync::Arc, time::Instant};

use alloy_primitives::{Address, B256};
use metrics::{Counter, Gauge};
use metrics_derive::Metrics;
use parking_lot::RwLock;
use relayer_sim::Validator;
use relayer_types::{
    pool::{MempoolError, MempoolResult, Pool, PoolOperation, ReputationManager, ReputationStatus},
    UserOperation,
};
use relayer_utils::emit::{EventEmitter, WithEntryPoint};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use super::{
    pool::{Inserted, PoolInner},
    PoolConfig,
};
use crate::emit::{OpRemovalReason, PoolEvent};

/// Operation pool for a single entry point.
///
/// Operations are validated once on insert. The builder validates them again
/// before they go into a bundle.
pub struct UoPool<V, R> {
    config: PoolConfig,
    state: RwLock<PoolInner>,
    validator: V,
    reputation: Arc<R>,
    emitter: EventEmitter<PoolEvent>,
    size_tx: watch::Sender<usize>,
    metrics: UoPoolMetrics,
}

impl<V, R> UoPool<V, R>
where
    V: Validator,
    R: ReputationManager,
{
    /// Create a new pool
    pub fn new(
        config: PoolConfig,
        validator: V,
        reputation: Arc<R>,
        event_sender: broadcast::Sender<WithEntryPoint<PoolEvent>>,
    ) -> Self {
        let ep = config.entry_point.to_string();
        Self {
            state: RwLock::new(PoolInner::new((&config).into())),
            emitter: EventEmitter::new(config.entry_point, event_sender),
            size_tx: watch::channel(0).0,
            metrics: UoPoolMetrics::new_with_labels(&[("entry_point", ep)]),
            config,
            validator,
            reputation,
        }
    }

    /// Subscribe to the number of operations in the pool
    pub fn subscribe_size(&self) -> watch::Receiver<usize> {
        self.size_tx.subscribe()
    }

    fn emit_removed(&self, hashes: impl IntoIterator<Item = B256>, reason: OpRemovalReason) {
        let mut count = 0;
        for op_hash in hashes {
            count += 1;
            self.emitter.emit(PoolEvent::RemovedOp {
                op_hash,
                reason: reason.clone(),
            });
        }
        self.metrics.removed_operations.increment(count);
    }

    fn update_size(&self, size: usize) {
        self.size_tx.send_replace(size);
        self.metrics.num_ops.set(size as f64);
    }

    fn check_entities(&self, op: &UserOperation) -> MempoolResult<()> {
        for entity in op.staked_entities() {
            if self.reputation.status(entity.address) == ReputationStatus::Banned {
                return Err(MempoolError::EntityBanned(entity));
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<V, R> Pool for UoPool<V, R>
where
    V: Validator,
    R: ReputationManager,
{
    fn entry_point(&self) -> Address {
        self.config.entry_point
    }

    async fn add_op(&self, op: UserOperation) -> MempoolResult<B256> {
        // Check if op is already known or replacing another, and if so, ensure its fees are high enough
        // do this before validation to save resources
        let replacement = {
            let state = self.state.read();
            let replacement = state.check_replacement(&op)?;
            state.check_sender_count(&op)?;
            replacement
        };
        self.check_entities(&op)?;

        let output = self.validator.validate(op.clone(), None, false).await?;

        let pool_op = PoolOperation {
            uo: op,
            entry_point: self.config.entry_point,
            referenced_contracts: output.referenced_contracts,
            added_at: Instant::now(),
        };

        let (Inserted {
            hash,
            replaced,
            evicted,
        }, size) = {
            let mut state = self.state.write();
            let inserted = state.add_operation(pool_op.clone())?;
            (inserted, state.len())
        };
        self.update_size(size);

        if replacement.is_none() {
            for entity in pool_op.uo.staked_entities() {
                self.reputation.add_seen(entity.address);
            }
        }
        self.metrics.ops_added.increment(1);

        self.emitter.emit(PoolEvent::ReceivedOp {
            op_hash: hash,
            op: pool_op.uo,
        });
        if let Some(old) = replaced {
            self.emit_removed([old], OpRemovalReason::Replaced { by: hash });
        }
        if !evicted.is_empty() {
            info!("Evicted {} ops to stay under the pool size limit", evicted.len());
            self.emit_removed(evicted, OpRemovalReason::Evicted);
        }

        Ok(hash)
    }

    fn sorted_for_inclusion(&self) -> Vec<Arc<PoolOperation>> {
        self.state.read().best_operations()
    }

    fn known_senders(&self) -> HashSet<Address> {
        self.state.read().senders()
    }

    fn get_op_by_hash(&self, hash: B256) -> Option<Arc<PoolOperation>> {
        self.state.read().get_operation_by_hash(hash)
    }

    fn remove_op(&self, hash: B256) -> bool {
        let (removed, size) = {
            let mut state = self.state.write();
            let removed = state.remove_operation_by_hash(hash).is_some();
            (removed, state.len())
        };
        if removed {
            debug!("Removed op {hash:?}");
            self.update_size(size);
            self.emit_removed([hash], OpRemovalReason::Requested);
        }
        removed
    }

    fn remove_expired(&self) -> Vec<B256> {
        let Some(max_age) = self.config.max_op_age else {
            return vec![];
        };
        let (expired, size) = {
            let mut state = self.state.write();
            let expired = state.remove_expired(max_age, Instant::now());
            (expired, state.len())
        };
        if expired.is_empty() {
            return vec![];
        }

        self.update_size(size);
        let mut hashes = Vec::with_capacity(expired.len());
        for (op_hash, age) in expired {
            self.emit_removed([op_hash], OpRemovalReason::Expired { age });
            hashes.push(op_hash);
        }
        hashes
    }

    fn size(&self) -> usize {
        self.state.read().len()
    }

    fn clear(&self) {
        let cleared = self.state.write().clear();
        self.update_size(0);
        self.emit_removed(cleared, OpRemovalReason::Cleared);
    }
}

#[derive(Metrics)]
#[metrics(scope = "op_pool")]
struct UoPoolMetrics {
    #[metric(describe = "the number of ops in the pool.")]
    num_ops: Gauge,
    #[metric(describe = "the count of added ops.")]
    ops_added: Counter,
    #[metric(describe = "the count of removed ops.")]
    removed_operations: Counter,
}
