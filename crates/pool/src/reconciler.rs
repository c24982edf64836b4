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

use std::sync::Arc;

use alloy_primitives::Address;
use alloy_sol_types::{SolEvent, SolEventInterface};
use parking_lot::Mutex;
use relayer_contracts::v0_7::IEntryPoint::{
    AccountDeployed, IEntryPointEvents, UserOperationEvent,
};
use relayer_provider::{EvmProvider, Filter};
use relayer_types::pool::{ChainReconciler, Pool, ReputationManager};
use tracing::{debug, info, instrument, warn};

/// Settings for the reconciler
#[derive(Debug, Clone, Copy)]
pub struct ReconcilerSettings {
    /// Entry point whose logs are scanned
    pub entry_point: Address,
    /// Maximum number of blocks scanned in one reconciliation
    pub block_range: u64,
}

/// Removes operations included on chain from the pool and credits their entities.
///
/// Each call scans the entry point's `UserOperationEvent` and `AccountDeployed`
/// logs from the block after the last scanned one up to the latest block, then
/// expires aged-out operations.
pub struct PoolReconciler<P, PL, R> {
    provider: P,
    pool: Arc<PL>,
    reputation: Arc<R>,
    settings: ReconcilerSettings,
    last_block: Mutex<Option<u64>>,
}

impl<P, PL, R> PoolReconciler<P, PL, R> {
    /// Create a new reconciler
    pub fn new(provider: P, pool: Arc<PL>, reputation: Arc<R>, settings: ReconcilerSettings) -> Self {
        Self {
            provider,
            pool,
            reputation,
            settings,
            last_block: Mutex::new(None),
        }
    }
}

impl<P, PL, R> PoolReconciler<P, PL, R>
where
    P: EvmProvider,
    PL: Pool,
    R: ReputationManager,
{
    fn apply_event(&self, event: IEntryPointEvents) -> usize {
        match event {
            IEntryPointEvents::UserOperationEvent(event) => {
                self.reputation.add_included(event.sender);
                if !event.paymaster.is_zero() {
                    self.reputation.add_included(event.paymaster);
                }
                usize::from(self.pool.remove_op(event.userOpHash))
            }
            IEntryPointEvents::AccountDeployed(event) => {
                if !event.factory.is_zero() {
                    self.reputation.add_included(event.factory);
                }
                0
            }
        }
    }
}

#[async_trait::async_trait]
impl<P, PL, R> ChainReconciler for PoolReconciler<P, PL, R>
where
    P: EvmProvider,
    PL: Pool,
    R: ReputationManager,
{
    #[instrument(skip_all)]
    async fn reconcile(&self) -> anyhow::Result<usize> {
        let latest = self.provider.get_block_number().await?;
        let earliest = latest.saturating_sub(self.settings.block_range);
        let from = match *self.last_block.lock() {
            Some(last) => last.saturating_add(1).max(earliest),
            None => earliest,
        };

        let mut removed = 0;
        if from <= latest {
            let filter = Filter::new()
                .address(self.settings.entry_point)
                .event_signature(vec![
                    UserOperationEvent::SIGNATURE_HASH,
                    AccountDeployed::SIGNATURE_HASH,
                ])
                .from_block(from)
                .to_block(latest);
            let logs = self.provider.get_logs(&filter).await?;
            debug!("Scanned blocks {from}..={latest}, found {} logs", logs.len());

            for log in logs {
                match IEntryPointEvents::decode_log(&log.inner) {
                    Ok(decoded) => removed += self.apply_event(decoded.data),
                    Err(e) => warn!("Failed to decode entry point log: {e:?}"),
                }
            }
            *self.last_block.lock() = Some(latest);
        }

        let expired = self.pool.remove_expired();
        if removed > 0 || !expired.is_empty() {
            info!(
                "Reconciled pool: {removed} ops included on chain, {} ops expired",
                expired.len()
            );
        }

        Ok(removed + expired.len())
    }
}
