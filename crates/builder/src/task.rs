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

use std::{sync::Arc, time::Duration};

use alloy_primitives::{Address, U256};
use anyhow::Context;
use async_trait::async_trait;
use relayer_provider::{EntryPoint, EvmProvider, FeeOracle};
use relayer_sim::Validator;
use relayer_task::Task;
use relayer_types::{
    builder::{BuilderError, BundlingMode},
    pool::{ChainReconciler, Pool, ReputationManager},
};
use relayer_utils::emit::{EventEmitter, WithEntryPoint};
use tokio::{
    sync::{broadcast, watch},
    time::{self, Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    bundle_proposer::{self, BundleProposerImpl},
    bundle_sender::{self, BundleSender, BundleSenderImpl},
    emit::BuilderEvent,
    sender::RawTransactionSender,
    server::LocalBuilderHandle,
    signer::{LocalSigner, Signer},
    trigger::{new_trigger_channel, TriggerReceiver, TriggerSender},
};

/// Builder settings
#[derive(Debug, Clone)]
pub struct Args {
    /// Chain id used to sign bundle transactions
    pub chain_id: u64,
    /// Hex private key of the bundle signer
    pub private_key: String,
    /// Fee recipient, defaults to the signer
    pub beneficiary: Option<Address>,
    /// Signer balance at or below which fees are paid to the signer
    pub min_signer_balance: U256,
    /// Ceiling on the summed gas of the operations in a bundle
    pub max_bundle_gas: u128,
    /// Gas limit of the bundle transaction
    pub bundle_gas_limit: u64,
    /// Broadcast with `eth_sendRawTransactionConditional`
    pub conditional_rpc: bool,
    /// Pin deployed senders to their storage root
    pub merge_to_account_root_hash: bool,
    /// Operations a single paymaster or factory may have in one bundle
    pub throttled_entity_bundle_count: usize,
    /// Period of automatic cycles, `None` disables them
    pub auto_bundle_interval: Option<Duration>,
    /// Pool size that starts a cycle
    pub auto_bundle_mempool_size: usize,
    /// Deadline of a single cycle
    pub cycle_timeout: Duration,
    /// Delay between receipt lookups
    pub receipt_poll_interval: Duration,
    /// Initial bundling mode
    pub bundling_mode: BundlingMode,
}

/// Collaborators the builder shares with the rest of the node
pub struct BuilderParts<P, R, V, E, EP> {
    /// Operation pool
    pub pool: Arc<P>,
    /// Reputation of staked entities
    pub reputation: Arc<R>,
    /// Brings the pool up to date with the chain before every cycle
    pub reconciler: Arc<dyn ChainReconciler>,
    /// Second pass validation
    pub validator: V,
    /// Entry point the bundles are sent to
    pub entry_point: E,
    /// Chain reads
    pub provider: EP,
    /// Broadcasts bundle transactions
    pub submit_provider: EP,
    /// Bundle transaction fees
    pub fee_oracle: Arc<dyn FeeOracle>,
    /// Pool size updates
    pub pool_size: watch::Receiver<usize>,
}

/// Runs bundle cycles on a timer, on pool growth and on demand
pub struct BuilderTask<P, R, V, E, EP> {
    args: Args,
    parts: BuilderParts<P, R, V, E, EP>,
    event_sender: broadcast::Sender<WithEntryPoint<BuilderEvent>>,
    trigger: TriggerSender,
    trigger_receiver: TriggerReceiver,
    mode: Arc<watch::Sender<BundlingMode>>,
}

impl<P, R, V, E, EP> BuilderTask<P, R, V, E, EP>
where
    P: Pool,
    R: ReputationManager,
    V: Validator,
    E: EntryPoint + Clone,
    EP: EvmProvider + Clone + 'static,
{
    /// Create a new builder task
    pub fn new(
        args: Args,
        parts: BuilderParts<P, R, V, E, EP>,
        event_sender: broadcast::Sender<WithEntryPoint<BuilderEvent>>,
    ) -> Self {
        let (trigger, trigger_receiver) = new_trigger_channel();
        let mode = Arc::new(watch::channel(args.bundling_mode).0);
        Self {
            args,
            parts,
            event_sender,
            trigger,
            trigger_receiver,
            mode,
        }
    }

    /// Handle for manual triggers and mode changes
    pub fn handle(&self) -> LocalBuilderHandle {
        LocalBuilderHandle::new(self.trigger.clone(), Arc::clone(&self.mode))
    }

    /// Convert this task into a boxed [`Task`]
    pub fn boxed(self) -> Box<dyn Task> {
        Box::new(self)
    }
}

#[async_trait]
impl<P, R, V, E, EP> Task for BuilderTask<P, R, V, E, EP>
where
    P: Pool,
    R: ReputationManager,
    V: Validator,
    E: EntryPoint + Clone,
    EP: EvmProvider + Clone + 'static,
{
    fn name(&self) -> &'static str {
        "builder"
    }

    async fn run(self: Box<Self>, shutdown_token: CancellationToken) -> anyhow::Result<()> {
        let Self {
            args,
            parts,
            event_sender,
            trigger_receiver,
            mode,
            ..
        } = *self;

        let signer = LocalSigner::connect(parts.provider.clone(), args.chain_id, &args.private_key)
            .context("builder should create signer")?;
        let beneficiary = args.beneficiary.unwrap_or(signer.address());
        info!(
            "Builder signer {:?}, beneficiary {beneficiary:?}",
            signer.address()
        );

        let emitter = EventEmitter::new(parts.entry_point.address(), event_sender);
        let proposer = BundleProposerImpl::new(
            Arc::clone(&parts.pool),
            Arc::clone(&parts.reputation),
            parts.validator,
            parts.entry_point.clone(),
            parts.provider.clone(),
            bundle_proposer::Settings {
                max_bundle_gas: args.max_bundle_gas,
                throttled_entity_bundle_count: args.throttled_entity_bundle_count,
                conditional_rpc: args.conditional_rpc,
                merge_to_account_root_hash: args.merge_to_account_root_hash,
            },
            emitter.clone(),
        );
        let sender = BundleSenderImpl::new(
            proposer,
            parts.reconciler,
            parts.pool,
            parts.reputation,
            parts.entry_point,
            parts.provider,
            RawTransactionSender::new(parts.submit_provider, signer, args.conditional_rpc),
            parts.fee_oracle,
            bundle_sender::Settings {
                beneficiary,
                min_signer_balance: args.min_signer_balance,
                bundle_gas_limit: args.bundle_gas_limit,
                cycle_timeout: args.cycle_timeout,
                receipt_poll_interval: args.receipt_poll_interval,
                conditional_rpc: args.conditional_rpc,
            },
            emitter,
        );

        let triggers = Triggers {
            manual: trigger_receiver,
            mode: mode.subscribe(),
            pool_size: parts.pool_size,
            interval: args.auto_bundle_interval,
            mempool_size: args.auto_bundle_mempool_size,
        };
        bundle_loop(&sender, triggers, shutdown_token).await;
        info!("Builder task shutting down");
        Ok(())
    }
}

/// Sources that start a cycle
struct Triggers {
    manual: TriggerReceiver,
    mode: watch::Receiver<BundlingMode>,
    pool_size: watch::Receiver<usize>,
    interval: Option<Duration>,
    mempool_size: usize,
}

async fn bundle_loop<S: BundleSender + ?Sized>(
    sender: &S,
    mut triggers: Triggers,
    shutdown_token: CancellationToken,
) {
    let mut interval = triggers.interval.map(|period| {
        let mut interval = time::interval_at(time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        let auto = *triggers.mode.borrow_and_update() == BundlingMode::Auto;
        let responder = tokio::select! {
            _ = shutdown_token.cancelled() => return,
            responder = triggers.manual.wait_for_trigger() => match responder {
                Ok(responder) => Some(responder),
                Err(error) => {
                    error!("Builder trigger channel failed: {error:#}");
                    return;
                }
            },
            _ = tick(&mut interval), if auto => None,
            Ok(()) = triggers.pool_size.changed(), if auto => {
                let size = *triggers.pool_size.borrow_and_update();
                if size < triggers.mempool_size {
                    continue;
                }
                debug!("Pool size {size} reached bundling threshold");
                None
            }
            Ok(()) = triggers.mode.changed() => {
                info!("Bundling mode set to {}", *triggers.mode.borrow());
                continue;
            }
        };

        let result = sender.run_cycle().await;
        match &result {
            Ok(Some(bundle)) => info!(
                "Bundle {:?} sent with {} ops",
                bundle.transaction_hash,
                bundle.user_op_hashes.len()
            ),
            Ok(None) => debug!("Cycle ended without a bundle"),
            Err(error) => error!("Bundle cycle failed: {error:#}"),
        }
        if let Some(responder) = responder {
            // the caller may have gone away
            let _ = responder.send(result.map_err(BuilderError::from));
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
