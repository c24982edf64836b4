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

use alloy_primitives::U64;
use anyhow::Context;
use clap::Args;
use relayer_builder::{BuilderEvent, BuilderParts, BuilderTask};
use relayer_pool::{HourlyMovingAverageReputation, PoolEvent, PoolReconciler, PoolTask, UoPool};
use relayer_provider::{
    fee_oracle_for_chain, new_alloy_evm_provider, EntryPointProvider, EvmProvider,
};
use relayer_rpc::RpcTask;
use relayer_sim::UnsafeValidator;
use relayer_task::spawn_tasks_with_shutdown;
use relayer_types::pool::ChainReconciler;
use relayer_utils::emit::{self, WithEntryPoint, EVENT_CHANNEL_CAPACITY};
use tokio::sync::broadcast;

use self::events::Event;
use crate::cli::{
    builder::{self, BuilderArgs},
    pool::PoolArgs,
    rpc::RpcArgs,
    sim::SimArgs,
    CommonArgs,
};
mod events;

#[derive(Debug, Args)]
pub struct NodeCliArgs {
    #[command(flatten)]
    pub pool: PoolArgs,

    #[command(flatten)]
    pub builder: BuilderArgs,

    #[command(flatten)]
    pub rpc: RpcArgs,

    #[command(flatten)]
    pub sim: SimArgs,
}

pub async fn run(node_args: NodeCliArgs, common_args: CommonArgs) -> anyhow::Result<()> {
    let NodeCliArgs {
        pool: pool_args,
        builder: builder_args,
        rpc: rpc_args,
        sim: sim_args,
    } = node_args;

    let node_http = common_args
        .node_http
        .as_deref()
        .context("must provide node_http")?;
    let provider = new_alloy_evm_provider(node_http, common_args.provider_timeout_seconds)?;
    let submit_provider = match &builder_args.submit_url {
        Some(url) => new_alloy_evm_provider(url, common_args.provider_timeout_seconds)?,
        None => provider.clone(),
    };

    let chain_id = match common_args.chain_id {
        Some(chain_id) => chain_id,
        None => provider
            .request::<_, U64>("eth_chainId", ())
            .await
            .context("should fetch chain id from node")?
            .to::<u64>(),
    };
    tracing::info!("Chain id: {chain_id}, entry point: {}", common_args.entry_point);

    let entry_point = EntryPointProvider::new(
        common_args.entry_point,
        chain_id,
        provider.clone(),
        sim_args.simulations_code()?,
    );

    let (blocklist, allowlist) = pool_args.address_lists()?;
    let reputation = Arc::new(HourlyMovingAverageReputation::new(
        pool_args.reputation_params(),
        blocklist,
        allowlist,
    ));

    let (event_sender, event_rx) =
        broadcast::channel::<WithEntryPoint<Event>>(EVENT_CHANNEL_CAPACITY);
    let (pool_event_sender, pool_event_rx) =
        broadcast::channel::<WithEntryPoint<PoolEvent>>(EVENT_CHANNEL_CAPACITY);
    let (builder_event_sender, builder_event_rx) =
        broadcast::channel::<WithEntryPoint<BuilderEvent>>(EVENT_CHANNEL_CAPACITY);

    emit::receive_and_log_events_with_filter(event_rx, |_| true);
    emit::receive_events("pool", pool_event_rx, {
        let event_sender = event_sender.clone();
        move |event| {
            let _ = event_sender.send(WithEntryPoint::of(event));
        }
    });
    emit::receive_events("builder", builder_event_rx, {
        let event_sender = event_sender.clone();
        move |event| {
            if builder::is_nonspammy_event(&event) {
                let _ = event_sender.send(WithEntryPoint::of(event));
            }
        }
    });

    let validation_settings = sim_args.validation_settings();
    let pool = Arc::new(UoPool::new(
        pool_args.pool_config(&common_args),
        UnsafeValidator::new(provider.clone(), entry_point.clone(), validation_settings),
        Arc::clone(&reputation),
        pool_event_sender,
    ));
    let pool_size = pool.subscribe_size();
    let reconciler: Arc<dyn ChainReconciler> = Arc::new(PoolReconciler::new(
        provider.clone(),
        Arc::clone(&pool),
        Arc::clone(&reputation),
        pool_args.reconciler_settings(&common_args),
    ));

    let builder_task = BuilderTask::new(
        builder_args.to_args(chain_id),
        BuilderParts {
            pool: Arc::clone(&pool),
            reputation: Arc::clone(&reputation),
            reconciler,
            validator: UnsafeValidator::new(
                provider.clone(),
                entry_point.clone(),
                validation_settings,
            ),
            entry_point,
            provider: provider.clone(),
            submit_provider,
            fee_oracle: fee_oracle_for_chain(chain_id, provider),
            pool_size,
        },
        builder_event_sender,
    );
    let builder_handle = builder_task.handle();

    let rpc_task = RpcTask::new(
        rpc_args.to_args(chain_id)?,
        pool,
        Arc::clone(&reputation),
        builder_handle,
    );

    spawn_tasks_with_shutdown(
        [
            PoolTask::new(reputation).boxed(),
            builder_task.boxed(),
            rpc_task.boxed(),
        ],
        tokio::signal::ctrl_c(),
    )
    .await;

    Ok(())
}
