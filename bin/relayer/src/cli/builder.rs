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

use std::time::Duration;

use alloy_primitives::{Address, U256};
use clap::Args;
use relayer_builder::{BuilderEvent, BuilderTaskArgs};
use relayer_types::builder::BundlingMode;
use relayer_utils::emit::WithEntryPoint;

/// CLI options for the builder
#[derive(Args, Debug)]
#[command(next_help_heading = "BUILDER")]
pub struct BuilderArgs {
    /// Private key to use for signing transactions
    #[arg(
        long = "builder.private_key",
        name = "builder.private_key",
        env = "BUILDER_PRIVATE_KEY",
        hide_env_values = true
    )]
    private_key: String,

    /// Address that receives the bundle fees, defaults to the signer
    #[arg(
        long = "builder.beneficiary",
        name = "builder.beneficiary",
        env = "BUILDER_BENEFICIARY"
    )]
    beneficiary: Option<Address>,

    /// Signer balance, in wei, at or below which the signer keeps the fees
    #[arg(
        long = "builder.min_signer_balance",
        name = "builder.min_signer_balance",
        env = "BUILDER_MIN_SIGNER_BALANCE",
        default_value = "0"
    )]
    min_signer_balance: U256,

    /// Maximum summed operation gas in a bundle
    #[arg(
        long = "builder.max_bundle_gas",
        name = "builder.max_bundle_gas",
        env = "BUILDER_MAX_BUNDLE_GAS",
        default_value = "5000000"
    )]
    max_bundle_gas: u128,

    /// Gas limit of the bundle transaction
    #[arg(
        long = "builder.bundle_gas_limit",
        name = "builder.bundle_gas_limit",
        env = "BUILDER_BUNDLE_GAS_LIMIT",
        default_value = "10000000"
    )]
    bundle_gas_limit: u64,

    /// Submit with `eth_sendRawTransactionConditional`
    #[arg(
        long = "builder.conditional_rpc",
        name = "builder.conditional_rpc",
        env = "BUILDER_CONDITIONAL_RPC",
        default_value = "false"
    )]
    conditional_rpc: bool,

    /// Pin deployed senders to their storage root in the conditional
    #[arg(
        long = "builder.merge_to_account_root_hash",
        name = "builder.merge_to_account_root_hash",
        env = "BUILDER_MERGE_TO_ACCOUNT_ROOT_HASH",
        default_value = "false"
    )]
    merge_to_account_root_hash: bool,

    #[arg(
        long = "builder.throttled_entity_bundle_count",
        name = "builder.throttled_entity_bundle_count",
        env = "BUILDER_THROTTLED_ENTITY_BUNDLE_COUNT",
        default_value = "4"
    )]
    throttled_entity_bundle_count: usize,

    /// Seconds between automatic bundles, 0 disables them
    #[arg(
        long = "builder.auto_bundle_interval_seconds",
        name = "builder.auto_bundle_interval_seconds",
        env = "BUILDER_AUTO_BUNDLE_INTERVAL_SECONDS",
        default_value = "3"
    )]
    auto_bundle_interval_seconds: u64,

    /// Pool size that triggers a bundle
    #[arg(
        long = "builder.auto_bundle_mempool_size",
        name = "builder.auto_bundle_mempool_size",
        env = "BUILDER_AUTO_BUNDLE_MEMPOOL_SIZE",
        default_value = "10"
    )]
    auto_bundle_mempool_size: usize,

    #[arg(
        long = "builder.bundling_mode",
        name = "builder.bundling_mode",
        env = "BUILDER_BUNDLING_MODE",
        default_value = "auto"
    )]
    bundling_mode: BundlingMode,

    #[arg(
        long = "builder.cycle_timeout_seconds",
        name = "builder.cycle_timeout_seconds",
        env = "BUILDER_CYCLE_TIMEOUT_SECONDS",
        default_value = "60"
    )]
    cycle_timeout_seconds: u64,

    #[arg(
        long = "builder.receipt_poll_interval_millis",
        name = "builder.receipt_poll_interval_millis",
        env = "BUILDER_RECEIPT_POLL_INTERVAL_MILLIS",
        default_value = "1000"
    )]
    receipt_poll_interval_millis: u64,

    /// Separate node to broadcast bundles through
    #[arg(
        long = "builder.submit_url",
        name = "builder.submit_url",
        env = "BUILDER_SUBMIT_URL"
    )]
    pub submit_url: Option<String>,
}

impl BuilderArgs {
    pub fn to_args(&self, chain_id: u64) -> BuilderTaskArgs {
        BuilderTaskArgs {
            chain_id,
            private_key: self.private_key.clone(),
            beneficiary: self.beneficiary,
            min_signer_balance: self.min_signer_balance,
            max_bundle_gas: self.max_bundle_gas,
            bundle_gas_limit: self.bundle_gas_limit,
            conditional_rpc: self.conditional_rpc,
            merge_to_account_root_hash: self.merge_to_account_root_hash,
            throttled_entity_bundle_count: self.throttled_entity_bundle_count,
            auto_bundle_interval: (self.auto_bundle_interval_seconds > 0)
                .then(|| Duration::from_secs(self.auto_bundle_interval_seconds)),
            auto_bundle_mempool_size: self.auto_bundle_mempool_size,
            cycle_timeout: Duration::from_secs(self.cycle_timeout_seconds),
            receipt_poll_interval: Duration::from_millis(self.receipt_poll_interval_millis),
            bundling_mode: self.bundling_mode,
        }
    }
}

/// Skipped operations are logged by the builder at debug level
pub fn is_nonspammy_event(event: &WithEntryPoint<BuilderEvent>) -> bool {
    !matches!(event.event, BuilderEvent::SkippedOp { .. })
}
