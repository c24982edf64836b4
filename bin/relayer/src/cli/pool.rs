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

use clap::Args;
use relayer_pool::{parse_address_list, PoolConfig, ReconcilerSettings, ReputationParams};

use super::CommonArgs;

/// CLI options for the operation pool
#[derive(Args, Debug)]
#[command(next_help_heading = "POOL")]
pub struct PoolArgs {
    #[arg(
        long = "pool.max_size_in_bytes",
        name = "pool.max_size_in_bytes",
        env = "POOL_MAX_SIZE_IN_BYTES",
        default_value = "500000000" // .5gigs
    )]
    pub max_size_in_bytes: usize,

    #[arg(
        long = "pool.same_sender_mempool_count",
        name = "pool.same_sender_mempool_count",
        env = "SAME_SENDER_MEMPOOL_COUNT",
        default_value = "4"
    )]
    pub same_sender_mempool_count: usize,

    #[arg(
        long = "pool.min_replacement_fee_increase_percentage",
        name = "pool.min_replacement_fee_increase_percentage",
        env = "POOL_MIN_REPLACEMENT_FEE_INCREASE_PERCENTAGE",
        default_value = "10"
    )]
    pub min_replacement_fee_increase_percentage: u32,

    /// Operations older than this are dropped, unset keeps them until included
    #[arg(
        long = "pool.max_op_age_seconds",
        name = "pool.max_op_age_seconds",
        env = "POOL_MAX_OP_AGE_SECONDS"
    )]
    pub max_op_age_seconds: Option<u64>,

    /// Comma separated addresses that are always banned
    #[arg(
        long = "pool.blocklist",
        name = "pool.blocklist",
        env = "POOL_BLOCKLIST"
    )]
    pub blocklist: Option<String>,

    /// Comma separated addresses that are never throttled or banned
    #[arg(
        long = "pool.allowlist",
        name = "pool.allowlist",
        env = "POOL_ALLOWLIST"
    )]
    pub allowlist: Option<String>,

    /// Seen operations added to an entity that crashed a bundle
    #[arg(
        long = "pool.crash_penalty",
        name = "pool.crash_penalty",
        env = "POOL_CRASH_PENALTY",
        default_value = "10000"
    )]
    pub crash_penalty: u64,

    /// Maximum blocks scanned for included operations per cycle
    #[arg(
        long = "pool.reconcile_block_range",
        name = "pool.reconcile_block_range",
        env = "POOL_RECONCILE_BLOCK_RANGE",
        default_value = "1000"
    )]
    pub reconcile_block_range: u64,
}

impl PoolArgs {
    pub fn pool_config(&self, common: &CommonArgs) -> PoolConfig {
        PoolConfig {
            entry_point: common.entry_point,
            same_sender_mempool_count: self.same_sender_mempool_count,
            min_replacement_fee_increase_percentage: self.min_replacement_fee_increase_percentage,
            max_size_of_pool_bytes: self.max_size_in_bytes,
            max_op_age: self.max_op_age_seconds.map(Duration::from_secs),
        }
    }

    pub fn reputation_params(&self) -> ReputationParams {
        ReputationParams {
            crash_penalty: self.crash_penalty,
            ..ReputationParams::bundler_default()
        }
    }

    pub fn reconciler_settings(&self, common: &CommonArgs) -> ReconcilerSettings {
        ReconcilerSettings {
            entry_point: common.entry_point,
            block_range: self.reconcile_block_range,
        }
    }

    pub fn address_lists(
        &self,
    ) -> anyhow::Result<(
        Option<std::collections::HashSet<alloy_primitives::Address>>,
        Option<std::collections::HashSet<alloy_primitives::Address>>,
    )> {
        let blocklist = self.blocklist.as_deref().map(parse_address_list).transpose()?;
        let allowlist = self.allowlist.as_deref().map(parse_address_list).transpose()?;
        Ok((blocklist, allowlist))
    }
}
