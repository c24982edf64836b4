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

use std::{collections::HashSet, time::Duration};

use alloy_primitives::Address;

mod pool;

mod reputation;
pub use reputation::{HourlyMovingAverageReputation, ReputationParams};

mod uo_pool;
pub use uo_pool::UoPool;

/// Config for the mempool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Address of the entry point this pool targets
    pub entry_point: Address,
    /// The maximum number of operations a sender can have in the mempool
    pub same_sender_mempool_count: usize,
    /// The minimum fee bump required to replace an operation in the mempool
    /// Applies to both priority fee and fee. Expressed as an integer percentage value
    pub min_replacement_fee_increase_percentage: u32,
    /// After this threshold is met, we will start to drop the worst userops from the mempool
    pub max_size_of_pool_bytes: usize,
    /// Operations older than this are dropped when the pool is reconciled
    pub max_op_age: Option<Duration>,
}

impl PoolConfig {
    /// Config with default limits for `entry_point`
    pub fn new(entry_point: Address) -> Self {
        Self {
            entry_point,
            same_sender_mempool_count: 4,
            min_replacement_fee_increase_percentage: 10,
            max_size_of_pool_bytes: 500 * 1024 * 1024,
            max_op_age: None,
        }
    }
}

/// Parse a comma separated address list, as used for the block and allow lists
pub fn parse_address_list(list: &str) -> anyhow::Result<HashSet<Address>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Address>()
                .map_err(|e| anyhow::anyhow!("invalid address {s}: {e}"))
        })
        .collect()
}
