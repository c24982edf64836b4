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
    collections::{HashMap, HashSet},
    time::Duration,
};

use alloy_primitives::Address;
use parking_lot::RwLock;
use relayer_types::pool::{Reputation, ReputationManager, ReputationStatus};
use tokio::time::interval;
use tracing::info;

/// Reputation manager whose counters decay by 1/24 every hour
#[derive(Debug)]
pub struct HourlyMovingAverageReputation {
    reputation: RwLock<AddressReputation>,
}

impl HourlyMovingAverageReputation {
    /// Create a new reputation manager
    pub fn new(
        params: ReputationParams,
        blocklist: Option<HashSet<Address>>,
        allowlist: Option<HashSet<Address>>,
    ) -> Self {
        let rep = AddressReputation::new(params)
            .with_blocklist(blocklist.unwrap_or_default())
            .with_allowlist(allowlist.unwrap_or_default());

        Self {
            reputation: RwLock::new(rep),
        }
    }

    /// Run the reputation hourly update job
    pub async fn run(&self) {
        let mut tick = interval(Duration::from_secs(60 * 60));
        // first tick completes immediately
        tick.tick().await;
        loop {
            tick.tick().await;
            self.reputation.write().hourly_update();
        }
    }
}

impl ReputationManager for HourlyMovingAverageReputation {
    fn status(&self, address: Address) -> ReputationStatus {
        self.reputation.read().status(address)
    }

    fn add_seen(&self, address: Address) {
        self.reputation.write().add_seen(address);
    }

    fn add_included(&self, address: Address) {
        self.reputation.write().add_included(address);
    }

    fn report_crash(&self, address: Address) {
        let mut reputation = self.reputation.write();
        reputation.crash(address);
        info!(
            "Crash reported for {address:?}, status now {}",
            reputation.status(address)
        );
    }

    fn dump_reputation(&self) -> Vec<Reputation> {
        let reputation = self.reputation.read();
        reputation
            .counts
            .iter()
            .map(|(address, count)| Reputation {
                address: *address,
                status: reputation.status(*address),
                ops_seen: count.ops_seen,
                ops_included: count.ops_included,
            })
            .collect()
    }

    fn set_reputation(&self, address: Address, ops_seen: u64, ops_included: u64) {
        self.reputation
            .write()
            .set_reputation(address, ops_seen, ops_included)
    }

    fn clear(&self) {
        self.reputation.write().counts.clear();
    }
}

/// Parameters of the reputation status computation
#[derive(Debug, Clone, Copy)]
pub struct ReputationParams {
    /// Expected inclusion rate is one in this many seen ops
    pub min_inclusion_rate_denominator: u64,
    /// Missing inclusions tolerated before throttling
    pub throttling_slack: u64,
    /// Missing inclusions tolerated before banning
    pub ban_slack: u64,
    /// Seen ops added when an entity causes a bundle to revert
    pub crash_penalty: u64,
}

impl ReputationParams {
    /// Defaults for a bundling relay
    pub fn bundler_default() -> Self {
        Self {
            min_inclusion_rate_denominator: 10,
            throttling_slack: 10,
            ban_slack: 50,
            crash_penalty: 10_000,
        }
    }
}

#[derive(Debug)]
struct AddressReputation {
    // Addresses that are always banned
    blocklist: HashSet<Address>,
    // Addresses that are always exempt from throttling and banning
    allowlist: HashSet<Address>,
    counts: HashMap<Address, AddressCount>,
    params: ReputationParams,
}

impl AddressReputation {
    fn new(params: ReputationParams) -> Self {
        Self {
            blocklist: HashSet::new(),
            allowlist: HashSet::new(),
            counts: HashMap::new(),
            params,
        }
    }

    fn with_blocklist(self, blocklist: HashSet<Address>) -> Self {
        Self { blocklist, ..self }
    }

    fn with_allowlist(self, allowlist: HashSet<Address>) -> Self {
        Self { allowlist, ..self }
    }

    fn status(&self, address: Address) -> ReputationStatus {
        if self.blocklist.contains(&address) {
            return ReputationStatus::Banned;
        } else if self.allowlist.contains(&address) {
            return ReputationStatus::Ok;
        }

        let Some(count) = self.counts.get(&address) else {
            return ReputationStatus::Ok;
        };

        let min_expected_included = count.ops_seen / self.params.min_inclusion_rate_denominator;
        if min_expected_included <= count.ops_included + self.params.throttling_slack {
            ReputationStatus::Ok
        } else if min_expected_included <= count.ops_included + self.params.ban_slack {
            ReputationStatus::Throttled
        } else {
            ReputationStatus::Banned
        }
    }

    fn add_seen(&mut self, address: Address) {
        let count = self.counts.entry(address).or_default();
        count.ops_seen = count.ops_seen.saturating_add(1);
    }

    fn add_included(&mut self, address: Address) {
        let count = self.counts.entry(address).or_default();
        count.ops_included = count.ops_included.saturating_add(1);
    }

    fn crash(&mut self, address: Address) {
        let count = self.counts.entry(address).or_default();
        count.ops_seen = count.ops_seen.saturating_add(self.params.crash_penalty);
        count.ops_included = 0;
    }

    fn set_reputation(&mut self, address: Address, ops_seen: u64, ops_included: u64) {
        let count = self.counts.entry(address).or_default();
        count.ops_seen = ops_seen;
        count.ops_included = ops_included;
    }

    fn hourly_update(&mut self) {
        for count in self.counts.values_mut() {
            count.ops_seen -= count.ops_seen / 24;
            count.ops_included -= count.ops_included / 24;
        }
        self.counts
            .retain(|_, count| count.ops_seen > 0 || count.ops_included > 0);
    }
}

#[derive(Debug, Default, Clone)]
struct AddressCount {
    ops_seen: u64,
    ops_included: u64,
}
