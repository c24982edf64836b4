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

use std::time::Instant;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::{Entity, ReferencedContracts, UserOperation};

/// The reputation of an entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reputation {
    /// The entity's address
    pub address: Address,
    /// Number of ops seen in the current interval
    pub ops_seen: u64,
    /// Number of ops included in the current interval
    pub ops_included: u64,
    /// Status derived from the counters
    pub status: ReputationStatus,
}

/// Reputation status for an entity
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, parse_display::Display,
)]
#[display(style = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReputationStatus {
    /// Entity is not throttled or banned
    Ok,
    /// Entity is throttled
    Throttled,
    /// Entity is banned
    Banned,
}

/// A user operation with metadata from its first validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOperation {
    /// The user operation stored in the pool
    pub uo: UserOperation,
    /// The entry point address for this operation
    pub entry_point: Address,
    /// Contracts touched when the operation was validated
    pub referenced_contracts: ReferencedContracts,
    /// When the operation entered the pool
    pub added_at: Instant,
}

impl PoolOperation {
    /// Returns true if the operation contains the given entity.
    pub fn contains_entity(&self, entity: &Entity) -> bool {
        self.uo.entities().contains(entity)
    }

    /// Compute the amount of heap memory the PoolOperation takes up.
    pub fn mem_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.uo.heap_size()
            + self.referenced_contracts.addresses.len() * std::mem::size_of::<Address>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ReputationStatus::Throttled).unwrap(),
            "\"throttled\""
        );
        assert_eq!(ReputationStatus::Banned.to_string(), "banned");
    }
}
