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

use std::cmp;

use relayer_utils::math;
use serde::{Deserialize, Serialize};

/// Gas fees for a user operation or transaction
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasFees {
    /// EIP-1559 max fee per gas
    pub max_fee_per_gas: u128,
    /// EIP-1559 max priority fee per gas
    pub max_priority_fee_per_gas: u128,
}

impl GasFees {
    /// Increase the gas fees by a percentage
    pub fn increase_by_percent(self, percent: u32) -> Self {
        Self {
            max_fee_per_gas: math::increase_by_percent_ceil(self.max_fee_per_gas, percent),
            max_priority_fee_per_gas: math::increase_by_percent_ceil(
                self.max_priority_fee_per_gas,
                percent,
            ),
        }
    }

    /// Whether these fees are high enough to replace `existing`, requiring both
    /// fee fields to rise by at least `percent`.
    pub fn can_replace(&self, existing: &GasFees, percent: u32) -> bool {
        let required = existing.increase_by_percent(percent);
        self.max_fee_per_gas >= required.max_fee_per_gas
            && self.max_priority_fee_per_gas >= required.max_priority_fee_per_gas
    }

    /// Get the gas price from these fees given a base fee
    pub fn gas_price(self, base_fee: u128) -> u128 {
        cmp::min(
            self.max_fee_per_gas,
            base_fee.saturating_add(self.max_priority_fee_per_gas),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replacement_requires_both_fees() {
        let existing = GasFees {
            max_fee_per_gas: 100,
            max_priority_fee_per_gas: 10,
        };
        let only_max = GasFees {
            max_fee_per_gas: 110,
            max_priority_fee_per_gas: 10,
        };
        let both = GasFees {
            max_fee_per_gas: 110,
            max_priority_fee_per_gas: 11,
        };
        assert!(!only_max.can_replace(&existing, 10));
        assert!(both.can_replace(&existing, 10));
    }

    #[test]
    fn gas_price_capped_by_max_fee() {
        let fees = GasFees {
            max_fee_per_gas: 50,
            max_priority_fee_per_gas: 5,
        };
        assert_eq!(fees.gas_price(10), 15);
        assert_eq!(fees.gas_price(100), 50);
    }
}
