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

//! Math utilities

use alloy_primitives::U256;

/// Increases a number by a percentage
pub fn increase_by_percent(n: u128, percent: u32) -> u128 {
    n.saturating_mul(100 + u128::from(percent)) / 100
}

/// Increases a number by a percentage, rounding up
pub fn increase_by_percent_ceil(n: u128, percent: u32) -> u128 {
    n.saturating_mul(100 + u128::from(percent)).div_ceil(100)
}

/// Take a percentage of a number
pub fn percent(n: u128, percent: u32) -> u128 {
    n.saturating_mul(u128::from(percent)) / 100
}

/// Convert a `U256` into a `u128`, saturating at `u128::MAX`
pub fn saturating_u128(n: U256) -> u128 {
    u128::try_from(n).unwrap_or(u128::MAX)
}

/// Convert a decimal amount of gwei into wei, truncating sub-wei precision.
pub fn gwei_to_wei(gwei: f64) -> u128 {
    if !gwei.is_finite() || gwei <= 0.0 {
        return 0;
    }
    (gwei * 1e9) as u128
}
