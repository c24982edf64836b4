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

use alloy_primitives::B256;
use parse_display::{Display, FromStr};
use serde::{Deserialize, Serialize};

/// Builder bundling mode
#[derive(Display, FromStr, Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[display(style = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BundlingMode {
    /// Manual bundling mode for debugging.
    ///
    /// Bundles will only be sent when `debug_send_bundle_now` is called.
    Manual,
    /// Auto bundling mode for normal operation.
    ///
    /// Bundles will be sent on an interval and when the pool grows past a threshold.
    Auto,
}

/// A bundle that was accepted by the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentBundle {
    /// Hash of the bundle transaction
    pub transaction_hash: B256,
    /// Hashes of the operations in the bundle
    pub user_op_hashes: Vec<B256>,
}
