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

#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]
//! Operation pool for the Relayer: ordered storage of pending operations,
//! entity reputation, and reconciliation against included operations.

mod emit;
pub use emit::{OpRemovalReason, PoolEvent};

mod mempool;
pub use mempool::{
    parse_address_list, HourlyMovingAverageReputation, PoolConfig, ReputationParams, UoPool,
};

mod reconciler;
pub use reconciler::{PoolReconciler, ReconcilerSettings};

mod task;
pub use task::PoolTask;
