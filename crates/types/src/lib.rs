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

//! Relayer common types

pub mod builder;

mod entity;
pub use entity::{Entity, EntityType};

mod gas;
pub use gas::GasFees;

pub mod pool;

mod storage;
pub use storage::{AccountStorage, StorageConflict, StorageMap};

mod user_operation;
pub use user_operation::{UserOperation, UserOperationBuilder, UserOperationId, UserOperationRequiredFields};

mod validation;
pub use validation::{ReferencedContracts, ValidationError, ValidationOutput};
