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
//! User operation validation.
//!
//! The pool validates operations on insert and the bundle assembler validates
//! them again before admitting them to a bundle.
//!
//! ## Feature Flags
//!
//! - `test-utils`: Export mocks and utilities for testing.

mod validator;
#[cfg(feature = "test-utils")]
pub use validator::MockValidator;
pub use validator::{Settings as ValidationSettings, Validator};

mod unsafe_sim;
pub use unsafe_sim::UnsafeValidator;

pub use relayer_types::{ReferencedContracts, ValidationError, ValidationOutput};
