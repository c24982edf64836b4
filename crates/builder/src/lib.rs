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
//! Bundle builder for the Relayer.
//!
//! Assembles bundles from the operation pool, submits them to the entry point
//! and classifies failed operations back into the pool and reputation.

mod bundle_proposer;
mod bundle_sender;

mod emit;
pub use emit::{BuilderEvent, OpRejectionReason, SkipReason};

mod failure;
mod sender;

mod server;
pub use server::LocalBuilderHandle;

mod signer;

mod task;
pub use task::{Args as BuilderTaskArgs, BuilderParts, BuilderTask};

mod trigger;
