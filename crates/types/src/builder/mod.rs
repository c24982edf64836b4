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

//! Bundle builder interfaces

mod error;
pub use error::{BuilderError, BuilderResult};

mod traits;
#[cfg(feature = "test-utils")]
pub use traits::MockBuilder;
pub use traits::Builder;

mod types;
pub use types::{BundlingMode, SentBundle};
