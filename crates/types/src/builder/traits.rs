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

#[cfg(feature = "test-utils")]
use mockall::automock;

use super::{error::BuilderResult, types::BundlingMode, SentBundle};

/// Builder
#[cfg_attr(feature = "test-utils", automock)]
#[async_trait::async_trait]
pub trait Builder: Send + Sync + 'static {
    /// Trigger the builder to run a cycle now, used for debugging.
    ///
    /// Returns `None` when the cycle did not send a bundle.
    async fn debug_send_bundle_now(&self) -> BuilderResult<Option<SentBundle>>;

    /// Set the bundling mode
    async fn debug_set_bundling_mode(&self, mode: BundlingMode) -> BuilderResult<()>;
}
