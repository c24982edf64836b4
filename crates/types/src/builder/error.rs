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

/// Builder result
pub type BuilderResult<T> = std::result::Result<T, BuilderError>;

/// Builder error type
#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    /// A bundle is already being built or a trigger is pending
    #[error("bundler is busy, try again later")]
    Busy,
    /// The builder is shutting down
    #[error("builder is shutting down")]
    Shutdown,
    /// Internal error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
