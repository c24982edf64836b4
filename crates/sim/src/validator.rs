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
use relayer_types::{ReferencedContracts, UserOperation, ValidationError, ValidationOutput};

/// Validation settings
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    /// The maximum amount of verification gas that can be used during the simulation call
    pub max_verification_gas: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_verification_gas: 5_000_000,
        }
    }
}

/// Validates a single user operation against current chain state
#[cfg_attr(feature = "test-utils", automock)]
#[async_trait::async_trait]
pub trait Validator: Send + Sync + 'static {
    /// Validate an operation.
    ///
    /// On the second pass `referenced_contracts` holds the contracts recorded on
    /// the first pass, and validation fails if their code has changed since.
    async fn validate(
        &self,
        op: UserOperation,
        referenced_contracts: Option<ReferencedContracts>,
        is_second_pass: bool,
    ) -> Result<ValidationOutput, ValidationError>;
}
