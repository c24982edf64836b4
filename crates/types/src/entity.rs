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

use std::fmt::Display;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

/// The role an address plays in a user operation
#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
    parse_display::Display,
)]
#[display(style = "camelCase")]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    /// Account type
    Account,
    /// Paymaster type
    Paymaster,
    /// Aggregator type
    Aggregator,
    /// Factory type
    Factory,
}

impl EntityType {
    /// Whether this role is subject to reputation tracking by the bundle assembler.
    ///
    /// Senders are limited to one operation per bundle instead.
    pub fn is_staked_role(&self) -> bool {
        matches!(self, EntityType::Paymaster | EntityType::Factory)
    }
}

/// An entity associated with a user operation
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Entity {
    /// The type of entity
    pub kind: EntityType,
    /// The address of the entity
    pub address: Address,
}

impl Entity {
    /// Create a new entity of the given type and address
    pub fn new(kind: EntityType, address: Address) -> Self {
        Self { kind, address }
    }

    /// Create a new account entity at address
    pub fn account(address: Address) -> Self {
        Self::new(EntityType::Account, address)
    }

    /// Create a new paymaster entity at address
    pub fn paymaster(address: Address) -> Self {
        Self::new(EntityType::Paymaster, address)
    }

    /// Create a new factory entity at address
    pub fn factory(address: Address) -> Self {
        Self::new(EntityType::Factory, address)
    }
}

impl Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.address.to_checksum(None))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn entity_type_strings() {
        assert_eq!(EntityType::Paymaster.to_string(), "paymaster");
        assert_eq!(
            EntityType::from_str("factory").unwrap(),
            EntityType::Factory
        );
        assert!(EntityType::from_str("bundler").is_err());
    }

    #[test]
    fn display_entity() {
        let e = Entity::paymaster(Address::repeat_byte(0xaa));
        assert!(e.to_string().starts_with("paymaster:0x"));
    }
}
