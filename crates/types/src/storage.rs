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

use std::collections::{btree_map::Entry, BTreeMap};

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// Expected storage of a single account.
///
/// Serialized as either a storage root hash or an object of slot to value,
/// the shape accepted in the `knownAccounts` option of
/// `eth_sendRawTransactionConditional`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountStorage {
    /// The full storage root of the account
    RootHash(B256),
    /// Individual slot values
    Slots(BTreeMap<B256, B256>),
}

/// Two storage maps disagree about the expected state of an account.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("conflicting expected storage for {address} at {slot:?}")]
pub struct StorageConflict {
    /// Account with conflicting storage
    pub address: Address,
    /// Slot with conflicting values, `None` if the root hashes differ
    pub slot: Option<B256>,
}

/// Expected account storage, keyed by account address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageMap(BTreeMap<Address, AccountStorage>);

impl StorageMap {
    /// Create an empty storage map
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the value of a single slot.
    ///
    /// Ignored if the account is already pinned to a root hash.
    pub fn insert_slot(&mut self, address: Address, slot: B256, value: B256) {
        match self
            .0
            .entry(address)
            .or_insert_with(|| AccountStorage::Slots(BTreeMap::new()))
        {
            AccountStorage::RootHash(_) => {}
            AccountStorage::Slots(slots) => {
                slots.insert(slot, value);
            }
        }
    }

    /// Pin an account to its full storage root, replacing any slot entries.
    pub fn set_root_hash(&mut self, address: Address, root: B256) {
        self.0.insert(address, AccountStorage::RootHash(root));
    }

    /// Get the expected storage of an account
    pub fn get(&self, address: &Address) -> Option<&AccountStorage> {
        self.0.get(address)
    }

    /// Accounts with expected storage
    pub fn addresses(&self) -> impl Iterator<Item = &Address> + '_ {
        self.0.keys()
    }

    /// Number of accounts in the map
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map has no accounts
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check that `other` can be merged into this map without conflicts.
    pub fn check_merge(&self, other: &StorageMap) -> Result<(), StorageConflict> {
        for (address, theirs) in &other.0 {
            let Some(ours) = self.0.get(address) else {
                continue;
            };
            match (ours, theirs) {
                (AccountStorage::RootHash(a), AccountStorage::RootHash(b)) if a != b => {
                    return Err(StorageConflict {
                        address: *address,
                        slot: None,
                    });
                }
                (AccountStorage::Slots(a), AccountStorage::Slots(b)) => {
                    for (slot, value) in b {
                        if a.get(slot).is_some_and(|v| v != value) {
                            return Err(StorageConflict {
                                address: *address,
                                slot: Some(*slot),
                            });
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Merge `other` into this map.
    ///
    /// A root hash subsumes slot entries for the same account and slot maps are
    /// unioned. Nothing is changed if the maps conflict.
    pub fn merge(&mut self, other: &StorageMap) -> Result<(), StorageConflict> {
        self.check_merge(other)?;
        for (address, theirs) in &other.0 {
            match self.0.entry(*address) {
                Entry::Vacant(e) => {
                    e.insert(theirs.clone());
                }
                Entry::Occupied(mut e) => match (e.get_mut(), theirs) {
                    (AccountStorage::RootHash(_), _) => {}
                    (ours @ AccountStorage::Slots(_), AccountStorage::RootHash(root)) => {
                        *ours = AccountStorage::RootHash(*root);
                    }
                    (AccountStorage::Slots(ours), AccountStorage::Slots(slots)) => {
                        ours.extend(slots.iter().map(|(k, v)| (*k, *v)));
                    }
                },
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(n: u8) -> B256 {
        B256::repeat_byte(n)
    }

    #[test]
    fn merge_unions_slots() {
        let a = Address::repeat_byte(1);
        let mut map = StorageMap::new();
        map.insert_slot(a, slot(1), slot(10));

        let mut other = StorageMap::new();
        other.insert_slot(a, slot(2), slot(20));
        other.insert_slot(Address::repeat_byte(2), slot(1), slot(30));

        map.merge(&other).unwrap();
        assert_eq!(map.len(), 2);
        let AccountStorage::Slots(slots) = map.get(&a).unwrap() else {
            panic!("expected slots");
        };
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn root_hash_subsumes_slots() {
        let a = Address::repeat_byte(1);
        let mut map = StorageMap::new();
        map.insert_slot(a, slot(1), slot(10));

        let mut other = StorageMap::new();
        other.set_root_hash(a, slot(0xff));
        map.merge(&other).unwrap();
        assert_eq!(map.get(&a), Some(&AccountStorage::RootHash(slot(0xff))));

        map.insert_slot(a, slot(3), slot(3));
        assert_eq!(map.get(&a), Some(&AccountStorage::RootHash(slot(0xff))));
    }

    #[test]
    fn conflicting_slot_is_rejected_without_change() {
        let a = Address::repeat_byte(1);
        let mut map = StorageMap::new();
        map.insert_slot(a, slot(1), slot(10));

        let mut other = StorageMap::new();
        other.insert_slot(a, slot(1), slot(11));
        other.insert_slot(Address::repeat_byte(9), slot(1), slot(1));

        let err = map.merge(&other).unwrap_err();
        assert_eq!(err.address, a);
        assert_eq!(err.slot, Some(slot(1)));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn serializes_as_known_accounts() {
        let mut map = StorageMap::new();
        map.set_root_hash(Address::repeat_byte(1), slot(2));
        map.insert_slot(Address::repeat_byte(3), slot(4), slot(5));

        let json = serde_json::to_value(&map).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert!(obj
            .get("0x0101010101010101010101010101010101010101")
            .unwrap()
            .is_string());
        assert!(obj
            .get("0x0303030303030303030303030303030303030303")
            .unwrap()
            .is_object());
    }
}
