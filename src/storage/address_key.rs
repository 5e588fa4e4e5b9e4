//! Address + 32-byte key keyed storage, used for both persistent (SLOAD/SSTORE)
//! and transient (TLOAD/TSTORE) storage.

use std::collections::HashMap;

use crate::byte_group::TaggedByteGroup;
use crate::error::Error;
use crate::hexstring::HexString;

#[derive(Clone, Debug, Default)]
pub struct AddressKeyStorage {
    tables: HashMap<HexString, HashMap<HexString, TaggedByteGroup>>,
}

impl AddressKeyStorage {
    pub fn new() -> Self {
        AddressKeyStorage { tables: HashMap::new() }
    }

    pub fn knows_key(&self, address: &HexString, key: &HexString) -> bool {
        self.tables
            .get(&address.as_address())
            .is_some_and(|table| table.contains_key(&key.as_size(32)))
    }

    pub fn get(&self, address: &HexString, key: &HexString) -> Result<TaggedByteGroup, Error> {
        self.tables
            .get(&address.as_address())
            .and_then(|table| table.get(&key.as_size(32)))
            .cloned()
            .ok_or_else(|| Error::StorageKeyMissing(address.with_prefix(), key.with_prefix()))
    }

    pub fn set(&mut self, address: &HexString, key: &HexString, value: TaggedByteGroup) {
        self.tables
            .entry(address.as_address())
            .or_default()
            .insert(key.as_size(32), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group32(hex: &str, step: i64) -> TaggedByteGroup {
        TaggedByteGroup::from_hexstring(&HexString::new(hex).unwrap().as_size(32), step)
    }

    #[test]
    fn get_returns_the_stored_value_with_provenance() {
        let mut storage = AddressKeyStorage::new();
        let addr = HexString::new("0xabcd").unwrap();
        let key = HexString::new("0x1234").unwrap();
        storage.set(&addr, &key, group32("0x11223344", 1));

        let value = storage.get(&addr, &key).unwrap();

        assert_eq!(value.get_hexstring(), HexString::new("0x11223344").unwrap().as_size(32));
        assert_eq!(value.depends_on_instruction_indexes(), std::collections::BTreeSet::from([1]));
    }

    #[test]
    fn knows_key_reflects_presence() {
        let mut storage = AddressKeyStorage::new();
        let addr = HexString::new("0xabcd").unwrap();
        let key = HexString::new("0x1234").unwrap();

        assert!(!storage.knows_key(&addr, &key));
        storage.set(&addr, &key, group32("0x00", 1));
        assert!(storage.knows_key(&addr, &key));
    }

    #[test]
    fn get_fails_for_unknown_address_or_key() {
        let storage = AddressKeyStorage::new();
        let addr = HexString::new("0xabcd").unwrap();
        let key = HexString::new("0x1234").unwrap();

        assert!(storage.get(&addr, &key).is_err());
    }
}
