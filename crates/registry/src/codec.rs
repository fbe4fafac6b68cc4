//! Record encoding and key layout.
//!
//! A record lives under two keys: its id (primary index, full JSON record) and
//! `D:<domain>` (secondary index, holding the id as a back-reference).

use crate::errors::Result;
use crate::types::{Domain, Record};
use vicp_storage::KeyValueStore;

/// Prefix of secondary index keys.
pub const DOMAIN_KEY_PREFIX: &str = "D:";

pub struct RecordCodec;

impl RecordCodec {
    pub fn encode(record: &Record) -> Result<String> {
        Ok(serde_json::to_string(record)?)
    }

    pub fn decode(raw: &str) -> Result<Record> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Secondary index key for a domain
    pub fn domain_key(domain: &Domain) -> String {
        format!("{DOMAIN_KEY_PREFIX}{domain}")
    }

    /// Fetch and decode the primary entry stored under `key`.
    pub fn load(store: &dyn KeyValueStore, key: &str) -> Result<Option<Record>> {
        store
            .get(key)?
            .map(|raw| Self::decode(&raw))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordId;
    use vicp_storage::MemoryStore;

    fn sample() -> Record {
        Record {
            id: RecordId::parse("VICP-Q1W2E3R4").unwrap(),
            site: "Docs".to_string(),
            domain: Domain::parse("docs.example.org").unwrap(),
            owner: "Bob".to_string(),
            time: 42,
        }
    }

    #[test]
    fn test_domain_key_layout() {
        let domain = Domain::parse("example.com").unwrap();
        assert_eq!(RecordCodec::domain_key(&domain), "D:example.com");
    }

    #[test]
    fn test_load_decodes_stored_record() {
        let store = MemoryStore::new();
        let record = sample();
        store
            .put(record.id.as_str(), &RecordCodec::encode(&record).unwrap())
            .unwrap();

        let loaded = RecordCodec::load(&store, record.id.as_str()).unwrap();
        assert_eq!(loaded, Some(record));
        assert_eq!(RecordCodec::load(&store, "VICP-00000000").unwrap(), None);
    }

    #[test]
    fn test_corrupt_value_is_serialization_error() {
        let store = MemoryStore::new();
        store.put("VICP-Q1W2E3R4", "not json").unwrap();

        let err = RecordCodec::load(&store, "VICP-Q1W2E3R4").unwrap_err();
        assert!(matches!(err, crate::RegistryError::Serialization(_)));
        assert!(err.is_internal());
    }
}
