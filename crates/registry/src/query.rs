//! Read-only record resolution by id or by domain.

use crate::codec::RecordCodec;
use crate::errors::*;
use crate::types::*;
use std::sync::Arc;
use tracing::warn;
use vicp_storage::KeyValueStore;

pub struct QueryService {
    store: Arc<dyn KeyValueStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Resolve a record from an id or a domain. Empty values count as absent and
    /// the id wins when both are supplied.
    pub fn lookup(&self, id: Option<&str>, domain: Option<&str>) -> Result<Record> {
        let id = id.filter(|value| !value.is_empty());
        let domain = domain.filter(|value| !value.is_empty());

        match (id, domain) {
            (Some(id), _) => {
                let id = RecordId::parse(id).ok_or_else(RegistryError::invalid_id)?;
                self.by_id(&id)
            }
            (None, Some(domain)) => {
                let domain = Domain::parse(domain).ok_or_else(RegistryError::invalid_domain)?;
                self.by_domain(&domain)
            }
            (None, None) => Err(RegistryError::missing_lookup_key()),
        }
    }

    pub fn by_id(&self, id: &RecordId) -> Result<Record> {
        RecordCodec::load(self.store.as_ref(), id.as_str())?
            .ok_or_else(RegistryError::record_not_found)
    }

    pub fn by_domain(&self, domain: &Domain) -> Result<Record> {
        let domain_key = RecordCodec::domain_key(domain);
        let id = self
            .store
            .get(&domain_key)?
            .ok_or_else(RegistryError::record_not_found)?;

        let Some(record) = RecordCodec::load(self.store.as_ref(), &id)? else {
            warn!("Index entry {} points to missing record {}", domain_key, id);
            return Err(RegistryError::record_not_found());
        };

        if record.domain != *domain {
            warn!(
                "Index entry {} points to {} registered for {}",
                domain_key, id, record.domain
            );
            return Err(RegistryError::record_not_found());
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::RegistrationService;
    use vicp_storage::MemoryStore;

    fn setup() -> (MemoryStore, RegistrationService, QueryService) {
        let store = MemoryStore::new();
        let shared: Arc<dyn KeyValueStore> = Arc::new(store.clone());
        (
            store,
            RegistrationService::new(shared.clone()),
            QueryService::new(shared),
        )
    }

    #[test]
    fn test_lookup_by_id_and_domain() {
        let (_, registration, query) = setup();
        let record = registration.register("Blog", "example.com", "Alice").unwrap();

        let by_id = query.lookup(Some(record.id.as_str()), None).unwrap();
        let by_domain = query.lookup(None, Some("example.com")).unwrap();
        assert_eq!(by_id, record);
        assert_eq!(by_domain, record);
    }

    #[test]
    fn test_lookup_requires_a_key() {
        let (_, _, query) = setup();
        for (id, domain) in [(None, None), (Some(""), None), (Some(""), Some(""))] {
            let err = query.lookup(id, domain).unwrap_err();
            assert!(
                matches!(&err, RegistryError::Validation(msg) if msg == "must supply id or domain")
            );
        }
    }

    #[test]
    fn test_malformed_id_is_validation_error() {
        let (_, _, query) = setup();
        let err = query.lookup(Some("VICP-short"), None).unwrap_err();
        assert!(matches!(err, RegistryError::Validation(msg) if msg == "invalid id"));
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let (_, _, query) = setup();
        let err = query.lookup(Some("VICP-00000000"), None).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[test]
    fn test_malformed_and_unknown_domain() {
        let (_, _, query) = setup();
        assert!(matches!(
            query.lookup(None, Some("localhost")).unwrap_err(),
            RegistryError::Validation(_)
        ));
        assert!(matches!(
            query.lookup(None, Some("unknown.com")).unwrap_err(),
            RegistryError::NotFound(_)
        ));
    }

    #[test]
    fn test_id_takes_precedence_over_domain() {
        let (_, registration, query) = setup();
        let first = registration.register("One", "one.com", "Alice").unwrap();
        registration.register("Two", "two.com", "Bob").unwrap();

        let found = query
            .lookup(Some(first.id.as_str()), Some("two.com"))
            .unwrap();
        assert_eq!(found.domain.as_str(), "one.com");
    }

    #[test]
    fn test_dangling_index_entry_is_not_found() {
        let (store, _, query) = setup();
        store.put("D:example.com", "VICP-GONE0000").unwrap();

        let err = query.lookup(None, Some("example.com")).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }
}
