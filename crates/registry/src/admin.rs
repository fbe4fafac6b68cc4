//! Administrator operations: listing and deleting records behind a shared secret.

use crate::codec::RecordCodec;
use crate::errors::*;
use crate::types::*;
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use vicp_storage::KeyValueStore;

/// Page size used when enumerating record ids.
pub const DEFAULT_LIST_PAGE_SIZE: usize = 1000;

/// Configured administrator username and password.
///
/// Only fixed-length digests of the secrets are kept; candidates are hashed the
/// same way before comparison.
#[derive(Clone)]
pub struct AdminCredentials {
    user: String,
    user_digest: [u8; 32],
    pass_digest: [u8; 32],
}

impl AdminCredentials {
    pub fn new(user: impl Into<String>, pass: impl Into<String>) -> Self {
        let user = user.into();
        let pass = pass.into();
        Self {
            user_digest: digest(&user),
            pass_digest: digest(&pass),
            user,
        }
    }

    /// Constant-time comparison of both fields.
    pub fn verify(&self, user: &str, pass: &str) -> bool {
        let user_ok = digest(user)[..].ct_eq(&self.user_digest[..]);
        let pass_ok = digest(pass)[..].ct_eq(&self.pass_digest[..]);
        (user_ok & pass_ok).into()
    }
}

fn digest(value: &str) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"vicp-admin-credential");
    hasher.update(value.as_bytes());
    *hasher.finalize().as_bytes()
}

impl fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .finish()
    }
}

pub struct AdminService {
    store: Arc<dyn KeyValueStore>,
    credentials: AdminCredentials,
    page_size: usize,
}

impl AdminService {
    pub fn new(store: Arc<dyn KeyValueStore>, credentials: AdminCredentials) -> Self {
        Self::with_page_size(store, credentials, DEFAULT_LIST_PAGE_SIZE)
    }

    pub fn with_page_size(
        store: Arc<dyn KeyValueStore>,
        credentials: AdminCredentials,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            credentials,
            page_size: page_size.max(1),
        }
    }

    /// Fails closed when either credential is absent.
    pub fn authenticate(&self, user: Option<&str>, pass: Option<&str>) -> bool {
        match (user, pass) {
            (Some(user), Some(pass)) => self.credentials.verify(user, pass),
            _ => false,
        }
    }

    /// Authenticate, then list every record when no id is given or delete the
    /// named record otherwise.
    pub fn handle(
        &self,
        user: Option<&str>,
        pass: Option<&str>,
        id: Option<&str>,
    ) -> Result<AdminOutcome> {
        if !self.authenticate(user, pass) {
            warn!("Rejected admin request with bad credentials");
            return Err(RegistryError::Unauthorized);
        }

        match id.filter(|value| !value.is_empty()) {
            None => self.list_all().map(AdminOutcome::Listed),
            Some(id) => self.delete(id).map(AdminOutcome::Deleted),
        }
    }

    /// Every record id in store order, following cursors to the end.
    pub fn list_all(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .store
                .list(RECORD_ID_PREFIX, cursor.as_deref(), self.page_size)?;
            ids.extend(page.keys);
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(ids)
    }

    /// Remove a record and its domain index entry, returning the deleted id.
    pub fn delete(&self, id: &str) -> Result<String> {
        let id = RecordId::parse(id).ok_or_else(RegistryError::invalid_id)?;
        let record = RecordCodec::load(self.store.as_ref(), id.as_str())?
            .ok_or_else(RegistryError::record_not_found)?;

        let domain_key = RecordCodec::domain_key(&record.domain);
        // Only drop the index entry if it still refers to this record.
        let secondary = match self.store.get(&domain_key)? {
            Some(owner) if owner == id.as_str() => Some(domain_key.as_str()),
            Some(owner) => {
                warn!(
                    "Index entry {} belongs to {}, leaving it in place while deleting {}",
                    domain_key, owner, id
                );
                None
            }
            None => {
                warn!("Record {} had no index entry {}", id, domain_key);
                None
            }
        };

        self.store.delete_pair(id.as_str(), secondary)?;
        info!("Deleted record {} for domain {}", id, record.domain);
        Ok(id.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryService;
    use crate::registration::RegistrationService;
    use vicp_storage::MemoryStore;

    const USER: &str = "root";
    const PASS: &str = "s3cret";

    struct Fixture {
        store: MemoryStore,
        registration: RegistrationService,
        query: QueryService,
        admin: AdminService,
    }

    fn fixture(page_size: usize) -> Fixture {
        let store = MemoryStore::new();
        let shared: Arc<dyn KeyValueStore> = Arc::new(store.clone());
        Fixture {
            registration: RegistrationService::new(shared.clone()),
            query: QueryService::new(shared.clone()),
            admin: AdminService::with_page_size(
                shared,
                AdminCredentials::new(USER, PASS),
                page_size,
            ),
            store,
        }
    }

    #[test]
    fn test_credentials_verify() {
        let credentials = AdminCredentials::new(USER, PASS);
        assert!(credentials.verify(USER, PASS));
        assert!(!credentials.verify(USER, "wrong"));
        assert!(!credentials.verify("admin", PASS));
        assert!(!credentials.verify("", ""));
        assert!(!format!("{credentials:?}").contains(PASS));
    }

    #[test]
    fn test_credentials_reject_prefix_and_extension() {
        let credentials = AdminCredentials::new(USER, PASS);
        for pass in ["s3cre", "s3crett", "s3cret ", "S3CRET", "s3cret\0"] {
            assert!(!credentials.verify(USER, pass), "accepted {pass:?}");
        }
        for user in ["roo", "roott", "Root"] {
            assert!(!credentials.verify(user, PASS), "accepted {user:?}");
        }
    }

    #[test]
    fn test_auth_failure_takes_priority() {
        let fx = fixture(10);
        let record = fx.registration.register("Blog", "example.com", "Alice").unwrap();

        for id in [None, Some(""), Some("garbage"), Some(record.id.as_str())] {
            for (user, pass) in [
                (Some(USER), Some("wrong")),
                (None, Some(PASS)),
                (Some(USER), None),
                (None, None),
            ] {
                let err = fx.admin.handle(user, pass, id).unwrap_err();
                assert!(matches!(err, RegistryError::Unauthorized));
            }
        }

        // Nothing was deleted along the way
        assert!(fx.query.lookup(Some(record.id.as_str()), None).is_ok());
    }

    #[test]
    fn test_list_spans_pagination() {
        let fx = fixture(3);
        let mut expected = Vec::new();
        for i in 0..10 {
            let record = fx
                .registration
                .register("Site", &format!("site{i}.com"), "Owner")
                .unwrap();
            expected.push(record.id.as_str().to_string());
        }
        expected.sort();

        let outcome = fx.admin.handle(Some(USER), Some(PASS), None).unwrap();
        assert_eq!(outcome, AdminOutcome::Listed(expected));
    }

    #[test]
    fn test_list_ignores_index_keys() {
        let fx = fixture(2);
        fx.registration.register("Blog", "example.com", "Alice").unwrap();

        let ids = fx.admin.list_all().unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids[0].starts_with(RECORD_ID_PREFIX));
    }

    #[test]
    fn test_delete_removes_both_entries() {
        let fx = fixture(10);
        let record = fx.registration.register("Blog", "example.com", "Alice").unwrap();

        let outcome = fx
            .admin
            .handle(Some(USER), Some(PASS), Some(record.id.as_str()))
            .unwrap();
        assert_eq!(outcome, AdminOutcome::Deleted(record.id.as_str().to_string()));

        assert!(matches!(
            fx.query.lookup(Some(record.id.as_str()), None).unwrap_err(),
            RegistryError::NotFound(_)
        ));
        assert!(matches!(
            fx.query.lookup(None, Some("example.com")).unwrap_err(),
            RegistryError::NotFound(_)
        ));
        assert!(fx.store.is_empty());

        // The domain can be registered again
        assert!(fx.registration.register("Blog", "example.com", "Alice").is_ok());
    }

    #[test]
    fn test_delete_unknown_and_malformed_ids() {
        let fx = fixture(10);
        assert!(matches!(
            fx.admin.delete("VICP-00000000").unwrap_err(),
            RegistryError::NotFound(_)
        ));
        assert!(matches!(
            fx.admin.delete("not-an-id").unwrap_err(),
            RegistryError::Validation(_)
        ));
    }

    #[test]
    fn test_delete_tolerates_missing_index_entry() {
        let fx = fixture(10);
        let record = fx.registration.register("Blog", "example.com", "Alice").unwrap();
        fx.store.delete("D:example.com").unwrap();

        assert!(fx.admin.delete(record.id.as_str()).is_ok());
        assert!(fx.store.is_empty());
    }

    #[test]
    fn test_delete_keeps_foreign_index_entry() {
        let fx = fixture(10);
        let record = fx.registration.register("Blog", "example.com", "Alice").unwrap();
        fx.store.put("D:example.com", "VICP-OTHER000").unwrap();

        fx.admin.delete(record.id.as_str()).unwrap();
        assert_eq!(
            fx.store.get("D:example.com").unwrap().as_deref(),
            Some("VICP-OTHER000")
        );
    }
}
