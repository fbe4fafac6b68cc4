//! Record registration
//!
//! Validates submissions, enforces one record per domain and writes both index
//! entries for the new record.

use crate::codec::RecordCodec;
use crate::errors::*;
use crate::types::*;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vicp_storage::KeyValueStore;

/// How many fresh ids are tried before registration gives up.
pub const MAX_ID_ATTEMPTS: usize = 8;

/// Source of candidate record ids.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> RecordId;
}

/// Draws ids from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn next_id(&self) -> RecordId {
        RecordId::random(&mut rand::thread_rng())
    }
}

pub struct RegistrationService {
    store: Arc<dyn KeyValueStore>,
    ids: Arc<dyn IdGenerator>,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_id_generator(store, Arc::new(RandomIdGenerator))
    }

    pub fn with_id_generator(store: Arc<dyn KeyValueStore>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { store, ids }
    }

    /// Register a new record. Empty strings count as missing parameters.
    pub fn register(&self, site: &str, domain: &str, owner: &str) -> Result<Record> {
        if site.is_empty() || domain.is_empty() || owner.is_empty() {
            return Err(RegistryError::missing_parameters());
        }

        let domain = Domain::parse(domain).ok_or_else(RegistryError::invalid_domain)?;
        let domain_key = RecordCodec::domain_key(&domain);

        // Only an entry whose record still claims this domain blocks registration.
        if let Some(existing) = self.store.get(&domain_key)? {
            match RecordCodec::load(self.store.as_ref(), &existing)? {
                Some(record) if record.domain == domain => {
                    return Err(RegistryError::domain_taken(existing));
                }
                Some(record) => warn!(
                    "Index entry {} points to {} registered for {}; reclaiming",
                    domain_key, existing, record.domain
                ),
                None => warn!(
                    "Index entry {} points to missing record {}; reclaiming",
                    domain_key, existing
                ),
            }
        }

        let record = Record {
            id: self.allocate_id()?,
            site: site.to_string(),
            domain,
            owner: owner.to_string(),
            time: now_millis(),
        };

        let encoded = RecordCodec::encode(&record)?;
        self.store.put_pair(
            (record.id.as_str(), encoded.as_str()),
            (domain_key.as_str(), record.id.as_str()),
        )?;

        info!("Registered {} for domain {}", record.id, record.domain);
        Ok(record)
    }

    /// Pick an id that is not yet a primary key.
    fn allocate_id(&self) -> Result<RecordId> {
        for attempt in 1..=MAX_ID_ATTEMPTS {
            let candidate = self.ids.next_id();
            if self.store.get(candidate.as_str())?.is_none() {
                return Ok(candidate);
            }
            debug!("Record id {} already taken (attempt {})", candidate, attempt);
        }

        Err(RegistryError::IdSpaceExhausted {
            attempts: MAX_ID_ATTEMPTS,
        })
    }
}
