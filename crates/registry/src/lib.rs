//! VICP Record Registry
//!
//! Sites register a `(site, domain, owner)` triple and receive a `VICP-XXXXXXXX`
//! record id. Records are stored twice in a flat key-value store: under their id
//! and under `D:<domain>` as a back-reference, which enforces one record per
//! domain and allows lookup by either key.

pub mod admin;
pub mod codec;
pub mod errors;
pub mod query;
pub mod registration;
pub mod types;

pub use admin::{AdminCredentials, AdminService, DEFAULT_LIST_PAGE_SIZE};
pub use codec::RecordCodec;
pub use errors::*;
pub use query::QueryService;
pub use registration::{IdGenerator, RandomIdGenerator, RegistrationService};
pub use types::*;
