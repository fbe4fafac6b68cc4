//! HTTP surface of the VICP record registry.
//!
//! | Method | Path | Handler |
//! |---|---|---|
//! | POST | `/api/register` | register a record |
//! | GET | `/api/query` | look a record up by `id` or `domain` |
//! | POST | `/api/admin/delete` | list (no id) or delete (with id) records |
//! | GET | `/` | control panel |
//!
//! Everything else answers 404. Errors use the envelope `{"err": "..."}`.

pub mod panel;
pub mod server;

pub use server::{build_router, start_server, ApiError, AppState};
