//! Persistence layer: libSQL-backed storage for the chat log, submissions,
//! usage records, and site data.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{ChatStore, ContactRequest, Counter, MeetingRequest, RecruiterSubmission};
