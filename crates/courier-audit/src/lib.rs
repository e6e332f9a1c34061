//! # Courier Audit
//!
//! Durable records of processed messages.
//!
//! After the handler stages ran, [`AuditMiddleware`] projects the message
//! context into a [`MessageRecord`] and appends it to a [`MessageRepository`].
//! Operators later read records back with a [`MessageQuery`].
//!
//! ## Repositories
//!
//! | Repository | Storage | Order of `get` |
//! |------------|---------|----------------|
//! | [`InMemoryMessageRepository`] | `Vec` behind a lock | insertion |
//! | [`FileMessageRepository`] | append-only wire frames, optionally gzip | insertion |
//! | [`SqlMessageRepository`] | any [`sql::SqlExecutor`] | auto-increment key |
//!
//! ## Other tooling
//!
//! - [`wire`]: the chunked binary frame format used by file stores
//! - [`sql`]: filter scripts, DDL and INSERT statements in three dialects
//! - [`export`]: the fixed 11-column CSV export

#![doc(html_root_url = "https://docs.rs/courier-audit/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod export;
mod middleware;
mod query;
mod record;
pub mod repository;
pub mod sql;
pub mod wire;

pub use error::{AuditError, AuditResult};
pub use middleware::AuditMiddleware;
pub use query::{CompiledQuery, MessageQuery};
pub use record::MessageRecord;
pub use repository::{
    FileMessageRepository, InMemoryMessageRepository, MessageRepository, SqlMessageRepository,
};
