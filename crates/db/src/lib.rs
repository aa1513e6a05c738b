//! Backlog implementations: durable Postgres and in-memory.

pub mod dedupe;
pub mod mem;
pub mod pg;

pub use mem::MemoryBacklog;
pub use pg::{NewIntent, PgBacklog};
