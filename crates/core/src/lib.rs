//! Domain types and seams for the contentpipe worker.
//!
//! This crate has zero internal dependencies so it can be shared by the
//! backlog, store, and worker crates without cycles. It defines the intent
//! and run records, the failure taxonomy, the retry backoff policy, and the
//! traits behind which the external collaborators sit: the durable intent
//! backlog, the content store, and the processing functions themselves.

pub mod backlog;
pub mod backoff;
pub mod error;
pub mod intent;
pub mod processing;
pub mod run;
pub mod store;
pub mod types;
