//! Intent-polling worker: claims work from the durable backlog, routes it
//! to a registered capability, executes the download → transform → upload
//! job, and records the outcome.

pub mod capabilities;
pub mod config;
pub mod executor;
pub mod limiter;
pub mod poller;
pub mod registry;
