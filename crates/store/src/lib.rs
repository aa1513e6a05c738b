//! HTTP client for the external content service.

pub mod client;

pub use client::HttpContentStore;
