//! HTTP backend for the research service.
//!
//! Speaks the service's JSON API and decodes its event-stream body into text
//! chunks for the orchestrator.

mod adapter;
mod config;
mod transport;

pub use adapter::HttpResearchBackend;
pub use config::{DEFAULT_BASE_URL, HttpBackendConfig};
