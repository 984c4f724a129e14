pub mod common;
pub mod config;
pub mod logging;

// Domain data shapes shared across layers
pub mod domain;

// Consolidation core: stage composition, monotonicity, timelines,
// reconciliation
pub mod pipeline;

// Persisted canonical series
pub mod store;

// Source-specific adapters and their factory
pub mod sources;

// Application use cases and the ports they depend on
pub mod app;

// Infrastructure implementations of the ports
pub mod infra;
