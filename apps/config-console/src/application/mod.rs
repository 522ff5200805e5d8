//! Application Layer - Use cases and port definitions.

/// Port interfaces for outbound adapters.
pub mod ports;

/// Orchestration services over the cache store.
pub mod services;
