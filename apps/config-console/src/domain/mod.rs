//! Domain Layer - Configuration trees and the reconciliation cache.
//!
//! This layer contains the core domain types for live configuration
//! reconciliation with no I/O dependencies. All types here are pure Rust
//! with serialization support.

/// Configuration tree types and the diff engine.
pub mod tree;

/// Per-entity cache records, reconciliation, and the edit surface.
pub mod cache;
