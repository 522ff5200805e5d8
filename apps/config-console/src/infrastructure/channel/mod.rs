//! Pipeline Channel Adapters
//!
//! Everything that touches the persistent WebSocket to the trading decision
//! pipeline: wire message types, the validating JSON codec, the reconnect
//! backoff schedule, and the client task itself.

/// Wire message types (serde).
pub mod messages;

/// JSON codec with boundary validation.
pub mod codec;

/// Reconnect backoff schedule.
pub mod reconnect;

/// WebSocket client task and outbound sink adapter.
pub mod client;
