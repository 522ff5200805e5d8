//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`UpdateSink`]: transmits committed configuration diffs back to the
//!   pipeline over the channel transport.

use async_trait::async_trait;

use crate::domain::cache::EntityId;
use crate::domain::tree::ConfigTree;

/// Failure to hand an outbound update to the channel transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpdateSinkError {
    /// The channel is not currently connected.
    #[error("channel disconnected")]
    Disconnected,

    /// Transport-level send failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Outbound contract for configuration-update requests.
///
/// One call corresponds to exactly one commit; implementations do not batch
/// or coalesce across entities. Delivery is not acknowledged; the commit
/// flow is optimistic by design.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpdateSink: Send + Sync {
    /// Transmit the pending diff for one entity.
    async fn send_update(&self, entity: EntityId, changes: ConfigTree)
    -> Result<(), UpdateSinkError>;
}
