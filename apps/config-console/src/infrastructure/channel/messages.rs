//! Channel Wire Messages
//!
//! Serde types for the JSON frames exchanged with the trading decision
//! pipeline over the persistent WebSocket.
//!
//! Inbound, the pipeline pushes full-state snapshot frames carrying one
//! configuration tree per instrument. Outbound, the console sends exactly one
//! configuration-update frame per commit, plus a subscribe request when a
//! connection opens.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::cache::EntityId;
use crate::domain::tree::ConfigTree;

// =============================================================================
// Discriminators
// =============================================================================

/// `type` value of an inbound snapshot frame.
pub const SNAPSHOT_TYPE: &str = "config_snapshot";

/// `type` value of an outbound configuration-update frame.
pub const UPDATE_TYPE: &str = "config_update";

/// `type` value of the subscribe request sent on connect.
pub const SUBSCRIBE_TYPE: &str = "subscribe";

// =============================================================================
// Inbound
// =============================================================================

/// Raw snapshot frame as pushed by the pipeline, before tree validation.
///
/// The per-entity config payloads stay as raw JSON values here; the codec
/// validates them into [`ConfigTree`]s and rejects anything that is not an
/// object of objects of scalars.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotFrame {
    /// Frame discriminator, always [`SNAPSHOT_TYPE`].
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Configuration payload per instrument symbol.
    pub configs: HashMap<String, serde_json::Value>,
}

/// A decoded, validated inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Authoritative configuration trees for one or more entities.
    Snapshot {
        /// Validated tree per entity.
        configs: HashMap<EntityId, ConfigTree>,
    },
}

// =============================================================================
// Outbound
// =============================================================================

/// Configuration-update request: the pending diff for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdateFrame {
    /// Frame discriminator, always [`UPDATE_TYPE`].
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Instrument symbol the update applies to.
    pub symbol: String,
    /// The diff captured at commit time.
    pub config: ConfigTree,
}

impl ConfigUpdateFrame {
    /// Build an update frame for one entity's pending diff.
    #[must_use]
    pub fn new(symbol: impl Into<String>, config: ConfigTree) -> Self {
        Self {
            msg_type: UPDATE_TYPE.to_string(),
            symbol: symbol.into(),
            config,
        }
    }
}

/// Subscribe request sent once per established connection.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeFrame {
    /// Frame discriminator, always [`SUBSCRIBE_TYPE`].
    #[serde(rename = "type")]
    pub msg_type: &'static str,
}

impl Default for SubscribeFrame {
    fn default() -> Self {
        Self {
            msg_type: SUBSCRIBE_TYPE,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
