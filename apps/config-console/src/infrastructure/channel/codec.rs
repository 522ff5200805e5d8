//! Channel Codec
//!
//! Decodes inbound JSON text frames into validated [`InboundMessage`]s and
//! encodes outbound frames. This is the protocol boundary: every shape rule
//! is enforced here so that nothing malformed ever reaches the
//! reconciliation engine. A rejected frame is a protocol error: logged and
//! counted by the caller, with the previous cache state left untouched.
//!
//! # Validation rules
//!
//! A snapshot's per-entity payload must be an object of objects of scalars
//! (namespace → parameter → number | boolean | string). Arrays, nulls, and
//! any deeper object nesting are rejected outright rather than stringified,
//! keeping the diff engine well-defined.

use std::collections::HashMap;

use crate::domain::cache::EntityId;
use crate::domain::tree::{ConfigTree, ScalarValue};
use crate::infrastructure::channel::messages::{InboundMessage, SNAPSHOT_TYPE, SnapshotFrame};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Frame is not valid JSON.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame carries no `type` discriminator.
    #[error("frame has no type discriminator")]
    MissingDiscriminator,

    /// Frame `type` is not one this console understands.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Per-entity payload is not an object of namespaces.
    #[error("config for {symbol} is not an object")]
    NotAnObject {
        /// Offending entity.
        symbol: String,
    },

    /// Namespace value is not an object of parameters.
    #[error("namespace {symbol}.{namespace} is not an object")]
    NamespaceNotAnObject {
        /// Offending entity.
        symbol: String,
        /// Offending namespace.
        namespace: String,
    },

    /// Parameter value is nested deeper than a scalar, or is a null/array.
    #[error("parameter {symbol}.{namespace}.{parameter} is not a scalar")]
    NotAScalar {
        /// Offending entity.
        symbol: String,
        /// Offending namespace.
        namespace: String,
        /// Offending parameter.
        parameter: String,
    },
}

/// JSON codec for the pipeline channel.
#[derive(Debug, Default, Clone)]
pub struct ChannelCodec;

impl ChannelCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] for malformed JSON, unknown discriminators,
    /// and payloads that violate the object-of-objects-of-scalars shape.
    pub fn decode(&self, text: &str) -> Result<InboundMessage, CodecError> {
        let value: serde_json::Value = serde_json::from_str(text)?;

        let msg_type = value
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or(CodecError::MissingDiscriminator)?;

        match msg_type {
            SNAPSHOT_TYPE => {
                let frame: SnapshotFrame = serde_json::from_value(value)?;
                let configs = validate_snapshot(frame)?;
                Ok(InboundMessage::Snapshot { configs })
            }
            other => Err(CodecError::UnknownMessageType(other.to_string())),
        }
    }

    /// Encode an outbound frame to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: serde::Serialize>(&self, frame: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(frame)?)
    }
}

/// Validate every per-entity payload of a snapshot frame.
fn validate_snapshot(
    frame: SnapshotFrame,
) -> Result<HashMap<EntityId, ConfigTree>, CodecError> {
    let mut configs = HashMap::with_capacity(frame.configs.len());
    for (symbol, payload) in frame.configs {
        let tree = validate_tree(&symbol, &payload)?;
        configs.insert(symbol, tree);
    }
    Ok(configs)
}

/// Validate one entity payload into a [`ConfigTree`].
fn validate_tree(symbol: &str, payload: &serde_json::Value) -> Result<ConfigTree, CodecError> {
    let namespaces = payload.as_object().ok_or_else(|| CodecError::NotAnObject {
        symbol: symbol.to_string(),
    })?;

    let mut tree = ConfigTree::new();
    for (namespace, params) in namespaces {
        let params = params
            .as_object()
            .ok_or_else(|| CodecError::NamespaceNotAnObject {
                symbol: symbol.to_string(),
                namespace: namespace.clone(),
            })?;

        for (parameter, value) in params {
            let scalar = validate_scalar(value).ok_or_else(|| CodecError::NotAScalar {
                symbol: symbol.to_string(),
                namespace: namespace.clone(),
                parameter: parameter.clone(),
            })?;
            tree.set(namespace.clone(), parameter.clone(), scalar);
        }
    }
    Ok(tree)
}

/// Accept exactly the scalar union; everything else is a protocol error.
fn validate_scalar(value: &serde_json::Value) -> Option<ScalarValue> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().map(ScalarValue::Number),
        serde_json::Value::Bool(b) => Some(ScalarValue::Bool(*b)),
        serde_json::Value::String(s) => Some(ScalarValue::Text(s.clone())),
        serde_json::Value::Null | serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
            None
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::infrastructure::channel::messages::ConfigUpdateFrame;

    fn decode(text: &str) -> Result<InboundMessage, CodecError> {
        ChannelCodec::new().decode(text)
    }

    #[test]
    fn decodes_snapshot_with_multiple_entities() {
        let msg = decode(
            r#"{
                "type": "config_snapshot",
                "configs": {
                    "BTC": {"ROEThresholdStrategy": {"roe_threshold": 0.2}},
                    "ETH": {"ATRStopLossStrategy": {"use_trailing_stop": true, "mode": "fast"}}
                }
            }"#,
        )
        .unwrap();

        let InboundMessage::Snapshot { configs } = msg;
        assert_eq!(configs.len(), 2);
        assert_eq!(
            configs["BTC"].get("ROEThresholdStrategy", "roe_threshold"),
            Some(&ScalarValue::Number(0.2))
        );
        assert_eq!(
            configs["ETH"].get("ATRStopLossStrategy", "mode"),
            Some(&ScalarValue::Text("fast".to_string()))
        );
    }

    #[test]
    fn decodes_empty_snapshot() {
        let msg = decode(r#"{"type": "config_snapshot", "configs": {}}"#).unwrap();
        let InboundMessage::Snapshot { configs } = msg;
        assert!(configs.is_empty());
    }

    #[test_case(r#"{"type": "config_snapshot", "configs": {"BTC": 7}}"# ; "entity payload not object")]
    #[test_case(r#"{"type": "config_snapshot", "configs": {"BTC": {"ROE": 0.2}}}"# ; "namespace not object")]
    #[test_case(r#"{"type": "config_snapshot", "configs": {"BTC": {"ROE": {"t": {"deep": 1}}}}}"# ; "nested object value")]
    #[test_case(r#"{"type": "config_snapshot", "configs": {"BTC": {"ROE": {"t": [1, 2]}}}}"# ; "array value")]
    #[test_case(r#"{"type": "config_snapshot", "configs": {"BTC": {"ROE": {"t": null}}}}"# ; "null value")]
    fn rejects_malformed_tree(text: &str) {
        assert!(decode(text).is_err());
    }

    #[test]
    fn rejects_unknown_discriminator() {
        let err = decode(r#"{"type": "order_update", "configs": {}}"#).unwrap_err();
        assert!(matches!(err, CodecError::UnknownMessageType(t) if t == "order_update"));
    }

    #[test]
    fn rejects_missing_discriminator() {
        let err = decode(r#"{"configs": {}}"#).unwrap_err();
        assert!(matches!(err, CodecError::MissingDiscriminator));
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(matches!(decode("not json"), Err(CodecError::Json(_))));
    }

    #[test]
    fn nested_error_names_the_offending_field() {
        let err = decode(
            r#"{"type": "config_snapshot", "configs": {"BTC": {"ROE": {"threshold": {"x": 1}}}}}"#,
        )
        .unwrap_err();

        match err {
            CodecError::NotAScalar {
                symbol,
                namespace,
                parameter,
            } => {
                assert_eq!(symbol, "BTC");
                assert_eq!(namespace, "ROE");
                assert_eq!(parameter, "threshold");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn encodes_update_frame() {
        let mut config = ConfigTree::new();
        config.set("ROEThresholdStrategy", "roe_threshold", 0.15);
        let frame = ConfigUpdateFrame::new("BTC", config);

        let text = ChannelCodec::new().encode(&frame).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["type"], "config_update");
        assert_eq!(value["symbol"], "BTC");
    }
}
