//! Configuration Tree Types
//!
//! Core domain types for pipeline configuration: the two-level mapping from
//! strategy namespace to parameter name to scalar value, and the diff engine
//! that computes the minimal difference between two trees.
//!
//! # Design
//!
//! Trees are finite, non-cyclic, and fully replaced on each authoritative
//! update. Values are restricted to an explicit scalar union (number, boolean,
//! string); anything deeper is rejected at the transport boundary and never
//! reaches this module. Equality is exact value equality, with no epsilon
//! tolerance for numbers: values are operator-entered constants echoed
//! back verbatim by the pipeline.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// =============================================================================
// Types
// =============================================================================

/// A strategy or subsystem namespace name.
pub type Namespace = String;

/// A parameter name within a namespace.
pub type ParameterName = String;

/// A single tunable parameter value.
///
/// Serializes as the bare JSON scalar (`0.2`, `true`, `"fast"`), matching the
/// wire format of pipeline snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    /// Numeric parameter (thresholds, multipliers, percentages).
    Number(f64),
    /// Boolean feature flag.
    Bool(bool),
    /// Free-form string parameter.
    Text(String),
}

impl ScalarValue {
    /// Check whether this value is blank operator input.
    ///
    /// Blank values must be rejected by the edit surface rather than stored
    /// as a placeholder.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::Number(_) | Self::Bool(_) => false,
        }
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl std::fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

// =============================================================================
// Config Tree
// =============================================================================

/// A full configuration tree: namespace → parameter → scalar value.
///
/// Serializes transparently as a nested JSON object, the exact shape the
/// pipeline pushes and accepts:
///
/// ```json
/// {"ROEThresholdStrategy": {"roe_threshold": 0.2, "use_trailing_stop": true}}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigTree {
    namespaces: HashMap<Namespace, HashMap<ParameterName, ScalarValue>>,
}

impl ConfigTree {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a parameter value.
    #[must_use]
    pub fn get(&self, namespace: &str, parameter: &str) -> Option<&ScalarValue> {
        self.namespaces.get(namespace)?.get(parameter)
    }

    /// Set a parameter value, creating the namespace if needed.
    pub fn set(
        &mut self,
        namespace: impl Into<Namespace>,
        parameter: impl Into<ParameterName>,
        value: impl Into<ScalarValue>,
    ) {
        self.namespaces
            .entry(namespace.into())
            .or_default()
            .insert(parameter.into(), value.into());
    }

    /// Check whether the tree carries no parameters at all.
    ///
    /// Namespaces without parameters do not count as content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.namespaces.values().all(HashMap::is_empty)
    }

    /// Total number of parameters across all namespaces.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.namespaces.values().map(HashMap::len).sum()
    }

    /// Iterate over namespaces and their parameter maps.
    pub fn namespaces(&self) -> impl Iterator<Item = (&Namespace, &HashMap<ParameterName, ScalarValue>)> {
        self.namespaces.iter()
    }

    /// Iterate over every (namespace, parameter, value) triple.
    pub fn parameters(&self) -> impl Iterator<Item = (&Namespace, &ParameterName, &ScalarValue)> {
        self.namespaces
            .iter()
            .flat_map(|(ns, params)| params.iter().map(move |(name, value)| (ns, name, value)))
    }

    /// Compute the difference of this tree against a baseline.
    ///
    /// Returns every (namespace, parameter) pair present in `self` whose value
    /// differs from the corresponding value in `baseline`; absence in the
    /// baseline counts as different. Namespaces with no differing parameters
    /// are omitted entirely. Pure and linear in tree size.
    #[must_use]
    pub fn changes_from(&self, baseline: &Self) -> Self {
        let mut changes = Self::new();

        for (namespace, params) in &self.namespaces {
            let baseline_params = baseline.namespaces.get(namespace);

            for (name, value) in params {
                let unchanged = baseline_params
                    .and_then(|p| p.get(name))
                    .is_some_and(|baseline_value| baseline_value == value);

                if !unchanged {
                    changes.set(namespace.clone(), name.clone(), value.clone());
                }
            }
        }

        changes
    }

    /// Overwrite every parameter present in `overlay` into this tree.
    ///
    /// Parameters not named by the overlay are left untouched.
    pub fn apply(&mut self, overlay: &Self) {
        for (namespace, name, value) in overlay.parameters() {
            self.set(namespace.clone(), name.clone(), value.clone());
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
