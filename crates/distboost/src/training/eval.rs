//! Evaluation values and per-round history.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// MetricValue
// =============================================================================

/// A computed metric value with metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricValue {
    /// Display name, e.g. `validation_0-rmse`.
    pub name: String,
    pub value: f64,
    pub higher_is_better: bool,
}

impl MetricValue {
    pub fn new(name: impl Into<String>, value: f64, higher_is_better: bool) -> Self {
        Self {
            name: name.into(),
            value,
            higher_is_better,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.6}", self.name, self.value)
    }
}

// =============================================================================
// EvalsResult
// =============================================================================

/// Per-round metric history: eval set name -> metric name -> values.
///
/// Eval sets are named `validation_0`, `validation_1`, ... in the order they
/// were passed to `fit`. Each series holds one value per boosting round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvalsResult(BTreeMap<String, BTreeMap<String, Vec<f64>>>);

impl EvalsResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name used for the eval set at `index`.
    pub fn set_name(index: usize) -> String {
        format!("validation_{index}")
    }

    /// Append one round's value for `set`/`metric`.
    pub fn push(&mut self, set: &str, metric: &str, value: f64) {
        self.0
            .entry(set.to_string())
            .or_default()
            .entry(metric.to_string())
            .or_default()
            .push(value);
    }

    /// History of one metric on one eval set.
    pub fn get(&self, set: &str, metric: &str) -> Option<&[f64]> {
        self.0.get(set)?.get(metric).map(Vec::as_slice)
    }

    /// The full history.
    pub fn history(&self) -> &BTreeMap<String, BTreeMap<String, Vec<f64>>> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of rounds recorded (length of the longest series).
    pub fn n_iterations(&self) -> usize {
        self.0
            .values()
            .flat_map(|metrics| metrics.values())
            .map(Vec::len)
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Display for EvalsResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
