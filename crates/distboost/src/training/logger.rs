//! Verbosity-gated training output.
//!
//! [`TrainingLogger`] emits through `tracing`, so output goes wherever the
//! installed subscriber sends it. The logger's own [`Verbosity`] decides which
//! messages are emitted at all.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::model::ConfigError;
use crate::training::MetricValue;

// =============================================================================
// Verbosity
// =============================================================================

/// How much the trainer reports.
///
/// Mirrors XGBoost's `verbosity` levels 0 through 3.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// No output.
    Silent = 0,
    /// Warnings only.
    #[default]
    Warning = 1,
    /// Per-round evaluation and training summary.
    Info = 2,
    /// Everything, including per-level tree growth.
    Debug = 3,
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verbosity::Silent => "silent",
            Verbosity::Warning => "warning",
            Verbosity::Info => "info",
            Verbosity::Debug => "debug",
        };
        f.write_str(name)
    }
}

impl FromStr for Verbosity {
    type Err = ConfigError;

    /// Accepts level names or their numeric values `0..=3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "silent" => Ok(Verbosity::Silent),
            "1" | "warning" | "warn" => Ok(Verbosity::Warning),
            "2" | "info" => Ok(Verbosity::Info),
            "3" | "debug" => Ok(Verbosity::Debug),
            _ => Err(ConfigError::InvalidValue {
                key: "verbosity".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

// =============================================================================
// TrainingLogger
// =============================================================================

/// Reports training progress at a given verbosity.
#[derive(Debug)]
pub struct TrainingLogger {
    verbosity: Verbosity,
    started: Option<Instant>,
}

impl TrainingLogger {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            started: None,
        }
    }

    #[inline]
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    #[inline]
    fn enabled(&self, level: Verbosity) -> bool {
        self.verbosity >= level
    }

    pub fn start_training(&mut self, n_rounds: usize) {
        self.started = Some(Instant::now());
        if self.enabled(Verbosity::Info) {
            tracing::info!(n_rounds, "training started");
        }
    }

    /// Log one round's metrics as `[round]\tname:value\tname:value`.
    pub fn log_round(&self, round: usize, metrics: &[MetricValue]) {
        if !self.enabled(Verbosity::Info) || metrics.is_empty() {
            return;
        }
        tracing::info!("{}", format_round(round, metrics));
    }

    pub fn log_level(&self, round: usize, depth: usize, n_splits: usize, n_leaves: usize) {
        if self.enabled(Verbosity::Debug) {
            tracing::debug!(round, depth, n_splits, n_leaves, "grew level");
        }
    }

    pub fn log_early_stopping(&self, round: usize, best_round: usize, metric: &str) {
        if self.enabled(Verbosity::Info) {
            tracing::info!(
                round,
                best_round,
                metric,
                "early stopping: no improvement since round {best_round}"
            );
        }
    }

    pub fn warn(&self, message: &str) {
        if self.enabled(Verbosity::Warning) {
            tracing::warn!("{message}");
        }
    }

    pub fn finish_training(&self, n_trees: usize) {
        if self.enabled(Verbosity::Info) {
            let elapsed = self.started.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0);
            tracing::info!(n_trees, elapsed_secs = elapsed, "training finished");
        }
    }
}

/// `[3]\tvalidation_0-rmse:0.288675`
pub(crate) fn format_round(round: usize, metrics: &[MetricValue]) -> String {
    let mut line = format!("[{round}]");
    for metric in metrics {
        line.push_str(&format!("\t{}:{:.6}", metric.name, metric.value));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_is_warning() {
        assert_eq!(Verbosity::default(), Verbosity::Warning);
        assert!(Verbosity::Info > Verbosity::Warning);
        assert!(Verbosity::Debug > Verbosity::Info);
    }

    #[rstest]
    #[case("0", Verbosity::Silent)]
    #[case("warning", Verbosity::Warning)]
    #[case("2", Verbosity::Info)]
    #[case("INFO", Verbosity::Info)]
    #[case("debug", Verbosity::Debug)]
    fn parses_levels(#[case] input: &str, #[case] expected: Verbosity) {
        assert_eq!(input.parse::<Verbosity>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_level() {
        assert!("loud".parse::<Verbosity>().is_err());
        assert!("4".parse::<Verbosity>().is_err());
    }

    #[test]
    fn round_line_format() {
        let metrics = vec![
            MetricValue::new("validation_0-rmse", 0.2886751, false),
            MetricValue::new("validation_1-rmse", 0.5, false),
        ];
        assert_eq!(
            format_round(3, &metrics),
            "[3]\tvalidation_0-rmse:0.288675\tvalidation_1-rmse:0.500000"
        );
    }

    #[test]
    fn silent_logger_is_quiet() {
        let mut logger = TrainingLogger::new(Verbosity::Silent);
        logger.start_training(10);
        logger.log_round(0, &[MetricValue::new("rmse", 1.0, false)]);
        logger.finish_training(10);
        assert_eq!(logger.verbosity(), Verbosity::Silent);
    }
}
