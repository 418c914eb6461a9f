//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{ConfigError, LapwflowError};
use crate::execution::{optimize_stdin, CliOptions};
use crate::parsing::convergence::{SCF_CONVERGED_MARKER, SCF_STR_CONVERGED_MARKER};
use crate::parsing::warnings::DEFAULT_THRESHOLD;
use crate::parsing::{ConvergenceChecker, MatchPolicy, WarningClassifier};

/// How the reference SCF is solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SolveMode {
    /// One `run_lapw` at the requested precision.
    #[default]
    Single,
    /// `run123_lapw`: the reference stage refined through three precisions.
    PrecisionCascade,
}

fn default_volume_deltas() -> Vec<f64> {
    vec![-6.0, -4.0, -2.0, 2.0, 4.0, 6.0]
}

fn default_init_options() -> CliOptions {
    CliOptions::new()
        .with("-b", true)
        .with("-red", "3")
        .with("-numk", "700")
}

fn default_solve_options() -> CliOptions {
    CliOptions::new().with("-i", "100")
}

fn default_warning_threshold() -> u8 {
    DEFAULT_THRESHOLD
}

fn default_convergence_markers() -> Vec<String> {
    vec![
        SCF_CONVERGED_MARKER.to_string(),
        SCF_STR_CONVERGED_MARKER.to_string(),
    ]
}

/// Configuration of a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Volume changes in percent. Zero entries are skipped.
    #[serde(default = "default_volume_deltas")]
    pub volume_deltas: Vec<f64>,
    /// Options for `x sgroup`.
    #[serde(default)]
    pub sgroup_options: CliOptions,
    /// Options for `init_lapw`.
    #[serde(default = "default_init_options")]
    pub init_options: CliOptions,
    /// Options for every `run_lapw`.
    #[serde(default = "default_solve_options")]
    pub solve_options: CliOptions,
    /// How the reference SCF is solved.
    #[serde(default)]
    pub solve_mode: SolveMode,
    /// Similarity a warning template must exceed.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: u8,
    /// Which template wins when several match.
    #[serde(default)]
    pub match_policy: MatchPolicy,
    /// Day-log lines signalling a converged SCF.
    #[serde(default = "default_convergence_markers")]
    pub convergence_markers: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            volume_deltas: default_volume_deltas(),
            sgroup_options: CliOptions::new(),
            init_options: default_init_options(),
            solve_options: default_solve_options(),
            solve_mode: SolveMode::default(),
            warning_threshold: default_warning_threshold(),
            match_policy: MatchPolicy::default(),
            convergence_markers: default_convergence_markers(),
        }
    }
}

impl PipelineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON configuration; absent keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, LapwflowError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LapwflowError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Sets the volume changes.
    #[must_use]
    pub fn with_volume_deltas(mut self, deltas: impl Into<Vec<f64>>) -> Self {
        self.volume_deltas = deltas.into();
        self
    }

    /// Sets the `x sgroup` options.
    #[must_use]
    pub fn with_sgroup_options(mut self, options: CliOptions) -> Self {
        self.sgroup_options = options;
        self
    }

    /// Sets the `init_lapw` options.
    #[must_use]
    pub fn with_init_options(mut self, options: CliOptions) -> Self {
        self.init_options = options;
        self
    }

    /// Sets the `run_lapw` options.
    #[must_use]
    pub fn with_solve_options(mut self, options: CliOptions) -> Self {
        self.solve_options = options;
        self
    }

    /// Sets the solve mode.
    #[must_use]
    pub const fn with_solve_mode(mut self, mode: SolveMode) -> Self {
        self.solve_mode = mode;
        self
    }

    /// Sets the warning similarity threshold.
    #[must_use]
    pub const fn with_warning_threshold(mut self, threshold: u8) -> Self {
        self.warning_threshold = threshold;
        self
    }

    /// Sets the warning match policy.
    #[must_use]
    pub const fn with_match_policy(mut self, policy: MatchPolicy) -> Self {
        self.match_policy = policy;
        self
    }

    /// Sets the convergence markers.
    #[must_use]
    pub fn with_convergence_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.convergence_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    /// Checks the configuration for values no run could use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.warning_threshold > 100 {
            return Err(ConfigError::new(format!(
                "warning threshold {} is not a percentage",
                self.warning_threshold
            ))
            .with_key("warning_threshold"));
        }
        if self.convergence_markers.iter().all(|m| m.trim().is_empty()) {
            return Err(
                ConfigError::new("at least one convergence marker is required")
                    .with_key("convergence_markers"),
            );
        }
        if let Some(bad) = self.volume_deltas.iter().find(|d| !d.is_finite() || **d <= -100.0) {
            return Err(
                ConfigError::new(format!("volume change {bad}% is not realizable"))
                    .with_key("volume_deltas"),
            );
        }
        Ok(())
    }

    /// Returns the non-zero volume changes in request order.
    #[must_use]
    pub fn non_zero_deltas(&self) -> Vec<f64> {
        self.volume_deltas.iter().copied().filter(|d| *d != 0.0).collect()
    }

    /// Returns the `x optimize` stdin for the configured deltas.
    pub fn optimize_stdin(&self) -> Result<String, ConfigError> {
        optimize_stdin(&self.volume_deltas)
    }

    /// Builds the warning classifier.
    #[must_use]
    pub fn classifier(&self) -> WarningClassifier {
        WarningClassifier::new()
            .with_threshold(self.warning_threshold)
            .with_policy(self.match_policy)
    }

    /// Builds the convergence checker.
    #[must_use]
    pub fn convergence(&self) -> ConvergenceChecker {
        ConvergenceChecker::new(self.convergence_markers.iter().cloned())
    }
}
