//! SCF convergence detection on day-logs.

/// Marker printed when energy, charge and force criteria are all met.
pub const SCF_CONVERGED_MARKER: &str = "ec cc and fc_conv 1 1 1";

/// Marker printed by newer releases, which also track structure relaxation.
pub const SCF_STR_CONVERGED_MARKER: &str = "ec cc fc and str_conv 1 1 1 1";

/// Decides whether a day-log reports a converged SCF cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceChecker {
    markers: Vec<String>,
}

impl Default for ConvergenceChecker {
    fn default() -> Self {
        Self::new([SCF_CONVERGED_MARKER, SCF_STR_CONVERGED_MARKER])
    }
}

impl ConvergenceChecker {
    /// Creates a checker accepting any of `markers`.
    #[must_use]
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the accepted markers.
    #[must_use]
    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    /// Returns true if any marker appears anywhere in `day_log`.
    #[must_use]
    pub fn is_converged(&self, day_log: &str) -> bool {
        self.markers.iter().any(|marker| day_log.contains(marker.as_str()))
    }
}
