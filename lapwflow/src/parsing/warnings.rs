//! Fuzzy classification of solver warning lines.

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::similarity::similarity;
use crate::core::WarningKind;

/// Default similarity a template must exceed to match.
pub const DEFAULT_THRESHOLD: u8 = 50;

/// A known warning phrasing and the category it signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarningTemplate {
    /// Representative warning text.
    pub template: &'static str,
    /// Category signalled by the template.
    pub kind: WarningKind,
}

/// Ordered, immutable table of warning templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarningCatalog {
    entries: Vec<WarningTemplate>,
}

static STANDARD_CATALOG: LazyLock<WarningCatalog> = LazyLock::new(|| WarningCatalog {
    entries: vec![
        WarningTemplate {
            template: "QTL-B value eq. in Band of energy ATOM= L=",
            kind: WarningKind::QtlB,
        },
        WarningTemplate {
            template: "VK-COUL not well converged: Increase GMAX or decrease NCON",
            kind: WarningKind::VkCoul,
        },
        WarningTemplate {
            template: "RESULT OF INTEGRATION SHOULD BE",
            kind: WarningKind::Integration,
        },
    ],
});

impl WarningCatalog {
    /// Returns the process-wide catalog of known solver warnings.
    #[must_use]
    pub fn standard() -> &'static Self {
        &STANDARD_CATALOG
    }

    /// Returns the templates in catalog order.
    #[must_use]
    pub fn entries(&self) -> &[WarningTemplate] {
        &self.entries
    }
}

/// Which template wins when several clear the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// The first template in catalog order wins.
    #[default]
    FirstMatch,
    /// The highest-scoring template wins; catalog order breaks ties.
    BestMatch,
}

/// Maps free-text warning lines onto [`WarningKind`].
#[derive(Debug, Clone, Copy)]
pub struct WarningClassifier {
    catalog: &'static WarningCatalog,
    threshold: u8,
    policy: MatchPolicy,
}

impl Default for WarningClassifier {
    fn default() -> Self {
        Self {
            catalog: WarningCatalog::standard(),
            threshold: DEFAULT_THRESHOLD,
            policy: MatchPolicy::FirstMatch,
        }
    }
}

impl WarningClassifier {
    /// Creates a classifier over the standard catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the similarity threshold (a template must score above it).
    #[must_use]
    pub const fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the tie-break policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the threshold.
    #[must_use]
    pub const fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Returns the similarity of `line` to every template, in catalog order.
    #[must_use]
    pub fn scores(&self, line: &str) -> Vec<(WarningKind, u8)> {
        self.catalog
            .entries()
            .iter()
            .map(|entry| (entry.kind, similarity(line, entry.template)))
            .collect()
    }

    /// Classifies one line; `None` if no template clears the threshold.
    #[must_use]
    pub fn classify(&self, line: &str) -> Option<WarningKind> {
        let mut candidates = self
            .scores(line)
            .into_iter()
            .filter(|(_, score)| *score > self.threshold);

        match self.policy {
            MatchPolicy::FirstMatch => candidates.next().map(|(kind, _)| kind),
            MatchPolicy::BestMatch => candidates
                .fold(None, |best: Option<(WarningKind, u8)>, (kind, score)| match best {
                    Some((_, top)) if top >= score => best,
                    _ => Some((kind, score)),
                })
                .map(|(kind, _)| kind),
        }
    }

    /// Classifies one line, falling back to [`WarningKind::Other`].
    #[must_use]
    pub fn classify_or_other(&self, line: &str) -> WarningKind {
        self.classify(line).unwrap_or(WarningKind::Other)
    }

    /// Classifies a stage's warning lines.
    ///
    /// The first line that matches a known template decides the category.
    /// Lines that match nothing still yield [`WarningKind::Other`]; an empty
    /// list yields `None`.
    #[must_use]
    pub fn classify_lines<S: AsRef<str>>(&self, lines: &[S]) -> Option<WarningKind> {
        if lines.is_empty() {
            return None;
        }
        Some(
            lines
                .iter()
                .find_map(|line| self.classify(line.as_ref()))
                .unwrap_or(WarningKind::Other),
        )
    }
}
