//! Command-line options and stdin payloads for WIEN2k programs.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::errors::ConfigError;

/// Ordered flat option map rendered into a program's argument list.
///
/// `true` renders the flag alone, a string renders the flag followed by
/// the value, and every other value is dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOptions {
    entries: Vec<(String, Value)>,
}

impl CliOptions {
    /// Creates an empty option set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `flag`, keeping its original position if already present.
    #[must_use]
    pub fn with(mut self, flag: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(flag, value);
        self
    }

    /// Sets `flag`, keeping its original position if already present.
    pub fn set(&mut self, flag: impl Into<String>, value: impl Into<Value>) {
        let flag = flag.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == flag) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((flag, value)),
        }
    }

    /// Returns the value of `flag`.
    #[must_use]
    pub fn get(&self, flag: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == flag)
            .map(|(_, value)| value)
    }

    /// Returns true if no option is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders the argument list.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.entries.len() * 2);
        for (flag, value) in &self.entries {
            match value {
                Value::Bool(true) => args.push(flag.clone()),
                Value::String(text) => {
                    args.push(flag.clone());
                    args.push(text.clone());
                }
                _ => {}
            }
        }
        args
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for CliOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = Self::new();
        for (flag, value) in iter {
            options.set(flag, value);
        }
        options
    }
}

impl Serialize for CliOptions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (flag, value) in &self.entries {
            map.serialize_entry(flag, value)?;
        }
        map.end()
    }
}

struct CliOptionsVisitor;

impl<'de> Visitor<'de> for CliOptionsVisitor {
    type Value = CliOptions;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of command-line flags")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut options = CliOptions::new();
        while let Some((flag, value)) = access.next_entry::<String, Value>()? {
            options.set(flag, value);
        }
        Ok(options)
    }
}

// Document order is the argument order, so the map is read entry by entry.
impl<'de> Deserialize<'de> for CliOptions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(CliOptionsVisitor)
    }
}

/// Builds the stdin of `x optimize` for a uniform volume scan.
///
/// Option `1` selects a uniform change of all lattice parameters; the
/// non-zero deltas follow their count.
pub fn optimize_stdin(deltas: &[f64]) -> Result<String, ConfigError> {
    let non_zero: Vec<f64> = deltas.iter().copied().filter(|d| *d != 0.0).collect();
    if non_zero.is_empty() {
        return Err(ConfigError::new("no non-zero volume change requested").with_key("volume_deltas"));
    }
    let mut stdin = format!("1\n{}", non_zero.len());
    for delta in non_zero {
        stdin.push_str(&format!("\n{delta:?}"));
    }
    Ok(stdin)
}
