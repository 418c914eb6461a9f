//! Typed result records.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;

use super::status::WarningKind;
use crate::errors::RecordConflictError;

/// A single value stored in a [`ResultRecord`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Integer quantity (iteration counts, electron counts).
    Int(i64),
    /// Floating point quantity (energies, volumes, radii).
    Float(f64),
    /// Free text (labels, raw warning lines, mesh descriptors).
    Text(String),
    /// A classified warning tag.
    Warning(WarningKind),
    /// An ordered list of values.
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Returns the value as `f64` if it is numeric.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns the value as `i64` if it is an integer.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text content, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the list items, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns true if this is a list.
    #[must_use]
    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Converts to a JSON value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Int(v) => serde_json::json!(v),
            Self::Float(v) => serde_json::json!(v),
            Self::Text(s) => serde_json::json!(s),
            Self::Warning(kind) => serde_json::json!(kind.as_str()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Warning(kind) => write!(f, "{kind}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<WarningKind> for FieldValue {
    fn from(kind: WarningKind) -> Self {
        Self::Warning(kind)
    }
}

impl<T: Into<Self>> From<Vec<T>> for FieldValue {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// An insertion-ordered, write-once mapping from field name to value.
///
/// Fields are never overwritten. Repeated runs of the same logical
/// quantity are folded with [`ResultMerger`](super::ResultMerger), which
/// turns fields into lists and appends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRecord {
    entries: Vec<(String, FieldValue)>,
}

impl ResultRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a field that must not be present yet.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Result<(), RecordConflictError> {
        let key = key.into();
        if self.contains_key(&key) {
            return Err(RecordConflictError::new(key));
        }
        self.entries.push((key, value.into()));
        Ok(())
    }

    /// Appends to a list-valued field, creating the list on first use.
    pub fn append(
        &mut self,
        key: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Result<(), RecordConflictError> {
        let key = key.into();
        match self.get_mut(&key) {
            None => {
                self.entries.push((key, FieldValue::List(vec![value.into()])));
                Ok(())
            }
            Some(FieldValue::List(items)) => {
                items.push(value.into());
                Ok(())
            }
            Some(_) => Err(RecordConflictError::new(key)),
        }
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub(crate) fn get_mut(&mut self, key: &str) -> Option<&mut FieldValue> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Returns true if `key` is set.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Returns the field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Iterates over fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts every field of `other`, failing on the first shared key.
    pub fn extend_from(&mut self, other: Self) -> Result<(), RecordConflictError> {
        for (key, value) in other.entries {
            self.insert(key, value)?;
        }
        Ok(())
    }

    /// Converts to a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl Serialize for ResultRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl IntoIterator for ResultRecord {
    type Item = (String, FieldValue);
    type IntoIter = std::vec::IntoIter<(String, FieldValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_insert_is_write_once() {
        let mut record = ResultRecord::new();
        record.insert("EtotRyd", -580.123).unwrap();
        let err = record.insert("EtotRyd", -580.5).unwrap_err();
        assert_eq!(err.key, "EtotRyd");
        assert_eq!(record.get("EtotRyd"), Some(&FieldValue::Float(-580.123)));
    }

    #[test]
    fn test_append_creates_and_extends_list() {
        let mut record = ResultRecord::new();
        record.append("Iter", 12_i64).unwrap();
        record.append("Iter", 3_i64).unwrap();
        assert_eq!(
            record.get("Iter"),
            Some(&FieldValue::List(vec![FieldValue::Int(12), FieldValue::Int(3)]))
        );

        record.insert("GapEv", 0.5).unwrap();
        assert!(record.append("GapEv", 0.6).is_err());
    }

    #[test]
    fn test_serialize_preserves_order() {
        let mut record = ResultRecord::new();
        record.insert("VolBohr3", 270.0).unwrap();
        record.insert("EtotRyd", -580.0).unwrap();
        record.insert("atom_labels", vec!["Si", "O"]).unwrap();
        record.insert("Warning_last", WarningKind::QtlB).unwrap();

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"VolBohr3":270.0,"EtotRyd":-580.0,"atom_labels":["Si","O"],"Warning_last":"QTL_B"}"#
        );
        let keys: Vec<_> = record.keys().collect();
        assert_eq!(keys, vec!["VolBohr3", "EtotRyd", "atom_labels", "Warning_last"]);
    }

    #[test]
    fn test_to_json_matches_serialize() {
        let mut record = ResultRecord::new();
        record.insert("Iter", vec![10_i64, 4]).unwrap();
        record.insert("Rmt", vec![2.1, 1.6]).unwrap();
        assert_eq!(
            record.to_json(),
            serde_json::to_value(&record).unwrap()
        );
    }

    #[test]
    fn test_field_value_accessors() {
        assert_eq!(FieldValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(FieldValue::Float(1.5).as_i64(), None);
        assert_eq!(FieldValue::from("Si").as_str(), Some("Si"));
        assert!(FieldValue::from(vec![1.0, 2.0]).is_list());
        assert_eq!(FieldValue::from(vec![1_i64, 2]).to_string(), "[1, 2]");
    }

    #[test]
    fn test_extend_from_conflict() {
        let mut a = ResultRecord::new();
        a.insert("EtotRyd", -1.0).unwrap();
        let mut b = ResultRecord::new();
        b.insert("EtotRyd_prec2", -1.1).unwrap();
        a.extend_from(b).unwrap();
        assert_eq!(a.len(), 2);

        let mut c = ResultRecord::new();
        c.insert("EtotRyd", -2.0).unwrap();
        assert!(a.extend_from(c).is_err());
    }
}
