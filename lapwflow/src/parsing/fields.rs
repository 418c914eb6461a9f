//! Field extraction from WIEN2k log text.
//!
//! Each supported field is a [`LogField`] variant carrying its own
//! [`ExtractionRule`]. A line *matches* a field when its anchor matches and
//! the rule's delimiter or phrase is present; a matching line whose value
//! slice does not convert is a [`ParseError`].

use std::collections::HashMap;
use std::fmt;

use crate::core::FieldValue;
use crate::errors::ParseError;

/// How a line is recognized as a candidate for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// The line starts with the marker.
    Prefix(&'static str),
    /// The marker appears anywhere in the line.
    Contains(&'static str),
}

impl Anchor {
    /// Returns true if `line` is anchored here.
    #[must_use]
    pub fn matches(&self, line: &str) -> bool {
        match self {
            Self::Prefix(marker) => line.starts_with(marker),
            Self::Contains(marker) => line.contains(marker),
        }
    }
}

/// Conversion applied to an extracted slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Floating point number.
    Float,
    /// Integer.
    Int,
    /// Floating point number rounded to the nearest integer.
    RoundedInt,
    /// Trimmed text.
    Text,
}

/// Per-field positional/token rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionRule {
    /// Text after the last `after`, cut before the first `until` if given.
    ByDelimiter {
        /// Delimiter whose last occurrence starts the value.
        after: &'static str,
        /// Delimiter whose first occurrence ends the value.
        until: Option<&'static str>,
        /// Value conversion.
        kind: ValueKind,
    },
    /// Fixed character columns `[start, end)`, trimmed.
    ByColumnRange {
        /// First column (zero based).
        start: usize,
        /// One past the last column.
        end: usize,
    },
    /// The `token`-th whitespace token after the last `phrase`.
    ByPhrase {
        /// Phrase preceding the value.
        phrase: &'static str,
        /// Token index after the phrase.
        token: usize,
        /// Value conversion.
        kind: ValueKind,
    },
    /// `count` whitespace tokens starting at `first`.
    ///
    /// A single token is converted with `kind`; several tokens are joined
    /// by single spaces as text.
    ByTokens {
        /// First token index.
        first: usize,
        /// Number of tokens.
        count: usize,
        /// Value conversion for a single token.
        kind: ValueKind,
    },
    /// Text between the last `open` and the next `close`, read as
    /// fixed-width integer columns and rejoined by single spaces.
    ByBracketColumns {
        /// Opening delimiter.
        open: &'static str,
        /// Closing delimiter.
        close: &'static str,
        /// Column width.
        width: usize,
    },
    /// The whole line.
    Verbatim,
}

/// The closed set of fields the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogField {
    /// `:ENE` total energy, Ry.
    TotalEnergy,
    /// `:VOL` unit cell volume, Bohr³.
    Volume,
    /// `:FER` Fermi energy, Ry.
    FermiEnergy,
    /// `:ITE` iteration index.
    Iteration,
    /// `:GAP` band gap, eV.
    BandGap,
    /// `:WAR` warning line.
    Warning,
    /// `:CHA` muffin-tin sphere radius (RMT).
    SphereRadius,
    /// `:POS` atom label.
    AtomLabel,
    /// `:CINT` core electron count.
    CoreElectrons,
    /// k-point mesh from a `klist` header.
    KMesh,
    /// FFT mesh from `in0`.
    FftMesh,
    /// `-(T*S)` entropy contribution to the free energy, Ry.
    EntropyTerm,
    /// Any other marker, returned verbatim.
    Marker(&'static str),
}

impl LogField {
    /// Returns the marker text identifying this field.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::TotalEnergy => ":ENE",
            Self::Volume => ":VOL",
            Self::FermiEnergy => ":FER",
            Self::Iteration => ":ITE",
            Self::BandGap => ":GAP",
            Self::Warning => ":WAR",
            Self::SphereRadius => ":CHA",
            Self::AtomLabel => ":POS",
            Self::CoreElectrons => ":CINT",
            Self::KMesh => "(",
            Self::FftMesh => "IFFT-parameters",
            Self::EntropyTerm => "-(T*S)",
            Self::Marker(marker) => *marker,
        }
    }

    /// Returns how candidate lines are recognized.
    #[must_use]
    pub const fn anchor(&self) -> Anchor {
        match self {
            Self::KMesh | Self::FftMesh | Self::EntropyTerm => Anchor::Contains(self.key()),
            _ => Anchor::Prefix(self.key()),
        }
    }

    /// Returns the extraction rule.
    #[must_use]
    pub const fn rule(&self) -> ExtractionRule {
        match self {
            Self::TotalEnergy | Self::Volume | Self::FermiEnergy => ExtractionRule::ByDelimiter {
                after: "=",
                until: None,
                kind: ValueKind::Float,
            },
            Self::Iteration => ExtractionRule::ByDelimiter {
                after: ":",
                until: Some("."),
                kind: ValueKind::Int,
            },
            Self::BandGap => ExtractionRule::ByDelimiter {
                after: "=",
                until: Some(" eV "),
                kind: ValueKind::Float,
            },
            Self::SphereRadius => ExtractionRule::ByDelimiter {
                after: "RMT=",
                until: Some(")"),
                kind: ValueKind::Float,
            },
            Self::AtomLabel => ExtractionRule::ByColumnRange { start: 73, end: 75 },
            Self::CoreElectrons => ExtractionRule::ByPhrase {
                phrase: "Core Integral Atom",
                token: 1,
                kind: ValueKind::RoundedInt,
            },
            Self::KMesh => ExtractionRule::ByBracketColumns {
                open: "(",
                close: ")",
                width: 3,
            },
            Self::FftMesh => ExtractionRule::ByTokens {
                first: 0,
                count: 3,
                kind: ValueKind::Text,
            },
            Self::EntropyTerm => ExtractionRule::ByTokens {
                first: 2,
                count: 1,
                kind: ValueKind::Float,
            },
            Self::Warning | Self::Marker(_) => ExtractionRule::Verbatim,
        }
    }

    /// Applies this field's rule to one line.
    ///
    /// Returns `Ok(None)` when the line is not a match.
    pub fn apply(&self, line: &str, line_number: usize) -> Result<Option<FieldValue>, ParseError> {
        if !self.anchor().matches(line) {
            return Ok(None);
        }
        let fail = |reason: &str| ParseError::new(self.key(), line_number, line, reason);

        match self.rule() {
            ExtractionRule::ByDelimiter { after, until, kind } => {
                let Some((_, tail)) = line.rsplit_once(after) else {
                    return Ok(None);
                };
                let slice = match until {
                    Some(end) => tail.split_once(end).map_or(tail, |(head, _)| head),
                    None => tail,
                };
                convert(slice, kind).map(Some).map_err(|reason| fail(&reason))
            }
            ExtractionRule::ByColumnRange { start, end } => {
                let slice: String = line.chars().skip(start).take(end - start).collect();
                Ok(Some(FieldValue::Text(slice.trim().to_string())))
            }
            ExtractionRule::ByPhrase { phrase, token, kind } => {
                let Some((_, tail)) = line.rsplit_once(phrase) else {
                    return Ok(None);
                };
                let value = tail
                    .split_whitespace()
                    .nth(token)
                    .ok_or_else(|| fail(&format!("no token {token} after '{phrase}'")))?;
                convert(value, kind).map(Some).map_err(|reason| fail(&reason))
            }
            ExtractionRule::ByTokens { first, count, kind } => {
                let tokens: Vec<&str> = line.split_whitespace().skip(first).take(count).collect();
                if tokens.len() < count {
                    return Err(fail(&format!(
                        "expected {count} tokens from index {first}, found {}",
                        tokens.len()
                    )));
                }
                if count == 1 {
                    convert(tokens[0], kind).map(Some).map_err(|reason| fail(&reason))
                } else {
                    Ok(Some(FieldValue::Text(tokens.join(" "))))
                }
            }
            ExtractionRule::ByBracketColumns { open, close, width } => {
                let Some((_, tail)) = line.rsplit_once(open) else {
                    return Ok(None);
                };
                let inner = tail.split_once(close).map_or(tail, |(head, _)| head);
                let chars: Vec<char> = inner.chars().collect();
                let columns: Vec<String> = chars
                    .chunks(width)
                    .map(|chunk| chunk.iter().collect::<String>().trim().to_string())
                    .filter(|column| !column.is_empty())
                    .collect();
                if columns.is_empty() || columns.iter().any(|c| c.parse::<u32>().is_err()) {
                    return Err(fail(&format!("malformed mesh '{inner}'")));
                }
                Ok(Some(FieldValue::Text(columns.join(" "))))
            }
            ExtractionRule::Verbatim => Ok(Some(FieldValue::Text(line.to_string()))),
        }
    }
}

impl fmt::Display for LogField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[allow(clippy::cast_possible_truncation)]
fn convert(raw: &str, kind: ValueKind) -> Result<FieldValue, String> {
    let raw = raw.trim();
    match kind {
        ValueKind::Float => raw
            .parse::<f64>()
            .map(FieldValue::Float)
            .map_err(|e| format!("invalid float '{raw}': {e}")),
        ValueKind::Int => raw
            .parse::<i64>()
            .map(FieldValue::Int)
            .map_err(|e| format!("invalid integer '{raw}': {e}")),
        ValueKind::RoundedInt => raw
            .parse::<f64>()
            .map(|v| FieldValue::Int(v.round() as i64))
            .map_err(|e| format!("invalid float '{raw}': {e}")),
        ValueKind::Text => Ok(FieldValue::Text(raw.to_string())),
    }
}

/// Returns the value of the first line matching `field`, scanning forward.
pub fn extract(field: LogField, text: &str) -> Result<Option<FieldValue>, ParseError> {
    for (index, line) in text.lines().enumerate() {
        if let Some(value) = field.apply(line, index + 1)? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Returns every instance of `field`, in file order.
pub fn extract_all(field: LogField, text: &str) -> Result<Vec<FieldValue>, ParseError> {
    let mut values = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if let Some(value) = field.apply(line, index + 1)? {
            values.push(value);
        }
    }
    Ok(values)
}

/// Scans `text` backward and emits `(field, value)` for each requested
/// field on each line, stopping right after the most recent `:ITE` line.
///
/// Values are returned in scan order, i.e. latest line first. Without any
/// `:ITE` line the whole text is scanned.
pub fn extract_last_iteration(
    text: &str,
    fields: &[LogField],
) -> Result<Vec<(LogField, FieldValue)>, ParseError> {
    let lines: Vec<&str> = text.lines().collect();
    let iteration_anchor = LogField::Iteration.anchor();
    let mut emitted = Vec::new();

    for (index, line) in lines.iter().enumerate().rev() {
        for field in fields {
            if let Some(value) = field.apply(line, index + 1)? {
                emitted.push((*field, value));
            }
        }
        if iteration_anchor.matches(line) {
            break;
        }
    }
    Ok(emitted)
}

/// Values of the most recent SCF iteration, grouped by field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LastIteration {
    values: HashMap<LogField, Vec<FieldValue>>,
}

impl LastIteration {
    /// Runs [`extract_last_iteration`] and groups the values.
    pub fn scan(text: &str, fields: &[LogField]) -> Result<Self, ParseError> {
        let mut values: HashMap<LogField, Vec<FieldValue>> = HashMap::new();
        for (field, value) in extract_last_iteration(text, fields)? {
            values.entry(field).or_default().push(value);
        }
        // Back to file order.
        for list in values.values_mut() {
            list.reverse();
        }
        Ok(Self { values })
    }

    /// Returns the latest value of `field` in the iteration.
    #[must_use]
    pub fn latest(&self, field: LogField) -> Option<&FieldValue> {
        self.values.get(&field).and_then(|list| list.last())
    }

    /// Returns every value of `field` in the iteration, in file order.
    #[must_use]
    pub fn all(&self, field: LogField) -> &[FieldValue] {
        self.values.get(&field).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_total_energy() {
        let line = ":ENE  : ********** TOTAL ENERGY IN Ry =       -580.72457265";
        assert_eq!(
            extract(LogField::TotalEnergy, line).unwrap(),
            Some(FieldValue::Float(-580.724_572_65))
        );
    }

    #[test]
    fn test_volume_and_fermi() {
        let text = ":VOL  :      UNIT CELL VOLUME =     270.01100\n\
                    :FER  : F E R M I - ENERGY(TETRAH.M.)=   0.3843020035\n";
        assert_eq!(
            extract(LogField::Volume, text).unwrap(),
            Some(FieldValue::Float(270.011))
        );
        assert_eq!(
            extract(LogField::FermiEnergy, text).unwrap(),
            Some(FieldValue::Float(0.384_302_003_5))
        );
    }

    #[test]
    fn test_iteration_index() {
        let line = ":ITE012:  12. ITERATION";
        assert_eq!(
            extract(LogField::Iteration, line).unwrap(),
            Some(FieldValue::Int(12))
        );
    }

    #[test]
    fn test_band_gap() {
        let line = ":GAP (global)   :    0.031982 Ry =     0.435 eV  (provided you have a proper k-mesh)";
        assert_eq!(
            extract(LogField::BandGap, line).unwrap(),
            Some(FieldValue::Float(0.435))
        );
    }

    #[test]
    fn test_sphere_radius_skips_lines_without_rmt() {
        let text = ":CHA  : TOTAL VALENCE CHARGE INSIDE UNIT CELL =      32.000000\n\
                    :CHA001: TOTAL VALENCE CHARGE INSIDE SPHERE   1 =   6.7577    (RMT=  1.5800 )\n\
                    :CHA002: TOTAL VALENCE CHARGE INSIDE SPHERE   2 =   4.1000    (RMT=  2.1000 )\n";
        assert_eq!(
            extract_all(LogField::SphereRadius, text).unwrap(),
            vec![FieldValue::Float(1.58), FieldValue::Float(2.1)]
        );
    }

    #[test]
    fn test_atom_label_columns() {
        let line = fixtures::pos_line(1, "Si1");
        assert_eq!(
            extract_all(LogField::AtomLabel, &line).unwrap(),
            vec![FieldValue::Text("Si".to_string())]
        );
    }

    #[test]
    fn test_atom_label_short_line() {
        assert_eq!(
            extract(LogField::AtomLabel, ":POS001: ATOM").unwrap(),
            Some(FieldValue::Text(String::new()))
        );
    }

    #[test]
    fn test_core_electrons_rounded() {
        let text = ":CINT001 Core Integral Atom   1    3.99550337\n\
                    :CINT002 Core Integral Atom   2   10.00421000\n";
        assert_eq!(
            extract_all(LogField::CoreElectrons, text).unwrap(),
            vec![FieldValue::Int(4), FieldValue::Int(10)]
        );
    }

    #[test]
    fn test_k_mesh() {
        let line = "         1         0         0         0        24  1.0 -7.0  1.5         0 k, div: (  8  8  8)";
        assert_eq!(
            extract(LogField::KMesh, line).unwrap(),
            Some(FieldValue::Text("8 8 8".to_string()))
        );
        let dense = "   1   0   0   0   24 k, div: (182182182)";
        assert_eq!(
            extract(LogField::KMesh, dense).unwrap(),
            Some(FieldValue::Text("182 182 182".to_string()))
        );
    }

    #[test]
    fn test_fft_mesh() {
        let line = "   48   48   48    2.00  1    min IFFT-parameters, enhancement factor, iprint";
        assert_eq!(
            extract(LogField::FftMesh, line).unwrap(),
            Some(FieldValue::Text("48 48 48".to_string()))
        );
    }

    #[test]
    fn test_entropy_term() {
        let line = "  -(T*S)            =  -0.00441718";
        assert_eq!(
            extract(LogField::EntropyTerm, line).unwrap(),
            Some(FieldValue::Float(-0.004_417_18))
        );
    }

    #[test]
    fn test_generic_marker_is_verbatim() {
        let text = "noise\n:NEC01: NUCLEAR AND ELECTRONIC CHARGE   28.00000   28.00000\n";
        assert_eq!(
            extract(LogField::Marker(":NEC01"), text).unwrap(),
            Some(FieldValue::Text(
                ":NEC01: NUCLEAR AND ELECTRONIC CHARGE   28.00000   28.00000".to_string()
            ))
        );
    }

    #[test]
    fn test_missing_marker() {
        assert_eq!(extract(LogField::TotalEnergy, "nothing here\n").unwrap(), None);
        assert!(extract_all(LogField::SphereRadius, "").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_number_is_fatal() {
        let text = "header\n:ENE  : ********** TOTAL ENERGY IN Ry =  -58O.12\n";
        let err = extract(LogField::TotalEnergy, text).unwrap_err();
        assert_eq!(err.field, ":ENE");
        assert_eq!(err.line_number, 2);
        assert!(err.reason.contains("invalid float"));
    }

    #[test]
    fn test_backward_scan_stops_at_latest_iteration() {
        let text = fixtures::scf_iterations(&[(1, -580.10), (2, -580.20), (3, -580.30)]);
        let emitted =
            extract_last_iteration(&text, &[LogField::Iteration, LogField::TotalEnergy]).unwrap();

        assert_eq!(
            emitted,
            vec![
                (LogField::TotalEnergy, FieldValue::Float(-580.30)),
                (LogField::Iteration, FieldValue::Int(3)),
            ]
        );
    }

    #[test]
    fn test_backward_scan_ignores_malformed_earlier_iterations() {
        let text = ":ITE001:  1. ITERATION\n\
                    :ENE  : ********** TOTAL ENERGY IN Ry =  garbage\n\
                    :ITE002:  2. ITERATION\n\
                    :ENE  : ********** TOTAL ENERGY IN Ry =  -1.5\n";
        let last = LastIteration::scan(text, &[LogField::TotalEnergy]).unwrap();
        assert_eq!(last.latest(LogField::TotalEnergy), Some(&FieldValue::Float(-1.5)));
    }

    #[test]
    fn test_backward_scan_without_iteration_marker() {
        let text = ":WAR : first\n:WAR : second\n";
        let last = LastIteration::scan(text, &[LogField::Warning]).unwrap();
        assert_eq!(
            last.all(LogField::Warning),
            &[
                FieldValue::Text(":WAR : first".to_string()),
                FieldValue::Text(":WAR : second".to_string()),
            ]
        );
    }

    #[test]
    fn test_last_iteration_groups_lists_in_file_order() {
        let text = ":ITE001:  1. ITERATION\n\
                    :CHA001: TOTAL VALENCE CHARGE INSIDE SPHERE   1 =   6.1    (RMT=  1.0000 )\n\
                    :ITE002:  2. ITERATION\n\
                    :CHA001: TOTAL VALENCE CHARGE INSIDE SPHERE   1 =   6.7    (RMT=  1.5800 )\n\
                    :CHA002: TOTAL VALENCE CHARGE INSIDE SPHERE   2 =   4.1    (RMT=  2.1000 )\n";
        let last = LastIteration::scan(text, &[LogField::SphereRadius]).unwrap();
        assert_eq!(
            last.all(LogField::SphereRadius),
            &[FieldValue::Float(1.58), FieldValue::Float(2.1)]
        );
        assert!(last.latest(LogField::Iteration).is_none());
    }
}
