//! Output-file and field contracts of the solve stages.
//!
//! A contract names the files a stage must leave behind, its error-file
//! suffix, its day-log, and every field it extracts with the record key
//! the field is stored under. Contracts are built once per process.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::files::FileSet;
use crate::parsing::error_files::DEFAULT_ERROR_SUFFIX;
use crate::parsing::LogField;

/// Refinement level of a precision-cascade solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// Coarse reference stage; its keys are unsuffixed.
    Prec3k,
    /// First refinement.
    Prec3,
    /// Second refinement.
    Prec2,
    /// Finest refinement.
    Prec1,
}

impl Precision {
    /// Stages in execution order, coarsest first.
    pub const CASCADE: [Self; 4] = [Self::Prec3k, Self::Prec3, Self::Prec2, Self::Prec1];

    /// Returns the file-name stem, e.g. `prec3k`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Prec3k => "prec3k",
            Self::Prec3 => "prec3",
            Self::Prec2 => "prec2",
            Self::Prec1 => "prec1",
        }
    }

    /// Returns true for the reference stage.
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(self, Self::Prec3k)
    }

    /// Suffix appended to record keys of this stage.
    #[must_use]
    pub fn key_suffix(&self) -> String {
        if self.is_reference() {
            String::new()
        } else {
            format!("_{}", self.as_str())
        }
    }

    /// Suffix of this stage's error files, e.g. `.error_prec2`.
    #[must_use]
    pub fn error_suffix(&self) -> String {
        format!(".error_{}", self.as_str())
    }

    /// Offset added to warning exit codes raised by this stage.
    #[must_use]
    pub const fn warning_offset(&self) -> u16 {
        match self {
            Self::Prec3k => 0,
            Self::Prec3 => 30,
            Self::Prec2 => 20,
            Self::Prec1 => 10,
        }
    }

    /// Returns `<stem>.<extension>`.
    #[must_use]
    pub fn file(&self, extension: &str) -> String {
        format!("{}.{extension}", self.as_str())
    }

    const fn index(self) -> usize {
        match self {
            Self::Prec3k => 0,
            Self::Prec3 => 1,
            Self::Prec2 => 2,
            Self::Prec1 => 3,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A required output: one exact name, or any of several alternatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRequirement {
    /// Exactly this name.
    One(String),
    /// Any one of these names, checked in order.
    AnyOf(Vec<String>),
}

impl FileRequirement {
    /// Returns the first name satisfying the requirement.
    pub fn resolve<F: FileSet + ?Sized>(&self, files: &F) -> Option<String> {
        match self {
            Self::One(name) => files.contains(name).then(|| name.clone()),
            Self::AnyOf(names) => names.iter().find(|n| files.contains(n)).cloned(),
        }
    }

    /// Returns every candidate name.
    #[must_use]
    pub fn candidates(&self) -> Vec<&str> {
        match self {
            Self::One(name) => vec![name.as_str()],
            Self::AnyOf(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

impl fmt::Display for FileRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One(name) => f.write_str(name),
            Self::AnyOf(names) => write!(f, "{}", names.join(" | ")),
        }
    }
}

/// How an extracted field is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    /// The latest value, as a scalar.
    Scalar,
    /// Every value of the last iteration, as a list.
    List,
    /// The latest value, appended to a list shared across cascade stages.
    Series,
}

/// Which part of the source file is searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Backward scan limited to the most recent SCF iteration.
    LastIteration,
    /// First match, scanning forward through the whole file.
    FirstMatch,
}

/// One field a stage extracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Record key.
    pub key: String,
    /// Log field to extract.
    pub field: LogField,
    /// File the field is read from.
    pub source: String,
    /// Absence is a stage-terminal error.
    pub mandatory: bool,
    /// Storage shape.
    pub shape: FieldShape,
    /// Search mode.
    pub scan: ScanMode,
}

impl FieldSpec {
    fn new(key: impl Into<String>, field: LogField, source: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            field,
            source: source.into(),
            mandatory: true,
            shape: FieldShape::Scalar,
            scan: ScanMode::LastIteration,
        }
    }

    fn optional(mut self) -> Self {
        self.mandatory = false;
        self
    }

    fn shaped(mut self, shape: FieldShape) -> Self {
        self.shape = shape;
        self
    }

    fn first_match(mut self) -> Self {
        self.scan = ScanMode::FirstMatch;
        self
    }
}

/// Everything a stage parser needs to know about one stage's outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageContract {
    /// Stage label used in diagnostics.
    pub name: String,
    /// Files that must all be retrieved.
    pub required: Vec<FileRequirement>,
    /// The day-log checked for convergence.
    pub day_log: FileRequirement,
    /// Error-file suffix.
    pub error_suffix: String,
    /// Fields to extract.
    pub fields: Vec<FieldSpec>,
    /// Files searched for `:WAR` lines.
    pub warning_sources: Vec<String>,
    /// Record key holding the warning lines.
    pub warnings_key: String,
    /// Line appended to the warnings when the SCF did not converge.
    pub not_converged_note: String,
    /// Offset for warning exit codes.
    pub warning_offset: u16,
}

const SCF_EXTENSIONS: [&str; 5] = ["scf0", "scf1", "scf2", "scfm", "scfc"];

static SINGLE_PRECISION: LazyLock<StageContract> = LazyLock::new(build_single_precision);

static CASCADE: LazyLock<Vec<StageContract>> =
    LazyLock::new(|| Precision::CASCADE.iter().map(|p| build_cascade_stage(*p)).collect());

impl StageContract {
    /// Contract of a plain `run_lapw` solve (`case.*` files).
    #[must_use]
    pub fn single_precision() -> &'static Self {
        &SINGLE_PRECISION
    }

    /// Contract of one precision-cascade stage (`precN.*` files).
    #[must_use]
    pub fn for_precision(precision: Precision) -> &'static Self {
        &CASCADE[precision.index()]
    }

    /// Returns the storage shape of `key`, if the contract defines it.
    #[must_use]
    pub fn shape_of(&self, key: &str) -> Option<FieldShape> {
        self.fields.iter().find(|f| f.key == key).map(|f| f.shape)
    }

    /// Returns every file name this contract refers to.
    #[must_use]
    pub fn known_files(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .required
            .iter()
            .flat_map(|r| r.candidates().into_iter().map(str::to_string))
            .collect();
        for spec in &self.fields {
            if !names.contains(&spec.source) {
                names.push(spec.source.clone());
            }
        }
        names
    }
}

fn build_single_precision() -> StageContract {
    let scf = |ext: &str| format!("case.{ext}");
    let day_log = FileRequirement::AnyOf(vec!["case.dayfile".into(), "run_lapw.log".into()]);
    let mut required: Vec<FileRequirement> =
        SCF_EXTENSIONS.iter().map(|e| FileRequirement::One(scf(e))).collect();
    required.push(day_log.clone());

    StageContract {
        name: "run_lapw".to_string(),
        required,
        day_log,
        error_suffix: DEFAULT_ERROR_SUFFIX.to_string(),
        fields: vec![
            FieldSpec::new("Iter", LogField::Iteration, scf("scf0")).optional(),
            FieldSpec::new("VolBohr3", LogField::Volume, scf("scf0")),
            FieldSpec::new("EfermiRyd", LogField::FermiEnergy, scf("scf2")),
            FieldSpec::new("GapEv", LogField::BandGap, scf("scf2")).optional(),
            FieldSpec::new("Rmt", LogField::SphereRadius, scf("scf2")).shaped(FieldShape::List),
            FieldSpec::new("atom_labels", LogField::AtomLabel, scf("scf2"))
                .shaped(FieldShape::List),
            FieldSpec::new("EtotRyd", LogField::TotalEnergy, scf("scfm")),
            FieldSpec::new("num_core_el", LogField::CoreElectrons, scf("scfm"))
                .shaped(FieldShape::List),
        ],
        warning_sources: SCF_EXTENSIONS.iter().map(|e| scf(e)).collect(),
        warnings_key: "Warning_last".to_string(),
        not_converged_note: "Warning: SCF not converged".to_string(),
        warning_offset: 0,
    }
}

fn build_cascade_stage(precision: Precision) -> StageContract {
    let day_log = FileRequirement::One(precision.file("dayfile"));
    let mut required: Vec<FileRequirement> = SCF_EXTENSIONS
        .iter()
        .map(|e| FileRequirement::One(precision.file(e)))
        .collect();
    required.push(day_log.clone());

    let suffix = precision.key_suffix();
    let mut fields = vec![
        FieldSpec::new("Iter", LogField::Iteration, precision.file("scf0"))
            .optional()
            .shaped(FieldShape::Series),
    ];

    if precision.is_reference() {
        fields.extend([
            FieldSpec::new("VolBohr3", LogField::Volume, precision.file("scf0")),
            FieldSpec::new("EfermiRyd", LogField::FermiEnergy, precision.file("scf2")),
            FieldSpec::new("GapEv", LogField::BandGap, precision.file("scf2")).optional(),
            FieldSpec::new("Rmt", LogField::SphereRadius, precision.file("scf2"))
                .shaped(FieldShape::List),
            FieldSpec::new("atom_labels", LogField::AtomLabel, precision.file("scf2"))
                .shaped(FieldShape::List),
            FieldSpec::new("mTSRyd", LogField::EntropyTerm, precision.file("scf2")).optional(),
        ]);
    }

    fields.extend([
        FieldSpec::new(format!("EtotRyd{suffix}"), LogField::TotalEnergy, precision.file("scfm")),
        FieldSpec::new(
            format!("num_core_el{suffix}"),
            LogField::CoreElectrons,
            precision.file("scfm"),
        )
        .shaped(FieldShape::List),
    ]);

    // Mesh descriptors come from input files that are not always retrieved.
    let mesh_tag = precision.as_str().trim_start_matches("prec");
    fields.push(
        FieldSpec::new(format!("kmesh{mesh_tag}"), LogField::KMesh, precision.file("klist"))
            .optional()
            .first_match(),
    );
    if precision.is_reference() {
        fields.push(
            FieldSpec::new(format!("fftmesh{mesh_tag}"), LogField::FftMesh, precision.file("in0"))
                .optional()
                .first_match(),
        );
    }

    let not_converged_note = if precision.is_reference() {
        "Warning: SCF not converged".to_string()
    } else {
        format!("Warning: SCF {precision} not converged")
    };

    StageContract {
        name: precision.as_str().to_string(),
        required,
        day_log,
        error_suffix: precision.error_suffix(),
        fields,
        warning_sources: SCF_EXTENSIONS.iter().map(|e| precision.file(e)).collect(),
        warnings_key: format!("Warning_last{suffix}"),
        not_converged_note,
        warning_offset: precision.warning_offset(),
    }
}
