//! WIEN2k output fixtures and pre-scripted executors.

use std::fmt::Write as _;

use super::mocks::{ScriptedExecutor, ScriptedResponse};
use crate::execution::{StepKind, StepRequest};
use crate::files::{FileSet, MemoryFileSet};
use crate::pipeline::STRUCT_FILE;
use crate::stages::auxiliary::{INIT_LAPW_FINISHED, INIT_LAPW_LOG, SGROUP_STRUCT_FILE};
use crate::stages::Precision;

/// A `:WAR` line classified as `QTL_B`.
pub const QTL_B_WARNING: &str =
    ":WAR : QTL-B value eq. 3.32 in Band of energy   0.51203  ATOM=    1  L=  2";

/// A `:WAR` line classified as `VK_COUL`.
pub const VK_COUL_WARNING: &str =
    ":WAR : VK-COUL not well converged: Increase GMAX or decrease NCON";

/// Diamond-structure silicon.
pub const SI_STRUCT: &str = "\
Si bulk
F   LATTICE,NONEQUIV.ATOMS:  1 227 Fd-3m
MODE OF CALC=RELA unit=bohr
 10.261200 10.261200 10.261200 90.000000 90.000000 90.000000
ATOM  -1: X=0.12500000 Y=0.12500000 Z=0.12500000
          MULT= 2          ISPLIT= 2
      -1: X=0.87500000 Y=0.87500000 Z=0.87500000
Si1        NPT=  781  R0=0.00010000 RMT=    2.1000   Z: 14.00000
LOCAL ROT MATRIX:    1.0000000 0.0000000 0.0000000
                     0.0000000 1.0000000 0.0000000
                     0.0000000 0.0000000 1.0000000
  24      NUMBER OF SYMMETRY OPERATIONS
";

/// Reference cell volume of [`ScfFixture`], Bohr³.
pub const REFERENCE_VOLUME: f64 = 270.0;

/// Reference total energy of [`ScfFixture`], Ry.
pub const REFERENCE_ENERGY: f64 = -580.5;

/// Formats a `:POS` line with `label` in the atom-name columns.
#[must_use]
pub fn pos_line(index: usize, label: &str) -> String {
    format!(
        ":POS{index:03}: ATOM {index:>4} X,Y,Z = 0.00000 0.00000 0.00000  MULT= 1  ZZ= 14.000  {label}"
    )
}

/// Formats `:ITE` and `:ENE` lines for each `(iteration, energy)` pair.
#[must_use]
pub fn scf_iterations(iterations: &[(u32, f64)]) -> String {
    iterations.iter().fold(String::new(), |mut text, (i, e)| {
        let _ = write!(
            text,
            ":ITE{i:03}:  {i}. ITERATION\n:ENE  : ********** TOTAL ENERGY IN Ry =  {e:.8}\n"
        );
        text
    })
}

/// Energy of the model curve used by [`eos_executor`] at `delta_percent`.
#[must_use]
pub fn model_energy(delta_percent: f64) -> f64 {
    REFERENCE_ENERGY + 0.001 * delta_percent * delta_percent
}

/// Builds the files a single-precision or cascade-stage solve leaves
/// behind.
#[derive(Debug, Clone)]
pub struct ScfFixture {
    iterations: u32,
    volume: f64,
    energy: f64,
    earlier_energy: f64,
    fermi: Option<f64>,
    gap: Option<f64>,
    rmt: Vec<f64>,
    labels: Vec<&'static str>,
    core: Vec<f64>,
    entropy: f64,
    converged: bool,
    warnings: Vec<String>,
    day_log: Option<String>,
    mesh_files: bool,
}

impl Default for ScfFixture {
    fn default() -> Self {
        Self {
            iterations: 12,
            volume: REFERENCE_VOLUME,
            energy: REFERENCE_ENERGY,
            earlier_energy: REFERENCE_ENERGY + 0.25,
            fermi: Some(0.38),
            gap: Some(0.435),
            rmt: vec![2.1, 1.6],
            labels: vec!["Si1", "O 1"],
            core: vec![9.996_2, 2.000_4],
            entropy: -0.004_417_18,
            converged: true,
            warnings: Vec::new(),
            day_log: None,
            mesh_files: false,
        }
    }
}

impl ScfFixture {
    /// A converged, warning-free SCF of 12 iterations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the index of the last iteration.
    #[must_use]
    pub fn iterations(mut self, n: u32) -> Self {
        self.iterations = n.max(1);
        self
    }

    /// Sets the last-iteration total energy.
    #[must_use]
    pub fn with_energy(mut self, energy: f64) -> Self {
        self.energy = energy;
        self
    }

    /// Sets the cell volume.
    #[must_use]
    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }

    /// Sets the total energy of the iteration before the last.
    #[must_use]
    pub fn with_earlier_energy(mut self, energy: f64) -> Self {
        self.earlier_energy = energy;
        self
    }

    /// Writes the day-log under `name` instead of `<prefix>.dayfile`.
    #[must_use]
    pub fn day_log_name(mut self, name: impl Into<String>) -> Self {
        self.day_log = Some(name.into());
        self
    }

    /// Sets whether the day-log carries the convergence marker.
    #[must_use]
    pub fn converged(mut self, converged: bool) -> Self {
        self.converged = converged;
        self
    }

    /// Adds a `:WAR` line to the last iteration of `scf1`.
    #[must_use]
    pub fn with_warning(mut self, line: impl Into<String>) -> Self {
        self.warnings.push(line.into());
        self
    }

    /// Drops the `:FER` line.
    #[must_use]
    pub fn without_fermi_energy(mut self) -> Self {
        self.fermi = None;
        self
    }

    /// Drops the `:GAP` line.
    #[must_use]
    pub fn without_gap(mut self) -> Self {
        self.gap = None;
        self
    }

    /// Also writes `<prefix>.klist` and `<prefix>.in0`.
    #[must_use]
    pub fn with_mesh_files(mut self) -> Self {
        self.mesh_files = true;
        self
    }

    /// Renders the fixture with `prefix` as file stem (`case`, `prec2`, ...).
    #[must_use]
    pub fn files(&self, prefix: &str) -> MemoryFileSet {
        let mut files = MemoryFileSet::new();
        files.insert(format!("{prefix}.scf0"), self.scf0());
        files.insert(format!("{prefix}.scf1"), self.scf1());
        files.insert(format!("{prefix}.scf2"), self.scf2());
        files.insert(format!("{prefix}.scfm"), self.scfm());
        files.insert(format!("{prefix}.scfc"), self.scfc());

        let day_log = self
            .day_log
            .clone()
            .unwrap_or_else(|| format!("{prefix}.dayfile"));
        files.insert(day_log, self.dayfile());

        let error_name = if prefix == "case" {
            "lapw1.error".to_string()
        } else {
            format!("lapw1.error_{prefix}")
        };
        files.insert(error_name, "");

        if self.mesh_files {
            files.insert(
                format!("{prefix}.klist"),
                "         1         0         0         0        24  1.0 -7.0  1.5         0 k, div: (  8  8  8)\n\
                 END\n",
            );
            files.insert(
                format!("{prefix}.in0"),
                "TOT  13  (5...CA-LDA, 13...PBE)\n\
                 NR2V      IFFT      (R2V)\n\
                 \x20  48   48   48    2.00  1    min IFFT-parameters, enhancement factor, iprint\n",
            );
        }
        files
    }

    /// Renders one cascade stage.
    #[must_use]
    pub fn stage_files(&self, precision: Precision) -> MemoryFileSet {
        self.files(precision.as_str())
    }

    /// The previous iteration followed by the last one, built by `body`.
    fn blocks(&self, body: impl Fn(&mut String, bool)) -> String {
        let mut text = String::new();
        if self.iterations > 1 {
            text.push_str(&iteration_header(self.iterations - 1));
            body(&mut text, false);
        }
        text.push_str(&iteration_header(self.iterations));
        body(&mut text, true);
        text
    }

    fn scf0(&self) -> String {
        self.blocks(|text, _| {
            let _ = writeln!(text, ":VOL  :      UNIT CELL VOLUME =     {:.5}", self.volume);
        })
    }

    fn scf1(&self) -> String {
        self.blocks(|text, last| {
            text.push_str(":EPL001:  Si1  LINEARIZATION ENERGY   0.31000\n");
            if last {
                for warning in &self.warnings {
                    text.push_str(warning);
                    text.push('\n');
                }
            }
        })
    }

    fn scf2(&self) -> String {
        self.blocks(|text, _| {
            if let Some(fermi) = self.fermi {
                let _ = writeln!(text, ":FER  : F E R M I - ENERGY(TETRAH.M.)=   {fermi:.10}");
            }
            if let Some(gap) = self.gap {
                let _ = writeln!(
                    text,
                    ":GAP (global)   :    {:.6} Ry =     {gap:.3} eV  (provided you have a proper k-mesh)",
                    gap / 13.605_693
                );
            }
            text.push_str(":CHA  : TOTAL VALENCE CHARGE INSIDE UNIT CELL =      32.000000\n");
            for (i, rmt) in self.rmt.iter().enumerate() {
                let _ = writeln!(
                    text,
                    ":CHA{:03}: TOTAL VALENCE CHARGE INSIDE SPHERE {:>3} =   4.1000    (RMT=  {rmt:.4} )",
                    i + 1,
                    i + 1
                );
            }
            for (i, label) in self.labels.iter().enumerate() {
                text.push_str(&pos_line(i + 1, label));
                text.push('\n');
            }
            let _ = writeln!(text, "  -(T*S)            =  {:.8}", self.entropy);
        })
    }

    fn scfm(&self) -> String {
        self.blocks(|text, last| {
            let energy = if last { self.energy } else { self.earlier_energy };
            let _ = writeln!(text, ":ENE  : ********** TOTAL ENERGY IN Ry =  {energy:.8}");
            for (i, core) in self.core.iter().enumerate() {
                let _ = writeln!(
                    text,
                    ":CINT{:03} Core Integral Atom {:>3}    {core:.8}",
                    i + 1,
                    i + 1
                );
            }
        })
    }

    fn scfc(&self) -> String {
        self.blocks(|text, _| {
            text.push_str(":CTO001: CORE TOTAL ENERGY   -548.12345\n");
        })
    }

    fn dayfile(&self) -> String {
        let flags = if self.converged { "1 1 1" } else { "0 1 1" };
        format!(
            "\n    start \t(Mon Oct 19 10:00:00 2026) with lapw0 (40/99 to go)\n\
             \n    cycle {} \t(Mon Oct 19 10:12:00 2026) \t(28/88 to go)\n\
             :ENERGY convergence:  0 0.0001 .0000070000000000\n\
             :CHARGE convergence:  0 0.0000 .0000000000000000\n\
             ec cc and fc_conv {flags}\n",
            self.iterations
        )
    }
}

fn iteration_header(index: u32) -> String {
    format!(":ITE{index:03}:  {index}. ITERATION\n")
}

/// Files left behind by a successful `x sgroup`.
#[must_use]
pub fn sgroup_files(structure: &str) -> MemoryFileSet {
    MemoryFileSet::new()
        .with_file(SGROUP_STRUCT_FILE, structure)
        .with_file("case.outputsgroup", "Number and name of space group: 227 (F d -3 m)\n")
        .with_file("sgroup.error", "")
}

/// Files left behind by a successful `init_lapw`.
#[must_use]
pub fn init_lapw_files() -> MemoryFileSet {
    MemoryFileSet::new().with_file(
        INIT_LAPW_LOG,
        format!("> lstart\n> kgen\n> dstart\n{INIT_LAPW_FINISHED}\n"),
    )
}

/// A full four-stage cascade, every stage clean. The two coarsest stages
/// also carry their mesh inputs.
#[must_use]
pub fn cascade_files() -> MemoryFileSet {
    let mut files = ScfFixture::new().iterations(14).with_mesh_files().files("prec3k");
    files.extend(
        &ScfFixture::new()
            .iterations(5)
            .with_energy(-580.6)
            .with_mesh_files()
            .stage_files(Precision::Prec3),
    );
    for (precision, iterations, energy) in [(Precision::Prec2, 4, -580.7), (Precision::Prec1, 3, -580.8)] {
        files.extend(
            &ScfFixture::new()
                .iterations(iterations)
                .with_energy(energy)
                .stage_files(precision),
        );
    }
    files
}

/// An executor answering every SCF step with clean output.
#[must_use]
pub fn scf_executor() -> ScriptedExecutor {
    ScriptedExecutor::new()
        .on(StepKind::Symmetrize, ScriptedResponse::complete(sgroup_files(SI_STRUCT)))
        .on(StepKind::Initialize, ScriptedResponse::complete(init_lapw_files()))
        .on(StepKind::Solve, ScriptedResponse::complete(ScfFixture::new().files("case")))
        .on(StepKind::SolveCascade, ScriptedResponse::complete(cascade_files()))
}

/// An executor that also generates scaled structures from the `x optimize`
/// stdin and solves each one on the curve of [`model_energy`].
#[must_use]
pub fn eos_executor() -> ScriptedExecutor {
    scf_executor()
        .on(StepKind::GenerateVolumes, ScriptedResponse::from_fn(generate_volumes))
        .on(StepKind::SolveAtVolume, ScriptedResponse::from_fn(solve_at_volume))
}

/// Name `x optimize` gives the structure scaled by `delta_percent`.
#[must_use]
pub fn volume_file_name(delta_percent: f64) -> String {
    if delta_percent < 0.0 {
        format!("case_vol_{delta_percent:?}.struct")
    } else {
        format!("case_vol__{delta_percent:?}.struct")
    }
}

fn generate_volumes(request: &StepRequest) -> ScriptedResponse {
    let stdin = request.stdin.as_deref().unwrap_or_default();
    let structure = request
        .inputs
        .read(STRUCT_FILE)
        .map(|s| s.into_owned())
        .unwrap_or_default();
    let body = structure.split_once('\n').map_or("", |(_, rest)| rest);

    let mut files = MemoryFileSet::new().with_file("optimize.job", "#!/bin/csh -f\n");
    for delta in stdin.lines().skip(2).filter_map(|l| l.trim().parse::<f64>().ok()) {
        files.insert(
            volume_file_name(delta),
            format!("Si bulk vol {delta:?}\n{body}"),
        );
    }
    ScriptedResponse::complete(files)
}

fn solve_at_volume(request: &StepRequest) -> ScriptedResponse {
    let delta = request
        .inputs
        .read(STRUCT_FILE)
        .ok()
        .and_then(|text| {
            let title = text.lines().next()?.to_string();
            title.rsplit_once(" vol ")?.1.trim().parse::<f64>().ok()
        });
    match delta {
        Some(delta) => ScriptedResponse::complete(
            ScfFixture::new()
                .with_volume(REFERENCE_VOLUME * (1.0 + delta / 100.0))
                .with_energy(model_energy(delta))
                .files("case"),
        ),
        None => ScriptedResponse::complete(MemoryFileSet::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scf_iterations_format() {
        assert_eq!(
            scf_iterations(&[(3, -1.5)]),
            ":ITE003:  3. ITERATION\n:ENE  : ********** TOTAL ENERGY IN Ry =  -1.50000000\n"
        );
    }

    #[test]
    fn test_fixture_layout() {
        let files = ScfFixture::new().files("prec2");
        assert!(files.contains("prec2.scfm"));
        assert!(files.contains("prec2.dayfile"));
        assert!(files.contains("lapw1.error_prec2"));
        assert!(!files.contains("prec2.klist"));

        let scfm = ScfFixture::new().files("case").read("case.scfm").unwrap().into_owned();
        assert!(scfm.starts_with(":ITE011:"));
        assert_eq!(scfm.matches(":ITE").count(), 2);
    }

    #[test]
    fn test_volume_file_names() {
        assert_eq!(volume_file_name(-6.0), "case_vol_-6.0.struct");
        assert_eq!(volume_file_name(2.0), "case_vol__2.0.struct");
    }
}
