use gt_types::{ArtifactRecord, ExtractionError, Mode, ParameterVector, WorkItem};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::artifact::read_artifact;
use crate::fields::EnergyField;

/// Hartree to electron-volt conversion used for excitation energies.
pub const HARTREE_TO_EV: f64 = 27.2114;

/// Derive excitation energies from raw state energies (Hartree).
pub fn derive_record(molecule: impl Into<String>, s0: f64, s1: f64, t1: f64) -> ArtifactRecord {
    let s1_ev = (s1 - s0) * HARTREE_TO_EV;
    let t1_ev = (t1 - s0) * HARTREE_TO_EV;
    let gap_ev = s1_ev - t1_ev;
    ArtifactRecord {
        molecule: molecule.into(),
        s0,
        s1,
        t1,
        s1_ev,
        t1_ev,
        gap_ev,
        valid: gap_ev < 0.0,
    }
}

/// Reads the singlet and triplet artifacts of a molecule under a run root.
#[derive(Debug, Clone)]
pub struct ArtifactExtractor {
    root: PathBuf,
}

impl ArtifactExtractor {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Values held by one artifact: `[s0, s1]` for singlet, `[t1]` for triplet.
    pub fn extract_mode(&self, item: &WorkItem) -> Result<Vec<f64>, ExtractionError> {
        let path = item.artifact_path(&self.root);
        let text = read_artifact(&path, item.mode)?;
        let fields: &[EnergyField] = match item.mode {
            Mode::Singlet => &[EnergyField::S0, EnergyField::S1],
            Mode::Triplet => &[EnergyField::T1],
        };
        fields.iter().map(|field| field.find(&text, &path)).collect()
    }

    /// Extract a full record. Both artifacts are always inspected so that
    /// every failing mode is reported at once.
    pub fn extract(
        &self,
        molecule: &str,
        params: &ParameterVector,
    ) -> Result<ArtifactRecord, Vec<ExtractionError>> {
        let singlet = self.extract_mode(&WorkItem::new(molecule, Mode::Singlet, params.clone()));
        let triplet = self.extract_mode(&WorkItem::new(molecule, Mode::Triplet, params.clone()));

        match (singlet, triplet) {
            (Ok(singlet), Ok(triplet)) => {
                let record = derive_record(molecule, singlet[0], singlet[1], triplet[0]);
                debug!(
                    molecule,
                    s1_ev = record.s1_ev,
                    t1_ev = record.t1_ev,
                    gap_ev = record.gap_ev,
                    "artifact extracted"
                );
                if !record.valid {
                    warn!(molecule, gap_ev = record.gap_ev, "non-negative singlet-triplet gap");
                }
                Ok(record)
            }
            (singlet, triplet) => {
                let errors: Vec<ExtractionError> =
                    [singlet.err(), triplet.err()].into_iter().flatten().collect();
                for error in &errors {
                    debug!(molecule, error = %error, "extraction failed");
                }
                Err(errors)
            }
        }
    }
}
