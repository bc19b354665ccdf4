use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::params::ParameterVector;

/// Evaluation mode of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Mode {
    Singlet,
    Triplet,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Singlet, Mode::Triplet];

    /// Short tag used in directory and file names.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Singlet => "S",
            Self::Triplet => "T",
        }
    }

    /// Spin multiplicity requested from the response calculation.
    pub fn multiplicity(self) -> u8 {
        match self {
            Self::Singlet => 1,
            Self::Triplet => 3,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singlet => write!(f, "singlet"),
            Self::Triplet => write!(f, "triplet"),
        }
    }
}

/// One molecule evaluated in one mode for one parameter vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub molecule: String,
    pub mode: Mode,
    pub params: ParameterVector,
}

impl WorkItem {
    pub fn new(molecule: impl Into<String>, mode: Mode, params: ParameterVector) -> Self {
        Self {
            molecule: molecule.into(),
            mode,
            params,
        }
    }

    /// Name of the directory shared by every molecule of this vector and mode.
    pub fn dir_name(&self) -> String {
        format!("{}_{}", self.params.signature(), self.mode.tag())
    }

    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.molecule, self.dir_name())
    }

    pub fn job_dir(&self, root: &Path) -> PathBuf {
        root.join(self.dir_name())
    }

    pub fn input_file_name(&self) -> String {
        format!("{}.inp", self.file_stem())
    }

    pub fn input_path(&self, root: &Path) -> PathBuf {
        self.job_dir(root).join(self.input_file_name())
    }

    /// The log the external job writes; the only source of truth for its result.
    pub fn artifact_path(&self, root: &Path) -> PathBuf {
        self.job_dir(root).join(format!("{}.log", self.file_stem()))
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.molecule, self.mode.tag())
    }
}

/// Expand a parameter vector into work items, molecule-major: every mode of
/// the first molecule, then every mode of the next.
pub fn expand_work_items(
    molecules: &[String],
    modes: &[Mode],
    params: &ParameterVector,
) -> Vec<WorkItem> {
    molecules
        .iter()
        .flat_map(|molecule| {
            modes
                .iter()
                .map(move |mode| WorkItem::new(molecule.clone(), *mode, params.clone()))
        })
        .collect()
}
