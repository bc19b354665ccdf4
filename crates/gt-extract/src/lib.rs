//! Turns job log artifacts into [`gt_types::ArtifactRecord`]s.
//!
//! An artifact is trusted only if it carries a completion marker; a job that
//! left the scheduler queue may still have died mid-run.

pub mod artifact;
pub mod extractor;
pub mod fields;

pub use artifact::{has_completion_marker, read_artifact, COMPLETION_MARKERS};
pub use extractor::{derive_record, ArtifactExtractor, HARTREE_TO_EV};
pub use fields::EnergyField;
