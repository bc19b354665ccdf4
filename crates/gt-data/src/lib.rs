//! Tabular inputs and outputs: reference energies, per-trial CSV exports and
//! the append-only trial summary.

pub mod export;
pub mod reference;
pub mod summary;

pub use export::{read_extracted, write_comparison, write_extracted, ExtractedRow};
pub use reference::{ReferenceEnergies, ReferenceTable};
pub use summary::SummaryLog;
