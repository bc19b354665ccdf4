//! Energy-level patterns.
//!
//! The excited-state summary table lists states as `<index>  A  <energy>`.
//! The first occurrence of each pattern is the one we want: later occurrences
//! belong to other tables (gradients, iteration logs) and must not win.

use gt_types::{ExtractionError, Mode};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

const NUMBER: &str = r"([-+]?\d*\.\d+|\d+)";

static STATE_1: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"1\s+A\s+{NUMBER}")).expect("Invalid state 1 regex"));

static STATE_2: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"2\s+A\s+{NUMBER}")).expect("Invalid state 2 regex"));

/// A numeric field located by pattern in an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyField {
    /// Ground-state energy, first state of the singlet log.
    S0,
    /// First excited singlet, second state of the singlet log.
    S1,
    /// Lowest triplet, first state of the triplet log.
    T1,
}

impl EnergyField {
    pub fn name(self) -> &'static str {
        match self {
            Self::S0 => "s0",
            Self::S1 => "s1",
            Self::T1 => "t1",
        }
    }

    /// Mode whose artifact holds this field.
    pub fn mode(self) -> Mode {
        match self {
            Self::S0 | Self::S1 => Mode::Singlet,
            Self::T1 => Mode::Triplet,
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Self::S0 | Self::T1 => &STATE_1,
            Self::S1 => &STATE_2,
        }
    }

    /// First match in `text`, parsed as a float.
    pub fn find(self, text: &str, path: &Path) -> Result<f64, ExtractionError> {
        let captures = self
            .pattern()
            .captures(text)
            .ok_or_else(|| ExtractionError::pattern_not_found(self.mode(), path, self.name()))?;
        let raw = &captures[1];
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(ExtractionError::parse(self.mode(), path, self.name(), raw)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gt_types::ExtractionErrorKind;

    const TABLE: &str = "\
  STATE   SYM     ENERGY
    1      A    -1219.4218810
    2      A    -1219.3268810
    3      A    -1219.2000000
  ...
    1      A    -9999.0
";

    #[test]
    fn first_match_wins() {
        let path = Path::new("x.log");
        assert_eq!(EnergyField::S0.find(TABLE, path).unwrap(), -1219.4218810);
        assert_eq!(EnergyField::S1.find(TABLE, path).unwrap(), -1219.3268810);
    }

    #[test]
    fn missing_field_reports_mode_and_name() {
        let err = EnergyField::T1.find("no table here", Path::new("t.log")).unwrap_err();
        assert_eq!(err.kind, ExtractionErrorKind::PatternNotFound);
        assert_eq!(err.mode, Mode::Triplet);
        assert!(err.detail.contains("t1"));
    }

    #[test]
    fn integer_energies_are_accepted() {
        assert_eq!(EnergyField::S0.find("1 A 42", Path::new("x")).unwrap(), 42.0);
    }
}
