use gt_types::{DataError, TrialResult};
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only, human-readable log of every trial.
#[derive(Debug, Clone)]
pub struct SummaryLog {
    path: PathBuf,
}

fn or_none(value: Option<f64>) -> String {
    value.map_or_else(|| "none".to_string(), |v| v.to_string())
}

impl SummaryLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block written after each trial, infinite-loss trials included.
    pub fn render_trial(result: &TrialResult) -> String {
        let mut text = String::new();
        let _ = writeln!(text, "Combination: {}", result.parameters);
        let _ = writeln!(text, "RMSE: {}, MAE: {}", or_none(result.rmse), or_none(result.mae));
        text.push_str("Per-molecule differences:\n");
        for row in &result.comparisons {
            let _ = writeln!(
                text,
                "{}: S1_diff={}, T1_diff={}, S1_T1_diff={}",
                row.molecule,
                or_none(row.s1_diff),
                or_none(row.t1_diff),
                or_none(row.gap_diff)
            );
        }
        for skipped in &result.skipped {
            let _ = writeln!(text, "{}: skipped ({:?})", skipped.molecule, skipped.reason);
        }
        text.push('\n');
        text
    }

    /// Closing block for a run.
    pub fn render_best(best: Option<&TrialResult>) -> String {
        match best {
            Some(best) => format!(
                "\nBest Parameters Found: {}\nBest RMSE: {}\n",
                best.parameters, best.loss
            ),
            None => "\nBest Parameters Found: none\nBest RMSE: inf\n".to_string(),
        }
    }

    pub fn append_trial(&self, result: &TrialResult) -> Result<(), DataError> {
        self.append(&Self::render_trial(result))
    }

    pub fn append_best(&self, best: Option<&TrialResult>) -> Result<(), DataError> {
        self.append(&Self::render_best(best))
    }

    fn append(&self, text: &str) -> Result<(), DataError> {
        let to_error = |e: std::io::Error| DataError::Io {
            path: self.path.display().to_string(),
            message: e.to_string(),
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(to_error)?;
        file.write_all(text.as_bytes()).map_err(to_error)
    }
}
