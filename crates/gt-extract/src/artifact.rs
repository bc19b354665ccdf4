use gt_types::{ExtractionError, ExtractionErrorKind, Mode};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Literal strings the quantum chemistry program prints on a clean exit.
pub const COMPLETION_MARKERS: [&str; 2] = [
    "CPU timing information for all processes",
    "ddikick.x: exited gracefully.",
];

pub fn has_completion_marker(text: &str) -> bool {
    COMPLETION_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Read an artifact and check it finished. A missing marker is treated the
/// same as a missing file: both are recoverable by resubmission.
pub fn read_artifact(path: &Path, mode: Mode) -> Result<String, ExtractionError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ExtractionError::missing_artifact(mode, path));
        }
        Err(e) => {
            return Err(ExtractionError {
                mode,
                path: path.to_path_buf(),
                kind: ExtractionErrorKind::MissingArtifact,
                detail: e.to_string(),
            });
        }
    };

    // Logs occasionally carry stray non-UTF-8 bytes from the runtime.
    let text = String::from_utf8_lossy(&bytes).into_owned();
    if !has_completion_marker(&text) {
        return Err(ExtractionError::missing_marker(mode, path));
    }
    Ok(text)
}
