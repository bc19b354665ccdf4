//! Input file preparation for work items.

use gt_types::{GtResult, WorkItem};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes the input file a work item's job will read.
pub trait InputPreparer: Send + Sync {
    /// Create the item's job directory under `root` and write its input
    /// file there. Returns the input path.
    fn prepare(&self, item: &WorkItem, root: &Path) -> GtResult<PathBuf>;
}

/// Renders a text template with `{{name}}` placeholders.
///
/// Every parameter name is a placeholder, plus `{{molecule}}`, `{{mult}}`
/// (1 for singlet, 3 for triplet) and `{{geometry}}`, the contents of
/// `{geometry_dir}/{molecule}.xyz`.
#[derive(Debug, Clone)]
pub struct TemplatePreparer {
    template: String,
    geometry_dir: PathBuf,
}

impl TemplatePreparer {
    pub fn new(template: impl Into<String>, geometry_dir: impl AsRef<Path>) -> Self {
        Self {
            template: template.into(),
            geometry_dir: geometry_dir.as_ref().to_path_buf(),
        }
    }

    pub fn from_file(template_path: impl AsRef<Path>, geometry_dir: impl AsRef<Path>) -> GtResult<Self> {
        let template = fs::read_to_string(template_path)?;
        Ok(Self::new(template, geometry_dir))
    }

    pub fn geometry_path(&self, molecule: &str) -> PathBuf {
        self.geometry_dir.join(format!("{molecule}.xyz"))
    }

    pub fn render(&self, item: &WorkItem, geometry: &str) -> String {
        let mut text = self.template.clone();
        for (name, value) in item.params.iter() {
            text = text.replace(&format!("{{{{{name}}}}}"), &value.to_string());
        }
        text.replace("{{molecule}}", &item.molecule)
            .replace("{{mult}}", &item.mode.multiplicity().to_string())
            .replace("{{geometry}}", geometry.trim_end())
    }
}

impl InputPreparer for TemplatePreparer {
    fn prepare(&self, item: &WorkItem, root: &Path) -> GtResult<PathBuf> {
        let geometry = fs::read_to_string(self.geometry_path(&item.molecule))?;
        fs::create_dir_all(item.job_dir(root))?;
        let path = item.input_path(root);
        fs::write(&path, self.render(item, &geometry))?;
        debug!(item = %item, path = %path.display(), "input file written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gt_types::{Mode, ParameterVector};

    const TEMPLATE: &str = " $TDDFT MULT={{mult}} mralp={{a2}} $END\n $DFT alphac={{a1}} $END\n $DATA\n {{molecule}}\n{{geometry}}\n $END\n";

    fn item(mode: Mode) -> WorkItem {
        WorkItem::new("Heptazine", mode, ParameterVector::new([("a1", 0.5), ("a2", 0.61)]))
    }

    #[test]
    fn renders_every_placeholder() {
        let preparer = TemplatePreparer::new(TEMPLATE, "/geoms");
        let text = preparer.render(&item(Mode::Triplet), "N 0.0 0.0 0.0\n");
        assert_eq!(
            text,
            " $TDDFT MULT=3 mralp=0.61 $END\n $DFT alphac=0.5 $END\n $DATA\n Heptazine\nN 0.0 0.0 0.0\n $END\n"
        );
    }

    #[test]
    fn prepare_writes_into_job_directory() {
        let root = tempfile::tempdir().unwrap();
        let geoms = tempfile::tempdir().unwrap();
        fs::write(geoms.path().join("Heptazine.xyz"), "C 1.0 0.0 0.0\n").unwrap();

        let preparer = TemplatePreparer::new(TEMPLATE, geoms.path());
        let item = item(Mode::Singlet);
        let path = preparer.prepare(&item, root.path()).unwrap();

        assert_eq!(path, item.input_path(root.path()));
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("MULT=1"));
        assert!(text.contains("C 1.0 0.0 0.0"));
    }

    #[test]
    fn missing_geometry_fails_preparation() {
        let root = tempfile::tempdir().unwrap();
        let preparer = TemplatePreparer::new(TEMPLATE, root.path().join("none"));
        assert!(preparer.prepare(&item(Mode::Singlet), root.path()).is_err());
        assert!(!item(Mode::Singlet).input_path(root.path()).exists());
    }
}
