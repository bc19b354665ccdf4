//! Run configuration, loaded from JSON.

use gt_scheduler::{PollConfig, SchedulerConfig};
use gt_types::{config_error, GtResult, Mode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::search::SearchSpace;

/// Environment variable naming the default config file.
pub const CONFIG_ENV: &str = "GAPTUNE_CONFIG";

/// Top-level configuration for a tuning run. Every field has a default, so
/// a config file only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Molecules evaluated by every trial, in submission order.
    pub molecules: Vec<String>,
    pub modes: Vec<Mode>,
    /// Most jobs listed at the scheduler at once.
    pub max_concurrent: usize,
    /// Extraction attempts per molecule, the first included.
    pub max_attempts: usize,
    /// Root under which every job directory is created.
    pub work_root: PathBuf,
    /// Input template; see [`crate::TemplatePreparer`].
    pub template: PathBuf,
    pub geometry_dir: PathBuf,
    /// `molecule,S1,T1` table; the built-in benchmark values when unset.
    pub reference: Option<PathBuf>,
    pub summary_path: PathBuf,
    pub extracted_path: PathBuf,
    pub comparison_path: Option<PathBuf>,
    pub scheduler: SchedulerConfig,
    pub poll: PollConfig,
    pub search_space: SearchSpace,
    /// "grid", "random" or "adaptive".
    pub strategy: String,
    pub max_trials: usize,
    /// Share of adaptive suggestions drawn uniformly instead of near the best.
    pub exploration_weight: f64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            molecules: [
                "Heptazine",
                "Cyclazine",
                "Molecule3",
                "Molecule4",
                "Molecule5",
                "Molecule6",
                "Molecule7",
                "Molecule8",
                "Molecule9",
                "Molecule10",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            modes: Mode::ALL.to_vec(),
            max_concurrent: 20,
            max_attempts: 2,
            work_root: PathBuf::from("runs"),
            template: PathBuf::from("data/template.inp"),
            geometry_dir: PathBuf::from("geometries"),
            reference: None,
            summary_path: PathBuf::from("results_summary.txt"),
            extracted_path: PathBuf::from("extracted_data.csv"),
            comparison_path: Some(PathBuf::from("comparison_results.csv")),
            scheduler: SchedulerConfig::default(),
            poll: PollConfig::default(),
            search_space: SearchSpace::default(),
            strategy: "adaptive".to_string(),
            max_trials: 2500,
            exploration_weight: 0.3,
        }
    }
}

impl TuningConfig {
    /// Load and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> GtResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| config_error!("cannot read config {}: {e}", path.display()))?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        tracing::info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// The file named by `explicit`, else by `GAPTUNE_CONFIG`, else defaults.
    pub fn load(explicit: Option<&Path>) -> GtResult<Self> {
        match explicit {
            Some(path) => Self::from_json_file(path),
            None => match std::env::var_os(CONFIG_ENV) {
                Some(path) => Self::from_json_file(PathBuf::from(path)),
                None => {
                    let config = Self::default();
                    config.validate()?;
                    Ok(config)
                }
            },
        }
    }

    pub fn validate(&self) -> GtResult<()> {
        if self.molecules.is_empty() {
            return Err(config_error!("molecules must not be empty"));
        }
        let mut molecules: Vec<&str> = self.molecules.iter().map(String::as_str).collect();
        molecules.sort_unstable();
        if let Some(pair) = molecules.windows(2).find(|w| w[0] == w[1]) {
            return Err(config_error!("molecule {} is listed twice", pair[0]));
        }
        if !Mode::ALL.iter().all(|mode| self.modes.contains(mode)) {
            return Err(config_error!(
                "modes must include singlet and triplet, got {:?}",
                self.modes
            ));
        }
        if self.max_concurrent == 0 {
            return Err(config_error!("max_concurrent must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(config_error!("max_attempts must be at least 1"));
        }
        if self.poll.interval_secs == 0 {
            return Err(config_error!("poll.interval_secs must be at least 1"));
        }
        if self.scheduler.submit_command.is_empty()
            || self.scheduler.query_command.is_empty()
            || self.scheduler.cancel_command.is_empty()
        {
            return Err(config_error!("scheduler commands must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.exploration_weight) {
            return Err(config_error!(
                "exploration_weight must be within [0, 1], got {}",
                self.exploration_weight
            ));
        }
        self.search_space.validate()
    }

    pub fn with_molecules<I, S>(mut self, molecules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.molecules = molecules.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    pub fn with_max_attempts(mut self, n: usize) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn with_max_trials(mut self, n: usize) -> Self {
        self.max_trials = n;
        self
    }

    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = root.into();
        self
    }

    pub fn with_strategy(mut self, strategy: &str) -> Self {
        self.strategy = strategy.to_string();
        self
    }

    pub fn with_search_space(mut self, space: SearchSpace) -> Self {
        self.search_space = space;
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Point every output file into `dir`.
    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.summary_path = dir.join("results_summary.txt");
        self.extracted_path = dir.join("extracted_data.csv");
        self.comparison_path = Some(dir.join("comparison_results.csv"));
        self
    }
}
