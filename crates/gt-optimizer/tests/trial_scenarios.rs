//! End-to-end trials against the simulated scheduler.
//!
//! The scheduler's submission hook plays the part of the external program:
//! it writes the log artifact a real job would leave behind, or withholds it
//! to simulate a job that died.

use gt_data::ReferenceTable;
use gt_optimizer::{
    GridSearch, InputPreparer, OptimizationRunner, OptimizationState, SearchSpace,
    TrialEvaluator, TrialPipeline, TuningConfig,
};
use gt_scheduler::{PollConfig, SimulatedScheduler, SubmitRequest};
use gt_types::{
    BestResult, ExtractionErrorKind, GtResult, ItemOutcome, Mode, ParameterVector, SkipReason,
    WorkItem,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const HARTREE_TO_EV: f64 = 27.2114;
const S0: f64 = -1000.0;

/// Creates job directories and an empty input file.
struct TouchPreparer;

impl InputPreparer for TouchPreparer {
    fn prepare(&self, item: &WorkItem, root: &Path) -> GtResult<PathBuf> {
        fs::create_dir_all(item.job_dir(root))?;
        let path = item.input_path(root);
        fs::write(&path, format!("{} {}\n", item.molecule, item.params))?;
        Ok(path)
    }
}

/// Excitation energies (eV) the fake program reports per molecule, and how
/// many submissions of a given input produce no artifact.
#[derive(Clone, Default)]
struct FakeProgram {
    energies: HashMap<String, (f64, f64)>,
    withhold: HashMap<String, usize>,
    seen: Arc<Mutex<HashMap<String, usize>>>,
}

impl FakeProgram {
    fn with_molecule(mut self, molecule: &str, s1_ev: f64, t1_ev: f64) -> Self {
        self.energies.insert(molecule.to_string(), (s1_ev, t1_ev));
        self
    }

    /// The first `times` submissions of `molecule` in `mode` leave no log.
    fn withhold(mut self, molecule: &str, mode: Mode, times: usize) -> Self {
        self.withhold.insert(format!("{molecule}/{}", mode.tag()), times);
        self
    }

    fn run(&self, request: &SubmitRequest) {
        let stem = request.input_file.trim_end_matches(".inp");
        let molecule = stem.split('_').next().unwrap_or_default().to_string();
        let mode = if stem.ends_with("_S") { Mode::Singlet } else { Mode::Triplet };
        let key = format!("{molecule}/{}", mode.tag());

        let count = {
            let mut seen = self.seen.lock();
            let count = seen.entry(key.clone()).or_insert(0);
            *count += 1;
            *count
        };
        if count <= self.withhold.get(&key).copied().unwrap_or(0) {
            return;
        }

        let Some((s1_ev, t1_ev)) = self.energies.get(&molecule).copied() else {
            return;
        };
        let body = match mode {
            Mode::Singlet => format!(
                "  1  A  {:.10}\n  2  A  {:.10}\n ddikick.x: exited gracefully.\n",
                S0,
                S0 + s1_ev / HARTREE_TO_EV
            ),
            Mode::Triplet => format!(
                "  1  A  {:.10}\n ddikick.x: exited gracefully.\n",
                S0 + t1_ev / HARTREE_TO_EV
            ),
        };
        fs::write(request.working_dir.join(format!("{stem}.log")), body).unwrap();
    }
}

fn references() -> ReferenceTable {
    ReferenceTable::new()
        .with_entry("A", 1.0, 1.2)
        .with_entry("B", 2.0, 2.3)
}

fn config(dir: &Path) -> TuningConfig {
    TuningConfig::default()
        .with_molecules(["A", "B"])
        .with_work_root(dir.join("runs"))
        .with_output_dir(dir)
        .with_max_concurrent(1)
        .with_poll(PollConfig::default().with_interval_secs(30))
}

fn params() -> ParameterVector {
    ParameterVector::new([("a1", 0.5), ("b1", -0.2)])
}

fn scheduler(program: FakeProgram) -> SimulatedScheduler {
    SimulatedScheduler::new(2).with_hook(move |request: &SubmitRequest| program.run(request))
}

#[tokio::test(start_paused = true)]
async fn cap_of_one_submits_in_molecule_major_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let scheduler = scheduler(
        FakeProgram::default()
            .with_molecule("A", 1.0, 1.25)
            .with_molecule("B", 2.0, 2.2),
    );
    let pipeline = TrialPipeline::new(
        &scheduler,
        &TouchPreparer,
        TrialEvaluator::new(references()),
        &config,
        CancellationToken::new(),
    );

    let mut best = BestResult::new();
    let result = pipeline.run_trial(1, params(), &mut best).await.unwrap();

    let order: Vec<String> = scheduler
        .submissions()
        .into_iter()
        .map(|r| r.input_file)
        .collect();
    assert_eq!(
        order,
        vec![
            "A_a1_0.50_b1_-0.20_S.inp",
            "A_a1_0.50_b1_-0.20_T.inp",
            "B_a1_0.50_b1_-0.20_S.inp",
            "B_a1_0.50_b1_-0.20_T.inp",
        ]
    );
    assert_eq!(scheduler.peak_active(), 1);
    assert_eq!(result.records.len(), 2);
    assert!(result.is_viable());
    // A: |-0.25 - -0.2| = 0.05, B: |-0.2 - -0.3| = 0.1
    let expected_rmse = ((0.05f64.powi(2) + 0.1f64.powi(2)) / 2.0).sqrt();
    assert!((result.loss - expected_rmse).abs() < 1e-6);
    assert!((result.mae.unwrap() - 0.075).abs() < 1e-6);
    assert_eq!(best.get().unwrap().trial_id, result.trial_id);
}

#[tokio::test(start_paused = true)]
async fn missing_triplet_recovers_after_one_resubmission() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let scheduler = scheduler(
        FakeProgram::default()
            .with_molecule("A", 1.0, 1.25)
            .with_molecule("B", 2.0, 2.2)
            .withhold("B", Mode::Triplet, 1),
    );
    let pipeline = TrialPipeline::new(
        &scheduler,
        &TouchPreparer,
        TrialEvaluator::new(references()),
        &config,
        CancellationToken::new(),
    );

    let mut best = BestResult::new();
    let result = pipeline.run_trial(1, params(), &mut best).await.unwrap();

    assert!(result.skipped.is_empty());
    let b = result.comparisons.iter().find(|c| c.molecule == "B").unwrap();
    assert!(b.valid);
    assert_eq!(scheduler.submission_count("B_a1_0.50_b1_-0.20_T.inp"), 2);
    assert_eq!(scheduler.submission_count("B_a1_0.50_b1_-0.20_S.inp"), 1);
    assert_eq!(scheduler.submissions().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn never_extractable_item_is_skipped_after_max_attempts() {
    for max_attempts in [1usize, 2, 3] {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path()).with_max_attempts(max_attempts);
        let scheduler = scheduler(
            FakeProgram::default()
                .with_molecule("A", 1.0, 1.25)
                .with_molecule("B", 2.0, 2.2)
                .withhold("B", Mode::Triplet, usize::MAX),
        );
        let pipeline = TrialPipeline::new(
            &scheduler,
            &TouchPreparer,
            TrialEvaluator::new(references()),
            &config,
            CancellationToken::new(),
        );

        let mut best = BestResult::new();
        let result = pipeline.run_trial(1, params(), &mut best).await.unwrap();

        // One initial submission plus max_attempts - 1 resubmissions.
        assert_eq!(
            scheduler.submission_count("B_a1_0.50_b1_-0.20_T.inp"),
            max_attempts
        );
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].molecule, "B");
        assert_eq!(
            result.skipped[0].reason,
            SkipReason::ExtractionExhausted {
                attempts: max_attempts,
                mode: Mode::Triplet,
                kind: ExtractionErrorKind::MissingArtifact,
            }
        );
        // A alone still scores.
        assert!(result.is_viable());
        assert_eq!(result.records.len(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn rejected_submission_skips_molecule_without_retry() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let scheduler = scheduler(
        FakeProgram::default()
            .with_molecule("A", 1.0, 1.25)
            .with_molecule("B", 2.0, 2.2),
    )
    .reject_input("B_a1_0.50_b1_-0.20_S.inp");
    let pipeline = TrialPipeline::new(
        &scheduler,
        &TouchPreparer,
        TrialEvaluator::new(references()),
        &config,
        CancellationToken::new(),
    );

    let mut best = BestResult::new();
    let result = pipeline.run_trial(1, params(), &mut best).await.unwrap();

    assert!(matches!(
        result.skipped[0].reason,
        SkipReason::SubmissionFailed { mode: Mode::Singlet, .. }
    ));
    assert_eq!(result.records.len(), 1);
    assert_eq!(scheduler.submissions().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn all_positive_gaps_give_infinite_loss_and_keep_best() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());

    let good = scheduler(FakeProgram::default().with_molecule("A", 1.0, 1.25));
    let pipeline = TrialPipeline::new(
        &good,
        &TouchPreparer,
        TrialEvaluator::new(references()),
        &config,
        CancellationToken::new(),
    );
    let mut best = BestResult::new();
    let first = pipeline.run_trial(1, params(), &mut best).await.unwrap();
    assert!(first.is_viable());
    let before = best.clone();

    let bad = scheduler(
        FakeProgram::default()
            .with_molecule("A", 1.3, 1.2)
            .with_molecule("B", 2.5, 2.2),
    );
    let pipeline = TrialPipeline::new(
        &bad,
        &TouchPreparer,
        TrialEvaluator::new(references()),
        &config,
        CancellationToken::new(),
    );
    let second = pipeline
        .run_trial(2, ParameterVector::new([("a1", 0.51), ("b1", -0.2)]), &mut best)
        .await
        .unwrap();

    assert!(second.loss.is_infinite());
    assert!(second.comparisons.iter().all(|c| !c.valid));
    assert_eq!(best, before);

    let summary = fs::read_to_string(&config.summary_path).unwrap();
    assert_eq!(summary.matches("Combination:").count(), 2);
    assert!(summary.contains("RMSE: none, MAE: none"));
}

#[tokio::test(start_paused = true)]
async fn runner_writes_best_block_and_exports() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path()).with_max_trials(5);
    let scheduler = scheduler(
        FakeProgram::default()
            .with_molecule("A", 1.0, 1.25)
            .with_molecule("B", 2.0, 2.2),
    );
    let pipeline = TrialPipeline::new(
        &scheduler,
        &TouchPreparer,
        TrialEvaluator::new(references()),
        &config,
        CancellationToken::new(),
    );
    // Two grid points.
    let space = SearchSpace::new().add_range("a1", 0.50, 0.52, 0.01);
    let mut runner = OptimizationRunner::new(Box::new(GridSearch::new(space)), config.max_trials);

    let status = runner.run(&pipeline).await.unwrap();
    assert_eq!(status.state, OptimizationState::Completed);
    assert_eq!(status.trials_completed, 2);
    assert!(runner.best().get().is_some());

    let summary = fs::read_to_string(&config.summary_path).unwrap();
    assert_eq!(summary.matches("Combination:").count(), 2);
    assert!(summary.contains("\nBest Parameters Found: a1=0.5\nBest RMSE: "));

    let rows = gt_data::read_extracted(&config.extracted_path).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].params.get("a1"), Some(0.51));
    assert!(config.comparison_path.as_ref().unwrap().exists());
}

#[tokio::test(start_paused = true)]
async fn cancelled_run_still_writes_best_block() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let scheduler = scheduler(FakeProgram::default().with_molecule("A", 1.0, 1.25));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let pipeline = TrialPipeline::new(
        &scheduler,
        &TouchPreparer,
        TrialEvaluator::new(references()),
        &config,
        cancel,
    );
    let mut runner =
        OptimizationRunner::new(Box::new(GridSearch::new(SearchSpace::default())), 10);

    let status = runner.run(&pipeline).await.unwrap();
    assert_eq!(status.state, OptimizationState::Cancelled);
    assert_eq!(status.trials_run(), 0);

    let summary = fs::read_to_string(&config.summary_path).unwrap();
    assert!(summary.contains("Best Parameters Found: none"));
}

#[tokio::test(start_paused = true)]
async fn outcomes_cover_every_molecule() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path()).with_molecules(["A", "B", "C"]);
    // C has no energies: its logs are never written.
    let scheduler = scheduler(
        FakeProgram::default()
            .with_molecule("A", 1.0, 1.25)
            .with_molecule("B", 2.0, 2.2),
    );
    let pipeline = TrialPipeline::new(
        &scheduler,
        &TouchPreparer,
        TrialEvaluator::new(references()),
        &config,
        CancellationToken::new(),
    );

    let mut best = BestResult::new();
    let result = pipeline.run_trial(1, params(), &mut best).await.unwrap();

    let mut molecules: Vec<&str> = result
        .records
        .iter()
        .map(|r| r.molecule.as_str())
        .chain(result.skipped.iter().map(|s| s.molecule.as_str()))
        .collect();
    molecules.sort_unstable();
    assert_eq!(molecules, vec!["A", "B", "C"]);
    assert!(ItemOutcome::Skipped(result.skipped[0].clone()).record().is_none());
}

#[tokio::test(start_paused = true)]
async fn unwritable_summary_does_not_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path()).with_max_trials(10);
    config.summary_path = dir.path().join("missing_dir").join("summary.txt");
    let scheduler = scheduler(
        FakeProgram::default()
            .with_molecule("A", 1.0, 1.25)
            .with_molecule("B", 2.0, 2.2),
    );
    let pipeline = TrialPipeline::new(
        &scheduler,
        &TouchPreparer,
        TrialEvaluator::new(references()),
        &config,
        CancellationToken::new(),
    );
    // Three grid points.
    let space = SearchSpace::new().add_range("a1", 0.50, 0.53, 0.01);
    let mut runner = OptimizationRunner::new(Box::new(GridSearch::new(space)), config.max_trials);

    let status = runner.run(&pipeline).await.unwrap();
    assert_eq!(status.state, OptimizationState::Completed);
    assert_eq!(status.trials_run(), 3);
    // One failed append per trial plus the best block.
    assert_eq!(status.write_failures, 4);
    assert!(status.best_loss.is_some());
    assert!(!config.summary_path.exists());
    assert_eq!(gt_data::read_extracted(&config.extracted_path).unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn logs_from_an_earlier_trial_are_not_rescored() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());

    let good = scheduler(
        FakeProgram::default()
            .with_molecule("A", 1.0, 1.25)
            .with_molecule("B", 2.0, 2.2),
    );
    let pipeline = TrialPipeline::new(
        &good,
        &TouchPreparer,
        TrialEvaluator::new(references()),
        &config,
        CancellationToken::new(),
    );
    let mut best = BestResult::new();
    assert!(pipeline.run_trial(1, params(), &mut best).await.unwrap().is_viable());

    // Same signature again, but every job now dies without a log.
    let dead = scheduler(FakeProgram::default());
    let pipeline = TrialPipeline::new(
        &dead,
        &TouchPreparer,
        TrialEvaluator::new(references()),
        &config,
        CancellationToken::new(),
    );
    let again = pipeline.run_trial(2, params(), &mut best).await.unwrap();

    assert!(again.records.is_empty());
    assert_eq!(again.skipped.len(), 2);
    assert!(again.loss.is_infinite());
}
