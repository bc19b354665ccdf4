//! Property tests for bounded-concurrency submission.
//!
//! - The number of simultaneously listed jobs never exceeds the cap
//! - Every work item is submitted exactly once
//! - Every submitted job settles as Completed

use gt_scheduler::{BatchSubmitter, CompletionPoller, PollConfig, SimulatedScheduler};
use gt_types::{expand_work_items, JobState, Mode, ParameterVector};
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

fn molecule_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("Molecule{i}")).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: peak concurrency <= max_concurrent
    #[test]
    fn prop_peak_concurrency_bounded(
        molecules in 1usize..8,
        cap in 1usize..6,
        polls in 0usize..4,
    ) {
        let runtime = paused_runtime();
        let scheduler = SimulatedScheduler::new(polls);
        let params = ParameterVector::new([("a1", 0.5), ("b1", -0.2)]);
        let items = expand_work_items(&molecule_names(molecules), &Mode::ALL, &params);
        let total = items.len();

        let outcome = runtime.block_on(async {
            let poller = CompletionPoller::new(&scheduler, PollConfig::default(), CancellationToken::new());
            BatchSubmitter::new(&scheduler, poller, cap, "/runs")
                .submit_all(items)
                .await
                .unwrap()
        });

        prop_assert!(scheduler.peak_active() <= cap);
        prop_assert_eq!(scheduler.submissions().len(), total);
        prop_assert_eq!(outcome.jobs.len(), total);
        prop_assert!(outcome.jobs.iter().all(|job| job.state == JobState::Completed));
    }

    /// Property: rejected items are reported and never waited on
    #[test]
    fn prop_rejections_are_partitioned(
        molecules in 1usize..6,
        rejected in 0usize..6,
        cap in 1usize..4,
    ) {
        let runtime = paused_runtime();
        let params = ParameterVector::new([("a1", 0.5)]);
        let names = molecule_names(molecules);
        let items = expand_work_items(&names, &Mode::ALL, &params);

        let mut scheduler = SimulatedScheduler::new(1);
        let rejected = rejected.min(molecules);
        for item in items.iter().filter(|i| i.mode == Mode::Triplet).take(rejected) {
            scheduler = scheduler.reject_input(item.input_file_name());
        }

        let outcome = runtime.block_on(async {
            let poller = CompletionPoller::new(&scheduler, PollConfig::default(), CancellationToken::new());
            BatchSubmitter::new(&scheduler, poller, cap, "/runs")
                .submit_all(items)
                .await
                .unwrap()
        });

        prop_assert_eq!(outcome.failed.len(), rejected);
        prop_assert_eq!(outcome.jobs.len(), molecules * 2 - rejected);
        prop_assert_eq!(scheduler.active_count(), 0);
    }
}
