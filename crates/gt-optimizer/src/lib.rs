//! # gt-optimizer
//!
//! Parameter search and trial orchestration for gaptune.
//!
//! Provides search strategies (grid, random, adaptive), the per-trial
//! pipeline that prepares inputs, submits jobs under a concurrency cap,
//! harvests artifacts with bounded resubmission and scores them against
//! reference energies, and the run loop that ties them together.

mod config;
mod evaluator;
mod input;
mod pipeline;
mod retry;
mod runner;
mod search;
mod trial;

pub use config::{TuningConfig, CONFIG_ENV};
pub use evaluator::{rmse_mae, TrialEvaluator};
pub use input::{InputPreparer, TemplatePreparer};
pub use pipeline::TrialPipeline;
pub use retry::RetryCoordinator;
pub use runner::OptimizationRunner;
pub use search::{
    build_strategy, AdaptiveSearch, GridSearch, ParameterRange, RandomSearch, SearchSpace,
    SearchStrategy,
};
pub use trial::{OptimizationId, OptimizationState, OptimizationStatus};
