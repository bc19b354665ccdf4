//! Search space definitions and parameter sweep strategies.

use gt_types::{config_error, round_to_precision, GtResult, ParameterVector};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A single parameter dimension: a closed-open range with a grid step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    /// Parameter name as it appears in templates and signatures (e.g. "a1").
    pub name: String,
    pub low: f64,
    pub high: f64,
    /// Grid spacing; also the smallest meaningful perturbation.
    pub step: f64,
}

impl ParameterRange {
    /// Grid values `low, low + step, ...` strictly below `high`, rounded.
    pub fn grid_values(&self) -> Vec<f64> {
        if self.step <= 0.0 || self.high <= self.low {
            return vec![round_to_precision(self.low)];
        }
        // Tolerance keeps float accumulation from adding or dropping the last point.
        let count = ((self.high - self.low) / self.step - 1e-6).ceil().max(1.0) as usize;
        (0..count)
            .map(|i| round_to_precision(self.low + i as f64 * self.step))
            .collect()
    }

    fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.low, self.high)
    }
}

/// The full search space: an ordered list of parameter ranges. Order fixes
/// the order of every [`ParameterVector`] it produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterRange>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn add_range(mut self, name: impl Into<String>, low: f64, high: f64, step: f64) -> Self {
        self.parameters.push(ParameterRange {
            name: name.into(),
            low,
            high,
            step,
        });
        self
    }

    /// Range-separated hybrid exchange (a1, b1) and response (a2, b2) ranges.
    pub fn functional_defaults() -> Self {
        Self::new()
            .add_range("a1", 0.45, 0.55, 0.01)
            .add_range("b1", -0.28, -0.18, 0.01)
            .add_range("a2", 0.60, 0.75, 0.01)
            .add_range("b2", -0.12, -0.08, 0.01)
    }

    /// Adds the spin-pair coupling (co, ov, cv) and range-separation (mu)
    /// dimensions on top of [`SearchSpace::functional_defaults`].
    pub fn with_coupling_defaults(self) -> Self {
        self.add_range("co", 0.40, 0.75, 0.01)
            .add_range("ov", 0.40, 0.75, 0.01)
            .add_range("cv", 0.40, 0.75, 0.01)
            .add_range("mu", 0.25, 0.40, 0.01)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    /// Total number of grid points, `None` on overflow.
    pub fn grid_size(&self) -> Option<usize> {
        self.parameters
            .iter()
            .try_fold(1usize, |total, p| total.checked_mul(p.grid_values().len()))
    }

    pub fn validate(&self) -> GtResult<()> {
        if self.parameters.is_empty() {
            return Err(config_error!("search space has no parameters"));
        }
        for param in &self.parameters {
            if !(param.low.is_finite() && param.high.is_finite() && param.low < param.high) {
                return Err(config_error!(
                    "parameter {} needs finite low < high, got [{}, {})",
                    param.name,
                    param.low,
                    param.high
                ));
            }
            if !(param.step > 0.0) {
                return Err(config_error!("parameter {} needs a positive step", param.name));
            }
        }
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        if names.windows(2).any(|w| w[0] == w[1]) {
            return Err(config_error!("search space has duplicate parameter names"));
        }
        Ok(())
    }

    fn vector(&self, values: impl IntoIterator<Item = f64>) -> ParameterVector {
        ParameterVector::new(self.names().zip(values))
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::functional_defaults()
    }
}

// ---------------------------------------------------------------------------
// Search strategies
// ---------------------------------------------------------------------------

/// Common trait for all search strategies. Losses are minimized.
pub trait SearchStrategy: Send {
    /// Generate the next batch of parameter vectors to evaluate. Fewer than
    /// `count` (possibly none) means the strategy is exhausted.
    fn suggest(&mut self, count: usize) -> Vec<ParameterVector>;

    /// Report a finished trial so adaptive strategies can learn.
    fn report(&mut self, _params: &ParameterVector, _loss: f64) {}

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

/// Build a strategy by configured name.
pub fn build_strategy(
    name: &str,
    space: SearchSpace,
    exploration_weight: f64,
) -> GtResult<Box<dyn SearchStrategy>> {
    match name {
        "grid" => Ok(Box::new(GridSearch::new(space))),
        "random" => Ok(Box::new(RandomSearch::new(space))),
        "adaptive" => Ok(Box::new(AdaptiveSearch::new(space, exploration_weight))),
        other => Err(config_error!(
            "unknown search strategy {other:?} (expected grid, random or adaptive)"
        )),
    }
}

// ---- Grid search ----

/// Exhaustive scan of every grid point, first parameter outermost.
#[derive(Debug, Clone)]
pub struct GridSearch {
    space: SearchSpace,
    axes: Vec<Vec<f64>>,
    cursor: usize,
    total: usize,
}

impl GridSearch {
    pub fn new(space: SearchSpace) -> Self {
        let axes: Vec<Vec<f64>> = space.parameters.iter().map(|p| p.grid_values()).collect();
        let total = space.grid_size().unwrap_or(usize::MAX);
        Self {
            space,
            axes,
            cursor: 0,
            total,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Mixed-radix decode of a flat index, last axis varying fastest. Avoids
    /// materializing the product, which runs to millions of points.
    fn point(&self, mut index: usize) -> ParameterVector {
        let mut values = vec![0.0; self.axes.len()];
        for (slot, axis) in values.iter_mut().zip(&self.axes).rev() {
            *slot = axis[index % axis.len()];
            index /= axis.len();
        }
        self.space.vector(values)
    }
}

impl SearchStrategy for GridSearch {
    fn suggest(&mut self, count: usize) -> Vec<ParameterVector> {
        let end = self.cursor.saturating_add(count).min(self.total);
        let batch = (self.cursor..end).map(|i| self.point(i)).collect();
        self.cursor = end;
        batch
    }

    fn name(&self) -> &str {
        "grid"
    }
}

// ---- Random search ----

/// Independent uniform sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: SearchSpace,
}

impl RandomSearch {
    pub fn new(space: SearchSpace) -> Self {
        Self { space }
    }

    fn sample_one(&self) -> ParameterVector {
        let mut rng = rand::thread_rng();
        let values: Vec<f64> = self
            .space
            .parameters
            .iter()
            .map(|p| rng.gen_range(p.low..=p.high))
            .collect();
        self.space.vector(values)
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, count: usize) -> Vec<ParameterVector> {
        (0..count).map(|_| self.sample_one()).collect()
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Adaptive search ----

/// Explore/exploit search around the lowest finite loss seen so far.
///
/// With probability `exploration_weight` (or while nothing finite has been
/// reported) a point is drawn uniformly; otherwise the best point is
/// perturbed by up to a tenth of each range. Infinite losses are remembered
/// only as "not the best".
#[derive(Debug, Clone)]
pub struct AdaptiveSearch {
    space: SearchSpace,
    best: Option<(ParameterVector, f64)>,
    observations: usize,
    exploration_weight: f64,
}

impl AdaptiveSearch {
    pub fn new(space: SearchSpace, exploration_weight: f64) -> Self {
        Self {
            space,
            best: None,
            observations: 0,
            exploration_weight: exploration_weight.clamp(0.0, 1.0),
        }
    }

    pub fn best(&self) -> Option<&(ParameterVector, f64)> {
        self.best.as_ref()
    }

    pub fn observations(&self) -> usize {
        self.observations
    }

    fn explore(&self) -> ParameterVector {
        RandomSearch::new(self.space.clone()).sample_one()
    }

    fn exploit(&self, base: &ParameterVector) -> ParameterVector {
        let mut rng = rand::thread_rng();
        let values: Vec<f64> = self
            .space
            .parameters
            .iter()
            .map(|p| {
                let centre = base.get(&p.name).unwrap_or((p.low + p.high) / 2.0);
                let noise = rng.gen_range(-0.1..0.1) * (p.high - p.low);
                p.clamp(centre + noise)
            })
            .collect();
        self.space.vector(values)
    }
}

impl SearchStrategy for AdaptiveSearch {
    fn suggest(&mut self, count: usize) -> Vec<ParameterVector> {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| match &self.best {
                Some((base, _)) if rng.gen::<f64>() >= self.exploration_weight => {
                    self.exploit(base)
                }
                _ => self.explore(),
            })
            .collect()
    }

    fn report(&mut self, params: &ParameterVector, loss: f64) {
        self.observations += 1;
        let improves = loss.is_finite() && self.best.as_ref().map_or(true, |(_, b)| loss < *b);
        if improves {
            self.best = Some((params.clone(), loss));
        }
    }

    fn name(&self) -> &str {
        "adaptive"
    }
}
