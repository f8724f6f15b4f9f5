//! Capacity search over the (PV kWp, battery kWh) plane.
//!
//! Strategies implement [`Optimizer`] and share the search lattice
//! ([`OptimizationBounds`]), the budget ([`SearchConfig`]), and the selection
//! rule ([`select_best`]), so swapping strategy never changes how a winner
//! is chosen.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SizingError;

/// Feasibility constraints and penalty settings.
pub mod constraints;
pub mod grid;
/// Scoring of candidates.
pub mod objective;
pub mod pattern;

pub use constraints::{BatteryOption, FeasibilityConstraints, PenaltyConfig};
pub use grid::GridSweepOptimizer;
pub use objective::{
    EvaluationContext, Evaluation, MinimizeLifecycleCost, Objective, ObjectiveKind,
    TargetSelfSufficiency, WeightedMultiObjective,
};
pub use pattern::PatternSearchOptimizer;

/// Discretisation of one search axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// `min, min + step, ...`, with `max` appended if not hit exactly.
    Step(f64),
    /// `count` evenly spaced values from `min` to `max` inclusive.
    Samples(usize),
}

/// Search region and lattice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizationBounds {
    pub pv_kwp_min: f64,
    pub pv_kwp_max: f64,
    pub battery_kwh_min: f64,
    pub battery_kwh_max: f64,
    pub pv_resolution: Resolution,
    pub battery_resolution: Resolution,
}

impl Default for OptimizationBounds {
    fn default() -> Self {
        Self {
            pv_kwp_min: 2.0,
            pv_kwp_max: 15.0,
            battery_kwh_min: 0.0,
            battery_kwh_max: 20.0,
            pv_resolution: Resolution::Step(1.0),
            battery_resolution: Resolution::Step(2.5),
        }
    }
}

impl OptimizationBounds {
    pub fn validate(&self) -> Result<(), SizingError> {
        check_range("bounds.pv_kwp", self.pv_kwp_min, self.pv_kwp_max)?;
        check_range("bounds.battery_kwh", self.battery_kwh_min, self.battery_kwh_max)?;
        check_resolution("bounds.pv_resolution", self.pv_resolution)?;
        check_resolution("bounds.battery_resolution", self.battery_resolution)
    }

    pub fn pv_axis(&self) -> Vec<f64> {
        axis(self.pv_kwp_min, self.pv_kwp_max, self.pv_resolution)
    }

    pub fn battery_axis(&self) -> Vec<f64> {
        axis(self.battery_kwh_min, self.battery_kwh_max, self.battery_resolution)
    }

    /// Every lattice point, PV-major.
    pub fn lattice(&self) -> Vec<(f64, f64)> {
        let batteries = self.battery_axis();
        self.pv_axis()
            .into_iter()
            .flat_map(|pv| batteries.iter().map(move |&bat| (pv, bat)))
            .collect()
    }

    /// Same PV axis with the battery pinned to `battery_kwh`.
    pub fn with_battery_fixed(&self, battery_kwh: f64) -> Self {
        Self {
            battery_kwh_min: battery_kwh,
            battery_kwh_max: battery_kwh,
            ..*self
        }
    }
}

fn check_range(field: &str, min: f64, max: f64) -> Result<(), SizingError> {
    if !(min.is_finite() && max.is_finite()) || min < 0.0 {
        return Err(SizingError::invalid(field, "bounds must be finite and >= 0"));
    }
    if max < min {
        return Err(SizingError::invalid(field, format!("max {max} is below min {min}")));
    }
    Ok(())
}

fn check_resolution(field: &str, resolution: Resolution) -> Result<(), SizingError> {
    match resolution {
        Resolution::Step(step) if !(step.is_finite() && step > 0.0) => {
            Err(SizingError::invalid(field, "step must be > 0"))
        }
        Resolution::Samples(0) => Err(SizingError::invalid(field, "samples must be >= 1")),
        _ => Ok(()),
    }
}

fn axis(min: f64, max: f64, resolution: Resolution) -> Vec<f64> {
    if max <= min {
        return vec![min];
    }
    match resolution {
        Resolution::Step(step) => {
            let tolerance = step * 1e-9;
            let mut values = Vec::new();
            let mut k = 0u32;
            loop {
                let value = min + step * f64::from(k);
                if value >= max - tolerance {
                    break;
                }
                values.push(value);
                k += 1;
            }
            values.push(max);
            values
        }
        Resolution::Samples(1) => vec![min],
        Resolution::Samples(count) => {
            let span = (max - min) / (count - 1) as f64;
            (0..count)
                .map(|i| if i + 1 == count { max } else { min + span * i as f64 })
                .collect()
        }
    }
}

/// One evaluated candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CandidatePoint {
    pub pv_kwp: f64,
    pub battery_kwh: f64,
    /// Lower is better.
    pub score: f64,
    pub feasible: bool,
    /// Distance outside the feasible set; 0 when feasible.
    pub violation: f64,
    pub self_sufficiency_pct: f64,
    pub lifecycle_cost: f64,
}

impl CandidatePoint {
    pub fn new(pv_kwp: f64, battery_kwh: f64, evaluation: &Evaluation) -> Self {
        Self {
            pv_kwp,
            battery_kwh,
            score: evaluation.score,
            feasible: evaluation.feasible,
            violation: evaluation.violation,
            self_sufficiency_pct: evaluation.self_sufficiency_pct,
            lifecycle_cost: evaluation.lifecycle_cost,
        }
    }
}

/// Why a search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every lattice point was evaluated.
    Exhausted,
    /// `max_evaluations` was reached first.
    EvaluationCap,
    /// `time_budget` ran out first.
    TimeBudget,
    /// A local search found no improving move at its finest stride.
    NoImprovement,
}

impl StopReason {
    /// Whether the strategy finished on its own terms.
    pub fn converged(self) -> bool {
        matches!(self, StopReason::Exhausted | StopReason::NoImprovement)
    }
}

/// Outcome of one search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationResult {
    pub best: CandidatePoint,
    /// Every evaluation, in evaluation order.
    pub trace: Vec<CandidatePoint>,
    pub converged: bool,
    pub stop_reason: StopReason,
    pub evaluations: usize,
    pub strategy: &'static str,
}

/// Budget and tie handling shared by all strategies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchConfig {
    /// Scores within this distance of the best are ties.
    pub tie_epsilon: f64,
    pub max_evaluations: Option<usize>,
    pub time_budget: Option<Duration>,
    /// Worker threads for strategies that evaluate in parallel.
    pub workers: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tie_epsilon: 1e-9,
            max_evaluations: None,
            time_budget: None,
            workers: std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), SizingError> {
        if !(self.tie_epsilon.is_finite() && self.tie_epsilon >= 0.0) {
            return Err(SizingError::invalid("optimizer.tie_epsilon", "must be >= 0"));
        }
        if self.max_evaluations == Some(0) {
            return Err(SizingError::invalid("optimizer.max_evaluations", "must be >= 1"));
        }
        if self.workers == 0 {
            return Err(SizingError::invalid("optimizer.workers", "must be >= 1"));
        }
        Ok(())
    }
}

/// Tracks the evaluation and time budget of one search.
#[derive(Debug)]
pub(crate) struct Budget {
    started: Instant,
    max_evaluations: Option<usize>,
    time_budget: Option<Duration>,
}

impl Budget {
    pub(crate) fn start(config: &SearchConfig) -> Self {
        Self {
            started: Instant::now(),
            max_evaluations: config.max_evaluations,
            time_budget: config.time_budget,
        }
    }

    /// Checked before each evaluation. The first evaluation always runs.
    pub(crate) fn exhausted(&self, evaluated: usize) -> Option<StopReason> {
        if evaluated == 0 {
            return None;
        }
        if self.max_evaluations.is_some_and(|cap| evaluated >= cap) {
            return Some(StopReason::EvaluationCap);
        }
        if self.time_budget.is_some_and(|limit| self.started.elapsed() >= limit) {
            return Some(StopReason::TimeBudget);
        }
        None
    }
}

/// A capacity-search strategy.
///
/// Implementations evaluate candidates through `objective` only, so any
/// strategy (including ones backed by an external solver) can be swapped in
/// without touching the simulator or the scoring.
pub trait Optimizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Searches `bounds` and returns the best candidate under
    /// [`select_best`].
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for bad bounds or search settings, `Infeasible` when
    /// no evaluated candidate satisfies the constraints, or any error the
    /// objective raises.
    fn optimize(
        &self,
        objective: &dyn Objective,
        bounds: &OptimizationBounds,
        config: &SearchConfig,
    ) -> Result<OptimizationResult, SizingError>;
}

/// Built-in strategies, selectable from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Grid,
    Pattern,
}

impl Strategy {
    pub fn build(self) -> Box<dyn Optimizer> {
        match self {
            Strategy::Grid => Box::new(GridSweepOptimizer),
            Strategy::Pattern => Box::new(PatternSearchOptimizer::default()),
        }
    }
}

/// Picks the winner among `candidates`.
///
/// Feasible candidates beat infeasible ones. Within the preferred pool, every
/// candidate scoring within `tie_epsilon` of the minimum ties, and ties go to
/// the smaller battery, then the smaller PV array. The result does not depend
/// on the order of `candidates`.
pub fn select_best(candidates: &[CandidatePoint], tie_epsilon: f64) -> Option<CandidatePoint> {
    let any_feasible = candidates.iter().any(|c| c.feasible);
    let pool = || candidates.iter().filter(move |c| c.feasible || !any_feasible);

    let best_score = pool().map(|c| c.score).fold(f64::INFINITY, f64::min);
    pool()
        .filter(|c| c.score <= best_score + tie_epsilon)
        .min_by(|a, b| {
            a.battery_kwh
                .total_cmp(&b.battery_kwh)
                .then(a.pv_kwp.total_cmp(&b.pv_kwp))
        })
        .copied()
}

/// Applies the selection rule to a finished trace.
pub(crate) fn conclude(
    strategy: &'static str,
    trace: Vec<CandidatePoint>,
    stop_reason: StopReason,
    tie_epsilon: f64,
) -> Result<OptimizationResult, SizingError> {
    let evaluations = trace.len();
    let best = select_best(&trace, tie_epsilon)
        .ok_or_else(|| SizingError::invalid("bounds", "search lattice is empty"))?;

    // A search cut short by its budget has not shown that nothing is
    // feasible; it reports its least-bad point as a partial result.
    if !best.feasible && stop_reason.converged() {
        info!(strategy, evaluations, "no feasible candidate found");
        return Err(SizingError::Infeasible {
            best: Box::new(best),
            evaluated: evaluations,
        });
    }

    info!(
        strategy,
        evaluations,
        ?stop_reason,
        pv_kwp = best.pv_kwp,
        battery_kwh = best.battery_kwh,
        score = best.score,
        "search finished"
    );

    Ok(OptimizationResult {
        best,
        trace,
        converged: stop_reason.converged(),
        stop_reason,
        evaluations,
        strategy,
    })
}
