use crate::economics::{CostBreakdown, CostModel};
use crate::error::SizingError;
use crate::series::EnergyTimeSeries;
use crate::sim::{BatteryConfig, BatteryTemplate, SimulationResult, simulate};

use super::OptimizationBounds;
use super::constraints::{BatteryOption, FeasibilityConstraints, PenaltyConfig};

/// Score and diagnostics for one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Lower is better. Infeasible candidates always score above every
    /// feasible one.
    pub score: f64,
    pub feasible: bool,
    pub violation: f64,
    pub self_sufficiency_pct: f64,
    pub lifecycle_cost: f64,
}

/// Evaluates a candidate `(pv_kwp, battery_kwh)` to a scalar score.
pub trait Objective: Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, pv_kwp: f64, battery_kwh: f64) -> Result<Evaluation, SizingError>;
}

/// Simulated candidate with its cost and the battery actually used.
#[derive(Debug, Clone)]
pub struct CandidateRun {
    pub simulation: SimulationResult,
    pub costs: CostBreakdown,
    pub battery: BatteryConfig,
    pub option: Option<BatteryOption>,
}

/// Everything an objective needs besides the candidate itself.
///
/// Catalog, tariff, and roof data are passed in here explicitly, so every
/// evaluation is a pure function of its inputs.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub series: EnergyTimeSeries,
    pub battery: BatteryTemplate,
    pub costs: CostModel,
    pub constraints: FeasibilityConstraints,
    pub penalty: PenaltyConfig,
    pub bounds: OptimizationBounds,
}

impl EvaluationContext {
    /// Validates every part and bundles them.
    pub fn new(
        series: EnergyTimeSeries,
        battery: BatteryTemplate,
        costs: CostModel,
        constraints: FeasibilityConstraints,
        penalty: PenaltyConfig,
        bounds: OptimizationBounds,
    ) -> Result<Self, SizingError> {
        if series.is_empty() {
            return Err(SizingError::EmptySeries);
        }
        battery.validate()?;
        costs.validate()?;
        constraints.validate()?;
        penalty.validate()?;
        bounds.validate()?;
        Ok(Self {
            series,
            battery,
            costs,
            constraints,
            penalty,
            bounds,
        })
    }

    /// Battery simulated for a candidate capacity: the catalog rating when
    /// the capacity is a catalog entry, the template C-rate otherwise.
    pub fn battery_for(&self, battery_kwh: f64) -> (BatteryConfig, Option<&BatteryOption>) {
        match self.constraints.catalog_match(battery_kwh) {
            Some(option) => {
                let rte = option
                    .round_trip_efficiency
                    .unwrap_or(self.battery.round_trip_efficiency);
                (
                    self.battery.with_rating(option.capacity_kwh, option.power_kw, rte),
                    Some(option),
                )
            }
            None => (self.battery.sized(battery_kwh), None),
        }
    }

    /// Simulates and costs one candidate.
    pub fn run(&self, pv_kwp: f64, battery_kwh: f64) -> Result<CandidateRun, SizingError> {
        let (battery, option) = self.battery_for(battery_kwh);
        let series = self.series.scaled_to(pv_kwp);
        let simulation = simulate(&series, &battery)?;
        let costs = self.costs.breakdown(pv_kwp, battery_kwh, &simulation);
        Ok(CandidateRun {
            simulation,
            costs,
            battery,
            option: option.cloned(),
        })
    }

    /// Upper bound on the lifecycle cost of any candidate inside the bounds.
    ///
    /// Assumes the largest installation, every kWh of load imported, and (for
    /// a negative feed-in price) every kWh of the largest array exported.
    pub fn lifecycle_cost_ceiling(&self) -> f64 {
        let b = &self.bounds;
        let capex = self.costs.capex(b.pv_kwp_max, b.battery_kwh_max);
        let annualize = 8760.0 / self.series.duration_hours();
        let tariffs = self.costs.tariffs;

        let import = self.series.total_load_kwh() * annualize * tariffs.import_tariff.max(0.0);
        let export = self.series.scaled_to(b.pv_kwp_max).total_generation_kwh()
            * annualize
            * (-tariffs.feedin_tariff).max(0.0);
        let annual = self.costs.costs.maintenance_pct / 100.0 * capex + import + export;

        capex + annual * self.costs.annuity_factor()
    }

    /// Runs a candidate and scores it with `raw` if feasible, or with the
    /// penalty above `ceiling` if not.
    fn assess(
        &self,
        pv_kwp: f64,
        battery_kwh: f64,
        ceiling: f64,
        raw: impl Fn(f64, f64) -> f64,
    ) -> Result<Evaluation, SizingError> {
        let run = self.run(pv_kwp, battery_kwh)?;
        let self_sufficiency_pct = run.simulation.self_sufficiency_pct;
        let lifecycle_cost = run.costs.lifecycle_cost;
        let violation = self
            .constraints
            .violation(pv_kwp, battery_kwh, self_sufficiency_pct);
        let feasible = violation <= 0.0;
        let score = if feasible {
            raw(self_sufficiency_pct, lifecycle_cost)
        } else {
            self.penalty.infeasible_score(ceiling, violation)
        };

        Ok(Evaluation {
            score,
            feasible,
            violation,
            self_sufficiency_pct,
            lifecycle_cost,
        })
    }
}

fn target_ceiling(target_pct: f64) -> f64 {
    target_pct.max(100.0 - target_pct).powi(2)
}

/// Squared distance of achieved self-sufficiency from a target.
#[derive(Debug, Clone, Copy)]
pub struct TargetSelfSufficiency<'a> {
    context: &'a EvaluationContext,
    target_pct: f64,
}

impl<'a> TargetSelfSufficiency<'a> {
    pub fn new(context: &'a EvaluationContext, target_pct: f64) -> Self {
        Self {
            context,
            target_pct,
        }
    }
}

impl Objective for TargetSelfSufficiency<'_> {
    fn name(&self) -> &'static str {
        "target_self_sufficiency"
    }

    fn evaluate(&self, pv_kwp: f64, battery_kwh: f64) -> Result<Evaluation, SizingError> {
        let target = self.target_pct;
        self.context
            .assess(pv_kwp, battery_kwh, target_ceiling(target), |ss, _| {
                (ss - target).powi(2)
            })
    }
}

/// Discounted lifecycle cost.
#[derive(Debug, Clone, Copy)]
pub struct MinimizeLifecycleCost<'a> {
    context: &'a EvaluationContext,
    ceiling: f64,
}

impl<'a> MinimizeLifecycleCost<'a> {
    pub fn new(context: &'a EvaluationContext) -> Self {
        Self {
            context,
            ceiling: context.lifecycle_cost_ceiling(),
        }
    }
}

impl Objective for MinimizeLifecycleCost<'_> {
    fn name(&self) -> &'static str {
        "minimize_lifecycle_cost"
    }

    fn evaluate(&self, pv_kwp: f64, battery_kwh: f64) -> Result<Evaluation, SizingError> {
        self.context
            .assess(pv_kwp, battery_kwh, self.ceiling, |_, cost| cost)
    }
}

/// Weighted sum of the normalised target distance and normalised cost.
#[derive(Debug, Clone, Copy)]
pub struct WeightedMultiObjective<'a> {
    context: &'a EvaluationContext,
    target_pct: f64,
    ss_weight: f64,
    cost_weight: f64,
    cost_scale: f64,
}

impl<'a> WeightedMultiObjective<'a> {
    pub fn new(
        context: &'a EvaluationContext,
        target_pct: f64,
        ss_weight: f64,
        cost_weight: f64,
    ) -> Self {
        let ceiling = context.lifecycle_cost_ceiling();
        Self {
            context,
            target_pct,
            ss_weight,
            cost_weight,
            cost_scale: if ceiling > 0.0 { ceiling } else { 1.0 },
        }
    }
}

impl Objective for WeightedMultiObjective<'_> {
    fn name(&self) -> &'static str {
        "weighted_multi_objective"
    }

    fn evaluate(&self, pv_kwp: f64, battery_kwh: f64) -> Result<Evaluation, SizingError> {
        let ss_scale = target_ceiling(self.target_pct);
        let ceiling = self.ss_weight + self.cost_weight;
        self.context
            .assess(pv_kwp, battery_kwh, ceiling, |ss, cost| {
                self.ss_weight * (ss - self.target_pct).powi(2) / ss_scale
                    + self.cost_weight * cost / self.cost_scale
            })
    }
}

/// Objective selection as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjectiveKind {
    TargetSelfSufficiency {
        target_pct: f64,
    },
    MinimizeLifecycleCost,
    WeightedMultiObjective {
        target_pct: f64,
        ss_weight: f64,
        cost_weight: f64,
    },
}

impl ObjectiveKind {
    pub fn validate(&self) -> Result<(), SizingError> {
        let check_target = |t: f64| {
            if (0.0..=100.0).contains(&t) {
                Ok(())
            } else {
                Err(SizingError::invalid("objective.target_pct", "must be in [0, 100]"))
            }
        };
        match *self {
            ObjectiveKind::TargetSelfSufficiency { target_pct } => check_target(target_pct),
            ObjectiveKind::MinimizeLifecycleCost => Ok(()),
            ObjectiveKind::WeightedMultiObjective {
                target_pct,
                ss_weight,
                cost_weight,
            } => {
                check_target(target_pct)?;
                if !(ss_weight >= 0.0 && cost_weight >= 0.0) {
                    return Err(SizingError::invalid("objective.weights", "must be >= 0"));
                }
                if ss_weight + cost_weight <= 0.0 {
                    return Err(SizingError::invalid("objective.weights", "must not both be 0"));
                }
                Ok(())
            }
        }
    }

    /// Self-sufficiency the objective aims for, if it has one.
    pub fn target_pct(&self) -> Option<f64> {
        match *self {
            ObjectiveKind::TargetSelfSufficiency { target_pct }
            | ObjectiveKind::WeightedMultiObjective { target_pct, .. } => Some(target_pct),
            ObjectiveKind::MinimizeLifecycleCost => None,
        }
    }

    pub fn build<'a>(&self, context: &'a EvaluationContext) -> Box<dyn Objective + 'a> {
        match *self {
            ObjectiveKind::TargetSelfSufficiency { target_pct } => {
                Box::new(TargetSelfSufficiency::new(context, target_pct))
            }
            ObjectiveKind::MinimizeLifecycleCost => Box::new(MinimizeLifecycleCost::new(context)),
            ObjectiveKind::WeightedMultiObjective {
                target_pct,
                ss_weight,
                cost_weight,
            } => Box::new(WeightedMultiObjective::new(
                context,
                target_pct,
                ss_weight,
                cost_weight,
            )),
        }
    }
}
