//! End-to-end sizing: baseline, optimization, validation.
//!
//! [`Orchestrator::run`] walks `Init → Baseline → Optimize → Validate →
//! Done`. Optimize is skipped when the PV-only baseline already meets the
//! self-sufficiency target. Any error moves the run to `Failed`.
//!
//! Series, battery, cost and bounds inputs are validated when the
//! [`EvaluationContext`] is built, so those errors surface before `Init`.

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::economics::CostBreakdown;
use crate::error::SizingError;
use crate::optimize::objective::CandidateRun;
use crate::optimize::{
    BatteryOption, CandidatePoint, EvaluationContext, ObjectiveKind, OptimizationResult,
    Optimizer, SearchConfig,
};
use crate::series::EnergyTimeSeries;
use crate::sim::{BatteryConfig, SimulationResult};

/// Stage of a sizing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingStage {
    Init,
    Baseline,
    Optimize,
    Validate,
    Done,
    Failed,
}

/// Whose self-sufficiency figure is reported when a cross-check ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    #[default]
    Internal,
    External,
}

/// Independent simulator used to double-check the chosen candidate.
pub trait CrossCheck: Sync {
    fn name(&self) -> &str;

    /// Self-sufficiency (%) of `battery` on `series`, which is already scaled
    /// to the chosen PV capacity.
    fn self_sufficiency_pct(
        &self,
        series: &EnergyTimeSeries,
        battery: &BatteryConfig,
    ) -> Result<f64, Box<dyn Error + Send + Sync>>;
}

/// How cross-check results are treated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ValidationSettings {
    /// Discrepancy in percentage points above which a warning is recorded.
    pub tolerance_pct: f64,
    pub authority: Authority,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            tolerance_pct: 2.0,
            authority: Authority::Internal,
        }
    }
}

/// Chosen sizing with everything needed to explain it.
#[derive(Debug, Clone, Serialize)]
pub struct SizingResult {
    pub pv_kwp: f64,
    pub battery_kwh: f64,
    pub simulation: SimulationResult,
    pub costs: CostBreakdown,
    /// Battery as simulated, including the derived power rating.
    pub battery: BatteryConfig,
    /// Catalog entry matching `battery_kwh`, if any.
    pub battery_option: Option<BatteryOption>,
    /// The roof, rather than the search bounds, caps the PV size.
    pub constrained_by_roof: bool,
    pub roof_limit_kwp: Option<f64>,
    /// PV-only search with the battery fixed at 0 kWh.
    pub baseline: Option<OptimizationResult>,
    /// Full search; absent when the baseline already met the target.
    pub optimization: Option<OptimizationResult>,
    pub warnings: Vec<String>,
    pub stages: Vec<SizingStage>,
    pub reported_self_sufficiency_pct: f64,
    pub self_sufficiency_source: Authority,
}

impl SizingResult {
    /// All evaluations, baseline first.
    pub fn evaluations(&self) -> impl Iterator<Item = &CandidatePoint> {
        self.baseline
            .iter()
            .chain(self.optimization.iter())
            .flat_map(|r| r.trace.iter())
    }

    /// One-paragraph plain-language recommendation.
    pub fn recommendation(&self) -> String {
        let mut text = format!("Install {:.1} kWp of PV", self.pv_kwp);
        match (&self.battery_option, self.battery_kwh > 0.0) {
            (Some(option), _) => text.push_str(&format!(
                " with a {} battery ({:.1} kWh, {:.1} kW)",
                option.name, option.capacity_kwh, option.power_kw
            )),
            (None, true) => text.push_str(&format!(
                " with {:.1} kWh of storage ({:.1} kW)",
                self.battery_kwh, self.battery.power_kw
            )),
            (None, false) => text.push_str(" without a battery"),
        }
        text.push_str(&format!(
            ". Expected self-sufficiency {:.1}%, lifecycle cost {:.0}.",
            self.reported_self_sufficiency_pct, self.costs.lifecycle_cost
        ));
        if self.constrained_by_roof {
            if let Some(roof) = self.roof_limit_kwp {
                text.push_str(&format!(" PV size is limited by the roof ({roof:.1} kWp)."));
            }
        }
        text
    }
}

impl fmt::Display for SizingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Sizing Result ---")?;
        writeln!(f, "PV capacity:           {:.2} kWp", self.pv_kwp)?;
        writeln!(f, "Battery capacity:      {:.2} kWh", self.battery_kwh)?;
        writeln!(f, "Capex:                 {:.0}", self.costs.capex)?;
        writeln!(f, "Annual opex:           {:.0}", self.costs.annual_opex)?;
        writeln!(f, "Lifecycle cost:        {:.0}", self.costs.lifecycle_cost)?;
        writeln!(f, "Evaluations:           {}", self.evaluations().count())?;
        writeln!(f, "{}", self.simulation)?;
        for warning in &self.warnings {
            writeln!(f, "warning: {warning}")?;
        }
        write!(f, "{}", self.recommendation())
    }
}

/// Runs the sizing pipeline for one scenario.
pub struct Orchestrator {
    context: EvaluationContext,
    objective: ObjectiveKind,
    optimizer: Box<dyn Optimizer>,
    search: SearchConfig,
    validation: ValidationSettings,
    cross_check: Option<Box<dyn CrossCheck>>,
}

impl Orchestrator {
    pub fn new(
        context: EvaluationContext,
        objective: ObjectiveKind,
        optimizer: Box<dyn Optimizer>,
        search: SearchConfig,
    ) -> Self {
        Self {
            context,
            objective,
            optimizer,
            search,
            validation: ValidationSettings::default(),
            cross_check: None,
        }
    }

    pub fn with_validation(mut self, validation: ValidationSettings) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_cross_check(mut self, cross_check: Box<dyn CrossCheck>) -> Self {
        self.cross_check = Some(cross_check);
        self
    }

    pub fn context(&self) -> &EvaluationContext {
        &self.context
    }

    /// Self-sufficiency the baseline must reach to skip Optimize.
    pub fn target_pct(&self) -> Option<f64> {
        self.objective
            .target_pct()
            .or(self.context.constraints.min_self_sufficiency_pct)
    }

    /// Runs the pipeline.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for bad objective or search settings, `Infeasible`
    /// when a search that ran to completion finds no feasible candidate, or
    /// any simulation error. A search stopped by its budget before finding a
    /// feasible point is returned with a warning instead.
    pub fn run(&self) -> Result<SizingResult, SizingError> {
        self.run_traced().1
    }

    /// Like [`Orchestrator::run`], also returning the visited stages when
    /// the run fails.
    pub fn run_traced(&self) -> (Vec<SizingStage>, Result<SizingResult, SizingError>) {
        let mut stages = vec![SizingStage::Init];
        let outcome = self.execute(&mut stages);
        match outcome {
            Ok(mut result) => {
                stages.push(SizingStage::Done);
                info!(stage = ?SizingStage::Done, "sizing complete");
                result.stages = stages.clone();
                (stages, Ok(result))
            }
            Err(err) => {
                stages.push(SizingStage::Failed);
                warn!(stage = ?SizingStage::Failed, error = %err, "sizing failed");
                (stages, Err(err))
            }
        }
    }

    fn enter(stages: &mut Vec<SizingStage>, stage: SizingStage) {
        info!(?stage, "entering stage");
        stages.push(stage);
    }

    fn execute(&self, stages: &mut Vec<SizingStage>) -> Result<SizingResult, SizingError> {
        self.objective.validate()?;
        self.search.validate()?;
        if !(self.validation.tolerance_pct.is_finite() && self.validation.tolerance_pct >= 0.0) {
            return Err(SizingError::invalid("validation.tolerance_pct", "must be >= 0"));
        }

        let objective = self.objective.build(&self.context);
        let bounds = self.context.bounds;

        Self::enter(stages, SizingStage::Baseline);
        let baseline_bounds = bounds.with_battery_fixed(0.0);
        let baseline = match self
            .optimizer
            .optimize(objective.as_ref(), &baseline_bounds, &self.search)
        {
            Ok(result) => Some(result),
            Err(SizingError::Infeasible { best, .. }) => {
                info!(
                    pv_kwp = best.pv_kwp,
                    violation = best.violation,
                    "PV-only baseline has no feasible candidate"
                );
                None
            }
            Err(err) => return Err(err),
        };

        let target = self.target_pct();
        let baseline_meets_target = match (&baseline, target) {
            (Some(b), Some(t)) => b.best.feasible && b.best.self_sufficiency_pct >= t,
            _ => false,
        };

        let (chosen, optimization) = if baseline_meets_target {
            let best = baseline.as_ref().map(|b| b.best);
            info!(target_pct = ?target, "baseline meets target, skipping optimization");
            (best, None)
        } else {
            Self::enter(stages, SizingStage::Optimize);
            let result = self
                .optimizer
                .optimize(objective.as_ref(), &bounds, &self.search)?;
            (Some(result.best), Some(result))
        };
        let chosen = chosen.ok_or_else(|| SizingError::invalid("sizing", "no candidate chosen"))?;

        let mut warnings = Vec::new();
        if let Some(partial) = optimization.as_ref().filter(|o| !o.best.feasible) {
            let message = format!(
                "search stopped ({:?}) before reaching a feasible candidate; \
                 recommending the closest one (violation {:.3})",
                partial.stop_reason, chosen.violation
            );
            warn!(violation = chosen.violation, "{message}");
            warnings.push(message);
        }

        Self::enter(stages, SizingStage::Validate);
        let CandidateRun {
            simulation,
            costs,
            battery,
            option,
        } = self.context.run(chosen.pv_kwp, chosen.battery_kwh)?;

        let mut reported = simulation.self_sufficiency_pct;
        let mut source = Authority::Internal;
        if let Some(check) = &self.cross_check {
            let series = self.context.series.scaled_to(chosen.pv_kwp);
            match check.self_sufficiency_pct(&series, &battery) {
                Ok(external) => {
                    let gap = (external - simulation.self_sufficiency_pct).abs();
                    if gap > self.validation.tolerance_pct {
                        let message = format!(
                            "{} reports {external:.1}% self-sufficiency, internal model {:.1}% \
                             ({gap:.1} pp apart, tolerance {:.1} pp)",
                            check.name(),
                            simulation.self_sufficiency_pct,
                            self.validation.tolerance_pct
                        );
                        warn!(checker = check.name(), gap, "{message}");
                        warnings.push(message);
                    }
                    if self.validation.authority == Authority::External {
                        reported = external;
                        source = Authority::External;
                    }
                }
                Err(err) => {
                    let message = format!("{} cross-check failed: {err}", check.name());
                    warn!(checker = check.name(), "{message}");
                    warnings.push(message);
                }
            }
        }

        let constraints = &self.context.constraints;
        Ok(SizingResult {
            pv_kwp: chosen.pv_kwp,
            battery_kwh: chosen.battery_kwh,
            simulation,
            costs,
            battery,
            battery_option: option,
            constrained_by_roof: constraints.roof_limits(bounds.pv_kwp_max),
            roof_limit_kwp: constraints.roof_max_kwp,
            baseline,
            optimization,
            warnings,
            stages: Vec::new(),
            reported_self_sufficiency_pct: reported,
            self_sufficiency_source: source,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone, Utc};

    use super::*;
    use crate::economics::CostModel;
    use crate::optimize::{
        FeasibilityConstraints, GridSweepOptimizer, OptimizationBounds, PenaltyConfig, Resolution,
        StopReason,
    };
    use crate::sim::BatteryTemplate;

    /// Three days with sun from 08:00 to 16:00 and an evening-heavy load.
    fn context(constraints: FeasibilityConstraints) -> EvaluationContext {
        let mut generation = Vec::new();
        let mut load = Vec::new();
        for _ in 0..3 {
            for hour in 0..24 {
                generation.push(if (8..16).contains(&hour) { 1.0 } else { 0.0 });
                load.push(if (18..23).contains(&hour) { 1.2 } else { 0.3 });
            }
        }
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let series =
            EnergyTimeSeries::uniform(start, TimeDelta::hours(1), &generation, &load, 1.0)
                .unwrap();
        EvaluationContext::new(
            series,
            BatteryTemplate::default(),
            CostModel::default(),
            constraints,
            PenaltyConfig::default(),
            OptimizationBounds {
                pv_kwp_min: 1.0,
                pv_kwp_max: 6.0,
                battery_kwh_min: 0.0,
                battery_kwh_max: 12.0,
                pv_resolution: Resolution::Step(1.0),
                battery_resolution: Resolution::Step(3.0),
            },
        )
        .unwrap()
    }

    fn orchestrator(target_pct: f64, constraints: FeasibilityConstraints) -> Orchestrator {
        Orchestrator::new(
            context(constraints),
            ObjectiveKind::TargetSelfSufficiency { target_pct },
            Box::new(GridSweepOptimizer),
            SearchConfig {
                workers: 2,
                ..Default::default()
            },
        )
    }

    struct Offset(f64);

    impl CrossCheck for Offset {
        fn name(&self) -> &str {
            "offset"
        }

        fn self_sufficiency_pct(
            &self,
            series: &EnergyTimeSeries,
            battery: &BatteryConfig,
        ) -> Result<f64, Box<dyn Error + Send + Sync>> {
            let internal = crate::sim::simulate(series, battery)?;
            Ok(internal.self_sufficiency_pct + self.0)
        }
    }

    struct Broken;

    impl CrossCheck for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn self_sufficiency_pct(
            &self,
            _: &EnergyTimeSeries,
            _: &BatteryConfig,
        ) -> Result<f64, Box<dyn Error + Send + Sync>> {
            Err("service unavailable".into())
        }
    }

    #[test]
    fn low_target_is_met_by_baseline() {
        let result = orchestrator(20.0, FeasibilityConstraints::default())
            .run()
            .unwrap();
        assert_eq!(
            result.stages,
            vec![
                SizingStage::Init,
                SizingStage::Baseline,
                SizingStage::Validate,
                SizingStage::Done
            ]
        );
        assert_eq!(result.battery_kwh, 0.0);
        assert!(result.optimization.is_none());
        assert!(result.simulation.self_sufficiency_pct >= 20.0);
    }

    #[test]
    fn high_target_triggers_optimization() {
        let result = orchestrator(80.0, FeasibilityConstraints::default())
            .run()
            .unwrap();
        assert!(result.stages.contains(&SizingStage::Optimize));
        assert!(result.battery_kwh > 0.0);
        let optimization = result.optimization.as_ref().unwrap();
        assert_eq!(optimization.best.pv_kwp, result.pv_kwp);
        assert_eq!(
            result.evaluations().count(),
            result.baseline.as_ref().map_or(0, |b| b.evaluations) + optimization.evaluations
        );
    }

    #[test]
    fn unreachable_floor_fails_with_infeasible() {
        let constraints = FeasibilityConstraints {
            min_self_sufficiency_pct: Some(99.0),
            ..Default::default()
        };
        let (stages, outcome) = orchestrator(99.0, constraints).run_traced();
        assert!(matches!(outcome, Err(SizingError::Infeasible { .. })));
        assert_eq!(stages.last(), Some(&SizingStage::Failed));
        assert!(stages.contains(&SizingStage::Optimize));
    }

    #[test]
    fn capped_search_without_feasible_point_is_reported_not_failed() {
        let constraints = FeasibilityConstraints {
            min_self_sufficiency_pct: Some(99.0),
            ..Default::default()
        };
        let capped = Orchestrator::new(
            context(constraints),
            ObjectiveKind::TargetSelfSufficiency { target_pct: 99.0 },
            Box::new(GridSweepOptimizer),
            SearchConfig {
                max_evaluations: Some(3),
                workers: 1,
                ..Default::default()
            },
        );
        let result = capped.run().unwrap();
        assert_eq!(result.stages.last(), Some(&SizingStage::Done));
        assert!(result.stages.contains(&SizingStage::Optimize));
        let optimization = result.optimization.as_ref().unwrap();
        assert!(!optimization.converged);
        assert_eq!(optimization.stop_reason, StopReason::EvaluationCap);
        assert!(!optimization.best.feasible);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("EvaluationCap"));
    }

    #[test]
    fn roof_below_every_candidate_fails_with_infeasible() {
        let constraints = FeasibilityConstraints {
            roof_max_kwp: Some(0.5),
            ..Default::default()
        };
        let (stages, outcome) = orchestrator(20.0, constraints).run_traced();
        match outcome {
            Err(SizingError::Infeasible { best, evaluated }) => {
                assert_eq!(evaluated, 6 * 5);
                assert_eq!(best.pv_kwp, 1.0);
            }
            other => panic!("expected Infeasible, got {other:?}"),
        }
        assert_eq!(stages.last(), Some(&SizingStage::Failed));
    }

    #[test]
    fn invalid_search_settings_fail_from_init() {
        let orchestrator = Orchestrator::new(
            context(FeasibilityConstraints::default()),
            ObjectiveKind::TargetSelfSufficiency { target_pct: 50.0 },
            Box::new(GridSweepOptimizer),
            SearchConfig {
                workers: 0,
                ..Default::default()
            },
        );
        let (stages, outcome) = orchestrator.run_traced();
        assert!(matches!(outcome, Err(SizingError::InvalidConfig { .. })));
        assert_eq!(stages, vec![SizingStage::Init, SizingStage::Failed]);
    }

    #[test]
    fn discrepancy_beyond_tolerance_is_a_warning() {
        let result = orchestrator(20.0, FeasibilityConstraints::default())
            .with_cross_check(Box::new(Offset(5.0)))
            .run()
            .unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("offset reports"));
        assert_eq!(
            result.reported_self_sufficiency_pct,
            result.simulation.self_sufficiency_pct
        );
        assert_eq!(result.self_sufficiency_source, Authority::Internal);
    }

    #[test]
    fn small_discrepancy_is_silent_and_external_authority_is_honoured() {
        let result = orchestrator(20.0, FeasibilityConstraints::default())
            .with_cross_check(Box::new(Offset(0.5)))
            .with_validation(ValidationSettings {
                tolerance_pct: 1.0,
                authority: Authority::External,
            })
            .run()
            .unwrap();
        assert!(result.warnings.is_empty());
        assert_eq!(result.self_sufficiency_source, Authority::External);
        assert!(
            (result.reported_self_sufficiency_pct - result.simulation.self_sufficiency_pct - 0.5)
                .abs()
                < 1e-9
        );
    }

    #[test]
    fn cross_check_error_does_not_fail_the_run() {
        let result = orchestrator(20.0, FeasibilityConstraints::default())
            .with_cross_check(Box::new(Broken))
            .run()
            .unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("service unavailable"));
    }

    #[test]
    fn roof_below_bounds_is_flagged() {
        let constraints = FeasibilityConstraints {
            roof_max_kwp: Some(4.0),
            ..Default::default()
        };
        let result = orchestrator(90.0, constraints).run().unwrap();
        assert!(result.constrained_by_roof);
        assert!(result.pv_kwp <= 4.0);
        assert!(result.recommendation().contains("limited by the roof"));
    }
}
