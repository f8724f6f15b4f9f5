//! Request and response types for the API.

use serde::{Deserialize, Serialize};

use crate::series::Sample;
use crate::sim::SimulationResult;
use crate::sizing::{Authority, SizingResult, SizingStage};

/// Body of `GET /sizing`.
#[derive(Debug, Clone, Serialize)]
pub struct SizingResponse {
    pub pv_kwp: f64,
    pub battery_kwh: f64,
    pub battery_power_kw: f64,
    pub battery_option: Option<String>,
    pub self_sufficiency_pct: f64,
    pub self_sufficiency_source: Authority,
    pub self_consumption_pct: f64,
    pub equivalent_full_cycles: f64,
    pub capex: f64,
    pub annual_opex: f64,
    pub lifecycle_cost: f64,
    pub constrained_by_roof: bool,
    pub converged: bool,
    pub evaluations: usize,
    pub stages: Vec<SizingStage>,
    pub warnings: Vec<String>,
    pub recommendation: String,
}

impl From<&SizingResult> for SizingResponse {
    fn from(r: &SizingResult) -> Self {
        let converged = r
            .optimization
            .as_ref()
            .or(r.baseline.as_ref())
            .is_none_or(|o| o.converged);
        Self {
            pv_kwp: r.pv_kwp,
            battery_kwh: r.battery_kwh,
            battery_power_kw: r.battery.power_kw,
            battery_option: r.battery_option.as_ref().map(|o| o.name.clone()),
            self_sufficiency_pct: r.reported_self_sufficiency_pct,
            self_sufficiency_source: r.self_sufficiency_source,
            self_consumption_pct: r.simulation.self_consumption_pct,
            equivalent_full_cycles: r.simulation.equivalent_full_cycles,
            capex: r.costs.capex,
            annual_opex: r.costs.annual_opex,
            lifecycle_cost: r.costs.lifecycle_cost,
            constrained_by_roof: r.constrained_by_roof,
            converged,
            evaluations: r.evaluations().count(),
            stages: r.stages.clone(),
            warnings: r.warnings.clone(),
            recommendation: r.recommendation(),
        }
    }
}

/// One step of the recommended system's dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: usize,
    pub timestamp: String,
    pub generation_kw: f64,
    pub load_kw: f64,
    pub grid_import_kw: f64,
    pub grid_export_kw: f64,
    pub battery_charge_kw: f64,
    pub battery_discharge_kw: f64,
    pub soc_kwh: f64,
    pub loss_kwh: f64,
}

impl StepRecord {
    pub fn new(step: usize, sample: &Sample, trace: &SimulationResult) -> Self {
        Self {
            step,
            timestamp: sample.timestamp.to_rfc3339(),
            generation_kw: sample.generation_kw,
            load_kw: sample.load_kw,
            grid_import_kw: trace.grid_import_kw[step],
            grid_export_kw: trace.grid_export_kw[step],
            battery_charge_kw: trace.battery_charge_kw[step],
            battery_discharge_kw: trace.battery_discharge_kw[step],
            soc_kwh: trace.soc_kwh[step],
            loss_kwh: trace.loss_kwh[step],
        }
    }
}

/// Inclusive step range for `GET /simulation`.
#[derive(Debug, Deserialize)]
pub struct SimulationQuery {
    pub from: Option<usize>,
    pub to: Option<usize>,
}

/// Filter for `GET /evaluations`.
#[derive(Debug, Deserialize)]
pub struct EvaluationQuery {
    pub feasible: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
