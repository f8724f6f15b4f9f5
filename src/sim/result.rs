//! Per-step dispatch trace and the aggregate metrics derived from it.

use std::fmt;

use serde::Serialize;

/// Output of one dispatch run.
///
/// Every per-step vector has exactly one entry per input sample. Aggregates
/// are computed once from the trace when the run finishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationResult {
    pub grid_import_kw: Vec<f64>,
    pub grid_export_kw: Vec<f64>,
    /// Terminal-side charging power (kW).
    pub battery_charge_kw: Vec<f64>,
    /// Terminal-side discharging power (kW).
    pub battery_discharge_kw: Vec<f64>,
    /// SOC at the end of each step (kWh).
    pub soc_kwh: Vec<f64>,
    /// Conversion losses per step (kWh).
    pub loss_kwh: Vec<f64>,

    pub self_sufficiency_pct: f64,
    pub self_consumption_pct: f64,
    pub total_import_kwh: f64,
    pub total_export_kwh: f64,
    pub total_load_kwh: f64,
    pub total_generation_kwh: f64,
    pub total_loss_kwh: f64,
    /// Energy drawn from storage divided by nominal capacity.
    pub equivalent_full_cycles: f64,

    pub capacity_kwh: f64,
    pub initial_soc_kwh: f64,
    pub step_hours: f64,
    pub duration_hours: f64,
}

impl SimulationResult {
    pub fn len(&self) -> usize {
        self.soc_kwh.len()
    }

    pub fn is_empty(&self) -> bool {
        self.soc_kwh.is_empty()
    }

    pub fn final_soc_kwh(&self) -> f64 {
        self.soc_kwh.last().copied().unwrap_or(self.initial_soc_kwh)
    }

    /// Fills in the aggregate fields from the per-step vectors.
    pub(crate) fn finalize(
        &mut self,
        total_load_kwh: f64,
        total_generation_kwh: f64,
        cumulative_discharge_kwh: f64,
    ) {
        let dt = self.step_hours;
        self.total_import_kwh = self.grid_import_kw.iter().sum::<f64>() * dt;
        self.total_export_kwh = self.grid_export_kw.iter().sum::<f64>() * dt;
        self.total_loss_kwh = self.loss_kwh.iter().sum();
        self.total_load_kwh = total_load_kwh;
        self.total_generation_kwh = total_generation_kwh;
        self.duration_hours = self.len() as f64 * dt;

        self.self_sufficiency_pct =
            percentage(total_load_kwh - self.total_import_kwh, total_load_kwh);

        // Energy still parked in the battery at the end was generated but not
        // yet consumed.
        let stranded_kwh = (self.final_soc_kwh() - self.initial_soc_kwh).max(0.0);
        self.self_consumption_pct = percentage(
            total_generation_kwh - self.total_export_kwh - stranded_kwh,
            total_generation_kwh,
        );

        self.equivalent_full_cycles = if self.capacity_kwh > 0.0 {
            cumulative_discharge_kwh / self.capacity_kwh
        } else {
            0.0
        };
    }
}

/// `100 * part / whole` clamped to `[0, 100]`; 0 for an empty whole.
fn percentage(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        (100.0 * part / whole).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

impl fmt::Display for SimulationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Simulation Report ---")?;
        writeln!(f, "Self-sufficiency:      {:.1}%", self.self_sufficiency_pct)?;
        writeln!(f, "Self-consumption:      {:.1}%", self.self_consumption_pct)?;
        writeln!(f, "Load:                  {:.1} kWh", self.total_load_kwh)?;
        writeln!(f, "Generation:            {:.1} kWh", self.total_generation_kwh)?;
        writeln!(f, "Grid import:           {:.1} kWh", self.total_import_kwh)?;
        writeln!(f, "Grid export:           {:.1} kWh", self.total_export_kwh)?;
        writeln!(f, "Conversion losses:     {:.1} kWh", self.total_loss_kwh)?;
        write!(
            f,
            "Battery cycles:        {:.1} equiv. full cycles",
            self.equivalent_full_cycles
        )
    }
}
