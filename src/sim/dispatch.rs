use tracing::debug;

use super::battery::{BatteryConfig, BatteryState};
use super::result::SimulationResult;
use crate::error::SizingError;
use crate::series::EnergyTimeSeries;

/// Runs the self-consumption dispatch over `series` with one battery.
///
/// Each step PV serves the load first. Surplus charges the battery and the
/// rest is exported. A deficit is covered from storage and the rest is
/// imported. Inputs are validated before any state is created; the run
/// itself cannot fail.
///
/// # Errors
///
/// `InvalidConfig` if `config` breaks an invariant, `EmptySeries` if the
/// series has no samples.
///
/// # Examples
///
/// ```
/// use chrono::{TimeDelta, TimeZone, Utc};
/// use pv_sizer::series::EnergyTimeSeries;
/// use pv_sizer::sim::{simulate, BatteryConfig};
///
/// let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
/// let series = EnergyTimeSeries::uniform(
///     start, TimeDelta::hours(1), &[3.0, 0.0], &[1.0, 1.0], 1.0,
/// ).unwrap();
///
/// let result = simulate(&series, &BatteryConfig::new(0.0, 1.0)).unwrap();
/// assert_eq!(result.grid_export_kw, vec![2.0, 0.0]);
/// assert_eq!(result.grid_import_kw, vec![0.0, 1.0]);
/// ```
pub fn simulate(
    series: &EnergyTimeSeries,
    config: &BatteryConfig,
) -> Result<SimulationResult, SizingError> {
    config.validate()?;
    if series.is_empty() {
        return Err(SizingError::EmptySeries);
    }

    let dt = series.step_hours();
    let n = series.len();
    let mut state = BatteryState::new(config);
    let mut result = SimulationResult {
        grid_import_kw: Vec::with_capacity(n),
        grid_export_kw: Vec::with_capacity(n),
        battery_charge_kw: Vec::with_capacity(n),
        battery_discharge_kw: Vec::with_capacity(n),
        soc_kwh: Vec::with_capacity(n),
        loss_kwh: Vec::with_capacity(n),
        capacity_kwh: config.capacity_kwh,
        initial_soc_kwh: state.soc_kwh,
        step_hours: dt,
        ..Default::default()
    };

    for sample in series.samples() {
        let net_kw = sample.generation_kw - sample.load_kw;

        let (charge_kw, discharge_kw, import_kw, export_kw, loss_kwh) = if net_kw >= 0.0 {
            let t = state.charge(net_kw, dt);
            (t.terminal_kw, 0.0, 0.0, (net_kw - t.terminal_kw).max(0.0), t.loss_kwh)
        } else {
            let deficit_kw = -net_kw;
            let t = state.discharge(deficit_kw, dt);
            (0.0, t.terminal_kw, (deficit_kw - t.terminal_kw).max(0.0), 0.0, t.loss_kwh)
        };

        result.battery_charge_kw.push(charge_kw);
        result.battery_discharge_kw.push(discharge_kw);
        result.grid_import_kw.push(import_kw);
        result.grid_export_kw.push(export_kw);
        result.soc_kwh.push(state.soc_kwh);
        result.loss_kwh.push(loss_kwh);
    }

    result.finalize(
        series.total_load_kwh(),
        series.total_generation_kwh(),
        state.cumulative_discharge_kwh,
    );

    debug!(
        steps = n,
        capacity_kwh = config.capacity_kwh,
        self_sufficiency_pct = result.self_sufficiency_pct,
        import_kwh = result.total_import_kwh,
        export_kwh = result.total_export_kwh,
        "dispatch complete"
    );

    Ok(result)
}
