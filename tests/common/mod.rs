//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use pv_sizer::economics::CostModel;
use pv_sizer::optimize::{
    EvaluationContext, FeasibilityConstraints, OptimizationBounds, PenaltyConfig, Resolution,
};
use pv_sizer::series::EnergyTimeSeries;
use pv_sizer::sim::BatteryTemplate;

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

/// Constant generation and load at hourly resolution.
pub fn constant_series(generation_kw: f64, load_kw: f64, steps: usize) -> EnergyTimeSeries {
    EnergyTimeSeries::uniform(
        start(),
        TimeDelta::hours(1),
        &vec![generation_kw; steps],
        &vec![load_kw; steps],
        1.0,
    )
    .unwrap()
}

/// `days` of hourly data for a 1 kWp array: `sun_kw` from 08:00 to 16:00,
/// a 0.4 kW base load and a 1.5 kW evening peak from 18:00 to 22:00.
pub fn daily_series(days: usize, sun_kw: f64) -> EnergyTimeSeries {
    let mut generation = Vec::with_capacity(days * 24);
    let mut load = Vec::with_capacity(days * 24);
    for _ in 0..days {
        for hour in 0..24 {
            generation.push(if (8..16).contains(&hour) { sun_kw } else { 0.0 });
            load.push(if (18..22).contains(&hour) { 1.5 } else { 0.4 });
        }
    }
    EnergyTimeSeries::uniform(start(), TimeDelta::hours(1), &generation, &load, 1.0).unwrap()
}

pub fn bounds(pv_max: f64, battery_max: f64, pv_step: f64, battery_step: f64) -> OptimizationBounds {
    OptimizationBounds {
        pv_kwp_min: 1.0,
        pv_kwp_max: pv_max,
        battery_kwh_min: 0.0,
        battery_kwh_max: battery_max,
        pv_resolution: Resolution::Step(pv_step),
        battery_resolution: Resolution::Step(battery_step),
    }
}

pub fn context(
    series: EnergyTimeSeries,
    bounds: OptimizationBounds,
    constraints: FeasibilityConstraints,
) -> EvaluationContext {
    EvaluationContext::new(
        series,
        BatteryTemplate::default(),
        CostModel::default(),
        constraints,
        PenaltyConfig::default(),
        bounds,
    )
    .unwrap()
}
