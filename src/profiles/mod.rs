//! Synthetic household load and PV generation series.
//!
//! Used when no measured series is available. Output is deterministic for a
//! given seed.

use chrono::{DateTime, TimeDelta, Timelike, Utc};
use rand::{Rng, rngs::StdRng};

use crate::error::SizingError;
use crate::series::EnergyTimeSeries;

/// Residential demand profile.
pub mod load;
/// PV generation profile.
pub mod solar;

pub use load::ResidentialLoad;
pub use solar::ClearSkyPv;

/// Builds an aligned series of `days` days at `steps_per_day` resolution.
///
/// Generation comes from `pv`, which also fixes the series' reference kWp.
///
/// # Errors
///
/// `InvalidConfig` if `days` or `steps_per_day` is zero, or if
/// `steps_per_day` does not divide a day into whole seconds.
pub fn synthesize(
    start: DateTime<Utc>,
    days: usize,
    steps_per_day: usize,
    load: &mut ResidentialLoad,
    pv: &mut ClearSkyPv,
) -> Result<EnergyTimeSeries, SizingError> {
    if days == 0 {
        return Err(SizingError::invalid("synthetic.days", "must be > 0"));
    }
    if steps_per_day == 0 || 86_400 % steps_per_day != 0 {
        return Err(SizingError::invalid(
            "synthetic.steps_per_day",
            "must divide a day into whole seconds",
        ));
    }

    let step = TimeDelta::seconds((86_400 / steps_per_day) as i64);
    let step_hours = 24.0 / steps_per_day as f64;
    let n = days * steps_per_day;
    let timestamps: Vec<DateTime<Utc>> = (0..n).map(|i| start + step * i as i32).collect();

    let hours: Vec<f64> = timestamps.iter().map(|&t| hour_of_day(t)).collect();
    let load_kw = load.profile(&hours, step_hours);
    let generation_kw: Vec<f64> = timestamps.iter().map(|&t| pv.generation_kw(t)).collect();

    EnergyTimeSeries::uniform(start, step, &generation_kw, &load_kw, pv.kwp)
}

/// Fractional hour of the day, e.g. 13.5 for 13:30.
pub fn hour_of_day(timestamp: DateTime<Utc>) -> f64 {
    f64::from(timestamp.num_seconds_from_midnight()) / 3600.0
}

/// Gaussian noise via the Box-Muller transform.
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rand::SeedableRng;

    use super::*;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn synthesize_builds_aligned_series() {
        let mut load = ResidentialLoad::new(12.0, 7.0, 19.0, 0.2, 0.1, 1);
        let mut pv = ClearSkyPv::new(4.0, 12.0, 0.4, 5.0, 2);
        let series = synthesize(start(), 3, 48, &mut load, &mut pv).unwrap();

        assert_eq!(series.len(), 144);
        assert_eq!(series.step_hours(), 0.5);
        assert_eq!(series.reference_kwp(), 4.0);
        assert!((series.total_load_kwh() - 36.0).abs() < 1e-9);
        assert!(series.total_generation_kwh() > 0.0);
    }

    #[test]
    fn rejects_uneven_steps_per_day() {
        let mut load = ResidentialLoad::new(12.0, 7.0, 19.0, 0.2, 0.0, 1);
        let mut pv = ClearSkyPv::new(4.0, 12.0, 0.0, 0.0, 2);
        assert!(synthesize(start(), 1, 7, &mut load, &mut pv).is_err());
        assert!(synthesize(start(), 0, 24, &mut load, &mut pv).is_err());
    }

    #[test]
    fn hour_of_day_is_fractional() {
        let t = Utc.with_ymd_and_hms(2024, 5, 5, 13, 30, 0).unwrap();
        assert_eq!(hour_of_day(t), 13.5);
    }

    #[test]
    fn gaussian_noise_zero_std_returns_zero() {
        let mut rng = StdRng::seed_from_u64(42);
        assert_eq!(gaussian_noise(&mut rng, 0.0), 0.0);
    }

    #[test]
    fn gaussian_noise_is_roughly_centred() {
        let mut rng = StdRng::seed_from_u64(42);
        let n = 10_000;
        let mean = (0..n).map(|_| gaussian_noise(&mut rng, 1.0)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.05, "mean = {mean}");
    }
}
