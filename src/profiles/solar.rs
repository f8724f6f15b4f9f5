use chrono::{DateTime, Datelike, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};

use super::hour_of_day;

/// Day of year with the strongest sun (around the June solstice).
const SUMMER_PEAK_DAY: f64 = 172.0;

/// Clear-sky PV output shaped by time of day and season, attenuated by
/// random cloud cover.
///
/// The daily shape is `2 * max(0, cos(2π (h - peak) / 24) - 0.5)`, so it is
/// non-zero for four hours either side of `peak_hour`. Cloud attenuation is
/// drawn per step from Beta(`cloud_alpha`, 1), which is mostly sunny for
/// large alphas. A `cloud_alpha` of zero disables clouds.
#[derive(Debug, Clone)]
pub struct ClearSkyPv {
    /// Installed capacity the output corresponds to (kWp).
    pub kwp: f64,
    /// Hour of maximum generation.
    pub peak_hour: f64,
    /// Summer/winter swing, 0 = flat year.
    pub seasonality: f64,
    /// Beta shape parameter of the cloud factor.
    pub cloud_alpha: f64,

    rng: StdRng,
}

impl ClearSkyPv {
    pub fn new(kwp: f64, peak_hour: f64, seasonality: f64, cloud_alpha: f64, seed: u64) -> Self {
        Self {
            kwp: kwp.max(0.0),
            peak_hour,
            seasonality: seasonality.clamp(0.0, 1.0),
            cloud_alpha: cloud_alpha.max(0.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Relative clear-sky output in `[0, 1]` at `hour`.
    pub fn daily_shape(&self, hour: f64) -> f64 {
        let angle = 2.0 * std::f64::consts::PI * (hour - self.peak_hour) / 24.0;
        ((angle.cos() - 0.5).max(0.0) * 2.0).min(1.0)
    }

    /// Seasonal multiplier for a day of the year.
    pub fn seasonal_factor(&self, day_of_year: u32) -> f64 {
        let offset = f64::from(day_of_year) - SUMMER_PEAK_DAY;
        1.0 + self.seasonality * (2.0 * std::f64::consts::PI * offset / 365.0).cos()
    }

    /// Generation in kW for the interval starting at `timestamp`.
    pub fn generation_kw(&mut self, timestamp: DateTime<Utc>) -> f64 {
        let shape = self.daily_shape(hour_of_day(timestamp));
        if shape <= 0.0 {
            return 0.0;
        }
        let clouds = if self.cloud_alpha > 0.0 {
            // Beta(a, 1) by inversion: U^(1/a).
            self.rng.random::<f64>().powf(1.0 / self.cloud_alpha)
        } else {
            1.0
        };
        self.kwp * shape * self.seasonal_factor(timestamp.ordinal()) * clouds
    }
}
