use rand::{SeedableRng, rngs::StdRng};

use super::gaussian_noise;

/// Residential household demand with a morning and an evening peak.
///
/// The shape is two Gaussian bells (the evening one 1.5x taller) on top of a
/// constant base. Multiplicative noise is applied per step, and the whole
/// profile is then rescaled so the average day consumes `daily_kwh`.
///
/// # Examples
///
/// ```
/// use pv_sizer::profiles::ResidentialLoad;
///
/// let mut load = ResidentialLoad::new(12.0, 7.0, 19.0, 0.2, 0.0, 42);
/// let hours: Vec<f64> = (0..24).map(f64::from).collect();
/// let kw = load.profile(&hours, 1.0);
/// let daily: f64 = kw.iter().sum();
/// assert!((daily - 12.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct ResidentialLoad {
    /// Target consumption of an average day (kWh).
    pub daily_kwh: f64,
    /// Hour of the morning peak (0-24).
    pub morning_peak_hour: f64,
    /// Hour of the evening peak (0-24).
    pub evening_peak_hour: f64,
    /// Constant base relative to a unit morning peak.
    pub base_load_ratio: f64,
    /// Standard deviation of the multiplicative noise.
    pub noise_std: f64,

    rng: StdRng,
}

impl ResidentialLoad {
    pub fn new(
        daily_kwh: f64,
        morning_peak_hour: f64,
        evening_peak_hour: f64,
        base_load_ratio: f64,
        noise_std: f64,
        seed: u64,
    ) -> Self {
        Self {
            daily_kwh: daily_kwh.max(0.0),
            morning_peak_hour,
            evening_peak_hour,
            base_load_ratio: base_load_ratio.max(0.0),
            noise_std: noise_std.max(0.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Noise-free relative demand at `hour` of the day.
    pub fn shape(&self, hour: f64) -> f64 {
        let bell = |peak: f64| (-0.5 * ((hour - peak) / 2.0).powi(2)).exp();
        self.base_load_ratio + bell(self.morning_peak_hour) + 1.5 * bell(self.evening_peak_hour)
    }

    /// Demand in kW for each step, given each step's hour of day and the
    /// step length.
    pub fn profile(&mut self, hours: &[f64], step_hours: f64) -> Vec<f64> {
        let raw: Vec<f64> = hours
            .iter()
            .map(|&h| {
                let noise = 1.0 + gaussian_noise(&mut self.rng, self.noise_std);
                (self.shape(h) * noise).max(0.0)
            })
            .collect();

        let days = hours.len() as f64 * step_hours / 24.0;
        let energy: f64 = raw.iter().sum::<f64>() * step_hours;
        if energy <= 0.0 || days <= 0.0 {
            return raw;
        }
        let scale = self.daily_kwh * days / energy;
        raw.into_iter().map(|kw| kw * scale).collect()
    }
}
