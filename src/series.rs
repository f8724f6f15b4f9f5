//! Aligned generation/load time series at a fixed cadence.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SizingError;

/// One aligned observation of PV generation and household load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Start of the interval this sample covers.
    pub timestamp: DateTime<Utc>,
    /// Average PV generation over the interval (kW, >= 0).
    pub generation_kw: f64,
    /// Average household load over the interval (kW, >= 0).
    pub load_kw: f64,
}

/// Immutable, validated series of [`Sample`]s with uniform spacing.
///
/// The generation column describes a PV array of `reference_kwp`; use
/// [`EnergyTimeSeries::scaled_to`] to derive the series for another
/// installed capacity.
///
/// # Examples
///
/// ```
/// use chrono::{TimeDelta, TimeZone, Utc};
/// use pv_sizer::series::EnergyTimeSeries;
///
/// let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
/// let series =
///     EnergyTimeSeries::uniform(start, TimeDelta::hours(1), &[0.0, 2.0], &[1.0, 1.0], 1.0)
///         .unwrap();
/// assert_eq!(series.len(), 2);
/// assert_eq!(series.step_hours(), 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyTimeSeries {
    samples: Vec<Sample>,
    step: TimeDelta,
    reference_kwp: f64,
}

impl EnergyTimeSeries {
    /// Builds a series from explicit samples, rejecting anything that is not
    /// strictly increasing, uniformly spaced, finite, and non-negative.
    ///
    /// The step is taken from the first interval. Fewer than two samples
    /// default to a one-hour step. An empty series is accepted here and
    /// rejected by the simulator.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a bad `reference_kwp`, `InvalidSample`,
    /// `NonMonotonicTimestamp`, or `NonUniformTimestep`.
    pub fn from_samples(samples: Vec<Sample>, reference_kwp: f64) -> Result<Self, SizingError> {
        if !(reference_kwp.is_finite() && reference_kwp > 0.0) {
            return Err(SizingError::invalid("series.reference_kwp", "must be > 0"));
        }

        let mut step = TimeDelta::hours(1);
        for (index, sample) in samples.iter().enumerate() {
            check_value(index, "generation_kw", sample.generation_kw)?;
            check_value(index, "load_kw", sample.load_kw)?;

            if index == 0 {
                continue;
            }
            let gap = sample.timestamp - samples[index - 1].timestamp;
            if gap <= TimeDelta::zero() {
                return Err(SizingError::NonMonotonicTimestamp { index });
            }
            if index == 1 {
                step = gap;
            } else if gap != step {
                return Err(SizingError::NonUniformTimestep {
                    index,
                    expected_secs: step.num_seconds(),
                    found_secs: gap.num_seconds(),
                });
            }
        }

        Ok(Self {
            samples,
            step,
            reference_kwp,
        })
    }

    /// Builds a uniformly spaced series from parallel generation and load
    /// columns starting at `start`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the columns differ in length or `step` is not
    /// positive, plus everything [`EnergyTimeSeries::from_samples`] rejects.
    pub fn uniform(
        start: DateTime<Utc>,
        step: TimeDelta,
        generation_kw: &[f64],
        load_kw: &[f64],
        reference_kwp: f64,
    ) -> Result<Self, SizingError> {
        if generation_kw.len() != load_kw.len() {
            return Err(SizingError::invalid(
                "series",
                format!(
                    "generation has {} samples but load has {}",
                    generation_kw.len(),
                    load_kw.len()
                ),
            ));
        }
        if step <= TimeDelta::zero() {
            return Err(SizingError::invalid("series.step", "must be > 0"));
        }

        let samples = generation_kw
            .iter()
            .zip(load_kw)
            .enumerate()
            .map(|(i, (&generation_kw, &load_kw))| Sample {
                timestamp: start + step * i as i32,
                generation_kw,
                load_kw,
            })
            .collect();

        let mut series = Self::from_samples(samples, reference_kwp)?;
        series.step = step;
        Ok(series)
    }

    /// Returns a copy whose generation corresponds to `pv_kwp` installed.
    pub fn scaled_to(&self, pv_kwp: f64) -> Self {
        let factor = pv_kwp.max(0.0) / self.reference_kwp;
        let samples = self
            .samples
            .iter()
            .map(|s| Sample {
                generation_kw: s.generation_kw * factor,
                ..*s
            })
            .collect();
        Self {
            samples,
            step: self.step,
            reference_kwp: pv_kwp.max(f64::MIN_POSITIVE),
        }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample spacing.
    pub fn step(&self) -> TimeDelta {
        self.step
    }

    /// Sample spacing in hours (`Δt`).
    pub fn step_hours(&self) -> f64 {
        self.step.num_milliseconds() as f64 / 3_600_000.0
    }

    /// Total covered time in hours.
    pub fn duration_hours(&self) -> f64 {
        self.len() as f64 * self.step_hours()
    }

    /// PV capacity the generation column corresponds to (kWp).
    pub fn reference_kwp(&self) -> f64 {
        self.reference_kwp
    }

    pub fn total_generation_kwh(&self) -> f64 {
        self.samples.iter().map(|s| s.generation_kw).sum::<f64>() * self.step_hours()
    }

    pub fn total_load_kwh(&self) -> f64 {
        self.samples.iter().map(|s| s.load_kw).sum::<f64>() * self.step_hours()
    }
}

fn check_value(index: usize, field: &'static str, value: f64) -> Result<(), SizingError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SizingError::InvalidSample {
            index,
            field,
            value,
        })
    }
}
