//! Error taxonomy shared by the simulator, optimizer, and orchestrator.

use thiserror::Error;

use crate::optimize::CandidatePoint;

/// Hard failures surfaced to the caller.
///
/// Input-validation variants are raised before any simulation state exists.
/// Feasibility penalties never produce an error; only a search that finds no
/// feasible candidate at all does ([`SizingError::Infeasible`]).
#[derive(Debug, Error)]
pub enum SizingError {
    /// A battery, bounds, or objective parameter violates its invariant.
    #[error("invalid configuration: {field} {message}")]
    InvalidConfig {
        /// Dotted field path, e.g. `battery.round_trip_efficiency`.
        field: String,
        /// Constraint that was violated.
        message: String,
    },

    /// Sample spacing differs from the spacing of the first interval.
    #[error(
        "non-uniform timestep at sample {index}: expected {expected_secs} s, found {found_secs} s"
    )]
    NonUniformTimestep {
        index: usize,
        expected_secs: i64,
        found_secs: i64,
    },

    /// Timestamps are not strictly increasing.
    #[error("timestamp at sample {index} does not follow its predecessor")]
    NonMonotonicTimestamp { index: usize },

    /// A generation or load value is negative or not finite.
    #[error("invalid {field} at sample {index}: {value}")]
    InvalidSample {
        index: usize,
        field: &'static str,
        value: f64,
    },

    /// The series has no samples.
    #[error("energy time series is empty")]
    EmptySeries,

    /// No evaluated candidate satisfies the feasibility constraints.
    ///
    /// `best` is the least-violating candidate, kept for diagnostics.
    #[error(
        "no feasible candidate among {evaluated} evaluated; closest: {:.2} kWp / {:.2} kWh (violation {:.3})",
        .best.pv_kwp,
        .best.battery_kwh,
        .best.violation
    )]
    Infeasible {
        best: Box<CandidatePoint>,
        evaluated: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl SizingError {
    /// Shorthand for [`SizingError::InvalidConfig`].
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }
}
