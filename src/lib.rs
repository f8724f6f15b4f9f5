//! PV and battery capacity sizing for a single site.
//!
//! A generation/load series is dispatched through a battery model for each
//! candidate (PV kWp, battery kWh); an optimizer searches the candidate
//! lattice for the best score under the configured objective and
//! constraints.

#[cfg(feature = "api")]
pub mod api;
pub mod cli;
pub mod config;
/// Capital, operating and lifecycle costs.
pub mod economics;
pub mod error;
pub mod io;
/// Objectives, constraints and search strategies.
pub mod optimize;
pub mod profiles;
pub mod series;
/// Battery dispatch simulation.
pub mod sim;
pub mod sizing;

pub use error::SizingError;
