use serde::{Deserialize, Serialize};

use crate::error::SizingError;

/// Capacities closer than this are the same catalog entry.
const CATALOG_TOLERANCE_KWH: f64 = 1e-6;

/// One purchasable battery product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatteryOption {
    pub name: String,
    pub capacity_kwh: f64,
    /// Rated charge/discharge power (kW).
    pub power_kw: f64,
    /// Overrides the template efficiency when set.
    #[serde(default)]
    pub round_trip_efficiency: Option<f64>,
}

/// Hard limits a candidate must satisfy to be feasible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FeasibilityConstraints {
    /// Largest PV array the roof holds (kWp).
    pub roof_max_kwp: Option<f64>,
    /// Purchasable batteries. Empty means any capacity is allowed.
    pub battery_catalog: Vec<BatteryOption>,
    /// Minimum self-sufficiency a feasible candidate must reach (%).
    pub min_self_sufficiency_pct: Option<f64>,
}

impl FeasibilityConstraints {
    pub fn validate(&self) -> Result<(), SizingError> {
        if let Some(roof) = self.roof_max_kwp {
            if !(roof.is_finite() && roof >= 0.0) {
                return Err(SizingError::invalid("constraints.roof_max_kwp", "must be >= 0"));
            }
        }
        if let Some(floor) = self.min_self_sufficiency_pct {
            if !(0.0..=100.0).contains(&floor) {
                return Err(SizingError::invalid(
                    "constraints.min_self_sufficiency_pct",
                    "must be in [0, 100]",
                ));
            }
        }
        for (i, option) in self.battery_catalog.iter().enumerate() {
            let field = format!("constraints.battery_catalog[{i}]");
            if !(option.capacity_kwh.is_finite() && option.capacity_kwh > 0.0) {
                return Err(SizingError::invalid(field, "capacity_kwh must be > 0"));
            }
            if !(option.power_kw.is_finite() && option.power_kw > 0.0) {
                return Err(SizingError::invalid(field, "power_kw must be > 0"));
            }
            if let Some(rte) = option.round_trip_efficiency {
                if !(rte > 0.0 && rte <= 1.0) {
                    return Err(SizingError::invalid(
                        field,
                        "round_trip_efficiency must be in (0, 1]",
                    ));
                }
            }
        }
        Ok(())
    }

    /// The catalog entry with exactly this capacity, if any.
    pub fn catalog_match(&self, battery_kwh: f64) -> Option<&BatteryOption> {
        self.battery_catalog
            .iter()
            .find(|o| (o.capacity_kwh - battery_kwh).abs() <= CATALOG_TOLERANCE_KWH)
    }

    /// Whether the roof, not the search bounds, caps the PV size.
    pub fn roof_limits(&self, pv_kwp_max: f64) -> bool {
        self.roof_max_kwp.is_some_and(|roof| roof < pv_kwp_max)
    }

    /// Size-only part of the violation: roof excess plus the distance to the
    /// nearest catalog capacity. Zero battery is always allowed.
    pub fn size_violation(&self, pv_kwp: f64, battery_kwh: f64) -> f64 {
        let roof = self
            .roof_max_kwp
            .map_or(0.0, |roof| (pv_kwp - roof).max(0.0));

        let catalog = if self.battery_catalog.is_empty()
            || battery_kwh <= CATALOG_TOLERANCE_KWH
            || self.catalog_match(battery_kwh).is_some()
        {
            0.0
        } else {
            self.battery_catalog
                .iter()
                .map(|o| (o.capacity_kwh - battery_kwh).abs())
                .fold(f64::INFINITY, f64::min)
        };

        roof + catalog
    }

    /// Total violation including the self-sufficiency floor, in mixed units
    /// (kWp + kWh + percentage points). Zero means feasible.
    pub fn violation(&self, pv_kwp: f64, battery_kwh: f64, self_sufficiency_pct: f64) -> f64 {
        let floor = self
            .min_self_sufficiency_pct
            .map_or(0.0, |floor| (floor - self_sufficiency_pct).max(0.0));
        self.size_violation(pv_kwp, battery_kwh) + floor
    }
}

/// How infeasible candidates are scored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PenaltyConfig {
    /// Added on top of the objective ceiling.
    pub margin: f64,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self { margin: 1e6 }
    }
}

impl PenaltyConfig {
    pub fn validate(&self) -> Result<(), SizingError> {
        if !(self.margin.is_finite() && self.margin > 0.0) {
            return Err(SizingError::invalid("objective.penalty_margin", "must be > 0"));
        }
        Ok(())
    }

    /// Score of an infeasible candidate: always above `ceiling`, and ordered
    /// by `violation`.
    pub fn infeasible_score(&self, ceiling: f64, violation: f64) -> f64 {
        ceiling + self.margin + violation
    }
}
