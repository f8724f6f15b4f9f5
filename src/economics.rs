//! Capital, operating, and lifecycle cost of a PV + battery installation.
//!
//! All functions are pure. Prices arrive as configuration; nothing here looks
//! up tariffs or catalogs on its own.

use serde::{Deserialize, Serialize};

use crate::error::SizingError;
use crate::sim::SimulationResult;

const HOURS_PER_YEAR: f64 = 8760.0;

/// Installation and upkeep prices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CostParameters {
    /// Installed PV cost per kWp.
    pub pv_cost_per_kwp: f64,
    /// Installed storage cost per kWh.
    pub battery_cost_per_kwh: f64,
    /// One-off cost of any non-empty installation.
    pub fixed_cost: f64,
    /// Annual maintenance as a percentage of capex.
    pub maintenance_pct: f64,
    /// Evaluation horizon in years.
    pub horizon_years: u32,
    /// Annual discount rate as a fraction (0.03 = 3 %).
    pub discount_rate: f64,
}

impl Default for CostParameters {
    fn default() -> Self {
        Self {
            pv_cost_per_kwp: 1800.0,
            battery_cost_per_kwh: 450.0,
            fixed_cost: 2000.0,
            maintenance_pct: 1.0,
            horizon_years: 25,
            discount_rate: 0.03,
        }
    }
}

/// Grid energy prices per kWh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Tariffs {
    pub import_tariff: f64,
    pub feedin_tariff: f64,
}

impl Default for Tariffs {
    fn default() -> Self {
        Self {
            import_tariff: 0.30,
            feedin_tariff: 0.10,
        }
    }
}

/// Cost model bundling prices and tariffs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostModel {
    pub costs: CostParameters,
    pub tariffs: Tariffs,
}

/// Itemised cost of one candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub capex: f64,
    pub annual_maintenance: f64,
    pub annual_import_cost: f64,
    pub annual_export_revenue: f64,
    pub annual_opex: f64,
    pub lifecycle_cost: f64,
}

impl CostModel {
    pub fn new(costs: CostParameters, tariffs: Tariffs) -> Self {
        Self { costs, tariffs }
    }

    /// Rejects negative prices, rates, and horizons that make no sense.
    ///
    /// Tariffs may be negative (negative feed-in prices exist).
    pub fn validate(&self) -> Result<(), SizingError> {
        let c = &self.costs;
        let non_negative = [
            ("economics.pv_cost_per_kwp", c.pv_cost_per_kwp),
            ("economics.battery_cost_per_kwh", c.battery_cost_per_kwh),
            ("economics.fixed_cost", c.fixed_cost),
            ("economics.maintenance_pct", c.maintenance_pct),
        ];
        for (field, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(SizingError::invalid(field, "must be >= 0"));
            }
        }
        if !(c.discount_rate.is_finite() && c.discount_rate > -1.0) {
            return Err(SizingError::invalid("economics.discount_rate", "must be > -1"));
        }
        if !self.tariffs.import_tariff.is_finite() || !self.tariffs.feedin_tariff.is_finite() {
            return Err(SizingError::invalid("economics.tariffs", "must be finite"));
        }
        Ok(())
    }

    /// Up-front investment. Zero for an empty installation.
    pub fn capex(&self, pv_kwp: f64, battery_kwh: f64) -> f64 {
        if pv_kwp <= 0.0 && battery_kwh <= 0.0 {
            return 0.0;
        }
        self.costs.pv_cost_per_kwp * pv_kwp
            + self.costs.battery_cost_per_kwh * battery_kwh
            + self.costs.fixed_cost
    }

    /// Maintenance plus net grid cost over one year.
    ///
    /// Energy totals are scaled to a full year when the series covers a
    /// different duration.
    pub fn annual_opex(&self, result: &SimulationResult, capex: f64) -> f64 {
        let (maintenance, import_cost, export_revenue) = self.opex_parts(result, capex);
        maintenance + import_cost - export_revenue
    }

    /// `Σ_{y=1..horizon} 1 / (1 + r)^y`, the present value of one unit per year.
    pub fn annuity_factor(&self) -> f64 {
        let r = self.costs.discount_rate;
        if r == 0.0 {
            return f64::from(self.costs.horizon_years);
        }
        (1..=self.costs.horizon_years)
            .map(|y| 1.0 / (1.0 + r).powi(y as i32))
            .sum()
    }

    /// Capex plus discounted opex over the horizon.
    pub fn lifecycle_cost(&self, capex: f64, annual_opex: f64) -> f64 {
        capex + annual_opex * self.annuity_factor()
    }

    /// Full cost breakdown for a simulated candidate.
    pub fn breakdown(
        &self,
        pv_kwp: f64,
        battery_kwh: f64,
        result: &SimulationResult,
    ) -> CostBreakdown {
        let capex = self.capex(pv_kwp, battery_kwh);
        let (annual_maintenance, annual_import_cost, annual_export_revenue) =
            self.opex_parts(result, capex);
        let annual_opex = annual_maintenance + annual_import_cost - annual_export_revenue;
        CostBreakdown {
            capex,
            annual_maintenance,
            annual_import_cost,
            annual_export_revenue,
            annual_opex,
            lifecycle_cost: self.lifecycle_cost(capex, annual_opex),
        }
    }

    fn opex_parts(&self, result: &SimulationResult, capex: f64) -> (f64, f64, f64) {
        let scale = annualization_factor(result.duration_hours);
        (
            self.costs.maintenance_pct / 100.0 * capex,
            result.total_import_kwh * scale * self.tariffs.import_tariff,
            result.total_export_kwh * scale * self.tariffs.feedin_tariff,
        )
    }
}

fn annualization_factor(duration_hours: f64) -> f64 {
    if duration_hours > 0.0 {
        HOURS_PER_YEAR / duration_hours
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> CostModel {
        CostModel::new(
            CostParameters {
                pv_cost_per_kwp: 1000.0,
                battery_cost_per_kwh: 500.0,
                fixed_cost: 1000.0,
                maintenance_pct: 1.0,
                horizon_years: 10,
                discount_rate: 0.0,
            },
            Tariffs {
                import_tariff: 0.30,
                feedin_tariff: 0.10,
            },
        )
    }

    fn year_result(import_kwh: f64, export_kwh: f64) -> SimulationResult {
        SimulationResult {
            total_import_kwh: import_kwh,
            total_export_kwh: export_kwh,
            duration_hours: HOURS_PER_YEAR,
            ..Default::default()
        }
    }

    #[test]
    fn capex_includes_fixed_cost() {
        let m = model();
        assert_eq!(m.capex(5.0, 10.0), 5000.0 + 5000.0 + 1000.0);
        assert_eq!(m.capex(0.0, 0.0), 0.0);
    }

    #[test]
    fn opex_nets_export_against_import() {
        let m = model();
        let opex = m.annual_opex(&year_result(1000.0, 2000.0), 10_000.0);
        assert!((opex - (100.0 + 300.0 - 200.0)).abs() < 1e-9);
    }

    #[test]
    fn short_series_is_annualized() {
        let m = model();
        let mut result = year_result(10.0, 0.0);
        result.duration_hours = 24.0;
        let opex = m.annual_opex(&result, 0.0);
        assert!((opex - 10.0 * 365.0 * 0.30).abs() < 1e-6);
    }

    #[test]
    fn zero_discount_rate_is_plain_sum() {
        let m = model();
        assert_eq!(m.annuity_factor(), 10.0);
        assert_eq!(m.lifecycle_cost(1000.0, 100.0), 2000.0);
    }

    #[test]
    fn discounting_reduces_future_costs() {
        let mut m = model();
        m.costs.discount_rate = 0.05;
        let factor = m.annuity_factor();
        let closed_form = (1.0 - 1.05f64.powi(-10)) / 0.05;
        assert!((factor - closed_form).abs() < 1e-9);
        assert!(m.lifecycle_cost(0.0, 100.0) < 1000.0);
    }

    #[test]
    fn breakdown_is_consistent() {
        let m = model();
        let b = m.breakdown(4.0, 0.0, &year_result(500.0, 100.0));
        assert_eq!(b.capex, 5000.0);
        let parts = b.annual_maintenance + b.annual_import_cost - b.annual_export_revenue;
        assert!((b.annual_opex - parts).abs() < 1e-9);
        assert!((b.lifecycle_cost - (b.capex + 10.0 * b.annual_opex)).abs() < 1e-6);
    }

    #[test]
    fn negative_prices_are_rejected() {
        let mut m = model();
        m.costs.battery_cost_per_kwh = -1.0;
        assert!(m.validate().is_err());
        assert!(model().validate().is_ok());
    }
}
