use serde::{Deserialize, Serialize};

use crate::error::SizingError;

/// Which leg of a charge/discharge cycle absorbs the round-trip losses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossSplit {
    /// `sqrt(rte)` on both legs.
    #[default]
    Symmetric,
    /// All losses on the way in; discharge is lossless.
    ChargeSide,
    /// All losses on the way out; charge is lossless.
    DischargeSide,
}

impl LossSplit {
    /// Returns `(eta_charge, eta_discharge)` whose product is `rte`.
    pub fn leg_efficiencies(self, rte: f64) -> (f64, f64) {
        match self {
            LossSplit::Symmetric => {
                let leg = rte.sqrt();
                (leg, leg)
            }
            LossSplit::ChargeSide => (rte, 1.0),
            LossSplit::DischargeSide => (1.0, rte),
        }
    }
}

/// Static parameters of an ideal capacity- and power-limited battery.
///
/// A `capacity_kwh` of zero describes "no battery": the dispatch passes
/// every surplus and deficit straight to the grid and `power_kw` is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryConfig {
    /// Nominal capacity in kWh (>= 0).
    pub capacity_kwh: f64,
    /// Symmetric charge/discharge power limit in kW (> 0).
    pub power_kw: f64,
    /// Round-trip efficiency in `(0, 1]`.
    pub round_trip_efficiency: f64,
    /// Lower SOC bound as a fraction of capacity, in `[0, 1)`.
    pub min_soc_fraction: f64,
    /// Upper SOC bound as a fraction of capacity, in `(min, 1]`.
    pub max_soc_fraction: f64,
    /// SOC at the start of the horizon, in `[min, max]`.
    pub initial_soc_fraction: f64,
    #[serde(default)]
    pub loss_split: LossSplit,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            capacity_kwh: 0.0,
            power_kw: 1.0,
            round_trip_efficiency: 0.95,
            min_soc_fraction: 0.10,
            max_soc_fraction: 1.0,
            initial_soc_fraction: 0.10,
            loss_split: LossSplit::Symmetric,
        }
    }
}

impl BatteryConfig {
    /// Default battery parameters with the given size and power.
    pub fn new(capacity_kwh: f64, power_kw: f64) -> Self {
        Self {
            capacity_kwh,
            power_kw,
            ..Self::default()
        }
    }

    /// Checks every invariant, reporting the first violation.
    pub fn validate(&self) -> Result<(), SizingError> {
        let in_range = |v: f64, lo: f64, hi: f64| v.is_finite() && v >= lo && v <= hi;

        if !(self.capacity_kwh.is_finite() && self.capacity_kwh >= 0.0) {
            return Err(SizingError::invalid("battery.capacity_kwh", "must be >= 0"));
        }
        if self.capacity_kwh > 0.0 && !(self.power_kw.is_finite() && self.power_kw > 0.0) {
            return Err(SizingError::invalid("battery.power_kw", "must be > 0"));
        }
        if !(self.round_trip_efficiency.is_finite()
            && self.round_trip_efficiency > 0.0
            && self.round_trip_efficiency <= 1.0)
        {
            return Err(SizingError::invalid(
                "battery.round_trip_efficiency",
                "must be in (0, 1]",
            ));
        }
        if !in_range(self.min_soc_fraction, 0.0, 1.0) || self.min_soc_fraction >= 1.0 {
            return Err(SizingError::invalid(
                "battery.min_soc_fraction",
                "must be in [0, 1)",
            ));
        }
        if !in_range(self.max_soc_fraction, 0.0, 1.0)
            || self.max_soc_fraction <= self.min_soc_fraction
        {
            return Err(SizingError::invalid(
                "battery.max_soc_fraction",
                "must be in (min_soc_fraction, 1]",
            ));
        }
        if !in_range(
            self.initial_soc_fraction,
            self.min_soc_fraction,
            self.max_soc_fraction,
        ) {
            return Err(SizingError::invalid(
                "battery.initial_soc_fraction",
                "must be within [min_soc_fraction, max_soc_fraction]",
            ));
        }
        Ok(())
    }

    pub fn min_soc_kwh(&self) -> f64 {
        self.min_soc_fraction * self.capacity_kwh
    }

    pub fn max_soc_kwh(&self) -> f64 {
        self.max_soc_fraction * self.capacity_kwh
    }
}

/// Battery parameters shared by every candidate size during a search.
///
/// Power is derived from capacity via `c_rate` unless a catalog option
/// supplies its own rating.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BatteryTemplate {
    pub round_trip_efficiency: f64,
    pub min_soc_fraction: f64,
    pub max_soc_fraction: f64,
    pub initial_soc_fraction: f64,
    pub loss_split: LossSplit,
    /// Power per kWh of capacity (1/h).
    pub c_rate: f64,
}

impl Default for BatteryTemplate {
    fn default() -> Self {
        let base = BatteryConfig::default();
        Self {
            round_trip_efficiency: base.round_trip_efficiency,
            min_soc_fraction: base.min_soc_fraction,
            max_soc_fraction: base.max_soc_fraction,
            initial_soc_fraction: base.initial_soc_fraction,
            loss_split: base.loss_split,
            c_rate: 0.5,
        }
    }
}

impl BatteryTemplate {
    /// Concrete battery of `capacity_kwh` with `power_kw` and `rte`.
    pub fn with_rating(&self, capacity_kwh: f64, power_kw: f64, rte: f64) -> BatteryConfig {
        BatteryConfig {
            capacity_kwh,
            power_kw,
            round_trip_efficiency: rte,
            min_soc_fraction: self.min_soc_fraction,
            max_soc_fraction: self.max_soc_fraction,
            initial_soc_fraction: self.initial_soc_fraction,
            loss_split: self.loss_split,
        }
    }

    /// Concrete battery of `capacity_kwh` rated at the template C-rate.
    pub fn sized(&self, capacity_kwh: f64) -> BatteryConfig {
        self.with_rating(
            capacity_kwh,
            capacity_kwh * self.c_rate,
            self.round_trip_efficiency,
        )
    }

    /// Validates the template through a representative 1 kWh battery.
    pub fn validate(&self) -> Result<(), SizingError> {
        if !(self.c_rate.is_finite() && self.c_rate > 0.0) {
            return Err(SizingError::invalid("battery.c_rate", "must be > 0"));
        }
        self.sized(1.0).validate()
    }
}

/// Mutable state of one battery over one simulation run.
#[derive(Debug, Clone)]
pub struct BatteryState {
    /// Stored energy in kWh.
    pub soc_kwh: f64,
    /// Energy accepted at the terminals (kWh).
    pub cumulative_charge_kwh: f64,
    /// Energy drawn from storage (kWh).
    pub cumulative_discharge_kwh: f64,
    floor_kwh: f64,
    ceiling_kwh: f64,
    power_kw: f64,
    eta_c: f64,
    eta_d: f64,
}

/// Energy moved by one call to [`BatteryState::charge`] or
/// [`BatteryState::discharge`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Transfer {
    /// Terminal-side power in kW (taken in when charging, delivered when
    /// discharging).
    pub terminal_kw: f64,
    /// Storage-side power in kW (stored when charging, drawn when
    /// discharging).
    pub storage_kw: f64,
    /// Energy lost to conversion this step (kWh).
    pub loss_kwh: f64,
}

impl BatteryState {
    /// Initial state for a validated `config`.
    pub fn new(config: &BatteryConfig) -> Self {
        let (eta_c, eta_d) = config
            .loss_split
            .leg_efficiencies(config.round_trip_efficiency);
        Self {
            soc_kwh: config.initial_soc_fraction * config.capacity_kwh,
            cumulative_charge_kwh: 0.0,
            cumulative_discharge_kwh: 0.0,
            floor_kwh: config.min_soc_kwh(),
            ceiling_kwh: config.max_soc_kwh(),
            power_kw: if config.capacity_kwh > 0.0 {
                config.power_kw
            } else {
                0.0
            },
            eta_c,
            eta_d,
        }
    }

    /// Absorbs up to `surplus_kw` for `dt_hours`.
    ///
    /// SOC lands exactly on the ceiling when headroom is the binding limit.
    pub fn charge(&mut self, surplus_kw: f64, dt_hours: f64) -> Transfer {
        let headroom_kwh = (self.ceiling_kwh - self.soc_kwh).max(0.0);
        if surplus_kw <= 0.0 || headroom_kwh <= 0.0 || self.power_kw <= 0.0 {
            return Transfer::default();
        }

        let headroom_kw = headroom_kwh / (dt_hours * self.eta_c);
        let terminal_kw = surplus_kw.min(self.power_kw).min(headroom_kw);
        let stored_kwh = if terminal_kw >= headroom_kw {
            headroom_kwh
        } else {
            terminal_kw * dt_hours * self.eta_c
        };

        self.soc_kwh = if stored_kwh == headroom_kwh {
            self.ceiling_kwh
        } else {
            self.soc_kwh + stored_kwh
        };
        let taken_kwh = terminal_kw * dt_hours;
        self.cumulative_charge_kwh += taken_kwh;

        Transfer {
            terminal_kw,
            storage_kw: stored_kwh / dt_hours,
            loss_kwh: taken_kwh - stored_kwh,
        }
    }

    /// Covers up to `deficit_kw` for `dt_hours`.
    ///
    /// SOC lands exactly on the floor when available energy is the binding
    /// limit.
    pub fn discharge(&mut self, deficit_kw: f64, dt_hours: f64) -> Transfer {
        let available_kwh = (self.soc_kwh - self.floor_kwh).max(0.0);
        if deficit_kw <= 0.0 || available_kwh <= 0.0 || self.power_kw <= 0.0 {
            return Transfer::default();
        }

        let available_kw = available_kwh / dt_hours;
        let storage_kw = (deficit_kw / self.eta_d)
            .min(self.power_kw)
            .min(available_kw);
        let drawn_kwh = if storage_kw >= available_kw {
            available_kwh
        } else {
            storage_kw * dt_hours
        };

        self.soc_kwh = if drawn_kwh == available_kwh {
            self.floor_kwh
        } else {
            self.soc_kwh - drawn_kwh
        };
        self.cumulative_discharge_kwh += drawn_kwh;
        let delivered_kwh = drawn_kwh * self.eta_d;

        Transfer {
            terminal_kw: delivered_kwh / dt_hours,
            storage_kw: drawn_kwh / dt_hours,
            loss_kwh: drawn_kwh - delivered_kwh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ideal(capacity_kwh: f64, power_kw: f64) -> BatteryConfig {
        BatteryConfig {
            capacity_kwh,
            power_kw,
            round_trip_efficiency: 1.0,
            min_soc_fraction: 0.0,
            max_soc_fraction: 1.0,
            initial_soc_fraction: 0.0,
            loss_split: LossSplit::Symmetric,
        }
    }

    #[test]
    fn default_config_is_valid() {
        BatteryConfig::new(10.0, 5.0).validate().unwrap();
    }

    #[test]
    fn zero_capacity_is_valid_and_ignores_power() {
        BatteryConfig::new(0.0, 0.0).validate().unwrap();
    }

    #[test]
    fn rejects_bad_parameters() {
        let cases = [
            BatteryConfig::new(-1.0, 5.0),
            BatteryConfig::new(10.0, 0.0),
            BatteryConfig {
                round_trip_efficiency: 0.0,
                ..BatteryConfig::new(10.0, 5.0)
            },
            BatteryConfig {
                round_trip_efficiency: 1.2,
                ..BatteryConfig::new(10.0, 5.0)
            },
            BatteryConfig {
                min_soc_fraction: 0.5,
                max_soc_fraction: 0.5,
                initial_soc_fraction: 0.5,
                ..BatteryConfig::new(10.0, 5.0)
            },
            BatteryConfig {
                initial_soc_fraction: 0.05,
                ..BatteryConfig::new(10.0, 5.0)
            },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "{config:?} should be rejected");
        }
    }

    #[test]
    fn template_derives_power_from_c_rate() {
        let template = BatteryTemplate::default();
        template.validate().unwrap();
        let config = template.sized(10.0);
        assert_eq!(config.power_kw, 5.0);
        assert_eq!(config.round_trip_efficiency, 0.95);

        let bad = BatteryTemplate {
            c_rate: 0.0,
            ..template
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn symmetric_split_multiplies_to_rte() {
        let (c, d) = LossSplit::Symmetric.leg_efficiencies(0.81);
        assert!((c - 0.9).abs() < 1e-12);
        assert!((d - 0.9).abs() < 1e-12);
        assert_eq!(LossSplit::ChargeSide.leg_efficiencies(0.8), (0.8, 1.0));
        assert_eq!(LossSplit::DischargeSide.leg_efficiencies(0.8), (1.0, 0.8));
    }

    #[test]
    fn charge_is_power_limited() {
        let mut state = BatteryState::new(&ideal(10.0, 2.0));
        let t = state.charge(5.0, 1.0);
        assert_eq!(t.terminal_kw, 2.0);
        assert_eq!(state.soc_kwh, 2.0);
    }

    #[test]
    fn charge_fills_exactly_to_ceiling() {
        let config = BatteryConfig {
            round_trip_efficiency: 0.9,
            initial_soc_fraction: 0.95,
            min_soc_fraction: 0.0,
            ..BatteryConfig::new(10.0, 5.0)
        };
        let mut state = BatteryState::new(&config);
        state.charge(5.0, 1.0);
        assert_eq!(state.soc_kwh, 10.0);
        assert_eq!(state.charge(5.0, 1.0), Transfer::default());
    }

    #[test]
    fn discharge_stops_at_floor() {
        let config = BatteryConfig {
            min_soc_fraction: 0.2,
            initial_soc_fraction: 0.3,
            ..ideal(10.0, 5.0)
        };
        let mut state = BatteryState::new(&config);
        let t = state.discharge(4.0, 1.0);
        assert_eq!(t.terminal_kw, 1.0);
        assert_eq!(state.soc_kwh, 2.0);
        assert_eq!(state.cumulative_discharge_kwh, 1.0);
    }

    #[test]
    fn losses_account_for_both_legs() {
        let config = BatteryConfig {
            round_trip_efficiency: 0.81,
            initial_soc_fraction: 0.0,
            min_soc_fraction: 0.0,
            ..BatteryConfig::new(100.0, 10.0)
        };
        let mut state = BatteryState::new(&config);
        let c = state.charge(10.0, 1.0);
        assert!((c.loss_kwh - 1.0).abs() < 1e-9);
        assert!((state.soc_kwh - 9.0).abs() < 1e-9);

        let d = state.discharge(100.0, 1.0);
        assert!((d.terminal_kw - 8.1).abs() < 1e-9);
        assert!((d.loss_kwh - 0.9).abs() < 1e-9);
        assert!(state.soc_kwh.abs() < 1e-9);
    }

    #[test]
    fn empty_battery_is_a_no_op() {
        let mut state = BatteryState::new(&ideal(0.0, 5.0));
        assert_eq!(state.charge(3.0, 1.0), Transfer::default());
        assert_eq!(state.discharge(3.0, 1.0), Transfer::default());
    }
}
