//! TOML-based scenario configuration and preset definitions.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::economics::{CostModel, CostParameters, Tariffs};
use crate::error::SizingError;
use crate::io::import::load_series_csv;
use crate::optimize::{
    BatteryOption, EvaluationContext, FeasibilityConstraints, ObjectiveKind, OptimizationBounds,
    Optimizer, PatternSearchOptimizer, PenaltyConfig, Resolution, SearchConfig, Strategy,
};
use crate::profiles::{ClearSkyPv, ResidentialLoad, synthesize};
use crate::series::EnergyTimeSeries;
use crate::sim::BatteryTemplate;
use crate::sizing::{Orchestrator, ValidationSettings};

/// Offset applied to the master seed for the PV cloud RNG so that load
/// noise and cloud cover are drawn from different streams.
const PV_SEED_OFFSET: u64 = 7919;

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Where the generation/load series comes from.
    #[serde(default)]
    pub series: SeriesConfig,
    /// Synthetic profile parameters, used when `series.source = "synthetic"`.
    #[serde(default)]
    pub synthetic: SyntheticConfig,
    /// Battery parameters shared by every candidate capacity.
    #[serde(default)]
    pub battery: BatteryTemplate,
    /// Search region.
    #[serde(default)]
    pub bounds: BoundsConfig,
    /// Investment and maintenance costs.
    #[serde(default)]
    pub costs: CostParameters,
    /// Grid import/export prices.
    #[serde(default)]
    pub tariffs: Tariffs,
    /// What the search minimizes.
    #[serde(default)]
    pub objective: ObjectiveConfig,
    /// Search strategy and budget.
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    /// Roof, catalog and self-sufficiency limits.
    #[serde(default)]
    pub constraints: FeasibilityConstraints,
    /// Cross-check tolerance.
    #[serde(default)]
    pub validation: ValidationSettings,
}

/// Series source.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeriesConfig {
    /// `"synthetic"` or `"csv"`.
    pub source: String,
    /// CSV file with `timestamp,generation_kw,load_kw` (required for `"csv"`).
    pub path: Option<PathBuf>,
    /// PV capacity the generation column corresponds to (kWp).
    pub reference_kwp: f64,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            source: "synthetic".to_string(),
            path: None,
            reference_kwp: 1.0,
        }
    }
}

/// Synthetic residential load and clear-sky PV parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyntheticConfig {
    /// First timestamp, RFC 3339 string.
    pub start: DateTime<Utc>,
    /// Number of days to generate (must be > 0).
    pub days: usize,
    /// Samples per day (must divide 86 400 s evenly).
    pub steps_per_day: usize,
    /// Master random seed.
    pub seed: u64,
    /// Average daily consumption (kWh).
    pub daily_load_kwh: f64,
    pub morning_peak_hour: f64,
    pub evening_peak_hour: f64,
    /// Constant share of the load shape.
    pub base_load_ratio: f64,
    /// Multiplicative load noise (standard deviation).
    pub load_noise_std: f64,
    /// Hour of maximum PV output.
    pub pv_peak_hour: f64,
    /// Summer/winter swing (0.0–1.0).
    pub seasonality: f64,
    /// Beta shape of the cloud factor; 0 disables clouds.
    pub cloud_alpha: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            start: DateTime::from_timestamp(1_704_067_200, 0).unwrap_or_default(),
            days: 365,
            steps_per_day: 24,
            seed: 42,
            daily_load_kwh: 10.0,
            morning_peak_hour: 8.0,
            evening_peak_hour: 19.0,
            base_load_ratio: 0.2,
            load_noise_std: 0.2,
            pv_peak_hour: 12.0,
            seasonality: 0.4,
            cloud_alpha: 5.0,
        }
    }
}

/// Search region, expressed as axis ranges with a step or a sample count.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoundsConfig {
    pub pv_kwp_min: f64,
    pub pv_kwp_max: f64,
    /// Lattice spacing on the PV axis (kWp).
    pub pv_step: f64,
    /// Evenly spaced PV values; overrides `pv_step` when set.
    pub pv_samples: Option<usize>,
    pub battery_kwh_min: f64,
    pub battery_kwh_max: f64,
    /// Lattice spacing on the battery axis (kWh).
    pub battery_step: f64,
    /// Evenly spaced battery values; overrides `battery_step` when set.
    pub battery_samples: Option<usize>,
}

impl Default for BoundsConfig {
    fn default() -> Self {
        let d = OptimizationBounds::default();
        Self {
            pv_kwp_min: d.pv_kwp_min,
            pv_kwp_max: d.pv_kwp_max,
            pv_step: 1.0,
            pv_samples: None,
            battery_kwh_min: d.battery_kwh_min,
            battery_kwh_max: d.battery_kwh_max,
            battery_step: 2.5,
            battery_samples: None,
        }
    }
}

impl BoundsConfig {
    pub fn to_bounds(&self) -> OptimizationBounds {
        let resolution = |step: f64, samples: Option<usize>| {
            samples.map_or(Resolution::Step(step), Resolution::Samples)
        };
        OptimizationBounds {
            pv_kwp_min: self.pv_kwp_min,
            pv_kwp_max: self.pv_kwp_max,
            battery_kwh_min: self.battery_kwh_min,
            battery_kwh_max: self.battery_kwh_max,
            pv_resolution: resolution(self.pv_step, self.pv_samples),
            battery_resolution: resolution(self.battery_step, self.battery_samples),
        }
    }
}

/// Objective selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObjectiveConfig {
    /// `"target_self_sufficiency"`, `"minimize_lifecycle_cost"` or `"weighted"`.
    pub kind: String,
    /// Self-sufficiency target (%), used by the target and weighted kinds.
    pub target_pct: f64,
    /// Weight of the squared target deviation (weighted kind).
    pub ss_weight: f64,
    /// Weight of the lifecycle cost (weighted kind).
    pub cost_weight: f64,
    /// Added on top of the objective's ceiling for infeasible candidates.
    pub penalty_margin: f64,
}

impl Default for ObjectiveConfig {
    fn default() -> Self {
        Self {
            kind: "target_self_sufficiency".to_string(),
            target_pct: 80.0,
            ss_weight: 1.0,
            cost_weight: 1.0,
            penalty_margin: PenaltyConfig::default().margin,
        }
    }
}

impl ObjectiveConfig {
    /// Objective kinds accepted in `objective.kind`.
    pub const KINDS: &[&str] = &["target_self_sufficiency", "minimize_lifecycle_cost", "weighted"];

    /// # Errors
    ///
    /// `InvalidConfig` for an unknown kind or out-of-range parameters.
    pub fn to_kind(&self) -> Result<ObjectiveKind, SizingError> {
        let kind = match self.kind.as_str() {
            "target_self_sufficiency" => ObjectiveKind::TargetSelfSufficiency {
                target_pct: self.target_pct,
            },
            "minimize_lifecycle_cost" => ObjectiveKind::MinimizeLifecycleCost,
            "weighted" => ObjectiveKind::WeightedMultiObjective {
                target_pct: self.target_pct,
                ss_weight: self.ss_weight,
                cost_weight: self.cost_weight,
            },
            other => {
                return Err(SizingError::invalid(
                    "objective.kind",
                    format!("must be one of {}, got \"{other}\"", Self::KINDS.join(", ")),
                ));
            }
        };
        kind.validate()?;
        Ok(kind)
    }

    pub fn penalty(&self) -> PenaltyConfig {
        PenaltyConfig {
            margin: self.penalty_margin,
        }
    }
}

/// Search strategy and budget.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    /// `"grid"` or `"pattern"`.
    pub strategy: Strategy,
    /// Starting stride of the pattern search in lattice cells.
    pub initial_stride: Option<usize>,
    pub tie_epsilon: f64,
    pub max_evaluations: Option<usize>,
    /// Wall-clock budget in seconds.
    pub time_budget_secs: Option<f64>,
    /// Grid-sweep worker threads; defaults to the available parallelism.
    pub workers: Option<usize>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            initial_stride: None,
            tie_epsilon: SearchConfig::default().tie_epsilon,
            max_evaluations: None,
            time_budget_secs: None,
            workers: None,
        }
    }
}

impl OptimizerConfig {
    /// # Errors
    ///
    /// `InvalidConfig` for a negative or non-finite time budget, or any
    /// [`SearchConfig::validate`] failure.
    pub fn to_search(&self) -> Result<SearchConfig, SizingError> {
        let time_budget = self
            .time_budget_secs
            .map(|secs| {
                Duration::try_from_secs_f64(secs).map_err(|_| {
                    SizingError::invalid("optimizer.time_budget_secs", "must be a finite value >= 0")
                })
            })
            .transpose()?;
        let defaults = SearchConfig::default();
        let search = SearchConfig {
            tie_epsilon: self.tie_epsilon,
            max_evaluations: self.max_evaluations,
            time_budget,
            workers: self.workers.unwrap_or(defaults.workers),
        };
        search.validate()?;
        Ok(search)
    }

    pub fn to_optimizer(&self) -> Box<dyn Optimizer> {
        match self.strategy {
            Strategy::Pattern if self.initial_stride.is_some() => Box::new(PatternSearchOptimizer {
                initial_stride: self.initial_stride,
            }),
            strategy => strategy.build(),
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"synthetic.steps_per_day"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<SizingError> for ConfigError {
    fn from(err: SizingError) -> Self {
        match err {
            SizingError::InvalidConfig { field, message } => Self { field, message },
            other => Self::new("scenario", other.to_string()),
        }
    }
}

impl From<ConfigError> for SizingError {
    fn from(err: ConfigError) -> Self {
        SizingError::InvalidConfig {
            field: err.field,
            message: err.message,
        }
    }
}

impl ScenarioConfig {
    /// Returns the baseline scenario: one synthetic year, 80 % target.
    pub fn baseline() -> Self {
        Self::default()
    }

    /// Returns the roof-limited preset: small roof, high target, so the
    /// recommendation is capped by the roof.
    pub fn roof_limited() -> Self {
        Self {
            objective: ObjectiveConfig {
                target_pct: 90.0,
                ..ObjectiveConfig::default()
            },
            constraints: FeasibilityConstraints {
                roof_max_kwp: Some(6.0),
                ..FeasibilityConstraints::default()
            },
            ..Self::default()
        }
    }

    /// Returns the high-autarky preset: heavier load, catalog batteries,
    /// weighted objective and a self-sufficiency floor.
    pub fn high_autarky() -> Self {
        Self {
            synthetic: SyntheticConfig {
                daily_load_kwh: 14.0,
                ..SyntheticConfig::default()
            },
            bounds: BoundsConfig {
                pv_kwp_max: 20.0,
                battery_kwh_max: 20.0,
                battery_step: 5.0,
                ..BoundsConfig::default()
            },
            objective: ObjectiveConfig {
                kind: "weighted".to_string(),
                target_pct: 85.0,
                ss_weight: 2.0,
                cost_weight: 1.0,
                ..ObjectiveConfig::default()
            },
            optimizer: OptimizerConfig {
                strategy: Strategy::Pattern,
                ..OptimizerConfig::default()
            },
            constraints: FeasibilityConstraints {
                roof_max_kwp: None,
                battery_catalog: vec![
                    BatteryOption {
                        name: "compact-5".to_string(),
                        capacity_kwh: 5.0,
                        power_kw: 2.5,
                        round_trip_efficiency: Some(0.94),
                    },
                    BatteryOption {
                        name: "home-10".to_string(),
                        capacity_kwh: 10.0,
                        power_kw: 5.0,
                        round_trip_efficiency: Some(0.95),
                    },
                    BatteryOption {
                        name: "home-15".to_string(),
                        capacity_kwh: 15.0,
                        power_kw: 7.5,
                        round_trip_efficiency: Some(0.95),
                    },
                    BatteryOption {
                        name: "max-20".to_string(),
                        capacity_kwh: 20.0,
                        power_kw: 10.0,
                        round_trip_efficiency: None,
                    },
                ],
                min_self_sufficiency_pct: Some(60.0),
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "roof_limited", "high_autarky"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "roof_limited" => Ok(Self::roof_limited()),
            "high_autarky" => Ok(Self::high_autarky()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// A relative `series.path` is resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        let mut cfg = Self::from_toml_str(&content)?;
        if let Some(dir) = path.parent() {
            cfg.series.path = cfg
                .series
                .path
                .take()
                .map(|p| if p.is_relative() { dir.join(p) } else { p });
        }
        Ok(cfg)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut check = |result: Result<(), SizingError>| {
            if let Err(e) = result {
                errors.push(ConfigError::from(e));
            }
        };

        let s = &self.series;
        match s.source.as_str() {
            "synthetic" => {}
            "csv" => {
                if s.path.is_none() {
                    check(Err(SizingError::invalid(
                        "series.path",
                        "required when series.source = \"csv\"",
                    )));
                }
            }
            other => check(Err(SizingError::invalid(
                "series.source",
                format!("must be \"synthetic\" or \"csv\", got \"{other}\""),
            ))),
        }
        if !(s.reference_kwp.is_finite() && s.reference_kwp > 0.0) {
            check(Err(SizingError::invalid("series.reference_kwp", "must be > 0")));
        }

        let syn = &self.synthetic;
        if syn.days == 0 {
            check(Err(SizingError::invalid("synthetic.days", "must be > 0")));
        }
        if syn.steps_per_day == 0 || 86_400 % syn.steps_per_day != 0 {
            check(Err(SizingError::invalid(
                "synthetic.steps_per_day",
                "must divide a day into whole seconds",
            )));
        }
        if !(syn.daily_load_kwh.is_finite() && syn.daily_load_kwh >= 0.0) {
            check(Err(SizingError::invalid("synthetic.daily_load_kwh", "must be >= 0")));
        }
        if !(0.0..=1.0).contains(&syn.seasonality) {
            check(Err(SizingError::invalid("synthetic.seasonality", "must be in [0.0, 1.0]")));
        }

        check(self.battery.validate());
        check(self.bounds.to_bounds().validate());
        check(self.cost_model().validate());
        check(self.objective.to_kind().map(drop));
        check(self.objective.penalty().validate());
        check(self.optimizer.to_search().map(drop));
        check(self.constraints.validate());

        let v = &self.validation;
        if !(v.tolerance_pct.is_finite() && v.tolerance_pct >= 0.0) {
            check(Err(SizingError::invalid("validation.tolerance_pct", "must be >= 0")));
        }

        errors
    }

    pub fn cost_model(&self) -> CostModel {
        CostModel::new(self.costs, self.tariffs)
    }

    /// Loads or synthesizes the scenario's series.
    ///
    /// # Errors
    ///
    /// Import errors for CSV sources, `InvalidConfig` for bad synthetic
    /// parameters.
    pub fn load_series(&self) -> Result<EnergyTimeSeries, SizingError> {
        if self.series.source == "csv" {
            let path = self
                .series
                .path
                .as_deref()
                .ok_or_else(|| SizingError::invalid("series.path", "required for csv source"))?;
            return load_series_csv(path, self.series.reference_kwp);
        }

        let syn = &self.synthetic;
        let mut load = ResidentialLoad::new(
            syn.daily_load_kwh,
            syn.morning_peak_hour,
            syn.evening_peak_hour,
            syn.base_load_ratio,
            syn.load_noise_std,
            syn.seed,
        );
        let mut pv = ClearSkyPv::new(
            self.series.reference_kwp,
            syn.pv_peak_hour,
            syn.seasonality,
            syn.cloud_alpha,
            syn.seed.wrapping_add(PV_SEED_OFFSET),
        );
        synthesize(syn.start, syn.days, syn.steps_per_day, &mut load, &mut pv)
    }

    /// Bundles `series` with the scenario's battery, costs and constraints.
    ///
    /// # Errors
    ///
    /// Any validation error of [`EvaluationContext::new`].
    pub fn context(&self, series: EnergyTimeSeries) -> Result<EvaluationContext, SizingError> {
        EvaluationContext::new(
            series,
            self.battery,
            self.cost_model(),
            self.constraints.clone(),
            self.objective.penalty(),
            self.bounds.to_bounds(),
        )
    }

    /// Builds the sizing pipeline for `series`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for any invalid section.
    pub fn orchestrator(&self, series: EnergyTimeSeries) -> Result<Orchestrator, SizingError> {
        let context = self.context(series)?;
        let objective = self.objective.to_kind()?;
        let search = self.optimizer.to_search()?;
        Ok(
            Orchestrator::new(context, objective, self.optimizer.to_optimizer(), search)
                .with_validation(self.validation),
        )
    }
}
