use std::path::PathBuf;

use clap::Parser;

use crate::config::{ConfigError, ScenarioConfig};

/// PV + battery sizing: simulates candidate systems over a generation/load
/// series and recommends PV and battery capacities.
#[derive(Debug, Parser)]
#[command(name = "pv-sizer", version)]
pub struct Cli {
    /// Load scenario from TOML config file
    #[arg(long, value_name = "PATH", conflicts_with = "preset")]
    pub scenario: Option<PathBuf>,

    /// Use a built-in preset (baseline, roof_limited, high_autarky)
    #[arg(long, value_name = "NAME")]
    pub preset: Option<String>,

    /// Override the synthetic profile seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Read the series from a CSV file instead of the scenario's source
    #[arg(long, value_name = "PATH")]
    pub series: Option<PathBuf>,

    /// PV capacity the CSV generation column corresponds to (kWp)
    #[arg(long, requires = "series")]
    pub reference_kwp: Option<f64>,

    /// Export the recommended system's per-step trace to CSV
    #[arg(long, value_name = "PATH")]
    pub telemetry_out: Option<PathBuf>,

    /// Export every optimizer evaluation to CSV
    #[arg(long, value_name = "PATH")]
    pub trace_out: Option<PathBuf>,

    /// Start REST API server after sizing
    #[cfg(feature = "api")]
    #[arg(long)]
    pub serve: bool,

    /// API server port
    #[cfg(feature = "api")]
    #[arg(long, default_value_t = 3000)]
    pub port: u16,
}

impl Cli {
    /// Resolves the scenario (`--scenario`, then `--preset`, then the
    /// baseline) and applies the command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be parsed or the preset is
    /// unknown.
    pub fn load_scenario(&self) -> Result<ScenarioConfig, ConfigError> {
        let mut scenario = if let Some(path) = &self.scenario {
            ScenarioConfig::from_toml_file(path)?
        } else if let Some(name) = &self.preset {
            ScenarioConfig::from_preset(name)?
        } else {
            ScenarioConfig::baseline()
        };

        if let Some(seed) = self.seed {
            scenario.synthetic.seed = seed;
        }
        if let Some(path) = &self.series {
            scenario.series.source = "csv".to_string();
            scenario.series.path = Some(path.clone());
        }
        if let Some(kwp) = self.reference_kwp {
            scenario.series.reference_kwp = kwp;
        }
        Ok(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_preset_cli() {
        let cli = Cli::try_parse_from(["pv-sizer", "--preset", "roof_limited"]).unwrap();
        assert_eq!(cli.preset.as_deref(), Some("roof_limited"));
        let scenario = cli.load_scenario().unwrap();
        assert_eq!(scenario.constraints.roof_max_kwp, Some(6.0));
    }

    #[test]
    fn scenario_and_preset_are_exclusive() {
        let parsed = Cli::try_parse_from([
            "pv-sizer",
            "--scenario",
            "site.toml",
            "--preset",
            "baseline",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn overrides_apply_on_top_of_baseline() {
        let cli = Cli::try_parse_from([
            "pv-sizer",
            "--seed",
            "9",
            "--series",
            "meter.csv",
            "--reference-kwp",
            "4.5",
        ])
        .unwrap();
        let scenario = cli.load_scenario().unwrap();
        assert_eq!(scenario.synthetic.seed, 9);
        assert_eq!(scenario.series.source, "csv");
        assert_eq!(scenario.series.path, Some(PathBuf::from("meter.csv")));
        assert_eq!(scenario.series.reference_kwp, 4.5);
    }

    #[test]
    fn reference_kwp_requires_series() {
        assert!(Cli::try_parse_from(["pv-sizer", "--reference-kwp", "2"]).is_err());
    }

    #[test]
    fn unknown_preset_is_reported() {
        let cli = Cli::try_parse_from(["pv-sizer", "--preset", "nope"]).unwrap();
        let err = cli.load_scenario().unwrap_err();
        assert_eq!(err.field, "preset");
    }
}
