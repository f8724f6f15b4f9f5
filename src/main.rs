//! pv-sizer entry point: CLI wiring and config-driven pipeline construction.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pv_sizer::SizingError;
use pv_sizer::cli::Cli;
use pv_sizer::io::export::{export_evaluations_csv, export_trace_csv};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let scenario = cli.load_scenario()?;

    let mut errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        let count = errors.len();
        let first = SizingError::from(errors.swap_remove(0));
        return Err(anyhow::Error::new(first)
            .context(format!("scenario has {count} configuration error(s)")));
    }

    let series = scenario.load_series().context("failed to load series")?;
    info!(
        samples = series.len(),
        load_kwh = series.total_load_kwh(),
        "series ready"
    );

    let orchestrator = scenario.orchestrator(series)?;
    let result = orchestrator.run()?;

    println!("{result}");

    let chosen_series = orchestrator.context().series.scaled_to(result.pv_kwp);

    if let Some(path) = &cli.telemetry_out {
        export_trace_csv(&chosen_series, &result.simulation, path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("Telemetry written to {}", path.display());
    }

    if let Some(path) = &cli.trace_out {
        export_evaluations_csv(result.evaluations(), path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("Evaluation trace written to {}", path.display());
    }

    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;
        use std::sync::Arc;

        let state = Arc::new(pv_sizer::api::AppState {
            sizing: result,
            series: chosen_series,
        });
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let rt = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;
        rt.block_on(pv_sizer::api::serve(state, addr))?;
    }

    Ok(())
}
