//! REST API for a finished sizing run.
//!
//! Provides three GET endpoints:
//! - `/sizing`: recommendation, costs and headline metrics
//! - `/simulation`: per-step trace of the recommended system, with optional
//!   range filtering
//! - `/evaluations`: every candidate the search evaluated

mod handlers;
mod types;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::series::EnergyTimeSeries;
use crate::sizing::SizingResult;

pub use types::{ErrorResponse, EvaluationQuery, SimulationQuery, SizingResponse, StepRecord};

/// Immutable application state shared across all request handlers.
///
/// Built once after the sizing run completes and wrapped in `Arc`; all data
/// is read-only.
pub struct AppState {
    pub sizing: SizingResult,
    /// Series scaled to the recommended PV size, aligned with
    /// `sizing.simulation`.
    pub series: EnergyTimeSeries,
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sizing", get(handlers::get_sizing))
        .route("/simulation", get(handlers::get_simulation))
        .route("/evaluations", get(handlers::get_evaluations))
        .with_state(state)
}

/// Binds to `addr` and serves the API until the server stops.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
