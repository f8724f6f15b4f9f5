//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::AppState;
use super::types::{ErrorResponse, EvaluationQuery, SimulationQuery, SizingResponse, StepRecord};
use crate::optimize::CandidatePoint;

/// `GET /sizing` → 200 + `SizingResponse` JSON
pub async fn get_sizing(State(state): State<Arc<AppState>>) -> Json<SizingResponse> {
    Json(SizingResponse::from(&state.sizing))
}

/// Returns the recommended system's trace, optionally filtered by step range.
///
/// `GET /simulation` → 200 + `Vec<StepRecord>` JSON
/// `GET /simulation?from=N&to=M` → filtered range (inclusive)
/// `GET /simulation?from=10&to=5` → 400 + `ErrorResponse`
pub async fn get_simulation(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SimulationQuery>,
) -> impl IntoResponse {
    let from = query.from.unwrap_or(0);
    let to = query.to.unwrap_or(usize::MAX);

    if from > to {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("`from` ({from}) must be <= `to` ({to})"),
            }),
        ));
    }

    let trace = &state.sizing.simulation;
    let steps = state.series.len().min(trace.len());
    let records: Vec<StepRecord> = state
        .series
        .samples()
        .iter()
        .enumerate()
        .take(steps)
        .filter(|(i, _)| *i >= from && *i <= to)
        .map(|(i, sample)| StepRecord::new(i, sample, trace))
        .collect();

    Ok(Json(records))
}

/// `GET /evaluations` → 200 + `Vec<CandidatePoint>` JSON, baseline first
/// `GET /evaluations?feasible=true` → feasible candidates only
pub async fn get_evaluations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EvaluationQuery>,
) -> Json<Vec<CandidatePoint>> {
    let points = state
        .sizing
        .evaluations()
        .filter(|p| query.feasible.is_none_or(|f| p.feasible == f))
        .copied()
        .collect();
    Json(points)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{TimeDelta, TimeZone, Utc};
    use tower::util::ServiceExt;

    use super::*;
    use crate::api::router;
    use crate::economics::CostModel;
    use crate::optimize::{
        EvaluationContext, FeasibilityConstraints, ObjectiveKind, OptimizationBounds,
        PenaltyConfig, Resolution, SearchConfig, Strategy,
    };
    use crate::series::EnergyTimeSeries;
    use crate::sim::BatteryTemplate;
    use crate::sizing::Orchestrator;

    fn make_test_state() -> Arc<AppState> {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let generation: Vec<f64> = (0..24)
            .map(|h| if (8..16).contains(&h) { 1.0 } else { 0.0 })
            .collect();
        let load = vec![0.5; 24];
        let series =
            EnergyTimeSeries::uniform(start, TimeDelta::hours(1), &generation, &load, 1.0).unwrap();
        let bounds = OptimizationBounds {
            pv_kwp_min: 1.0,
            pv_kwp_max: 3.0,
            battery_kwh_min: 0.0,
            battery_kwh_max: 4.0,
            pv_resolution: Resolution::Step(1.0),
            battery_resolution: Resolution::Step(2.0),
        };
        let context = EvaluationContext::new(
            series,
            BatteryTemplate::default(),
            CostModel::default(),
            FeasibilityConstraints::default(),
            PenaltyConfig::default(),
            bounds,
        )
        .unwrap();
        let orchestrator = Orchestrator::new(
            context,
            ObjectiveKind::TargetSelfSufficiency { target_pct: 90.0 },
            Strategy::Grid.build(),
            SearchConfig {
                workers: 2,
                ..SearchConfig::default()
            },
        );
        let sizing = orchestrator.run().unwrap();
        let series = orchestrator.context().series.scaled_to(sizing.pv_kwp);
        Arc::new(AppState { sizing, series })
    }

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let app = router(make_test_state());
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn sizing_returns_200() {
        let (status, json) = get_json("/sizing").await;
        assert_eq!(status, StatusCode::OK);
        assert!(json.get("pv_kwp").is_some());
        assert!(json.get("recommendation").is_some());
        assert_eq!(json["evaluations"].as_u64(), Some(9 + 3));
    }

    #[tokio::test]
    async fn simulation_returns_all_steps() {
        let (status, json) = get_json("/simulation").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().map(Vec::len), Some(24));
    }

    #[tokio::test]
    async fn simulation_range_query() {
        let (status, json) = get_json("/simulation?from=5&to=10").await;
        assert_eq!(status, StatusCode::OK);
        let steps = json.as_array().unwrap();
        assert_eq!(steps.len(), 6);
        assert_eq!(steps[0]["step"].as_u64(), Some(5));
    }

    #[tokio::test]
    async fn simulation_inverted_range_is_400() {
        let (status, json) = get_json("/simulation?from=10&to=5").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("from"));
    }

    #[tokio::test]
    async fn evaluations_filter_by_feasibility() {
        let (_, all) = get_json("/evaluations").await;
        let (_, feasible) = get_json("/evaluations?feasible=true").await;
        assert_eq!(all.as_array().map(Vec::len), Some(12));
        assert_eq!(feasible.as_array().map(Vec::len), Some(12));
    }
}
