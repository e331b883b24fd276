use super::error::ApiError;
use super::AppState;
use crate::auth::bearer_token;
use crate::event_store::event::parse_timestamp;
use crate::event_store::{Event, TimeRange, TrackRequest};
use crate::metrics::Report;
use crate::registration::RegistrationForm;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Serialize)]
pub struct TrackResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// POST /api/track
pub async fn track(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TrackRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TrackResponse>), ApiError> {
    record_event(&state, payload)
        .await
        .inspect_err(|e| e.log("POST /api/track"))?;

    Ok((
        StatusCode::CREATED,
        Json(TrackResponse {
            status: "ok",
            message: "Event tracked",
        }),
    ))
}

async fn record_event(
    state: &AppState,
    payload: Result<Json<TrackRequest>, JsonRejection>,
) -> Result<i64, ApiError> {
    let Json(request) = payload?;
    let event = Event::try_from(request)?;
    let id = state.events.append(&event).await?;
    Ok(id)
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    pub since: Option<String>,
    pub until: Option<String>,
}

impl MetricsQuery {
    fn time_range(&self) -> Result<TimeRange, ApiError> {
        let bound = |raw: &Option<String>| -> Result<_, ApiError> {
            match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                Some(s) => Ok(Some(parse_timestamp(&Value::String(s.to_string()))?)),
                None => Ok(None),
            }
        };

        Ok(TimeRange {
            since: bound(&self.since)?,
            until: bound(&self.until)?,
        })
    }
}

/// GET /api/metrics
pub async fn metrics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MetricsQuery>,
) -> Result<Json<Report>, ApiError> {
    let report = async {
        let range = query.time_range()?;
        let report = state.aggregator.report(state.events.as_ref(), range).await?;
        Ok::<_, ApiError>(report)
    }
    .await
    .inspect_err(|e| e.log("GET /api/metrics"))?;

    Ok(Json(report))
}

/// Middleware guarding the dashboard with the configured credential verifier.
pub async fn require_dashboard_credential(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.verifier.verify(bearer_token(req.headers())) {
        return Ok(next.run(req).await);
    }

    let err = ApiError::Unauthorized;
    err.log("GET /api/metrics");
    Err(err)
}

/// POST /api/registrations
///
/// Uses its own `{result, message}` envelope rather than [`ApiError`].
pub async fn registrations(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegistrationForm>, JsonRejection>,
) -> Response {
    let form = match payload {
        Ok(Json(form)) => form,
        Err(rejection) => {
            log::warn!("⚠️  POST /api/registrations rejected: {}", rejection.body_text());
            return registration_reply(StatusCode::BAD_REQUEST, "error", &rejection.body_text());
        }
    };

    match state.registrations.save_registration(form).await {
        Ok(_) => registration_reply(StatusCode::OK, "success", "Data saved successfully!"),
        Err(e) => {
            log::error!("❌ POST /api/registrations failed: {}", e);
            registration_reply(StatusCode::SERVICE_UNAVAILABLE, "error", "Registration store unavailable")
        }
    }
}

fn registration_reply(status: StatusCode, result: &str, message: &str) -> Response {
    (status, Json(json!({ "result": result, "message": message }))).into_response()
}
