//! HTTP surface
//!
//! | Method | Path                 | Handler                    |
//! |--------|----------------------|----------------------------|
//! | POST   | `/api/track`         | [`handlers::track`]         |
//! | GET    | `/api/metrics`       | [`handlers::metrics`]       |
//! | POST   | `/api/registrations` | [`handlers::registrations`] |

pub mod error;
pub mod handlers;

use crate::auth::CredentialVerifier;
use crate::event_store::EventStore;
use crate::metrics::MetricsAggregator;
use crate::registration::RegistrationStore;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub use error::ApiError;

/// Shared, read-only request state. Handles are injected here once at startup.
pub struct AppState {
    pub events: Arc<dyn EventStore>,
    pub registrations: Arc<dyn RegistrationStore>,
    pub aggregator: MetricsAggregator,
    pub verifier: Box<dyn CredentialVerifier>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let dashboard = Router::new()
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::require_dashboard_credential,
        ));

    let api = Router::new()
        .route("/track", post(handlers::track))
        .route("/registrations", post(handlers::registrations))
        .merge(dashboard);

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verifier_for;
    use crate::event_store::{Event, StoreError, TimeRange};
    use crate::metrics::ReportConfig;
    use crate::registration::RegistrationForm;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct MemoryStore {
        events: Mutex<Vec<Event>>,
        registrations: Mutex<Vec<RegistrationForm>>,
    }

    #[async_trait]
    impl EventStore for MemoryStore {
        async fn append(&self, event: &Event) -> Result<i64, StoreError> {
            let mut events = self.events.lock().unwrap();
            events.push(event.clone());
            Ok(events.len() as i64)
        }

        async fn snapshot(&self, range: TimeRange) -> Result<Vec<Event>, StoreError> {
            let events = self.events.lock().unwrap();
            Ok(events.iter().filter(|e| range.contains(e.timestamp)).cloned().collect())
        }

        fn backend_type(&self) -> &'static str {
            "memory"
        }
    }

    #[async_trait]
    impl RegistrationStore for MemoryStore {
        async fn save_registration(&self, form: RegistrationForm) -> Result<i64, StoreError> {
            let mut rows = self.registrations.lock().unwrap();
            rows.push(form);
            Ok(rows.len() as i64)
        }
    }

    struct DownStore;

    #[async_trait]
    impl EventStore for DownStore {
        async fn append(&self, _event: &Event) -> Result<i64, StoreError> {
            Err(StoreError::Timeout("acquire"))
        }

        async fn snapshot(&self, _range: TimeRange) -> Result<Vec<Event>, StoreError> {
            Err(StoreError::Timeout("query"))
        }

        fn backend_type(&self) -> &'static str {
            "down"
        }
    }

    #[async_trait]
    impl RegistrationStore for DownStore {
        async fn save_registration(&self, _form: RegistrationForm) -> Result<i64, StoreError> {
            Err(StoreError::Pool("closed".to_string()))
        }
    }

    fn app_with(store: Arc<MemoryStore>, token: Option<&str>) -> Router {
        router(Arc::new(AppState {
            events: store.clone(),
            registrations: store,
            aggregator: MetricsAggregator::new(ReportConfig::default()),
            verifier: verifier_for(token),
        }))
    }

    fn down_app() -> Router {
        let store = Arc::new(DownStore);
        router(Arc::new(AppState {
            events: store.clone(),
            registrations: store,
            aggregator: MetricsAggregator::new(ReportConfig::default()),
            verifier: verifier_for(None),
        }))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn page_view(user: &str, session: &str, timestamp: &str) -> Value {
        json!({
            "event_type": "page_view",
            "user_id": user,
            "session_id": session,
            "timestamp": timestamp,
            "event_data": {"url": "/"}
        })
    }

    #[tokio::test]
    async fn test_track_then_metrics() {
        let store = Arc::new(MemoryStore::default());

        for (user, session) in [("A", "1"), ("A", "2"), ("B", "1")] {
            let (status, body) = send(
                app_with(store.clone(), None),
                post_json("/api/track", page_view(user, session, "2024-03-05T10:00:00Z")),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
            assert_eq!(body, json!({"status": "ok", "message": "Event tracked"}));
        }

        let (status, body) = send(app_with(store.clone(), None), get("/api/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["page_views"], 3);
        assert_eq!(body["unique_visitors"], 2);
        assert_eq!(body["sessions"], 2);
        assert_eq!(body["page_views_labels"], json!(["2024-03-05"]));
        assert_eq!(body["page_views_data"], json!([3]));
        assert_eq!(body.as_object().unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_track_rejects_missing_fields() {
        let store = Arc::new(MemoryStore::default());

        for field in ["event_type", "user_id", "session_id", "timestamp"] {
            let mut body = page_view("A", "1", "2024-03-05T10:00:00Z");
            body.as_object_mut().unwrap().remove(field);

            let (status, reply) = send(app_with(store.clone(), None), post_json("/api/track", body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(reply["error"].as_str().unwrap().contains(field));
        }

        assert!(store.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_track_rejects_malformed_json() {
        let store = Arc::new(MemoryStore::default());
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/track")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let (status, reply) = send(app_with(store, None), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(reply["error"].is_string());
    }

    #[tokio::test]
    async fn test_metrics_requires_configured_token() {
        let store = Arc::new(MemoryStore::default());

        let (status, body) = send(app_with(store.clone(), Some("s3cret")), get("/api/metrics")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"error": "Unauthorized"}));

        let wrong = Request::builder()
            .uri("/api/metrics")
            .header(header::AUTHORIZATION, "Bearer nope")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app_with(store.clone(), Some("s3cret")), wrong).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let right = Request::builder()
            .uri("/api/metrics")
            .header(header::AUTHORIZATION, "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app_with(store, Some("s3cret")), right).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["page_views"], 0);
    }

    #[tokio::test]
    async fn test_metrics_time_bounds() {
        let store = Arc::new(MemoryStore::default());
        for ts in ["2024-03-01T00:00:00Z", "2024-03-02T00:00:00Z", "2024-03-03T00:00:00Z"] {
            let (status, _) = send(app_with(store.clone(), None), post_json("/api/track", page_view("A", "1", ts))).await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = send(
            app_with(store.clone(), None),
            get("/api/metrics?since=2024-03-02T00:00:00Z&until=2024-03-03T00:00:00Z"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["page_views"], 1);

        let (status, _) = send(app_with(store, None), get("/api/metrics?since=yesterday")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_store_failure_is_503() {
        let (status, body) = send(
            down_app(),
            post_json("/api/track", page_view("A", "1", "2024-03-05T10:00:00Z")),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, json!({"error": "Event store unavailable"}));

        let (status, _) = send(down_app(), get("/api/metrics")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, body) = send(down_app(), post_json("/api/registrations", json!({"full_name": "Ada"}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["result"], "error");
    }

    #[tokio::test]
    async fn test_cross_origin_requests_allowed() {
        let store = Arc::new(MemoryStore::default());
        let req = Request::builder()
            .uri("/api/metrics")
            .header(header::ORIGIN, "https://landing.example.com")
            .body(Body::empty())
            .unwrap();

        let response = app_with(store.clone(), None).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );

        let preflight = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/track")
            .header(header::ORIGIN, "https://landing.example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = app_with(store, None).oneshot(preflight).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
    }

    #[tokio::test]
    async fn test_registration_saved() {
        let store = Arc::new(MemoryStore::default());

        let (status, body) = send(
            app_with(store.clone(), None),
            post_json(
                "/api/registrations",
                json!({"full_name": "Ada Obi", "email": "ada@example.com", "dependents": "1"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"result": "success", "message": "Data saved successfully!"}));

        let rows = store.registrations.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].dependents, Some(1));
    }

    #[tokio::test]
    async fn test_registration_rejects_bad_body_and_method() {
        let store = Arc::new(MemoryStore::default());

        let (status, body) = send(
            app_with(store.clone(), None),
            post_json("/api/registrations", json!({"dependents": "several"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["result"], "error");

        let (status, _) = send(app_with(store, None), get("/api/registrations")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}
