//! End-to-end tests against a real listener and a real SQLite file
//!
//! Covers the full path: HTTP ingestion, pooled append, snapshot read,
//! aggregation, JSON report, plus the registration table.

#[cfg(test)]
mod api_integration_tests {
    use serde_json::{json, Value};
    use sitepulse::api::{router, AppState};
    use sitepulse::auth::verifier_for;
    use sitepulse::config::StoreConfig;
    use sitepulse::event_store::SqliteStore;
    use sitepulse::metrics::{MetricsAggregator, ReportConfig};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    async fn spawn_server(token: Option<&str>) -> (SocketAddr, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("analytics.db").to_string_lossy());
        let store = Arc::new(SqliteStore::open(config).await.unwrap());

        let state = Arc::new(AppState {
            events: store.clone(),
            registrations: store,
            aggregator: MetricsAggregator::new(ReportConfig::default()),
            verifier: verifier_for(token),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        (addr, dir)
    }

    fn event(event_type: &str, user: &str, session: &str, data: Value) -> Value {
        json!({
            "event_type": event_type,
            "user_id": user,
            "session_id": session,
            "timestamp": "2024-03-05T10:00:00Z",
            "event_data": data
        })
    }

    #[tokio::test]
    async fn test_full_ingestion_to_report_flow() {
        let (addr, _dir) = spawn_server(None).await;
        let client = reqwest::Client::new();
        let base = format!("http://{}", addr);

        let mut events = Vec::new();
        for i in 0..10 {
            events.push(event("page_view", &format!("user{}", i % 4), &format!("s{}", i % 5), json!({"url": "/"})));
        }
        events.push(event("conversion", "user0", "s0", json!({"label": "signup"})));
        events.push(event("conversion", "user1", "s1", json!({})));
        events.push(event("traffic_source", "user0", "s0", json!({"referrer": "google"})));
        events.push(event("traffic_source", "user1", "s1", json!({"referrer": "google"})));
        events.push(event("traffic_source", "user2", "s2", json!({})));
        events.push(event("session_end", "user0", "s0", json!({"duration": 120, "pages": 3, "bounced": false})));
        events.push(event("session_end", "user1", "s1", json!({"duration": 10, "pages": 1, "bounced": true})));

        for body in &events {
            let response = client
                .post(format!("{}/api/track", base))
                .json(body)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status().as_u16(), 201);
        }

        let report: Value = client
            .get(format!("{}/api/metrics", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(report["page_views"], 10);
        assert_eq!(report["unique_visitors"], 4);
        assert_eq!(report["sessions"], 5);
        assert_eq!(report["conversion_rate"], 20.0);
        assert_eq!(report["traffic_sources"], json!({"direct": 1, "google": 2}));
        assert_eq!(report["bounce_rate"], 20.0);
        assert_eq!(report["avg_session_duration"], 65.0);
        assert_eq!(report["pages_per_session"], 2.0);
        assert_eq!(report["page_views_labels"], json!(["2024-03-05"]));
        assert_eq!(report["page_views_data"], json!([10]));

        let again: Value = client
            .get(format!("{}/api/metrics", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(report, again);
    }

    #[tokio::test]
    async fn test_invalid_event_is_not_stored() {
        let (addr, _dir) = spawn_server(None).await;
        let client = reqwest::Client::new();
        let base = format!("http://{}", addr);

        let response = client
            .post(format!("{}/api/track", base))
            .json(&json!({"event_type": "page_view", "user_id": "u1", "timestamp": "2024-03-05"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "missing required field: session_id");

        let report: Value = client
            .get(format!("{}/api/metrics", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(report["page_views"], 0);
        assert_eq!(report["unique_visitors"], 0);
    }

    #[tokio::test]
    async fn test_dashboard_token() {
        let (addr, _dir) = spawn_server(Some("letmein")).await;
        let client = reqwest::Client::new();
        let url = format!("http://{}/api/metrics", addr);

        let response = client.get(&url).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 401);

        let response = client.get(&url).bearer_auth("letmein").send().await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_registration_endpoint() {
        let (addr, _dir) = spawn_server(None).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("http://{}/api/registrations", addr))
            .json(&json!({
                "full_name": "Ada Obi",
                "email": "ada@example.com",
                "coverage_level": "family",
                "dependents": "2",
                "dependents_names": ["Tobi", "Kemi"],
                "total_amount": 45000
            }))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({"result": "success", "message": "Data saved successfully!"}));
    }
}
