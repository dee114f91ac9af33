//! API route definitions.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::{
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::analysis::AnalyticsSnapshot;
use crate::detect::Record;
use crate::storage::{Alert, DEFAULT_ALERT_LIMIT};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/detect", post(detect))
        .route("/threats", get(list_threats))
        .route("/threats/{id}", delete(delete_threat))
        .route("/analytics", get(analytics))
        .route("/alerts", get(list_alerts).post(configure_alerts))
        .route("/stats", get(stats))
        .route("/models/status", get(model_status))
}

pub async fn index() -> Json<Value> {
    Json(json!({
        "service": "threatlens",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/api/health",
            "detect": "/api/detect (POST)",
            "threats": "/api/threats",
            "delete": "/api/threats/{id} (DELETE)",
            "analytics": "/api/analytics",
            "alerts": "/api/alerts",
            "stats": "/api/stats",
            "models": "/api/models/status"
        },
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn detect(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(value) = body.map_err(|_| ApiError::BadRequest("Invalid JSON data".to_string()))?;
    let record = Record::from_value(value)?;

    let threats = state.sentinel.detect_and_record(&record).await?;
    if !threats.is_empty() {
        info!(detected = threats.len(), source = ?record.source_ip(), "threats detected");
    }

    Ok(Json(json!({
        "threats_detected": threats.len(),
        "threats": threats,
        "timestamp": Utc::now().to_rfc3339()
    })))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

async fn list_threats(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<Value> {
    let (threats, total) = state.sentinel.list_with_total(params.limit).await;

    Json(json!({
        "threats": threats,
        "total": total,
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn delete_threat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let (deleted, total) = state.sentinel.remove(&id).await?;

    Ok(Json(json!({
        "message": "Threat deleted successfully",
        "deleted_threat": deleted,
        "total_threats": total
    })))
}

async fn analytics(State(state): State<AppState>) -> Json<AnalyticsSnapshot> {
    Json(state.sentinel.analytics(Utc::now()).await)
}

async fn list_alerts(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<Vec<Alert>> {
    let limit = params.limit.unwrap_or(DEFAULT_ALERT_LIMIT);
    Json(state.sentinel.list_alerts(limit).await)
}

async fn configure_alerts(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(config) = body.map_err(|_| ApiError::BadRequest("Invalid JSON data".to_string()))?;
    let alert = state.sentinel.raise_config_alert(config).await;

    Ok(Json(json!({
        "message": "Alert configuration updated successfully",
        "alert": alert
    })))
}

async fn stats(State(state): State<AppState>) -> Json<Value> {
    let stats = state.sentinel.stats().await;
    Json(json!({
        "threats": {
            "total": stats.total,
            "by_severity": stats.by_severity,
            "by_type": stats.by_type
        },
        "alerts": stats.alerts,
        "timestamp": stats.timestamp.to_rfc3339()
    }))
}

async fn model_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "data": state.sentinel.model_status(),
        "meta": {
            "timestamp": Utc::now().to_rfc3339()
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt; // for `oneshot`

    use crate::api::{router, state::AppState};
    use crate::config::{AnalyticsConfig, DetectionConfig};
    use crate::sentinel::Sentinel;

    fn app_state() -> AppState {
        let detection = DetectionConfig {
            stochastic_probability: 0.0,
            ..DetectionConfig::default()
        };
        AppState::new(Arc::new(Sentinel::new(detection, AnalyticsConfig::default())))
    }

    async fn send(
        state: &AppState,
        method: &str,
        uri: &str,
        body: Option<&str>,
    ) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1_000_000)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let state = app_state();
        let (status, json) = send(&state, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert!(json["version"].is_string());
    }

    #[tokio::test]
    async fn test_detect_records_findings() {
        let state = app_state();
        let (status, json) = send(
            &state,
            "POST",
            "/api/detect",
            Some(r#"{"port": 3389, "source_ip": "10.0.0.5"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["threats_detected"], 2);
        assert_eq!(json["threats"][0]["type"], "suspicious_port");

        let (_, stats) = send(&state, "GET", "/api/stats", None).await;
        assert_eq!(stats["threats"]["total"], 2);
        assert_eq!(stats["threats"]["by_severity"]["medium"], 2);
    }

    #[tokio::test]
    async fn test_detect_rejects_bad_input() {
        let state = app_state();
        let (status, json) = send(&state, "POST", "/api/detect", Some("{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], 400);

        let (status, json) = send(&state, "POST", "/api/detect", Some("not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid JSON data");
    }

    #[tokio::test]
    async fn test_delete_threat_lifecycle() {
        let state = app_state();
        send(&state, "POST", "/api/detect", Some(r#"{"port": 22}"#)).await;

        let (_, list) = send(&state, "GET", "/api/threats", None).await;
        assert_eq!(list["total"], 2);
        let id = list["threats"][0]["id"].as_str().unwrap().to_string();

        let (status, json) = send(&state, "DELETE", &format!("/api/threats/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["deleted_threat"]["id"], id.as_str());
        assert_eq!(json["total_threats"], 1);

        let (status, json) = send(&state, "DELETE", &format!("/api/threats/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Threat not found");
    }

    #[tokio::test]
    async fn test_list_limit_and_analytics() {
        let state = app_state();
        send(&state, "POST", "/api/detect", Some(r#"{"port": 22}"#)).await;
        send(&state, "POST", "/api/detect", Some(r#"{"port": 23}"#)).await;

        let (_, list) = send(&state, "GET", "/api/threats?limit=1", None).await;
        assert_eq!(list["threats"].as_array().unwrap().len(), 1);
        assert_eq!(list["total"], 4);

        let (status, snap) = send(&state, "GET", "/api/analytics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snap["threat_analytics"]["total_threats"], 4);
        assert_eq!(snap["threat_analytics"]["threats_24h"], 4);
        assert_eq!(snap["threat_analytics"]["avg_confidence"], 0.75);
        assert_eq!(snap["real_time_metrics"]["active_alerts"], 0);
    }

    #[tokio::test]
    async fn test_model_status_and_index() {
        let state = app_state();
        let (status, json) = send(&state, "GET", "/api/models/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["detectors"].as_array().unwrap().len(), 5);

        let (status, json) = send(&state, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["service"], "threatlens");
    }

    #[tokio::test]
    async fn test_alerts_post_then_list() {
        let state = app_state();
        let (status, json) = send(&state, "GET", "/api/alerts", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json.as_array().unwrap().is_empty());

        for threshold in [5, 8, 13] {
            let body = format!(r#"{{"threshold": {threshold}}}"#);
            let (status, json) = send(&state, "POST", "/api/alerts", Some(&body)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["message"], "Alert configuration updated successfully");
            assert_eq!(json["alert"]["type"], "configuration_update");
        }

        let (_, json) = send(&state, "GET", "/api/alerts?limit=2", None).await;
        let alerts = json.as_array().unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0]["config"]["threshold"], 8);
        assert_eq!(alerts[1]["config"]["threshold"], 13);
        assert_eq!(alerts[1]["severity"], "info");

        let (_, stats) = send(&state, "GET", "/api/stats", None).await;
        assert_eq!(stats["alerts"]["total"], 3);
        assert_eq!(stats["alerts"]["recent"], 3);

        let (_, snap) = send(&state, "GET", "/api/analytics", None).await;
        assert_eq!(snap["real_time_metrics"]["active_alerts"], 3);
    }

    #[tokio::test]
    async fn test_alerts_reject_bad_json() {
        let state = app_state();
        let (status, json) = send(&state, "POST", "/api/alerts", Some("{oops")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid JSON data");

        let (_, json) = send(&state, "GET", "/api/alerts", None).await;
        assert!(json.as_array().unwrap().is_empty());
    }
}
