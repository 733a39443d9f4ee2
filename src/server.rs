//! Operator HTTP endpoints: Prometheus scraping, poller status and the
//! catalog maintenance calls.

use crate::enrichment::{EnrichmentOrchestrator, IngestError};
use crate::metrics;
use crate::poller::{PollingService, ServiceStatus};
use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Clone)]
pub struct ServerState {
    pub start_time: Instant,
    pub hash: String,
    pub service: Arc<PollingService>,
    pub orchestrator: Arc<EnrichmentOrchestrator>,
}

impl ServerState {
    pub fn new(service: Arc<PollingService>, orchestrator: Arc<EnrichmentOrchestrator>) -> Self {
        Self {
            start_time: Instant::now(),
            hash: env!("GIT_HASH").to_string(),
            service,
            orchestrator,
        }
    }
}

#[derive(Serialize)]
struct StatusResponse {
    uptime: String,
    hash: String,
    #[serde(flatten)]
    service: ServiceStatus,
}

#[derive(Deserialize)]
struct LovedBody {
    loved: bool,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

fn ingest_error_response(err: IngestError) -> Response {
    match err {
        IngestError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()).into_response(),
        other => {
            error!("Catalog request failed: {}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response()
        }
    }
}

async fn get_metrics(State(state): State<ServerState>) -> Response {
    // Catalog sizes are refreshed on scrape
    match state.orchestrator.store().counts() {
        Ok(counts) => metrics::set_catalog_counts(&counts),
        Err(e) => error!("Failed to count catalog rows: {:#}", e),
    }

    match metrics::encode() {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn get_status(State(state): State<ServerState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        service: state.service.status().await,
    })
}

async fn start_polling(State(state): State<ServerState>) -> StatusCode {
    if state.service.start().await {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    }
}

async fn stop_polling(State(state): State<ServerState>) -> StatusCode {
    if state.service.stop().await {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    }
}

async fn set_event_loved(
    State(state): State<ServerState>,
    Path(event_id): Path<i64>,
    Json(body): Json<LovedBody>,
) -> Response {
    match state.orchestrator.set_loved(event_id, body.loved) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => ingest_error_response(e),
    }
}

async fn refresh_album(State(state): State<ServerState>, Path(album_id): Path<i64>) -> Response {
    match state.orchestrator.refresh_album(album_id).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => ingest_error_response(e),
    }
}

pub fn make_app(state: ServerState) -> Router {
    Router::new()
        .route("/metrics", get(get_metrics))
        .route("/status", get(get_status))
        .route("/polling/start", post(start_polling))
        .route("/polling/stop", post(stop_polling))
        .route("/events/{id}/loved", put(set_event_loved))
        .route("/albums/{id}/refresh", post(refresh_album))
        .with_state(state)
}

/// Serves the operator endpoints until `shutdown_token` is cancelled.
pub async fn run_server(
    port: u16,
    state: ServerState,
    shutdown_token: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Status and metrics available at port {}", port);

    axum::serve(listener, make_app(state))
        .with_graceful_shutdown(shutdown_token.cancelled_owned())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::{CatalogStore, NewListeningEvent, SqliteCatalogStore};
    use crate::clock::ManualClock;
    use crate::enrichment::{EnrichmentSettings, Providers};
    use crate::listening::ArtistMatcher;
    use crate::resilience::{CircuitBreakerConfig, ResilientCaller, RetryPolicy};

    fn state() -> ServerState {
        let clock = Arc::new(ManualClock::at_timestamp(1_000));
        let store = Arc::new(SqliteCatalogStore::in_memory().unwrap());
        let orchestrator = Arc::new(EnrichmentOrchestrator::new(
            store,
            Providers::default(),
            ResilientCaller::new(
                RetryPolicy::immediate(1),
                CircuitBreakerConfig::default(),
                clock.clone(),
            ),
            ArtistMatcher::Exact,
            clock.clone(),
            EnrichmentSettings::default(),
        ));
        let service = Arc::new(PollingService::new(vec![], orchestrator.clone(), clock));
        ServerState::new(service, orchestrator)
    }

    async fn serve(state: ServerState) -> (String, CancellationToken) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let token = CancellationToken::new();
        let shutdown = token.clone();
        tokio::spawn(async move {
            axum::serve(listener, make_app(state))
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
                .unwrap();
        });
        (base, token)
    }

    #[test]
    fn formats_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(
            format_uptime(Duration::from_secs(86_400 + 3600 * 2 + 60 * 3 + 4)),
            "1d 02:03:04"
        );
    }

    #[tokio::test]
    async fn serves_status_and_metrics() {
        metrics::init_metrics();
        let (base, token) = serve(state()).await;
        let client = reqwest::Client::new();

        let status: serde_json::Value = client
            .get(format!("{}/status", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["running"], false);
        assert!(status["pollers"].as_array().unwrap().is_empty());
        assert!(status["uptime"].as_str().unwrap().starts_with("0d"));

        let response = client.get(format!("{}/metrics", base)).send().await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let text = response.text().await.unwrap();
        assert!(text.contains("listenlog_catalog_items_total"));

        token.cancel();
    }

    #[tokio::test]
    async fn start_and_stop_report_conflicts() {
        let (base, token) = serve(state()).await;
        let client = reqwest::Client::new();

        let stop = client.post(format!("{}/polling/stop", base)).send().await.unwrap();
        assert_eq!(stop.status(), reqwest::StatusCode::CONFLICT);
        let start = client.post(format!("{}/polling/start", base)).send().await.unwrap();
        assert_eq!(start.status(), reqwest::StatusCode::OK);
        let again = client.post(format!("{}/polling/start", base)).send().await.unwrap();
        assert_eq!(again.status(), reqwest::StatusCode::CONFLICT);
        let stop = client.post(format!("{}/polling/stop", base)).send().await.unwrap();
        assert_eq!(stop.status(), reqwest::StatusCode::OK);

        token.cancel();
    }

    #[tokio::test]
    async fn loved_toggle_and_missing_rows() {
        let state = state();
        let store = state.orchestrator.store().clone();
        let artist = store.create_artist("Can").unwrap();
        let album = store.create_album("Tago Mago", &[artist.id]).unwrap();
        let track = store.create_track("Halleluhwah", album.id, None).unwrap();
        let event = store
            .append_listening_event(&NewListeningEvent {
                track_id: track.id,
                timestamp: 1_000,
                source: "bridge".to_string(),
                context: None,
            })
            .unwrap();

        let (base, token) = serve(state).await;
        let client = reqwest::Client::new();

        let response = client
            .put(format!("{}/events/{}/loved", base, event.id))
            .json(&serde_json::json!({ "loved": true }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);

        let response = client
            .put(format!("{}/events/9999/loved", base))
            .json(&serde_json::json!({ "loved": true }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

        let response = client
            .post(format!("{}/albums/9999/refresh", base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

        let response = client
            .post(format!("{}/albums/{}/refresh", base, album.id))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        token.cancel();
    }
}
