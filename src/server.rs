//! HTTP transport: discovery runs as Server-Sent Event streams
//!
//! One route per operation. `/discover` admits a run and streams its events
//! until the terminal one; a busy session is a 409, never a queue. The
//! server also owns the periodic stale-session sweep.

use crate::discovery::DiscoveryService;
use crate::session::SessionError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::Stream;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Errors from server startup.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server i/o error")]
    Serve(#[from] std::io::Error),
}

#[derive(Clone)]
struct AppState {
    service: Arc<DiscoveryService>,
}

#[derive(Debug, Deserialize)]
struct DiscoverRequest {
    session: String,
    question: String,
}

#[derive(Debug, Deserialize)]
struct InterruptRequest {
    session: String,
}

/// Build the application router.
pub fn router(service: Arc<DiscoveryService>) -> Router {
    Router::new()
        .route("/discover", post(discover))
        .route("/interrupt", post(interrupt))
        .route("/status/:session", get(session_status))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { service })
}

/// Bind and serve until shutdown, sweeping stale sessions in the background.
pub async fn serve(service: Arc<DiscoveryService>, port: u16) -> Result<(), ServerError> {
    let sessions = service.sessions();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let swept = sessions.sweep();
            if swept > 0 {
                tracing::info!(swept, "stale sessions reclaimed");
            }
        }
    });

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    tracing::info!(%addr, "evigraph listening");
    axum::serve(listener, router(service)).await?;
    Ok(())
}

async fn discover(
    State(state): State<AppState>,
    Json(request): Json<DiscoverRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, (StatusCode, Json<serde_json::Value>)>
{
    match state.service.start(&request.session, &request.question) {
        Ok((run_id, rx)) => {
            tracing::debug!(run = %run_id, "streaming run events");
            let stream =
                UnboundedReceiverStream::new(rx).map(|event| Event::default().json_data(&event));
            Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
        }
        Err(SessionError::Busy {
            session,
            active_run,
        }) => Err((
            StatusCode::CONFLICT,
            Json(json!({
                "error": "session_busy",
                "session": session,
                "active_run": active_run,
            })),
        )),
    }
}

async fn interrupt(
    State(state): State<AppState>,
    Json(request): Json<InterruptRequest>,
) -> impl IntoResponse {
    if state.service.interrupt(&request.session) {
        (StatusCode::OK, Json(json!({ "interrupted": true })))
    } else {
        (StatusCode::NOT_FOUND, Json(json!({ "interrupted": false })))
    }
}

async fn session_status(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> impl IntoResponse {
    match state.service.session_status(&session) {
        Some(status) => (
            StatusCode::OK,
            Json(json!({
                "session": session,
                "active": true,
                "run_id": status.run_id,
                "elapsed_ms": status.elapsed.as_millis() as u64,
            })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "session": session, "active": false })),
        ),
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": crate::VERSION }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscoveryConfig;
    use crate::discovery::{MockPlanner, TemplateSynthesizer};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_service() -> Arc<DiscoveryService> {
        Arc::new(DiscoveryService::new(
            Arc::new(MockPlanner::new()),
            Arc::new(TemplateSynthesizer),
            DiscoveryConfig::for_tests(),
        ))
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let app = router(test_service());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_of_idle_session_is_not_found() {
        let app = router(test_service());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/status/nobody")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn interrupt_without_active_run_is_not_found() {
        let app = router(test_service());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/interrupt")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"session":"nobody"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn busy_session_is_a_conflict() {
        let service = test_service();
        // Occupy the slot directly; the run task never starts
        let _token = service.sessions().admit("alice", uuid::Uuid::new_v4()).unwrap();
        let app = router(service);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/discover")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"session":"alice","question":"q"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
