use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
};
use tokio_stream::StreamExt;
use tracing::{info, warn};

use super::super::AppState;
use super::super::auth;
use crate::core::orchestrator::{JobEvent, JobOptions};
use crate::core::retrieval::RetrievalStrategy;

#[derive(serde::Deserialize)]
pub struct AnalysisQuery {
    pub token: Option<String>,
    /// `plain` or `compressed`; the server's configured strategy when absent.
    pub strategy: Option<String>,
}

fn sse_event(event: &JobEvent) -> Event {
    Event::default().data(event.to_json())
}

/// A stream carrying exactly one `error` event.
fn error_stream(message: String) -> Response {
    let event = sse_event(&JobEvent::error(message));
    Sse::new(tokio_stream::once(Ok::<_, Infallible>(event))).into_response()
}

pub async fn stream_analysis(
    Path(document_id): Path<String>,
    Query(query): Query<AnalysisQuery>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let caller = match auth::resolve_caller(&state, query.token.as_deref(), &headers).await {
        Ok(caller) => caller,
        Err(e) => {
            warn!(document_id = %document_id, "Rejected analysis request: {}", e);
            return error_stream(format!("Authentication failed: {}", e));
        }
    };

    let strategy = match query.strategy.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => match raw.parse::<RetrievalStrategy>() {
            Ok(strategy) => Some(strategy),
            Err(e) => return error_stream(format!("Invalid request: {}", e)),
        },
    };

    let document = match state.store.get_document(&document_id).await {
        Ok(Some(document)) => document,
        Ok(None) => return error_stream(format!("Document '{}' not found", document_id)),
        Err(e) => {
            warn!(document_id = %document_id, "Document lookup failed: {}", e);
            return error_stream("Document store unavailable".to_string());
        }
    };

    let handle = state.engine.start_with(document, JobOptions { strategy });
    info!(
        job_id = %handle.job_id(),
        document_id = %document_id,
        caller = %caller,
        "Streaming analysis"
    );

    // Dropping this stream on disconnect closes the job's channel and cancels it.
    let stream = handle
        .into_event_stream()
        .map(|event| Ok::<_, Infallible>(sse_event(&event)));
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}
