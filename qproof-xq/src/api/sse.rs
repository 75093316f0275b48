//! Server-Sent Events endpoint for quality pipeline events

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::AppState;

/// GET /events - SSE stream of pipeline events
///
/// Streams RecordProcessed, PatternDetected, FixStaged, FixPromoted and
/// FixRolledBack events with 15-second heartbeats.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    qproof_common::sse::create_event_sse_stream("qproof-xq", &state.event_bus)
}
