//! Server-Sent Events (SSE) utilities
//!
//! Shared SSE stream construction for qproof services.

use crate::events::EventBus;
use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info};

/// Create an SSE stream that forwards bus events interleaved with heartbeats
///
/// Subscribes to the event bus at connection time; events emitted before the
/// subscription are not replayed. Lagged subscribers skip dropped events and
/// continue rather than terminating the stream.
pub fn create_event_sse_stream(
    service_name: &'static str,
    bus: &EventBus,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {} events", service_name);

    let mut rx = bus.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            let data = match serde_json::to_string(&event) {
                                Ok(json) => json,
                                Err(e) => {
                                    debug!("SSE: event serialization failed: {}", e);
                                    continue;
                                }
                            };
                            yield Ok(Event::default()
                                .event(event.event_type())
                                .data(data));
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!("SSE: subscriber lagged, skipped {} events", skipped);
                            continue;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
