use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::services::event_bus::EventBus;

/// `GET /events`: live session events as SSE.
pub async fn session_events(
    State(events): State<Arc<EventBus>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = events.subscribe();
    debug!("Event stream subscriber connected");

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(timed) => yield Ok(create_sse_event(timed.event.kind(), &timed)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream subscriber lagged");
                    yield Ok(Event::default().event("lagged").data(skipped.to_string()));
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn create_sse_event<T: serde::Serialize>(event_type: &str, data: &T) -> Event {
    Event::default()
        .event(event_type)
        .data(serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string()))
}
