//! Server-Sent Events for the admin UI
//!
//! Streams wizard step changes, upload progress and picture lifecycle
//! events.

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::{AppState, MODULE_NAME};

/// GET /events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    ngo_common::sse::create_event_sse_stream(MODULE_NAME, &state.event_bus)
}
