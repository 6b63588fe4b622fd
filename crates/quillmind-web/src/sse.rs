//! Frames a [`StreamEvent`] channel as an axum SSE response (§6 "SSE
//! framing"), grounded in `ferrumyx_web::sse::sse_handler`.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_core::Stream;
use quillmind_agent::StreamEvent;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

/// Wraps the agent loop's event channel into `event: <type>\ndata:
/// <json>\n\n` frames, with a 15s keep-alive ping matching `ferrumyx_web::sse`.
pub fn sse_from_events(rx: mpsc::UnboundedReceiver<StreamEvent>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = UnboundedReceiverStream::new(rx).map(|ev| Ok(Event::default().event(ev.name()).data(ev.data().to_string())));

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}
