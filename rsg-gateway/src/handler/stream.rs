use std::convert::Infallible;
use std::sync::Arc;

use axum::Extension;
use axum::response::sse::{Event, KeepAlive, Sse};
use rsg_engine::{Engine, RunEvent};
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::debug;

fn event_name(event: &RunEvent) -> &'static str {
    match event {
        RunEvent::Log { .. } => "log",
        RunEvent::Stage { .. } => "stage",
        RunEvent::Finished { .. } => "finished",
    }
}

/// Live run log as server-sent events. Slow readers get a `lagged` event
/// with the number of entries they missed.
pub async fn run_events(
    Extension(engine): Extension<Arc<Engine>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(engine.runner.subscribe()).filter_map(
        |message| match message {
            Ok(event) => Event::default()
                .event(event_name(&event))
                .json_data(&event)
                .ok()
                .map(Ok),
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                debug!("event subscriber lagged by {}", missed);
                Some(Ok(Event::default().event("lagged").data(missed.to_string())))
            }
        },
    );
    Sse::new(stream).keep_alive(KeepAlive::default())
}
