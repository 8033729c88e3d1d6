use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::Sse;
use axum::response::sse::{Event, KeepAlive};
use bytes::Bytes;
use futures::stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use crate::config::SSE_KEEPALIVE_SECS;
use crate::state::{AppState, PreSerializedEvent};

/// Streams the current point snapshot, then every refresh. Map clients
/// recompute their clusters on each `snapshot` event.
pub async fn points_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        // Subscribe before reading the snapshot so no refresh slips between them.
        let rx = state.event_tx.subscribe();
        let (mut last_seq, data) = current_snapshot(&state).await;
        if let Some(event) = snapshot_event(last_seq, &data) {
            yield Ok(event);
        }

        let mut stream = BroadcastStream::new(rx);
        while let Some(result) = stream.next().await {
            match result {
                Ok(PreSerializedEvent::Snapshot { seq, json }) => {
                    if seq <= last_seq {
                        continue;
                    }
                    last_seq = seq;
                    if let Some(event) = snapshot_event(seq, &json) {
                        yield Ok(event);
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(
                        skipped_events = skipped,
                        "SSE client lagged behind broadcast buffer; replaying snapshot"
                    );
                    let (seq, data) = current_snapshot(&state).await;
                    last_seq = seq;
                    if let Some(event) = snapshot_event(seq, &data) {
                        yield Ok(event);
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(SSE_KEEPALIVE_SECS))
            .text("keep-alive"),
    )
}

async fn current_snapshot(state: &AppState) -> (u64, Arc<Bytes>) {
    let live = state.live_points.read().await;
    (live.seq, Arc::clone(&live.snapshot_json))
}

/// Empty payloads mean no point set has been loaded yet.
fn snapshot_event(seq: u64, data: &Bytes) -> Option<Event> {
    if data.is_empty() {
        return None;
    }
    let Ok(payload) = std::str::from_utf8(data.as_ref()) else {
        warn!(seq, "snapshot payload is not valid utf-8; dropping SSE event");
        return None;
    };
    Some(
        Event::default()
            .id(seq.to_string())
            .event("snapshot")
            .data(payload),
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use artisan_shared::Point;

    use crate::services::points_loader::apply_points;
    use crate::state::AppState;

    #[tokio::test]
    async fn stream_opens_with_snapshot_then_follows_refreshes() {
        let state = AppState::new();
        apply_points(&state, vec![Point::new("a", 31.0, 74.0)], None)
            .await
            .expect("seed points");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let app = crate::app::build_app(state.clone());
        let server_handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test app");
        });

        let mut response = reqwest::Client::new()
            .get(format!("http://{addr}/api/events"))
            .send()
            .await
            .expect("events request")
            .error_for_status()
            .expect("events status");
        let mut received = String::new();

        let first_deadline = tokio::time::timeout(Duration::from_secs(5), async {
            while !received.contains("\"id\":\"a\"") {
                let chunk = response.chunk().await.expect("chunk").expect("stream open");
                received.push_str(&String::from_utf8_lossy(&chunk));
            }
        });
        first_deadline.await.expect("initial snapshot");
        assert!(received.contains("event: snapshot"));
        assert!(received.contains("id: 1"));

        apply_points(&state, vec![Point::new("b", 30.0, 71.0)], None)
            .await
            .expect("refresh points");
        let second_deadline = tokio::time::timeout(Duration::from_secs(5), async {
            while !received.contains("\"id\":\"b\"") {
                let chunk = response.chunk().await.expect("chunk").expect("stream open");
                received.push_str(&String::from_utf8_lossy(&chunk));
            }
        });
        second_deadline.await.expect("refresh snapshot");
        assert!(received.contains("id: 2"));

        server_handle.abort();
        let _ = server_handle.await;
    }
}
