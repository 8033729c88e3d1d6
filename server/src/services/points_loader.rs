use std::sync::Arc;
use std::sync::atomic::Ordering;

use artisan_shared::Point;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{artisans_refresh_interval, artisans_url};
use crate::state::{AppState, PreSerializedEvent};

pub async fn run(state: AppState) {
    let Some(url) = artisans_url() else {
        info!("ARTISANS_URL not set; artisan point feed disabled");
        return;
    };
    let mut interval = tokio::time::interval(artisans_refresh_interval());

    loop {
        interval.tick().await;

        match fetch_body(&state.http_client, &url).await {
            Ok(body) => {
                if let Err(e) = process_body(&state, &body).await {
                    state.observability.record_points_fetch_failure();
                    warn!("failed to process artisan feed: {e}");
                }
            }
            Err(e) => {
                state.observability.record_points_fetch_failure();
                warn!("failed to fetch artisan feed: {e}");
            }
        }
    }
}

async fn fetch_body(client: &reqwest::Client, url: &str) -> Result<Bytes, String> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("request failed: {e}"))?;
    let status = resp.status();
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| format!("failed to read response body: {e}"))?;

    if !status.is_success() {
        return Err(format!(
            "upstream status {status}; body preview: {}",
            body_preview(&bytes)
        ));
    }
    Ok(bytes)
}

fn body_preview(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).chars().take(200).collect()
}

/// Swap in a freshly fetched body. Returns whether the point set changed.
pub(crate) async fn process_body(state: &AppState, body: &[u8]) -> Result<bool, String> {
    let checksum = crc32fast::hash(body);
    if state.live_points.read().await.checksum == Some(checksum) {
        debug!(checksum, "artisan feed unchanged");
        return Ok(false);
    }

    let points = parse_artisan_payload(body).map_err(|e| {
        format!(
            "failed to decode artisan payload: {e}; body preview: {}",
            body_preview(body)
        )
    })?;
    apply_points(state, points, Some(checksum)).await?;
    Ok(true)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ArtisanPayload {
    Bare(Vec<serde_json::Value>),
    Envelope {
        #[serde(alias = "artisans")]
        data: Vec<serde_json::Value>,
    },
}

/// Accepts either a bare array of records or an object wrapping one under
/// `data` or `artisans`. Records without a usable id are skipped.
pub(crate) fn parse_artisan_payload(body: &[u8]) -> Result<Vec<Point>, serde_json::Error> {
    let records = match serde_json::from_slice::<ArtisanPayload>(body)? {
        ArtisanPayload::Bare(records) | ArtisanPayload::Envelope { data: records } => records,
    };
    let total = records.len();
    let points: Vec<Point> = records
        .into_iter()
        .filter_map(|record| serde_json::from_value(record).ok())
        .collect();
    if points.len() < total {
        warn!(
            skipped = total - points.len(),
            total, "skipped artisan records without a usable id"
        );
    }
    Ok(points)
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum SerializedPointsEvent<'a> {
    Snapshot {
        seq: u64,
        points: &'a [Point],
        timestamp: &'a str,
    },
}

#[derive(Serialize)]
struct SerializedPointsState<'a> {
    seq: u64,
    timestamp: &'a str,
    points: &'a [Point],
}

/// Publish a new point set: bump `seq`, refresh the cached payloads and
/// broadcast a snapshot event to SSE clients.
pub(crate) async fn apply_points(
    state: &AppState,
    points: Vec<Point>,
    checksum: Option<u32>,
) -> Result<u64, String> {
    let seq = state
        .next_seq
        .load(Ordering::Relaxed)
        .checked_add(1)
        .ok_or_else(|| "sequence counter overflow".to_string())?;
    let timestamp = Utc::now().to_rfc3339();

    let snapshot_json = serde_json::to_vec(&SerializedPointsEvent::Snapshot {
        seq,
        points: &points,
        timestamp: &timestamp,
    })
    .map_err(|e| format!("failed to serialize snapshot event: {e}"))?;
    let state_json = serde_json::to_vec(&SerializedPointsState {
        seq,
        timestamp: &timestamp,
        points: &points,
    })
    .map_err(|e| format!("failed to serialize points state: {e}"))?;

    let snapshot_json = Arc::new(Bytes::from(snapshot_json));
    let count = points.len();
    {
        let mut live = state.live_points.write().await;
        live.seq = seq;
        live.timestamp = timestamp;
        live.points = Arc::new(points);
        live.checksum = checksum;
        live.snapshot_json = Arc::clone(&snapshot_json);
        live.state_json = Arc::new(Bytes::from(state_json));
    }
    state.next_seq.store(seq, Ordering::Relaxed);
    state.observability.record_points_refresh();

    // No subscribers is not an error.
    let _ = state.event_tx.send(PreSerializedEvent::Snapshot {
        seq,
        json: snapshot_json,
    });
    info!(seq, count, "artisan point set updated");
    Ok(seq)
}

#[cfg(test)]
mod tests {
    use artisan_shared::{Point, PointsEvent, PointsState};

    use super::{apply_points, parse_artisan_payload, process_body};
    use crate::state::{AppState, PreSerializedEvent};

    #[test]
    fn parses_bare_arrays_and_envelopes() {
        let bare = br#"[{"id":"a","lat":31.5,"lng":74.3}]"#;
        let wrapped = br#"{"data":[{"_id":7,"latitude":"31.5","longitude":74.3,"craft":"pottery"}]}"#;
        let aliased = br#"{"artisans":[{"id":"b","lat":30.1,"lng":71.5}]}"#;

        let points = parse_artisan_payload(bare).expect("bare array");
        assert_eq!(points, vec![Point::new("a", 31.5, 74.3)]);

        let points = parse_artisan_payload(wrapped).expect("data envelope");
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].id, "7");
        assert_eq!(points[0].lat, 31.5);
        assert_eq!(points[0].payload["craft"], "pottery");

        let points = parse_artisan_payload(aliased).expect("artisans envelope");
        assert_eq!(points[0].id, "b");
    }

    #[test]
    fn records_without_ids_are_skipped() {
        let body = br#"[{"lat":31.0,"lng":74.0},{"id":"kept","lat":31.0,"lng":74.0}]"#;
        let points = parse_artisan_payload(body).expect("array");
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].id, "kept");
    }

    #[test]
    fn non_collection_payloads_are_rejected() {
        assert!(parse_artisan_payload(br#"{"status":"down"}"#).is_err());
        assert!(parse_artisan_payload(b"not json").is_err());
    }

    #[tokio::test]
    async fn unchanged_bodies_do_not_bump_seq() {
        let state = AppState::new();
        let mut rx = state.event_tx.subscribe();
        let body = br#"[{"id":"a","lat":31.5,"lng":74.3}]"#;

        assert_eq!(process_body(&state, body).await, Ok(true));
        assert_eq!(process_body(&state, body).await, Ok(false));

        let live = state.live_points.read().await;
        assert_eq!(live.seq, 1);
        assert_eq!(live.points.len(), 1);
        drop(live);

        let PreSerializedEvent::Snapshot { seq, json } = rx.recv().await.expect("snapshot event");
        assert_eq!(seq, 1);
        let PointsEvent::Snapshot { seq, points, .. } =
            serde_json::from_slice(&json).expect("snapshot decodes as PointsEvent");
        assert_eq!(seq, 1);
        assert_eq!(points[0].id, "a");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn undecodable_body_keeps_previous_points() {
        let state = AppState::new();
        apply_points(&state, vec![Point::new("a", 31.0, 74.0)], None)
            .await
            .expect("seed points");

        let err = process_body(&state, b"<html>oops</html>")
            .await
            .expect_err("html is not a feed");
        assert!(err.contains("body preview"));

        let live = state.live_points.read().await;
        assert_eq!(live.seq, 1);
        assert_eq!(live.points[0].id, "a");
    }

    #[tokio::test]
    async fn state_payload_matches_points_state() {
        let state = AppState::new();
        apply_points(&state, vec![Point::new("a", 31.0, 74.0)], None)
            .await
            .expect("apply");
        apply_points(&state, Vec::new(), None).await.expect("apply");

        let json = state.live_points.read().await.state_json.clone();
        let decoded: PointsState = serde_json::from_slice(&json).expect("points state");
        assert_eq!(decoded.seq, 2);
        assert!(decoded.points.is_empty());
    }
}
