use std::sync::Arc;

use artisan_shared::Gazetteer;
use bytes::Bytes;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::boundaries_url;
use crate::state::{AppState, BoundaryState};

/// Feature property keys that may carry the district name, in priority order.
const NAME_KEYS: [&str; 4] = ["district", "DISTRICT", "name", "NAME"];

pub async fn run(state: AppState) {
    let Some(url) = boundaries_url() else {
        info!("BOUNDARIES_URL not set; district overlay disabled");
        return;
    };
    *state.boundaries.write().await = BoundaryState::Pending;

    let next = fetch_boundaries(&state.http_client, &url)
        .await
        .and_then(|body| loaded_state(body, &state.gazetteer))
        .unwrap_or_else(|error| {
            state.observability.record_boundary_fetch_failure();
            warn!("failed to load district boundaries: {error}");
            BoundaryState::Failed { error }
        });
    *state.boundaries.write().await = next;
}

async fn fetch_boundaries(client: &reqwest::Client, url: &str) -> Result<Bytes, String> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("request failed: {e}"))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(format!("upstream status {status}"));
    }
    resp.bytes()
        .await
        .map_err(|e| format!("failed to read response body: {e}"))
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    properties: serde_json::Map<String, serde_json::Value>,
}

impl Feature {
    fn district_name(&self) -> Option<&str> {
        NAME_KEYS.iter().find_map(|key| {
            self.properties
                .get(*key)
                .and_then(|value| value.as_str())
                .map(str::trim)
                .filter(|name| !name.is_empty())
        })
    }
}

/// Parse a GeoJSON feature collection and collect its district names.
pub(crate) fn loaded_state(body: Bytes, gazetteer: &Gazetteer) -> Result<BoundaryState, String> {
    let collection: FeatureCollection = serde_json::from_slice(&body)
        .map_err(|e| format!("failed to decode boundary GeoJSON: {e}"))?;

    let districts: Vec<String> = collection
        .features
        .iter()
        .filter_map(Feature::district_name)
        .map(str::to_string)
        .collect();
    let unknown: Vec<&str> = districts
        .iter()
        .map(String::as_str)
        .filter(|name| gazetteer.lookup(name).is_none())
        .collect();
    if !unknown.is_empty() {
        warn!(
            count = unknown.len(),
            names = ?unknown,
            "boundary features without a gazetteer entry"
        );
    }
    info!(
        features = collection.features.len(),
        districts = districts.len(),
        "loaded district boundaries"
    );

    Ok(BoundaryState::Loaded {
        json: Arc::new(body),
        districts,
    })
}
