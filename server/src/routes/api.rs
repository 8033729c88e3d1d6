use std::fmt::Write as _;
use std::sync::Arc;

use artisan_shared::{Bounds, ClusterResponse, GridConfig, Point, cull};
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

use crate::config::MAX_QUERY_ZOOM;
use crate::state::{AppState, BoundaryState, ObservabilitySnapshot};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (seq, updated_at, point_count) = {
        let live = state.live_points.read().await;
        (live.seq, live.timestamp.clone(), live.points.len())
    };
    let (boundaries, boundary_districts) = {
        let boundaries = state.boundaries.read().await;
        let districts = match &*boundaries {
            BoundaryState::Loaded { districts, .. } => districts.len(),
            _ => 0,
        };
        (boundaries.label(), districts)
    };
    let observability = state.observability.snapshot();
    Json(serde_json::json!({
        "status": "ok",
        "seq": seq,
        "updated_at": updated_at,
        "points": point_count,
        "districts": state.gazetteer.len(),
        "boundaries": boundaries,
        "boundary_districts": boundary_districts,
        "observability": {
            "cluster_requests_total": observability.cluster_requests_total,
            "points_refreshes_total": observability.points_refreshes_total,
            "points_fetch_failures_total": observability.points_fetch_failures_total,
            "boundary_fetch_failures_total": observability.boundary_fetch_failures_total,
        }
    }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let point_count = state.live_points.read().await.points.len();
    let boundaries_loaded = matches!(*state.boundaries.read().await, BoundaryState::Loaded { .. });
    let observability = state.observability.snapshot();

    let body = render_prometheus_metrics(point_count, boundaries_loaded, observability);

    (
        [
            (header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
}

fn render_prometheus_metrics(
    point_count: usize,
    boundaries_loaded: bool,
    observability: ObservabilitySnapshot,
) -> String {
    let mut body = String::new();
    let _ = writeln!(
        body,
        "# HELP artisan_points Current number of artisan points in memory."
    );
    let _ = writeln!(body, "# TYPE artisan_points gauge");
    let _ = writeln!(body, "artisan_points {point_count}");

    let _ = writeln!(
        body,
        "# HELP artisan_boundaries_loaded Whether the district overlay is loaded (1 or 0)."
    );
    let _ = writeln!(body, "# TYPE artisan_boundaries_loaded gauge");
    let _ = writeln!(
        body,
        "artisan_boundaries_loaded {}",
        u8::from(boundaries_loaded)
    );

    let counters = [
        (
            "artisan_cluster_requests_total",
            "Total cluster API requests.",
            observability.cluster_requests_total,
        ),
        (
            "artisan_points_refreshes_total",
            "Total artisan point set refreshes that changed the data.",
            observability.points_refreshes_total,
        ),
        (
            "artisan_points_fetch_failures_total",
            "Total failed artisan feed fetches.",
            observability.points_fetch_failures_total,
        ),
        (
            "artisan_boundary_fetch_failures_total",
            "Total failed district boundary fetches.",
            observability.boundary_fetch_failures_total,
        ),
    ];
    for (name, help, value) in counters {
        let _ = writeln!(body, "# HELP {name} {help}");
        let _ = writeln!(body, "# TYPE {name} counter");
        let _ = writeln!(body, "{name} {value}");
    }

    body
}

/// Serve the pre-serialized point set.
pub async fn get_points(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let (etag, json): (String, Arc<Bytes>) = {
        let live = state.live_points.read().await;
        (points_etag(live.seq), Arc::clone(&live.state_json))
    };

    if if_none_match_matches(&headers, &etag) {
        return not_modified_response("public, max-age=5", Some(etag.as_str()));
    }

    json_bytes_response((*json).clone(), "public, max-age=5", Some(etag.as_str()))
}

#[derive(Debug, Deserialize)]
pub struct ClusterQuery {
    pub zoom: u8,
    pub south: Option<f64>,
    pub west: Option<f64>,
    pub north: Option<f64>,
    pub east: Option<f64>,
}

impl ClusterQuery {
    /// Bounds are all-or-none; a partial or non-finite box is rejected.
    fn bounds(&self) -> Result<Option<Bounds>, &'static str> {
        match (self.south, self.west, self.north, self.east) {
            (None, None, None, None) => Ok(None),
            (Some(south), Some(west), Some(north), Some(east)) => {
                if ![south, west, north, east].iter().all(|v| v.is_finite()) {
                    return Err("bounds must be finite numbers");
                }
                Ok(Some(Bounds::new(south, west, north, east)))
            }
            _ => Err("south, west, north and east must be given together"),
        }
    }
}

pub async fn get_clusters(
    State(state): State<AppState>,
    Query(query): Query<ClusterQuery>,
) -> Response {
    state.observability.record_cluster_request();
    if query.zoom > MAX_QUERY_ZOOM {
        return error_response(StatusCode::BAD_REQUEST, "zoom out of range");
    }
    let bounds = match query.bounds() {
        Ok(bounds) => bounds,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    let (seq, points) = {
        let live = state.live_points.read().await;
        (live.seq, Arc::clone(&live.points))
    };
    let response = cluster_points(&state.grid, seq, &points, query.zoom, bounds.as_ref());
    debug!(
        seq,
        zoom = query.zoom,
        culled = response.culled,
        clusters = response.clusters.len(),
        "served cluster query"
    );
    Json(response).into_response()
}

/// Bounds are ignored from the full-marker zoom on, where every point is shown.
fn cluster_points(
    grid: &GridConfig,
    seq: u64,
    points: &[Point],
    zoom: u8,
    bounds: Option<&Bounds>,
) -> ClusterResponse {
    let bounds = bounds.filter(|_| grid.culls_at(zoom));
    let visible = cull(points, bounds);
    let clusters = grid
        .bucket(visible, zoom)
        .iter()
        .map(|cluster| cluster.descriptor())
        .collect();
    ClusterResponse {
        seq,
        zoom,
        culled: bounds.is_some(),
        clusters,
    }
}

pub async fn list_districts(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "public, max-age=3600")],
        Json(state.gazetteer.districts().to_vec()),
    )
}

pub async fn get_district(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.gazetteer.lookup(&name) {
        Some(district) => Json(district.clone()).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "unknown district"),
    }
}

pub async fn get_boundaries(State(state): State<AppState>) -> Response {
    match &*state.boundaries.read().await {
        BoundaryState::Loaded { json, .. } => {
            json_bytes_response((**json).clone(), "public, max-age=3600", None)
        }
        BoundaryState::Disabled => {
            error_response(StatusCode::NOT_FOUND, "district overlay is not configured")
        }
        BoundaryState::Pending => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "district overlay is loading")
        }
        BoundaryState::Failed { error } => error_response(StatusCode::BAD_GATEWAY, error),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn points_etag(seq: u64) -> String {
    format!("\"points-{seq}\"")
}

fn json_bytes_response(body: Bytes, cache_control: &'static str, etag: Option<&str>) -> Response {
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Some(etag) = etag
        && let Ok(etag_header) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

fn not_modified_response(cache_control: &'static str, etag: Option<&str>) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Some(etag) = etag
        && let Ok(etag_header) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

fn normalize_etag(candidate: &str) -> &str {
    candidate.strip_prefix("W/").unwrap_or(candidate).trim()
}

fn if_none_match_matches(headers: &HeaderMap, etag: &str) -> bool {
    let Some(value) = headers.get(header::IF_NONE_MATCH) else {
        return false;
    };
    let Ok(raw) = value.to_str() else {
        return false;
    };

    raw.split(',').any(|candidate| {
        let candidate = candidate.trim();
        candidate == "*" || normalize_etag(candidate) == normalize_etag(etag)
    })
}
