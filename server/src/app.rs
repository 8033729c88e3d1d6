use axum::Router;
use axum::routing::get;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;

use crate::routes;
use crate::state::AppState;

pub(crate) fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/api/points", get(routes::api::get_points))
        .route("/api/clusters", get(routes::api::get_clusters))
        .route("/api/districts", get(routes::api::list_districts))
        .route("/api/districts/{name}", get(routes::api::get_district))
        .route("/api/boundaries", get(routes::api::get_boundaries))
        .route("/api/events", get(routes::sse::points_events))
        .route("/api/health", get(routes::api::health))
        .route("/api/metrics", get(routes::api::metrics))
        .layer(CompressionLayer::new())
        // Map widgets are embedded on other origins and only read.
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::build_app;
    use crate::state::AppState;

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let app = build_app(AppState::new());
        let server_handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test app");
        });

        let response = reqwest::Client::new()
            .get(format!("http://{addr}/api/unknown"))
            .send()
            .await
            .expect("request");
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

        let cross_origin = reqwest::Client::new()
            .get(format!("http://{addr}/api/health"))
            .header(reqwest::header::ORIGIN, "https://crafts.example")
            .send()
            .await
            .expect("cross-origin request");
        assert_eq!(
            cross_origin
                .headers()
                .get(reqwest::header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );

        server_handle.abort();
        let _ = server_handle.await;
    }
}
