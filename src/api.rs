use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::{ApplicationError, BindAddressSnafu, WebServerSnafu};

mod error;
mod state;

pub use error::*;
pub use state::*;

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

/// Acknowledgement returned by the tracking endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub fn success() -> Self {
        Ack { success: true }
    }
}

pub fn create_router(app: App, cors: CorsLayer) -> Router {
    Router::new()
        .route("/track-button-click", post(track::button_click))
        .route("/track", post(track::button_click))
        .route("/track-page-view", post(track::page_view))
        .route("/dashboard/button-clicks", get(dashboard::button_clicks))
        .route("/stats", get(dashboard::button_clicks))
        .route("/dashboard/page-views", get(dashboard::page_views))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(app)
}

/// Allow the given origins, or any origin when the list is empty. Origins that are not valid header values are skipped.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(%origin, %err, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

pub async fn serve(config: &Config, app: App) -> Result<(), ApplicationError> {
    let address = config.server.host;
    let listener = TcpListener::bind(address)
        .await
        .context(BindAddressSnafu { address })?;

    let router = create_router(app, cors_layer(&config.server.cors_origins));

    tracing::info!(%address, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context(WebServerSnafu)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "could not listen for ctrl-c, running until killed");
        std::future::pending::<()>().await;
    }

    tracing::info!("shutting down");
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub mod track {
    use axum::extract::State;
    use axum::Json;
    use snafu::ResultExt;
    use tracing::instrument;

    use super::{Ack, App, Result, TrackButtonClickSnafu, TrackPageViewSnafu};
    use crate::model::{ButtonClick, ButtonClickKey, PageView, PageViewKey};

    #[instrument(skip(app))]
    pub async fn button_click(
        State(app): State<App>, Json(payload): Json<ButtonClickKey>,
    ) -> Result<Json<Ack>> {
        ButtonClick::increment(&payload, &app)
            .await
            .context(TrackButtonClickSnafu)?;

        Ok(Json(Ack::success()))
    }

    #[instrument(skip(app))]
    pub async fn page_view(
        State(app): State<App>, Json(payload): Json<PageViewKey>,
    ) -> Result<Json<Ack>> {
        PageView::increment(&payload, &app)
            .await
            .context(TrackPageViewSnafu)?;

        Ok(Json(Ack::success()))
    }
}

pub mod dashboard {
    use axum::extract::State;
    use axum::Json;
    use snafu::ResultExt;
    use tracing::instrument;

    use super::{App, ListButtonClicksSnafu, ListPageViewsSnafu, Result};
    use crate::model::{ButtonClick, PageView};

    /// All button counters, most clicked first.
    #[instrument(skip(app))]
    pub async fn button_clicks(State(app): State<App>) -> Result<Json<Vec<ButtonClick>>> {
        let clicks = ButtonClick::list(&app)
            .await
            .context(ListButtonClicksSnafu)?;

        Ok(Json(clicks))
    }

    #[instrument(skip(app))]
    pub async fn page_views(State(app): State<App>) -> Result<Json<Vec<PageView>>> {
        let views = PageView::list(&app).await.context(ListPageViewsSnafu)?;

        Ok(Json(views))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use surrealdb::Surreal;

    use super::*;
    use crate::database::{memory, Database};

    async fn server() -> TestServer {
        let app = App::new(memory().await);
        TestServer::new(create_router(app, cors_layer(&[]))).unwrap()
    }

    #[tokio::test]
    async fn tracked_clicks_show_up_on_the_dashboard() {
        let server = server().await;

        for _ in 0..3 {
            server
                .post("/track-button-click")
                .json(&json!({ "buttonId": "cta-1", "path": "/home" }))
                .await
                .assert_json(&json!({ "success": true }));
        }
        server
            .post("/track")
            .json(&json!({ "buttonId": "cta-2", "path": "/home" }))
            .await
            .assert_status_ok();

        let expected = json!([
            { "buttonId": "cta-1", "path": "/home", "count": 3 },
            { "buttonId": "cta-2", "path": "/home", "count": 1 },
        ]);

        let response = server.get("/dashboard/button-clicks").await;
        response.assert_status_ok();
        response.assert_json(&expected);

        server.get("/stats").await.assert_json(&expected);
    }

    #[tokio::test]
    async fn missing_button_id_is_a_bad_request() {
        let server = server().await;

        let response = server
            .post("/track-button-click")
            .json(&json!({ "path": "/home" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let body: Failure = response.json();
        assert!(!body.success);
        assert!(body.error.contains("buttonId"), "{}", body.error);

        server
            .get("/dashboard/button-clicks")
            .await
            .assert_json(&json!([]));
    }

    #[tokio::test]
    async fn page_views_are_tracked_per_path() {
        let server = server().await;

        for path in ["/blog", "/blog", "/contact"] {
            server
                .post("/track-page-view")
                .json(&json!({ "path": path }))
                .await
                .assert_json(&json!({ "success": true }));
        }

        let mut views: Vec<Value> = server.get("/dashboard/page-views").await.json();
        views.sort_by_key(|view| view["path"].as_str().map(str::to_owned));

        assert_eq!(
            views,
            vec![
                json!({ "path": "/blog", "count": 2 }),
                json!({ "path": "/contact", "count": 1 }),
            ]
        );
    }

    #[tokio::test]
    async fn empty_page_view_path_is_a_bad_request() {
        let server = server().await;

        server
            .post("/track-page-view")
            .json(&json!({ "path": "" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unreachable_store_is_service_unavailable() {
        let app = App::new(Database::new(Surreal::init(), Duration::from_secs(1)));
        let server = TestServer::new(create_router(app, cors_layer(&[]))).unwrap();

        server
            .get("/dashboard/button-clicks")
            .await
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);

        server
            .post("/track-button-click")
            .json(&json!({ "buttonId": "cta", "path": "/" }))
            .await
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_check() {
        let server = server().await;

        server
            .get("/health")
            .await
            .assert_json(&json!({ "status": "ok" }));
    }

    #[test]
    fn invalid_cors_origins_are_skipped() {
        let origins = vec!["https://example.com".to_string(), "bad\norigin".to_string()];

        // building the layer must not panic on the invalid entry
        let _ = cors_layer(&origins);
    }
}
