pub mod error;
pub mod extractors;
pub mod routes;
pub mod state;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use state::AppState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 100 MB body limit for meeting audio uploads.
    let api = Router::new()
        .route("/enroll", post(routes::enroll::enroll))
        .route(
            "/enroll-from-meeting",
            post(routes::enroll::enroll_from_meeting),
        )
        .route("/identify", post(routes::identify::identify))
        .route("/confirm-speaker", post(routes::confirm::confirm_speaker))
        .route("/meeting/{meeting_id}", get(routes::meeting::get_meeting))
        .route(
            "/meeting/{meeting_id}/speaker/{speaker_id}/clip",
            get(routes::meeting::speaker_clip),
        )
        .route(
            "/meeting/{meeting_id}/cleanup",
            post(routes::meeting::cleanup),
        )
        .route(
            "/meeting/{meeting_id}/summary",
            post(routes::summary::create).get(routes::summary::get_cached),
        )
        .route("/speakers", get(routes::speakers::list))
        .route("/speakers/{name}", delete(routes::speakers::remove))
        .route("/speakers/sync", post(routes::speakers::sync))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024));

    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api)
        .merge(health)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
