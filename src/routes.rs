use crate::api;
use crate::state::SharedState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub const API_PREFIX: &str = "/api";

/// Every API route, without prefix.
fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/tasks", get(api::list_tasks).post(api::create_task))
        .route("/tasks/bulk", post(api::bulk_tasks))
        .route("/tasks/analytics", get(api::analytics))
        .route(
            "/tasks/:id",
            get(api::get_task).patch(api::update_task).delete(api::delete_task),
        )
        .route("/courses", get(api::list_courses))
        .route("/assistant/chat", post(api::chat))
        .route("/health", get(api::health))
        .route("/admin/set-llm-key", post(api::set_llm_key))
}

pub fn map_routes(state: SharedState) -> Router {
    let mut app = Router::new().nest(API_PREFIX, api_router());
    if state.settings.legacy_routes {
        app = app.merge(api_router());
    }
    if let Some(dir) = &state.settings.static_dir {
        app = app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    app.with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
