pub mod auth;
pub mod citizens;
pub mod error;
pub mod middleware;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tracing::error;

use crate::auth::{AppState, AppStateInner};
use crate::error::ApiError;

/// All routes, with session-protected ones behind `require_session`.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    let public_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/verify", get(auth::verify))
        .route("/login", post(auth::login))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/session", get(auth::session_status))
        .route("/logout", post(auth::logout))
        .route("/citizen", post(citizens::create_citizen).get(citizens::get_citizen))
        .route("/citizen/card", post(citizens::render_card))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_session));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Run blocking store or render work off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
}
