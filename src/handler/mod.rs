pub(crate) mod errors;
pub(crate) mod middleware;
pub(crate) mod search;
pub(crate) mod state;

use axum::routing::{get, post};
use axum::Router;

use state::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(search::healthz))
        .route("/proxy", get(search::proxy_info))
        .route("/search", post(search::search))
        .route("/search.csv", post(search::search_csv))
        .layer(axum::middleware::from_fn(middleware::metrics))
        .with_state(state)
}
