pub mod handlers;

use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/receiver_data",
            get(handlers::receiver_data).options(handlers::preflight),
        )
        .route(
            "/vol_pct",
            post(handlers::set_vol_pct).options(handlers::preflight),
        )
        .route(
            "/make_bt_discoverable",
            post(handlers::make_bt_discoverable).options(handlers::preflight),
        )
        .route(
            "/disconnect_clients",
            post(handlers::disconnect_clients).options(handlers::preflight),
        )
        .fallback(handlers::fallback)
        .with_state(state)
}
