//! HTTP front-end for an upstream comic host.
//!
//! # Overview
//! Serves comic metadata by id, the current comic, batches of comics, and
//! downloads comic images into a local directory. Lookups go through a
//! per-process cache; every route is rate limited per client address.
//!
//! # Design
//! - All shared state lives in `AppState`, built from `Settings` at startup.
//! - Handlers translate query and path values, call into `comic_core` on the
//!   blocking pool, and map failures through `AppError`.

pub mod config;
pub mod error;
pub mod handlers;
pub mod query;
pub mod rate_limit;
pub mod state;

use std::net::SocketAddr;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;

pub use config::{ConfigError, Settings};
pub use error::AppError;
pub use state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/comics/current", get(handlers::current_comic))
        .route("/comics/many", get(handlers::many_comics))
        .route("/comics/download", get(handlers::download_comics))
        .route("/comics/{comic_id}", get(handlers::comic_by_id))
        .route_layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            rate_limit::enforce,
        ))
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}
