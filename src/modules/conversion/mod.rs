use axum::Router;
use axum::routing::{get, post};
use crate::state::AppState;

pub mod dto;
pub mod error;
pub mod events;
pub mod handler;
pub mod model;
pub mod orchestrator;
pub mod processor;
pub mod progress;
pub mod repository;
pub mod retry;
pub mod service;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/conversions",
            post(handler::submit_conversion).delete(handler::delete_conversion),
        )
        .route("/conversions/{id}", get(handler::get_conversion))
        .route("/events", post(handler::storage_event))
}
