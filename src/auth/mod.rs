use crate::state::AppState;
use axum::Router;

pub mod claims;
mod credentials;
mod dto;
pub(crate) mod extractors;
pub mod guest;
pub mod handlers;
pub mod jwt;
#[cfg(test)]
pub mod memory;
pub mod repo;
pub mod repo_types;
mod services;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::profile_routes())
}
