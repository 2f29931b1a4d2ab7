use crate::state::AppState;
use axum::Router;

mod claims;
pub mod cookies;
mod dto;
pub(crate) mod extractors;
pub mod handlers;
pub mod jwt;
#[cfg(test)]
pub(crate) mod memory;
pub mod password;
pub mod repo;
mod repo_types;
pub mod session;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::user_routes())
}
