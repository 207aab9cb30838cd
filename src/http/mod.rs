use axum::Router;

use crate::AppState;

mod auth;
mod error;
mod extract;
mod handlers;
pub mod payload;
mod routes;

pub use auth::AuthUser;
pub use error::AppError;
pub use extract::AppJson;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health())
        .merge(routes::auth())
        .merge(routes::posts())
        .merge(routes::subposts())
        .with_state(state)
}
