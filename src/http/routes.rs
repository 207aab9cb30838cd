use axum::{routing::get, routing::post, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn auth() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh", post(handlers::refresh_token))
        .route("/auth/revoke", post(handlers::revoke_token))
        .route("/auth/me", get(handlers::current_user))
}

pub fn posts() -> Router<AppState> {
    Router::new()
        .route(
            "/posts/",
            get(handlers::list_posts).post(handlers::create_post),
        )
        .route(
            "/posts/:id/",
            get(handlers::get_post)
                .put(handlers::update_post)
                .patch(handlers::partial_update_post)
                .delete(handlers::delete_post),
        )
        .route("/posts/:id/like/", post(handlers::toggle_like))
        .route("/posts/:id/likes/", get(handlers::list_post_likes))
        .route("/posts/:id/view", get(handlers::record_view))
}

pub fn subposts() -> Router<AppState> {
    Router::new()
        .route(
            "/subposts/",
            get(handlers::list_subposts).post(handlers::create_subpost),
        )
        .route(
            "/subposts/:id/",
            get(handlers::get_subpost)
                .put(handlers::update_subpost)
                .delete(handlers::delete_subpost),
        )
}
