use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::auth::AuthService;
use crate::app::likes::LikeService;
use crate::app::posts::PostService;
use crate::app::subposts::SubPostService;
use crate::domain::like::Like;
use crate::domain::page::{Page, PageRequest};
use crate::domain::post::{Post, PostDetail};
use crate::domain::subpost::SubPost;
use crate::domain::user::User;
use crate::http::payload::{CreatePostRequest, SubPostRequest, UpdateMode, UpdatePostRequest};
use crate::http::{AppError, AppJson, AuthUser};
use crate::AppState;

fn auth_service(state: &AppState) -> AuthService {
    AuthService::new(
        state.db.clone(),
        state.paseto_access_key,
        state.paseto_refresh_key,
        state.access_ttl_minutes,
        state.refresh_ttl_days,
    )
}

fn page_request(
    state: &AppState,
    page: Option<i64>,
    page_size: Option<i64>,
) -> Result<PageRequest, AppError> {
    parse_page(page, page_size, state.default_page_size, state.max_page_size)
}

/// Validates page-number query parameters. The page is capped so that
/// `page * page_size` always fits in an `i64`.
fn parse_page(
    page: Option<i64>,
    page_size: Option<i64>,
    default_page_size: i64,
    max_page_size: i64,
) -> Result<PageRequest, AppError> {
    let page_size = page_size.unwrap_or(default_page_size);
    if !(1..=max_page_size).contains(&page_size) {
        return Err(AppError::validation(
            "page_size",
            format!("must be between 1 and {}", max_page_size),
        ));
    }
    let page = page.unwrap_or(1);
    let max_page = i64::MAX / page_size;
    if !(1..=max_page).contains(&page) {
        return Err(AppError::validation(
            "page",
            format!("must be between 1 and {}", max_page),
        ));
    }
    Ok(PageRequest { page, page_size })
}

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.db.ping().await.is_ok() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse { status })
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 150;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let username = payload.username.trim();
    let username_len = username.chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&username_len) {
        return Err(AppError::validation(
            "username",
            format!(
                "must be between {} and {} characters",
                MIN_USERNAME_LEN, MAX_USERNAME_LEN
            ),
        ));
    }
    if payload.password.trim().len() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(
            "password",
            "must be at least 8 characters",
        ));
    }
    if payload.password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::validation(
            "password",
            "must be at most 128 characters",
        ));
    }

    let user = auth_service(&state)
        .register(username, &payload.password)
        .await
        .map_err(|err| {
            if let Some(sqlx_err) = err.downcast_ref::<sqlx::Error>() {
                if let Some(db_err) = sqlx_err.as_database_error() {
                    if db_err.constraint() == Some("users_username_key") {
                        return AppError::conflict("username already taken");
                    }
                }
            }
            AppError::from_service(err, "failed to register user")
        })?;

    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub access_expires_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub refresh_expires_at: OffsetDateTime,
}

impl From<crate::app::auth::TokenPair> for AuthTokenResponse {
    fn from(tokens: crate::app::auth::TokenPair) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            access_expires_at: tokens.access_expires_at,
            refresh_expires_at: tokens.refresh_expires_at,
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<AuthTokenResponse>, AppError> {
    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("username and password are required"));
    }
    if payload.password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::bad_request("password must be at most 128 characters"));
    }

    let tokens = auth_service(&state)
        .login(payload.username.trim(), &payload.password)
        .await
        .map_err(|err| AppError::from_service(err, "failed to login"))?;

    match tokens {
        Some(tokens) => Ok(Json(tokens.into())),
        None => Err(AppError::unauthorized("invalid credentials")),
    }
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh_token(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RefreshRequest>,
) -> Result<Json<AuthTokenResponse>, AppError> {
    if payload.refresh_token.trim().is_empty() {
        return Err(AppError::bad_request("refresh_token is required"));
    }

    let tokens = auth_service(&state)
        .refresh(&payload.refresh_token)
        .await
        .map_err(|err| AppError::from_service(err, "failed to refresh token"))?;

    match tokens {
        Some(tokens) => Ok(Json(tokens.into())),
        None => Err(AppError::unauthorized("invalid refresh token")),
    }
}

pub async fn revoke_token(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RefreshRequest>,
) -> Result<StatusCode, AppError> {
    if payload.refresh_token.trim().is_empty() {
        return Err(AppError::bad_request("refresh_token is required"));
    }

    let revoked = auth_service(&state)
        .revoke_refresh_token(&payload.refresh_token)
        .await
        .map_err(|err| AppError::from_service(err, "failed to revoke token"))?;

    if revoked {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("refresh token not found"))
    }
}

pub async fn current_user(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<User>, AppError> {
    let user = auth_service(&state)
        .get_user(auth.user_id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to fetch user"))?;

    user.map(Json)
        .ok_or_else(|| AppError::not_found("user not found"))
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct PostListQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub author: Option<Uuid>,
}

pub async fn list_posts(
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> Result<Json<Page<Post>>, AppError> {
    let page = page_request(&state, query.page, query.page_size)?;

    let service = PostService::new(state.db.clone());
    let (posts, count) = service
        .list_posts(query.author, page)
        .await
        .map_err(|err| AppError::from_service(err, "failed to list posts"))?;

    Ok(Json(Page::new(posts, count, page)))
}

/// Single, nested and bulk creation share one route; the body shape picks the
/// variant.
pub async fn create_post(
    auth: AuthUser,
    State(state): State<AppState>,
    AppJson(body): AppJson<Value>,
) -> Result<Response, AppError> {
    let request = CreatePostRequest::parse(body)?;
    let service = PostService::new(state.db.clone());

    let response = match request {
        CreatePostRequest::Single(post) => {
            let post = service
                .create_post(auth.user_id, post)
                .await
                .map_err(|err| AppError::from_service(err, "failed to create post"))?;
            (StatusCode::CREATED, Json(post)).into_response()
        }
        CreatePostRequest::Nested { post, subposts } => {
            let post = service
                .create_post_with_subposts(auth.user_id, post, subposts)
                .await
                .map_err(|err| AppError::from_service(err, "failed to create post"))?;
            (StatusCode::CREATED, Json(post)).into_response()
        }
        CreatePostRequest::Bulk(posts) => {
            let posts = service
                .create_posts(auth.user_id, posts)
                .await
                .map_err(|err| AppError::from_service(err, "failed to create posts"))?;
            tracing::info!(author_id = %auth.user_id, count = posts.len(), "bulk-created posts");
            (StatusCode::CREATED, Json(posts)).into_response()
        }
    };

    Ok(response)
}

pub async fn get_post(
    Path(id): Path<i64>,
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<PostDetail>, AppError> {
    let service = PostService::new(state.db.clone());
    let post = service
        .get_post(id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to fetch post"))?;

    post.map(Json)
        .ok_or_else(|| AppError::not_found("post not found"))
}

pub async fn update_post(
    Path(id): Path<i64>,
    auth: AuthUser,
    State(state): State<AppState>,
    AppJson(body): AppJson<Value>,
) -> Result<Json<PostDetail>, AppError> {
    apply_post_update(id, auth, state, body, UpdateMode::Full).await
}

pub async fn partial_update_post(
    Path(id): Path<i64>,
    auth: AuthUser,
    State(state): State<AppState>,
    AppJson(body): AppJson<Value>,
) -> Result<Json<PostDetail>, AppError> {
    apply_post_update(id, auth, state, body, UpdateMode::Partial).await
}

async fn apply_post_update(
    id: i64,
    auth: AuthUser,
    state: AppState,
    body: Value,
    mode: UpdateMode,
) -> Result<Json<PostDetail>, AppError> {
    let request = UpdatePostRequest::parse(body, mode)?;

    let service = PostService::new(state.db.clone());
    let post = service
        .update_post(id, auth.user_id, request.changes, request.subposts)
        .await
        .map_err(|err| {
            tracing::debug!(error = %err, post_id = id, user_id = %auth.user_id, "post update rejected");
            AppError::from_service(err, "failed to update post")
        })?;

    Ok(Json(post))
}

pub async fn delete_post(
    Path(id): Path<i64>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = PostService::new(state.db.clone());
    service
        .delete_post(id, auth.user_id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to delete post"))?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

pub async fn toggle_like(
    Path(id): Path<i64>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, AppError> {
    let service = LikeService::new(state.db.clone());
    let outcome = service
        .toggle_like(auth.user_id, id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to toggle like"))?;

    Ok(Json(MessageResponse {
        message: outcome.message(),
    }))
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

pub async fn list_post_likes(
    Path(id): Path<i64>,
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Like>>, AppError> {
    let page = page_request(&state, query.page, query.page_size)?;

    let service = LikeService::new(state.db.clone());
    let (likes, count) = service
        .list_likes(id, page)
        .await
        .map_err(|err| AppError::from_service(err, "failed to list likes"))?;

    Ok(Json(Page::new(likes, count, page)))
}

#[derive(Serialize)]
pub struct ViewResponse {
    pub views_count: i64,
}

pub async fn record_view(
    Path(id): Path<i64>,
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ViewResponse>, AppError> {
    let service = PostService::new(state.db.clone());
    let views_count = service
        .record_view(id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to record view"))?;

    Ok(Json(ViewResponse { views_count }))
}

// ---------------------------------------------------------------------------
// Sub-posts
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct SubPostListQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub post: Option<i64>,
}

pub async fn list_subposts(
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<SubPostListQuery>,
) -> Result<Json<Page<SubPost>>, AppError> {
    let page = page_request(&state, query.page, query.page_size)?;

    let service = SubPostService::new(state.db.clone());
    let (subposts, count) = service
        .list_subposts(query.post, page)
        .await
        .map_err(|err| AppError::from_service(err, "failed to list sub-posts"))?;

    Ok(Json(Page::new(subposts, count, page)))
}

pub async fn create_subpost(
    auth: AuthUser,
    State(state): State<AppState>,
    AppJson(body): AppJson<Value>,
) -> Result<(StatusCode, Json<SubPost>), AppError> {
    let request = SubPostRequest::parse(body)?;

    let service = SubPostService::new(state.db.clone());
    let subpost = service
        .create_subpost(auth.user_id, request.post_id, request.subpost)
        .await
        .map_err(|err| AppError::from_service(err, "failed to create sub-post"))?;

    Ok((StatusCode::CREATED, Json(subpost)))
}

pub async fn get_subpost(
    Path(id): Path<i64>,
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<SubPost>, AppError> {
    let service = SubPostService::new(state.db.clone());
    let subpost = service
        .get_subpost(id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to fetch sub-post"))?;

    subpost
        .map(Json)
        .ok_or_else(|| AppError::not_found("sub-post not found"))
}

pub async fn update_subpost(
    Path(id): Path<i64>,
    auth: AuthUser,
    State(state): State<AppState>,
    AppJson(body): AppJson<Value>,
) -> Result<Json<SubPost>, AppError> {
    let request = SubPostRequest::parse(body)?;

    let service = SubPostService::new(state.db.clone());
    let subpost = service
        .replace_subpost(id, auth.user_id, request.post_id, request.subpost)
        .await
        .map_err(|err| AppError::from_service(err, "failed to update sub-post"))?;

    Ok(Json(subpost))
}

pub async fn delete_subpost(
    Path(id): Path<i64>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = SubPostService::new(state.db.clone());
    service
        .delete_subpost(id, auth.user_id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to delete sub-post"))?;

    Ok(StatusCode::NO_CONTENT)
}
