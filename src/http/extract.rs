use axum::extract::FromRequest;

use crate::http::AppError;

/// `axum::Json`, but a body that is missing, malformed or of the wrong content
/// type is rejected with the regular JSON error format.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);
