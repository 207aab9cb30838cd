use thiserror::Error;

/// Domain failures raised by the services. They travel inside `anyhow::Error`
/// and are recovered at the HTTP edge with `downcast_ref`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{resource} not found")]
    NotFound { resource: &'static str },

    #[error("you do not have permission to modify {resource} {id}")]
    PermissionDenied { resource: &'static str, id: i64 },

    #[error("sub-posts {} do not belong to post {post_id}", join_ids(.ids))]
    ForeignSubPosts { post_id: i64, ids: Vec<i64> },

    #[error("{0}")]
    Conflict(String),
}

impl ServiceError {
    pub fn not_found(resource: &'static str) -> Self {
        Self::NotFound { resource }
    }

    pub fn post_denied(id: i64) -> Self {
        Self::PermissionDenied { resource: "post", id }
    }
}

fn join_ids(ids: &[i64]) -> String {
    let parts: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    format!("[{}]", parts.join(", "))
}
