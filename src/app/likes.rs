use anyhow::Result;
use sqlx::Row;
use uuid::Uuid;

use crate::app::error::ServiceError;
use crate::domain::like::{Like, LikeToggle};
use crate::domain::page::PageRequest;
use crate::infra::db::Db;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Clone)]
pub struct LikeService {
    db: Db,
}

impl LikeService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Removes the caller's like on `post_id` if present, adds it otherwise.
    ///
    /// The `(user_id, post_id)` primary key is the only guard against two
    /// concurrent toggles both inserting; the loser gets
    /// [`ServiceError::Conflict`].
    pub async fn toggle_like(&self, user_id: Uuid, post_id: i64) -> Result<LikeToggle> {
        let mut tx = self.db.pool().begin().await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)")
            .bind(post_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(ServiceError::not_found("post").into());
        }

        let removed = sqlx::query("DELETE FROM likes WHERE user_id = $1 AND post_id = $2")
            .bind(user_id)
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        let outcome = if removed.rows_affected() > 0 {
            LikeToggle::Removed
        } else {
            sqlx::query("INSERT INTO likes (user_id, post_id) VALUES ($1, $2)")
                .bind(user_id)
                .bind(post_id)
                .execute(&mut *tx)
                .await
                .map_err(classify_insert_error)?;
            LikeToggle::Added
        };

        tx.commit().await?;

        Ok(outcome)
    }

    pub async fn list_likes(&self, post_id: i64, page: PageRequest) -> Result<(Vec<Like>, i64)> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)")
            .bind(post_id)
            .fetch_one(self.db.pool())
            .await?;
        if !exists {
            return Err(ServiceError::not_found("post").into());
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM likes WHERE post_id = $1")
            .bind(post_id)
            .fetch_one(self.db.pool())
            .await?;

        let rows = sqlx::query(
            "SELECT user_id, post_id, created_at \
             FROM likes \
             WHERE post_id = $1 \
             ORDER BY created_at DESC, user_id \
             LIMIT $2 OFFSET $3",
        )
        .bind(post_id)
        .bind(page.page_size)
        .bind(page.offset())
        .fetch_all(self.db.pool())
        .await?;

        let mut likes = Vec::with_capacity(rows.len());
        for row in rows {
            likes.push(Like {
                user_id: row.get("user_id"),
                post_id: row.get("post_id"),
                created_at: row.get("created_at"),
            });
        }

        Ok((likes, count))
    }
}

fn classify_insert_error(err: sqlx::Error) -> anyhow::Error {
    let code = err
        .as_database_error()
        .and_then(|db_err| db_err.code())
        .map(|code| code.into_owned());

    match code.as_deref() {
        Some(UNIQUE_VIOLATION) => {
            ServiceError::Conflict("like was changed by a concurrent request".to_string()).into()
        }
        Some(FOREIGN_KEY_VIOLATION) => ServiceError::not_found("post").into(),
        _ => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    use axum::http::StatusCode;
    use sqlx::error::{DatabaseError, ErrorKind};

    use super::*;
    use crate::http::AppError;

    #[derive(Debug)]
    struct PgCode(&'static str);

    impl fmt::Display for PgCode {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "database error {}", self.0)
        }
    }

    impl StdError for PgCode {}

    impl DatabaseError for PgCode {
        fn message(&self) -> &str {
            "constraint violated"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.0))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            match self.0 {
                UNIQUE_VIOLATION => ErrorKind::UniqueViolation,
                FOREIGN_KEY_VIOLATION => ErrorKind::ForeignKeyViolation,
                _ => ErrorKind::Other,
            }
        }
    }

    fn insert_failure(code: &'static str) -> AppError {
        let err = classify_insert_error(sqlx::Error::Database(Box::new(PgCode(code))));
        AppError::from_service(err, "failed to toggle like")
    }

    #[test]
    fn duplicate_like_insert_is_a_conflict() {
        let err = insert_failure(UNIQUE_VIOLATION);
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.message(), "like was changed by a concurrent request");
    }

    #[test]
    fn like_on_deleted_post_is_not_found() {
        let err = insert_failure(FOREIGN_KEY_VIOLATION);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.message(), "post not found");
    }

    #[test]
    fn other_database_errors_stay_internal() {
        let err = insert_failure("40P01");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
