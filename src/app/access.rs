use anyhow::Result;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::app::error::ServiceError;

// Lock order across every write path: parent posts (ascending id), then
// sub-post rows.

/// Checks that `user_id` authored post `post_id` and locks the post row for the
/// rest of the surrounding transaction. Unknown posts are reported before
/// ownership so callers can tell 404 from 403.
pub async fn lock_owned_post(conn: &mut PgConnection, post_id: i64, user_id: Uuid) -> Result<()> {
    let author_id: Option<Uuid> =
        sqlx::query_scalar("SELECT author_id FROM posts WHERE id = $1 FOR UPDATE")
            .bind(post_id)
            .fetch_optional(&mut *conn)
            .await?;

    match author_id {
        Some(author_id) if author_id == user_id => Ok(()),
        Some(_) => Err(ServiceError::post_denied(post_id).into()),
        None => Err(ServiceError::not_found("post").into()),
    }
}

/// [`lock_owned_post`] over several posts, locked in ascending id order.
pub async fn lock_owned_posts(
    conn: &mut PgConnection,
    post_ids: &[i64],
    user_id: Uuid,
) -> Result<()> {
    let mut post_ids = post_ids.to_vec();
    post_ids.sort_unstable();
    post_ids.dedup();

    for post_id in post_ids {
        lock_owned_post(conn, post_id, user_id).await?;
    }
    Ok(())
}

/// Current parent of a sub-post, read without locking.
pub async fn subpost_parent(conn: &mut PgConnection, subpost_id: i64) -> Result<i64> {
    let post_id: Option<i64> = sqlx::query_scalar("SELECT post_id FROM subposts WHERE id = $1")
        .bind(subpost_id)
        .fetch_optional(&mut *conn)
        .await?;

    post_id.ok_or_else(|| ServiceError::not_found("sub-post").into())
}

/// Locks the sub-post row, provided it still belongs to `post_id`. The parent
/// must already be locked; a sub-post moved or deleted in between reads as
/// not found.
pub async fn lock_subpost(conn: &mut PgConnection, subpost_id: i64, post_id: i64) -> Result<()> {
    let locked: Option<i64> =
        sqlx::query_scalar("SELECT id FROM subposts WHERE id = $1 AND post_id = $2 FOR UPDATE")
            .bind(subpost_id)
            .bind(post_id)
            .fetch_optional(&mut *conn)
            .await?;

    match locked {
        Some(_) => Ok(()),
        None => Err(ServiceError::not_found("sub-post").into()),
    }
}

/// Resolves the parent post of a sub-post, locks the parent through
/// [`lock_owned_post`] and then the sub-post itself. Returns the parent id.
pub async fn lock_owned_subpost(
    conn: &mut PgConnection,
    subpost_id: i64,
    user_id: Uuid,
) -> Result<i64> {
    let post_id = subpost_parent(conn, subpost_id).await?;
    lock_owned_post(conn, post_id, user_id).await?;
    lock_subpost(conn, subpost_id, post_id).await?;
    Ok(post_id)
}
