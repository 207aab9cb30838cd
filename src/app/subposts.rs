use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::app::access;
use crate::domain::page::PageRequest;
use crate::domain::subpost::{NewSubPost, SubPost};
use crate::infra::db::Db;

#[derive(Clone)]
pub struct SubPostService {
    db: Db,
}

impl SubPostService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn list_subposts(
        &self,
        post_id: Option<i64>,
        page: PageRequest,
    ) -> Result<(Vec<SubPost>, i64)> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM subposts WHERE ($1::bigint IS NULL OR post_id = $1)",
        )
        .bind(post_id)
        .fetch_one(self.db.pool())
        .await?;

        let rows = sqlx::query(
            "SELECT id, post_id, title, body, created_at, updated_at \
             FROM subposts \
             WHERE ($1::bigint IS NULL OR post_id = $1) \
             ORDER BY id \
             LIMIT $2 OFFSET $3",
        )
        .bind(post_id)
        .bind(page.page_size)
        .bind(page.offset())
        .fetch_all(self.db.pool())
        .await?;

        Ok((rows.iter().map(subpost_from_row).collect(), count))
    }

    pub async fn get_subpost(&self, subpost_id: i64) -> Result<Option<SubPost>> {
        let row = sqlx::query(
            "SELECT id, post_id, title, body, created_at, updated_at \
             FROM subposts WHERE id = $1",
        )
        .bind(subpost_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(subpost_from_row))
    }

    /// Only the author of `post_id` may add sub-posts to it.
    pub async fn create_subpost(
        &self,
        user_id: Uuid,
        post_id: i64,
        subpost: NewSubPost,
    ) -> Result<SubPost> {
        let mut tx = self.db.pool().begin().await?;

        access::lock_owned_post(&mut tx, post_id, user_id).await?;

        let row = sqlx::query(
            "INSERT INTO subposts (post_id, title, body) VALUES ($1, $2, $3) \
             RETURNING id, post_id, title, body, created_at, updated_at",
        )
        .bind(post_id)
        .bind(subpost.title)
        .bind(subpost.body)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(subpost_from_row(&row))
    }

    /// Full replacement. Moving the sub-post to another post requires
    /// authorship of both posts.
    pub async fn replace_subpost(
        &self,
        subpost_id: i64,
        user_id: Uuid,
        post_id: i64,
        subpost: NewSubPost,
    ) -> Result<SubPost> {
        let mut tx = self.db.pool().begin().await?;

        let current_post_id = access::subpost_parent(&mut tx, subpost_id).await?;
        access::lock_owned_posts(&mut tx, &[current_post_id, post_id], user_id).await?;
        access::lock_subpost(&mut tx, subpost_id, current_post_id).await?;

        let row = sqlx::query(
            "UPDATE subposts \
             SET post_id = $2, title = $3, body = $4, updated_at = now() \
             WHERE id = $1 \
             RETURNING id, post_id, title, body, created_at, updated_at",
        )
        .bind(subpost_id)
        .bind(post_id)
        .bind(subpost.title)
        .bind(subpost.body)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(subpost_from_row(&row))
    }

    pub async fn delete_subpost(&self, subpost_id: i64, user_id: Uuid) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;

        access::lock_owned_subpost(&mut tx, subpost_id, user_id).await?;

        sqlx::query("DELETE FROM subposts WHERE id = $1")
            .bind(subpost_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

pub(crate) fn subpost_from_row(row: &PgRow) -> SubPost {
    SubPost {
        id: row.get("id"),
        post_id: row.get("post_id"),
        title: row.get("title"),
        body: row.get("body"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
