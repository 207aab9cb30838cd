use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::app::access;
use crate::app::error::ServiceError;
use crate::app::reconcile;
use crate::app::subposts::subpost_from_row;
use crate::domain::page::PageRequest;
use crate::domain::post::{NewPost, Post, PostChanges, PostDetail};
use crate::domain::subpost::{NewSubPost, SubPost, SubPostItem};
use crate::infra::db::Db;

const POST_SELECT: &str = "SELECT p.id, p.author_id, u.username AS author_display, p.title, p.body, \
            p.created_at, p.updated_at, p.views_count \
     FROM posts p \
     JOIN users u ON u.id = p.author_id";

#[derive(Clone)]
pub struct PostService {
    db: Db,
}

impl PostService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create_post(&self, author_id: Uuid, post: NewPost) -> Result<PostDetail> {
        let mut conn = self.db.pool().acquire().await?;
        let post = insert_post(&mut conn, author_id, &post).await?;

        Ok(PostDetail {
            post,
            subposts: Vec::new(),
        })
    }

    /// Creates a post and its sub-posts atomically.
    pub async fn create_post_with_subposts(
        &self,
        author_id: Uuid,
        post: NewPost,
        subposts: Vec<NewSubPost>,
    ) -> Result<PostDetail> {
        let mut tx = self.db.pool().begin().await?;

        let post = insert_post(&mut tx, author_id, &post).await?;
        reconcile::insert_all(&mut tx, post.id, &subposts).await?;
        let subposts = fetch_subposts(&mut tx, post.id).await?;

        tx.commit().await?;

        Ok(PostDetail { post, subposts })
    }

    /// Inserts every post in one statement; the result keeps input order.
    pub async fn create_posts(&self, author_id: Uuid, posts: Vec<NewPost>) -> Result<Vec<Post>> {
        let titles: Vec<String> = posts.iter().map(|post| post.title.clone()).collect();
        let bodies: Vec<String> = posts.iter().map(|post| post.body.clone()).collect();

        let rows = sqlx::query(
            "WITH inserted AS ( \
                INSERT INTO posts (author_id, title, body) \
                SELECT $1, t.title, t.body \
                FROM UNNEST($2::text[], $3::text[]) WITH ORDINALITY AS t(title, body, ord) \
                ORDER BY t.ord \
                RETURNING id, author_id, title, body, created_at, updated_at, views_count \
             ) \
             SELECT i.id, i.author_id, u.username AS author_display, i.title, i.body, \
                    i.created_at, i.updated_at, i.views_count \
             FROM inserted i \
             JOIN users u ON u.id = i.author_id \
             ORDER BY i.id",
        )
        .bind(author_id)
        .bind(titles)
        .bind(bodies)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(post_from_row).collect())
    }

    pub async fn get_post(&self, post_id: i64) -> Result<Option<PostDetail>> {
        let mut conn = self.db.pool().acquire().await?;
        fetch_detail(&mut conn, post_id).await
    }

    /// Newest first. Returns the page and the total number of matching posts.
    pub async fn list_posts(
        &self,
        author_id: Option<Uuid>,
        page: PageRequest,
    ) -> Result<(Vec<Post>, i64)> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM posts WHERE ($1::uuid IS NULL OR author_id = $1)",
        )
        .bind(author_id)
        .fetch_one(self.db.pool())
        .await?;

        let rows = sqlx::query(&format!(
            "{} \
             WHERE ($1::uuid IS NULL OR p.author_id = $1) \
             ORDER BY p.id DESC \
             LIMIT $2 OFFSET $3",
            POST_SELECT
        ))
        .bind(author_id)
        .bind(page.page_size)
        .bind(page.offset())
        .fetch_all(self.db.pool())
        .await?;

        Ok((rows.iter().map(post_from_row).collect(), count))
    }

    /// Applies top-level field changes and, when `subposts` is provided,
    /// reconciles the post's sub-posts against it. Everything happens in one
    /// transaction; a failure at any step leaves the post untouched.
    pub async fn update_post(
        &self,
        post_id: i64,
        user_id: Uuid,
        changes: PostChanges,
        subposts: Option<Vec<SubPostItem>>,
    ) -> Result<PostDetail> {
        let mut tx = self.db.pool().begin().await?;

        access::lock_owned_post(&mut tx, post_id, user_id).await?;

        if let Some(items) = subposts {
            reconcile::reconcile(&mut tx, post_id, items).await?;
        }

        sqlx::query(
            "UPDATE posts \
             SET title = COALESCE($2, title), body = COALESCE($3, body), updated_at = now() \
             WHERE id = $1",
        )
        .bind(post_id)
        .bind(changes.title)
        .bind(changes.body)
        .execute(&mut *tx)
        .await?;

        let detail = fetch_detail(&mut tx, post_id)
            .await?
            .ok_or(ServiceError::not_found("post"))?;

        tx.commit().await?;

        Ok(detail)
    }

    /// Sub-posts and likes go with the post through `ON DELETE CASCADE`.
    pub async fn delete_post(&self, post_id: i64, user_id: Uuid) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;

        access::lock_owned_post(&mut tx, post_id, user_id).await?;

        sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Increments the view counter in a single statement and returns the new
    /// value.
    pub async fn record_view(&self, post_id: i64) -> Result<i64> {
        let views: Option<i64> = sqlx::query_scalar(
            "UPDATE posts SET views_count = views_count + 1 WHERE id = $1 RETURNING views_count",
        )
        .bind(post_id)
        .fetch_optional(self.db.pool())
        .await?;

        views.ok_or_else(|| ServiceError::not_found("post").into())
    }
}

async fn insert_post(conn: &mut PgConnection, author_id: Uuid, post: &NewPost) -> Result<Post> {
    let row = sqlx::query(
        "WITH inserted AS ( \
            INSERT INTO posts (author_id, title, body) \
            VALUES ($1, $2, $3) \
            RETURNING id, author_id, title, body, created_at, updated_at, views_count \
         ) \
         SELECT i.id, i.author_id, u.username AS author_display, i.title, i.body, \
                i.created_at, i.updated_at, i.views_count \
         FROM inserted i \
         JOIN users u ON u.id = i.author_id",
    )
    .bind(author_id)
    .bind(&post.title)
    .bind(&post.body)
    .fetch_one(&mut *conn)
    .await?;

    Ok(post_from_row(&row))
}

async fn fetch_detail(conn: &mut PgConnection, post_id: i64) -> Result<Option<PostDetail>> {
    let row = sqlx::query(&format!("{} WHERE p.id = $1", POST_SELECT))
        .bind(post_id)
        .fetch_optional(&mut *conn)
        .await?;

    let post = match row {
        Some(row) => post_from_row(&row),
        None => return Ok(None),
    };
    let subposts = fetch_subposts(conn, post_id).await?;

    Ok(Some(PostDetail { post, subposts }))
}

async fn fetch_subposts(conn: &mut PgConnection, post_id: i64) -> Result<Vec<SubPost>> {
    let rows = sqlx::query(
        "SELECT id, post_id, title, body, created_at, updated_at \
         FROM subposts WHERE post_id = $1 ORDER BY id",
    )
    .bind(post_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.iter().map(subpost_from_row).collect())
}

fn post_from_row(row: &PgRow) -> Post {
    Post {
        id: row.get("id"),
        author_id: row.get("author_id"),
        author_display: row.get("author_display"),
        title: row.get("title"),
        body: row.get("body"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        views_count: row.get("views_count"),
    }
}
