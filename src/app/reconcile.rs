//! Nested sub-post reconciliation.
//!
//! An incoming `subposts` list is diffed against the rows stored under a post:
//! items with an id update their row, items without one are created, and stored
//! rows the list no longer mentions are deleted. Planning is pure; applying the
//! plan runs on the caller's connection so it shares the caller's transaction.

use std::collections::BTreeSet;

use anyhow::Result;
use sqlx::PgConnection;

use crate::app::error::ServiceError;
use crate::domain::subpost::{NewSubPost, SubPostItem};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubPostUpdate {
    pub id: i64,
    pub title: Option<String>,
    pub body: Option<String>,
}

impl SubPostUpdate {
    fn is_noop(&self) -> bool {
        self.title.is_none() && self.body.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubPostPlan {
    pub delete_ids: Vec<i64>,
    pub updates: Vec<SubPostUpdate>,
    pub creates: Vec<NewSubPost>,
}

/// Splits `items` into updates and creates and derives the rows to delete.
///
/// Fails without producing a plan when an update references an id that is not
/// stored under `post_id`; the error lists every such id in ascending order.
pub fn plan(
    post_id: i64,
    stored_ids: &BTreeSet<i64>,
    items: Vec<SubPostItem>,
) -> Result<SubPostPlan, ServiceError> {
    let mut plan = SubPostPlan::default();
    let mut update_ids = BTreeSet::new();

    for item in items {
        match item {
            SubPostItem::Update { id, title, body } => {
                update_ids.insert(id);
                plan.updates.push(SubPostUpdate { id, title, body });
            }
            SubPostItem::Create(new) => plan.creates.push(new),
        }
    }

    let foreign: Vec<i64> = update_ids.difference(stored_ids).copied().collect();
    if !foreign.is_empty() {
        return Err(ServiceError::ForeignSubPosts {
            post_id,
            ids: foreign,
        });
    }

    plan.delete_ids = stored_ids.difference(&update_ids).copied().collect();
    Ok(plan)
}

/// Loads the stored sub-post ids of `post_id` (locking them), plans against
/// `items` and applies the plan. Must run inside a transaction.
pub async fn reconcile(
    conn: &mut PgConnection,
    post_id: i64,
    items: Vec<SubPostItem>,
) -> Result<SubPostPlan> {
    let stored_ids: Vec<i64> =
        sqlx::query_scalar("SELECT id FROM subposts WHERE post_id = $1 FOR UPDATE")
            .bind(post_id)
            .fetch_all(&mut *conn)
            .await?;
    let stored_ids: BTreeSet<i64> = stored_ids.into_iter().collect();

    let plan = plan(post_id, &stored_ids, items)?;
    apply(conn, post_id, &plan).await?;

    tracing::debug!(
        post_id,
        deleted = plan.delete_ids.len(),
        updated = plan.updates.len(),
        created = plan.creates.len(),
        "reconciled sub-posts"
    );

    Ok(plan)
}

async fn apply(conn: &mut PgConnection, post_id: i64, plan: &SubPostPlan) -> Result<()> {
    if !plan.delete_ids.is_empty() {
        sqlx::query("DELETE FROM subposts WHERE post_id = $1 AND id = ANY($2)")
            .bind(post_id)
            .bind(plan.delete_ids.clone())
            .execute(&mut *conn)
            .await?;
    }

    for update in plan.updates.iter().filter(|update| !update.is_noop()) {
        sqlx::query(
            "UPDATE subposts \
             SET title = COALESCE($3, title), body = COALESCE($4, body), updated_at = now() \
             WHERE id = $1 AND post_id = $2",
        )
        .bind(update.id)
        .bind(post_id)
        .bind(update.title.as_deref())
        .bind(update.body.as_deref())
        .execute(&mut *conn)
        .await?;
    }

    insert_all(conn, post_id, &plan.creates).await
}

/// Bulk-inserts `items` under `post_id` in a single statement.
pub async fn insert_all(conn: &mut PgConnection, post_id: i64, items: &[NewSubPost]) -> Result<()> {
    if items.is_empty() {
        return Ok(());
    }

    let titles: Vec<String> = items.iter().map(|item| item.title.clone()).collect();
    let bodies: Vec<String> = items.iter().map(|item| item.body.clone()).collect();

    sqlx::query(
        "INSERT INTO subposts (post_id, title, body) \
         SELECT $1, t.title, t.body \
         FROM UNNEST($2::text[], $3::text[]) WITH ORDINALITY AS t(title, body, ord) \
         ORDER BY t.ord",
    )
    .bind(post_id)
    .bind(titles)
    .bind(bodies)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
