use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubPost {
    pub id: i64,
    #[serde(rename = "post")]
    pub post_id: i64,
    pub title: String,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubPost {
    pub title: String,
    pub body: String,
}

/// One entry of a nested `subposts` list: items carrying an id update the
/// stored row, items without one are created under the parent post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubPostItem {
    Update {
        id: i64,
        title: Option<String>,
        body: Option<String>,
    },
    Create(NewSubPost),
}
