use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Like {
    #[serde(rename = "user")]
    pub user_id: Uuid,
    #[serde(rename = "post")]
    pub post_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeToggle {
    Added,
    Removed,
}

impl LikeToggle {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Added => "Вы поставили лайк",
            Self::Removed => "Лайк убран",
        }
    }
}
