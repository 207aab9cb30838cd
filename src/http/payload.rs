//! Request-body parsing for post and sub-post writes.
//!
//! Bodies arrive as raw JSON so the shape can decide the request variant
//! (array, object with `subposts`, plain object). Each object is then
//! deserialized into a field struct and checked by hand, so every rejection
//! can name the field at fault, e.g. `subposts[2].title` or `[0].body`.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::post::{NewPost, PostChanges, TITLE_MAX_CHARS};
use crate::domain::subpost::{NewSubPost, SubPostItem};
use crate::http::AppError;

pub const MAX_BULK_POSTS: usize = 100;

/// Fields of a post object. `subposts` stays raw so a non-list value can be
/// reported under its own key.
#[derive(Debug, Deserialize)]
struct PostFields {
    title: Option<String>,
    body: Option<String>,
    subposts: Option<Value>,
}

/// Fields of a sub-post object, nested or standalone.
#[derive(Debug, Deserialize)]
struct SubPostFields {
    id: Option<i64>,
    post: Option<i64>,
    title: Option<String>,
    body: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CreatePostRequest {
    Single(NewPost),
    Nested {
        post: NewPost,
        subposts: Vec<NewSubPost>,
    },
    Bulk(Vec<NewPost>),
}

impl CreatePostRequest {
    pub fn parse(body: Value) -> Result<Self, AppError> {
        match body {
            Value::Array(items) => {
                if items.is_empty() {
                    return Err(AppError::bad_request("expected at least one post"));
                }
                if items.len() > MAX_BULK_POSTS {
                    return Err(AppError::bad_request(format!(
                        "at most {} posts can be created at once",
                        MAX_BULK_POSTS
                    )));
                }

                let mut posts = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    let prefix = format!("[{}]", index);
                    let fields: PostFields = fields_of(item, &prefix)?;
                    if fields.subposts.is_some() {
                        return Err(AppError::validation(
                            format!("{}.subposts", prefix),
                            "nested sub-posts are not supported in bulk creation",
                        ));
                    }
                    posts.push(new_post(fields, &format!("{}.", prefix))?);
                }
                Ok(Self::Bulk(posts))
            }
            body @ Value::Object(_) => {
                let mut fields: PostFields = fields_of(body, "")?;
                let subposts = subpost_list(fields.subposts.take())?;
                let post = new_post(fields, "")?;

                match subposts {
                    None => Ok(Self::Single(post)),
                    Some(items) => {
                        let mut subposts = Vec::with_capacity(items.len());
                        for (index, item) in items.into_iter().enumerate() {
                            let prefix = format!("subposts[{}]", index);
                            let fields: SubPostFields = fields_of(item, &prefix)?;
                            if fields.id.is_some() {
                                return Err(AppError::validation(
                                    format!("{}.id", prefix),
                                    "must not be set when creating a post",
                                ));
                            }
                            subposts.push(new_subpost(fields, &format!("{}.", prefix))?);
                        }
                        Ok(Self::Nested { post, subposts })
                    }
                }
            }
            _ => Err(AppError::bad_request("expected a JSON object or array")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// PUT: `title` and `body` are required.
    Full,
    /// PATCH: every field is optional.
    Partial,
}

#[derive(Debug, PartialEq, Eq)]
pub struct UpdatePostRequest {
    pub changes: PostChanges,
    /// `None` leaves sub-posts untouched; `Some(vec![])` removes them all.
    pub subposts: Option<Vec<SubPostItem>>,
}

impl UpdatePostRequest {
    pub fn parse(body: Value, mode: UpdateMode) -> Result<Self, AppError> {
        if !body.is_object() {
            return Err(AppError::bad_request("expected a JSON object"));
        }
        let mut fields: PostFields = fields_of(body, "")?;

        let subposts = match subpost_list(fields.subposts.take())? {
            Some(items) => Some(subpost_items(items)?),
            None => None,
        };

        let changes = match mode {
            UpdateMode::Full => {
                let post = new_post(fields, "")?;
                PostChanges {
                    title: Some(post.title),
                    body: Some(post.body),
                }
            }
            UpdateMode::Partial => PostChanges {
                title: optional_text(fields.title, "title", Some(TITLE_MAX_CHARS))?,
                body: optional_text(fields.body, "body", None)?,
            },
        };

        Ok(Self { changes, subposts })
    }
}

/// Body of `POST /subposts/` and `PUT /subposts/{id}/`.
#[derive(Debug, PartialEq, Eq)]
pub struct SubPostRequest {
    pub post_id: i64,
    pub subpost: NewSubPost,
}

impl SubPostRequest {
    pub fn parse(body: Value) -> Result<Self, AppError> {
        if !body.is_object() {
            return Err(AppError::bad_request("expected a JSON object"));
        }
        let fields: SubPostFields = fields_of(body, "")?;
        let post_id = match fields.post {
            None => return Err(AppError::validation("post", "this field is required")),
            Some(id) if id > 0 => id,
            Some(_) => return Err(AppError::validation("post", "expected a positive integer")),
        };

        Ok(Self {
            post_id,
            subpost: new_subpost(fields, "")?,
        })
    }
}

/// Deserializes one JSON object. `key` names it in errors; an empty key means
/// the request body itself.
fn fields_of<T: DeserializeOwned>(value: Value, key: &str) -> Result<T, AppError> {
    if !value.is_object() {
        return Err(AppError::validation(key, "expected an object"));
    }
    serde_json::from_value(value).map_err(|err| {
        if key.is_empty() {
            AppError::bad_request(err.to_string())
        } else {
            AppError::validation(key, err.to_string())
        }
    })
}

fn subpost_list(value: Option<Value>) -> Result<Option<Vec<Value>>, AppError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(_) => Err(AppError::validation("subposts", "expected a list")),
    }
}

fn subpost_items(items: Vec<Value>) -> Result<Vec<SubPostItem>, AppError> {
    let mut seen = BTreeSet::new();
    let mut parsed = Vec::with_capacity(items.len());

    for (index, item) in items.into_iter().enumerate() {
        let prefix = format!("subposts[{}]", index);
        let fields: SubPostFields = fields_of(item, &prefix)?;

        let item = match fields.id {
            None => SubPostItem::Create(new_subpost(fields, &format!("{}.", prefix))?),
            Some(id) if id <= 0 => {
                return Err(AppError::validation(
                    format!("{}.id", prefix),
                    "expected a positive integer",
                ))
            }
            Some(id) => {
                if !seen.insert(id) {
                    return Err(AppError::validation(
                        format!("{}.id", prefix),
                        format!("duplicate sub-post id {}", id),
                    ));
                }
                SubPostItem::Update {
                    id,
                    title: optional_text(
                        fields.title,
                        &format!("{}.title", prefix),
                        Some(TITLE_MAX_CHARS),
                    )?,
                    body: optional_text(fields.body, &format!("{}.body", prefix), None)?,
                }
            }
        };
        parsed.push(item);
    }

    Ok(parsed)
}

fn new_post(fields: PostFields, prefix: &str) -> Result<NewPost, AppError> {
    Ok(NewPost {
        title: required_text(fields.title, &format!("{}title", prefix), Some(TITLE_MAX_CHARS))?,
        body: required_text(fields.body, &format!("{}body", prefix), None)?,
    })
}

fn new_subpost(fields: SubPostFields, prefix: &str) -> Result<NewSubPost, AppError> {
    Ok(NewSubPost {
        title: required_text(fields.title, &format!("{}title", prefix), Some(TITLE_MAX_CHARS))?,
        body: required_text(fields.body, &format!("{}body", prefix), None)?,
    })
}

fn required_text(
    value: Option<String>,
    field: &str,
    max_chars: Option<usize>,
) -> Result<String, AppError> {
    match value {
        None => Err(AppError::validation(field, "this field is required")),
        Some(value) => text(value, field, max_chars),
    }
}

fn optional_text(
    value: Option<String>,
    field: &str,
    max_chars: Option<usize>,
) -> Result<Option<String>, AppError> {
    value.map(|value| text(value, field, max_chars)).transpose()
}

fn text(value: String, field: &str, max_chars: Option<usize>) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(field, "this field may not be blank"));
    }
    if let Some(max_chars) = max_chars {
        if value.chars().count() > max_chars {
            return Err(AppError::validation(
                field,
                format!("ensure this field has no more than {} characters", max_chars),
            ));
        }
    }

    Ok(value.to_string())
}
