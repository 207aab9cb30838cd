//! Sub-post Tests
//!
//! Covers the standalone sub-post endpoints: listing, creation under an
//! owned post, replacement (including moving between posts) and deletion.

mod common;

use axum::http::StatusCode;
use common::app;
use futures::future::{join_all, FutureExt};
use serde_json::json;

#[tokio::test]
async fn create_subpost_under_own_post() {
    let app = app().await;
    let user = app.create_user("sub_create").await;
    let post_id = app.create_post_for_user(user.id, "Пост").await;

    let resp = app
        .post_json(
            "/subposts/",
            json!({ "post": post_id, "title": "Часть", "body": "Текст" }),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::CREATED);
    let body = resp.json();
    assert_eq!(body["post"].as_i64().unwrap(), post_id);
    assert_eq!(body["title"], "Часть");
    assert_eq!(app.subposts_of(post_id).await.len(), 1);
}

#[tokio::test]
async fn create_subpost_under_foreign_post_is_forbidden() {
    let app = app().await;
    let author = app.create_user("sub_owner").await;
    let other = app.create_user("sub_intruder").await;
    let post_id = app.create_post_for_user(author.id, "Чужой").await;

    let resp = app
        .post_json(
            "/subposts/",
            json!({ "post": post_id, "title": "Вставка", "body": "Текст" }),
            Some(&other.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert!(app.subposts_of(post_id).await.is_empty());
}

#[tokio::test]
async fn create_subpost_for_unknown_post_is_not_found() {
    let app = app().await;
    let user = app.create_user("sub_create_404").await;

    let resp = app
        .post_json(
            "/subposts/",
            json!({ "post": 999999, "title": "Часть", "body": "Текст" }),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_subpost_requires_post_field() {
    let app = app().await;
    let user = app.create_user("sub_create_nopost").await;

    let resp = app
        .post_json(
            "/subposts/",
            json!({ "title": "Часть", "body": "Текст" }),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.json()["fields"]["post"], "this field is required");
}

#[tokio::test]
async fn list_subposts_filters_by_post() {
    let app = app().await;
    let user = app.create_user("sub_list").await;
    let post_id = app.create_post_for_user(user.id, "Пост").await;
    let other_post = app.create_post_for_user(user.id, "Другой").await;
    app.create_subpost(post_id, "Первый").await;
    app.create_subpost(post_id, "Второй").await;
    app.create_subpost(other_post, "Чужой").await;

    let resp = app
        .get(
            &format!("/subposts/?post={}", post_id),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["count"], 2);
    let results = body["results"].as_array().unwrap();
    assert!(results
        .iter()
        .all(|s| s["post"].as_i64().unwrap() == post_id));
}

#[tokio::test]
async fn replace_subpost_moves_between_own_posts() {
    let app = app().await;
    let user = app.create_user("sub_move").await;
    let from = app.create_post_for_user(user.id, "Откуда").await;
    let to = app.create_post_for_user(user.id, "Куда").await;
    let subpost_id = app.create_subpost(from, "Путник").await;

    let resp = app
        .put_json(
            &format!("/subposts/{}/", subpost_id),
            json!({ "post": to, "title": "Переехал", "body": "Новый текст" }),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["post"].as_i64().unwrap(), to);
    assert_eq!(body["title"], "Переехал");
    assert!(app.subposts_of(from).await.is_empty());
    assert_eq!(app.subposts_of(to).await.len(), 1);
}

#[tokio::test]
async fn replace_subpost_into_foreign_post_is_forbidden() {
    let app = app().await;
    let user = app.create_user("sub_move_owner").await;
    let other = app.create_user("sub_move_target").await;
    let own_post = app.create_post_for_user(user.id, "Мой").await;
    let foreign_post = app.create_post_for_user(other.id, "Чужой").await;
    let subpost_id = app.create_subpost(own_post, "Часть").await;

    let resp = app
        .put_json(
            &format!("/subposts/{}/", subpost_id),
            json!({ "post": foreign_post, "title": "Часть", "body": "Текст" }),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(app.subposts_of(own_post).await.len(), 1);
}

#[tokio::test]
async fn delete_subpost_by_non_author_is_forbidden() {
    let app = app().await;
    let author = app.create_user("sub_del_owner").await;
    let other = app.create_user("sub_del_intruder").await;
    let post_id = app.create_post_for_user(author.id, "Пост").await;
    let subpost_id = app.create_subpost(post_id, "Часть").await;

    let resp = app
        .delete(&format!("/subposts/{}/", subpost_id), Some(&other.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app
        .delete(&format!("/subposts/{}/", subpost_id), Some(&author.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);
    assert!(app.subposts_of(post_id).await.is_empty());
}

#[tokio::test]
async fn get_unknown_subpost_is_not_found() {
    let app = app().await;
    let user = app.create_user("sub_get_404").await;

    let resp = app.get("/subposts/999999/", Some(&user.access_token)).await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.error_message(), "sub-post not found");
}

#[tokio::test]
async fn nested_update_and_subpost_delete_do_not_deadlock() {
    let app = app().await;
    let user = app.create_user("sub_lock_order").await;

    let mut cases = Vec::new();
    for round in 0..5 {
        let post_id = app
            .create_post_for_user(user.id, &format!("Пост {}", round))
            .await;
        let keep = app.create_subpost(post_id, "Оставить").await;
        let doomed = app.create_subpost(post_id, "Удалить").await;
        cases.push((post_id, keep, doomed));
    }

    let paths: Vec<(String, String)> = cases
        .iter()
        .map(|(post_id, _, doomed)| {
            (
                format!("/posts/{}/", post_id),
                format!("/subposts/{}/", doomed),
            )
        })
        .collect();

    let mut requests = Vec::new();
    for ((post_path, subpost_path), (_, keep, _)) in paths.iter().zip(&cases) {
        requests.push(
            app.patch_json(
                post_path,
                json!({ "subposts": [{ "id": keep, "title": "Обновлён" }] }),
                Some(&user.access_token),
            )
            .boxed_local(),
        );
        requests.push(
            app.delete(subpost_path, Some(&user.access_token)).boxed_local(),
        );
    }
    let responses = join_all(requests).await;

    for pair in responses.chunks(2) {
        assert_eq!(pair[0].status, StatusCode::OK);
        // whichever ran second finds the sub-post already gone
        assert!(
            pair[1].status == StatusCode::NO_CONTENT || pair[1].status == StatusCode::NOT_FOUND,
            "unexpected delete status {}",
            pair[1].status
        );
    }

    for (post_id, keep, _) in &cases {
        let subposts = app.subposts_of(*post_id).await;
        assert_eq!(subposts.len(), 1);
        assert_eq!(subposts[0].0, *keep);
        assert_eq!(subposts[0].1, "Обновлён");
    }
}

#[tokio::test]
async fn replace_subpost_concurrent_with_parent_update() {
    let app = app().await;
    let user = app.create_user("sub_move_race").await;
    let from = app.create_post_for_user(user.id, "Откуда").await;
    let to = app.create_post_for_user(user.id, "Куда").await;
    let subpost_id = app.create_subpost(from, "Путник").await;

    let subpost_path = format!("/subposts/{}/", subpost_id);
    let to_path = format!("/posts/{}/", to);
    let from_path = format!("/posts/{}/", from);

    let requests = vec![
        app.put_json(
            &subpost_path,
            json!({ "post": to, "title": "Переехал", "body": "Текст" }),
            Some(&user.access_token),
        )
        .boxed_local(),
        app.patch_json(
            &to_path,
            json!({ "title": "Куда", "subposts": [] }),
            Some(&user.access_token),
        )
        .boxed_local(),
        app.patch_json(
            &from_path,
            json!({ "title": "Откуда" }),
            Some(&user.access_token),
        )
        .boxed_local(),
    ];
    let responses = join_all(requests).await;

    assert!(responses
        .iter()
        .all(|resp| resp.status != StatusCode::INTERNAL_SERVER_ERROR));
}
