//! E2E tests for posts, likes, comments, follows and the feed

mod common;

use common::TestServer;
use serde_json::{Value, json};

fn files_in(server: &TestServer, dir: &str) -> usize {
    std::fs::read_dir(server.temp_dir.path().join("media").join(dir))
        .unwrap()
        .count()
}

#[tokio::test]
async fn test_create_post_with_images_serves_them() {
    let server = TestServer::new().await;
    let (account_id, token) = server.signed_up("alice@example.com").await;

    let first = reqwest::multipart::Part::bytes(b"first".to_vec()).file_name("one.png");
    let second = reqwest::multipart::Part::bytes(b"second".to_vec()).file_name("two.JPG");
    let form = reqwest::multipart::Form::new()
        .text("text-content", "hello world")
        .part("images", first)
        .part("images", second);

    let response = server
        .client
        .post(server.url("/api/v1/post"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["account_id"], account_id.as_str());
    assert_eq!(body["data"]["text_content"], "hello world");

    let images = body["data"]["images"].as_array().unwrap();
    assert_eq!(images.len(), 2);
    let first_url = images[0]["image_url"].as_str().unwrap();
    let second_url = images[1]["image_url"].as_str().unwrap();
    assert!(first_url.starts_with("/media/posts/") && first_url.ends_with(".png"));
    assert!(second_url.ends_with(".jpg"));

    let served = server.client.get(server.url(first_url)).send().await.unwrap();
    assert_eq!(served.status(), 200);
    assert_eq!(served.bytes().await.unwrap().as_ref(), b"first");
}

#[tokio::test]
async fn test_create_post_with_bad_extension_writes_nothing() {
    let server = TestServer::new().await;
    let (account_id, token) = server.signed_up("bob@example.com").await;

    let good = reqwest::multipart::Part::bytes(b"fine".to_vec()).file_name("fine.png");
    let bad = reqwest::multipart::Part::bytes(b"MZ".to_vec()).file_name("bad.exe");
    let form = reqwest::multipart::Form::new()
        .text("text-content", "should not exist")
        .part("images", good)
        .part("images", bad);

    let response = server
        .client
        .post(server.url("/api/v1/post"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    assert_eq!(files_in(&server, "posts"), 0);

    // Nobody can see a post that was never written
    let (_, follower) = server.signed_up("bob-follower@example.com").await;
    server
        .client
        .post(server.url(&format!("/api/v1/user/{account_id}/follow")))
        .bearer_auth(&follower)
        .send()
        .await
        .unwrap();
    let feed: Value = server
        .client
        .get(server.url("/api/v1/feed"))
        .bearer_auth(&follower)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(feed["data"], json!([]));
}

#[tokio::test]
async fn test_empty_post_is_rejected() {
    let server = TestServer::new().await;
    let (_, token) = server.signed_up("carol@example.com").await;

    let form = reqwest::multipart::Form::new().text("text-content", "   ");
    let response = server
        .client
        .post(server.url("/api/v1/post"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_like_is_idempotent() {
    let server = TestServer::new().await;
    let (_, author) = server.signed_up("dave@example.com").await;
    let (liker_id, liker) = server.signed_up("erin@example.com").await;
    let post_id = server.create_post(&author, "like me").await;

    let mut outcomes = Vec::new();
    for _ in 0..2 {
        let response = server
            .client
            .post(server.url("/api/v1/post/like"))
            .bearer_auth(&liker)
            .json(&json!({ "post_id": post_id }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        outcomes.push(response.json::<Value>().await.unwrap());
    }

    assert_eq!(outcomes[0]["data"]["already_liked"], false);
    assert_eq!(outcomes[0]["data"]["account_id"], liker_id.as_str());
    assert_eq!(outcomes[1]["data"]["already_liked"], true);
    assert_eq!(outcomes[1]["message"], "post already liked");
}

#[tokio::test]
async fn test_like_and_comment_on_missing_post_are_not_found() {
    let server = TestServer::new().await;
    let (_, token) = server.signed_up("frank@example.com").await;

    let like = server
        .client
        .post(server.url("/api/v1/post/like"))
        .bearer_auth(&token)
        .json(&json!({ "post_id": "01ARZ3NDEKTSV4RRFFQ69G5FAV" }))
        .send()
        .await
        .unwrap();
    assert_eq!(like.status(), 404);

    let comment = server
        .client
        .post(server.url("/api/v1/post/comment"))
        .bearer_auth(&token)
        .json(&json!({ "post_id": "01ARZ3NDEKTSV4RRFFQ69G5FAV", "comment": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(comment.status(), 404);
}

#[tokio::test]
async fn test_comment_requires_text() {
    let server = TestServer::new().await;
    let (_, token) = server.signed_up("grace@example.com").await;
    let post_id = server.create_post(&token, "comment here").await;

    let empty = server
        .client
        .post(server.url("/api/v1/post/comment"))
        .bearer_auth(&token)
        .json(&json!({ "post_id": post_id, "comment": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), 400);

    let created = server
        .client
        .post(server.url("/api/v1/post/comment"))
        .bearer_auth(&token)
        .json(&json!({ "post_id": post_id, "comment": "nice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    let body: Value = created.json().await.unwrap();
    assert_eq!(body["data"]["comment"], "nice");
    assert_eq!(body["data"]["post_id"], post_id.as_str());
}

#[tokio::test]
async fn test_follow_rules() {
    let server = TestServer::new().await;
    let (alice_id, alice) = server.signed_up("alice@example.com").await;
    let (bob_id, _) = server.signed_up("bob@example.com").await;

    let follow = |target: String| {
        let request = server
            .client
            .post(server.url(&format!("/api/v1/user/{target}/follow")))
            .bearer_auth(&alice);
        async move { request.send().await.unwrap().status() }
    };

    assert_eq!(follow(bob_id.clone()).await, 201);
    assert_eq!(follow(bob_id).await, 409);
    assert_eq!(follow(alice_id).await, 400);
    assert_eq!(follow("01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string()).await, 404);
}

#[tokio::test]
async fn test_feed_shows_followed_posts_with_likes_and_comments() {
    let server = TestServer::new().await;
    let (author_id, author) = server.signed_up("author@example.com").await;
    let (_, reader) = server.signed_up("reader@example.com").await;
    let (_, stranger) = server.signed_up("stranger@example.com").await;

    let older = server.create_post(&author, "older").await;
    let newer = server.create_post(&author, "newer").await;
    server.create_post(&stranger, "not followed").await;

    let follow = server
        .client
        .post(server.url(&format!("/api/v1/user/{author_id}/follow")))
        .bearer_auth(&reader)
        .send()
        .await
        .unwrap();
    assert_eq!(follow.status(), 201);

    server
        .client
        .post(server.url("/api/v1/post/like"))
        .bearer_auth(&reader)
        .json(&json!({ "post_id": older }))
        .send()
        .await
        .unwrap();
    server
        .client
        .post(server.url("/api/v1/post/comment"))
        .bearer_auth(&reader)
        .json(&json!({ "post_id": older, "comment": "first!" }))
        .send()
        .await
        .unwrap();

    let response = server
        .client
        .get(server.url("/api/v1/feed"))
        .bearer_auth(&reader)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    let posts = body["data"].as_array().unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0]["id"], newer.as_str());
    assert_eq!(posts[1]["id"], older.as_str());
    assert_eq!(posts[1]["author_name"], "author@example.com");
    assert_eq!(posts[1]["like_count"], 1);
    assert_eq!(posts[1]["images"].as_array().unwrap().len(), 1);
    assert_eq!(posts[1]["comments"][0]["comment"], "first!");
    assert_eq!(posts[0]["like_count"], 0);
}

#[tokio::test]
async fn test_get_post_by_id() {
    let server = TestServer::new().await;
    let (_, token) = server.signed_up("henry@example.com").await;
    let post_id = server.create_post(&token, "find me").await;

    let found = server
        .client
        .get(server.url(&format!("/api/v1/post/{post_id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(found.status(), 200);
    let body: Value = found.json().await.unwrap();
    assert_eq!(body["data"]["text_content"], "find me");
    assert_eq!(body["data"]["images"][0]["position"], 0);

    let missing = server
        .client
        .get(server.url("/api/v1/post/01ARZ3NDEKTSV4RRFFQ69G5FAV"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn test_concurrent_follows_create_one_edge() {
    let server = TestServer::new().await;
    let (_, follower) = server.signed_up("racer@example.com").await;
    let (target_id, _) = server.signed_up("target@example.com").await;

    let attempts = (0..6).map(|_| {
        server
            .client
            .post(server.url(&format!("/api/v1/user/{target_id}/follow")))
            .bearer_auth(&follower)
            .send()
    });
    let statuses: Vec<u16> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|response| response.unwrap().status().as_u16())
        .collect();

    assert_eq!(statuses.iter().filter(|&&s| s == 201).count(), 1);
    assert_eq!(statuses.iter().filter(|&&s| s == 409).count(), 5);
}
