#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use agora::auth::create_access_token;
use agora::cache::InMemoryViewCache;
use agora::models::{Role, User};
use agora::repo::inmem::InMemRepo;
use agora::storage::{ImageStore, ImageStoreError};
use agora::{config, AppState};
use chrono::Utc;
use serial_test::serial;
use std::sync::Arc;

struct MockImageStore;

#[async_trait::async_trait]
impl ImageStore for MockImageStore {
    async fn upload(&self, _bytes: &[u8], filename: &str) -> Result<String, ImageStoreError> {
        Ok(format!("https://img.test/{filename}"))
    }
}

fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
}

fn state() -> AppState {
    AppState::new(
        Arc::new(InMemRepo::new()),
        Arc::new(InMemoryViewCache::default()),
        Arc::new(MockImageStore),
    )
}

// Tokens are forged directly; post/comment handlers only need valid claims.
fn token_for(id: i64, nickname: &str, role: Role) -> String {
    let now = Utc::now();
    let user = User {
        id,
        email: format!("{nickname}@test.local"),
        password: String::new(),
        nickname: nickname.into(),
        role,
        created_at: now,
        updated_at: now,
    };
    create_access_token(&user).unwrap()
}

fn admin_token() -> String {
    token_for(9, "admin", Role::Admin)
}

const BOUNDARY: &str = "XBOUNDARYX";

fn post_form(fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_post(uri: &str, token: &str, fields: &[(&str, &str)]) -> actix_http::Request {
    test::TestRequest::post()
        .uri(uri)
        .insert_header(("Authorization", format!("Bearer {token}")))
        .insert_header((
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(post_form(fields))
        .to_request()
}

fn multipart_patch(uri: &str, token: &str, fields: &[(&str, &str)]) -> actix_http::Request {
    test::TestRequest::patch()
        .uri(uri)
        .insert_header(("Authorization", format!("Bearer {token}")))
        .insert_header((
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(post_form(fields))
        .to_request()
}

async fn create_post<S>(app: &S, token: &str, title: &str, category: &str) -> serde_json::Value
where
    S: actix_web::dev::Service<
        actix_http::Request,
        Response = actix_web::dev::ServiceResponse,
        Error = actix_web::Error,
    >,
{
    let req = multipart_post(
        "/post",
        token,
        &[("title", title), ("content", "body text"), ("category", category)],
    );
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status(), 201);
    serde_json::from_slice(&test::read_body(resp).await).unwrap()
}

#[actix_web::test]
#[serial]
async fn test_notice_creation_is_admin_only() {
    setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state()))
            .configure(config),
    )
    .await;

    // admin creates a notice
    let post = create_post(&app, &admin_token(), "sys maintenance", "notice").await;
    assert_eq!(post["category"], "notice");
    assert_eq!(post["view_cnt"], 0);

    // a regular user may not
    let req = multipart_post(
        "/post",
        &token_for(1, "user1", Role::User),
        &[("title", "fake notice"), ("content", "x"), ("category", "notice")],
    );
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
}

#[actix_web::test]
#[serial]
async fn test_inquiry_visible_to_owner_and_admin_only() {
    setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state()))
            .configure(config),
    )
    .await;

    let owner = token_for(2, "owner", Role::User);
    let stranger = token_for(3, "stranger", Role::User);

    let post = create_post(&app, &owner, "billing question", "inquiry").await;
    let id = post["id"].as_i64().unwrap();

    // stranger is rejected outright
    let req = test::TestRequest::get()
        .uri(&format!("/post/{id}"))
        .insert_header(("Authorization", format!("Bearer {stranger}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    // admin and owner both read it
    for token in [admin_token(), owner.clone()] {
        let req = test::TestRequest::get()
            .uri(&format!("/post/{id}"))
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }

    // category listing drops the inquiry for the stranger
    let req = test::TestRequest::get()
        .uri("/post/category/inquiry")
        .insert_header(("Authorization", format!("Bearer {stranger}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let posts: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(posts.as_array().unwrap().len(), 0);

    // admin sees it in the same listing
    let req = test::TestRequest::get()
        .uri("/post/category/inquiry")
        .insert_header(("Authorization", format!("Bearer {}", admin_token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let posts: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(posts.as_array().unwrap().len(), 1);
}

#[actix_web::test]
#[serial]
async fn test_view_count_increments_once_per_viewer() {
    setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state()))
            .configure(config),
    )
    .await;

    let owner = token_for(2, "owner", Role::User);
    let post = create_post(&app, &owner, "hello", "qna").await;
    let id = post["id"].as_i64().unwrap();

    // first read counts
    let req = test::TestRequest::get()
        .uri(&format!("/post/{id}"))
        .insert_header(("Authorization", format!("Bearer {owner}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["view_cnt"], 1);

    // second read inside the dedup window does not
    let req = test::TestRequest::get()
        .uri(&format!("/post/{id}"))
        .insert_header(("Authorization", format!("Bearer {owner}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["view_cnt"], 1);

    // a different viewer counts separately
    let other = token_for(3, "other", Role::User);
    let req = test::TestRequest::get()
        .uri(&format!("/post/{id}"))
        .insert_header(("Authorization", format!("Bearer {other}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["view_cnt"], 2);
}

#[actix_web::test]
#[serial]
async fn test_soft_delete_makes_post_unreachable() {
    setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state()))
            .configure(config),
    )
    .await;

    let owner = token_for(2, "owner", Role::User);
    let stranger = token_for(3, "stranger", Role::User);
    let post = create_post(&app, &owner, "ephemeral", "qna").await;
    let id = post["id"].as_i64().unwrap();

    // stranger cannot delete someone else's post
    let req = test::TestRequest::delete()
        .uri(&format!("/post/{id}/category/qna"))
        .insert_header(("Authorization", format!("Bearer {stranger}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    // owner soft-deletes
    let req = test::TestRequest::delete()
        .uri(&format!("/post/{id}/category/qna"))
        .insert_header(("Authorization", format!("Bearer {owner}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    // the id no longer resolves, even for its owner
    let req = test::TestRequest::get()
        .uri(&format!("/post/{id}"))
        .insert_header(("Authorization", format!("Bearer {owner}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    // deleting twice is also a 404
    let req = test::TestRequest::delete()
        .uri(&format!("/post/{id}/category/qna"))
        .insert_header(("Authorization", format!("Bearer {owner}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
#[serial]
async fn test_update_post_requires_ownership() {
    setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state()))
            .configure(config),
    )
    .await;

    let owner = token_for(2, "owner", Role::User);
    let stranger = token_for(3, "stranger", Role::User);
    let post = create_post(&app, &owner, "draft", "qna").await;
    let id = post["id"].as_i64().unwrap();

    let req = multipart_patch(
        &format!("/post/{id}/category/qna"),
        &stranger,
        &[("title", "hijacked")],
    );
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    let req = multipart_patch(
        &format!("/post/{id}/category/qna"),
        &owner,
        &[("title", "final")],
    );
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["title"], "final");
    assert_eq!(body["content"], "body text"); // untouched field survives
}

#[actix_web::test]
#[serial]
async fn test_search_respects_visibility() {
    setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state()))
            .configure(config),
    )
    .await;

    let owner = token_for(2, "owner", Role::User);
    let stranger = token_for(3, "stranger", Role::User);
    create_post(&app, &owner, "actix deployment tips", "qna").await;
    create_post(&app, &owner, "actix secret question", "inquiry").await;

    // title search only surfaces what the caller may see
    let req = test::TestRequest::get()
        .uri("/post/search?query=actix")
        .insert_header(("Authorization", format!("Bearer {stranger}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let posts: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(posts.as_array().unwrap().len(), 1);
    assert_eq!(posts[0]["title"], "actix deployment tips");

    // the owner finds both
    let req = test::TestRequest::get()
        .uri("/post/search?query=actix")
        .insert_header(("Authorization", format!("Bearer {owner}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let posts: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(posts.as_array().unwrap().len(), 2);

    // author search by nickname
    let req = test::TestRequest::get()
        .uri("/post/search?query=owner&target=user")
        .insert_header(("Authorization", format!("Bearer {stranger}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let posts: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(posts.as_array().unwrap().len(), 1);

    // a blank query is rejected
    let req = test::TestRequest::get()
        .uri("/post/search")
        .insert_header(("Authorization", format!("Bearer {stranger}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
#[serial]
async fn test_popular_ordering_puts_viewed_posts_first() {
    setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state()))
            .configure(config),
    )
    .await;

    let owner = token_for(2, "owner", Role::User);
    let _first = create_post(&app, &owner, "quiet post", "qna").await;
    let second = create_post(&app, &owner, "busy post", "qna").await;
    let busy_id = second["id"].as_i64().unwrap();

    // one view for the second post
    let req = test::TestRequest::get()
        .uri(&format!("/post/{busy_id}"))
        .insert_header(("Authorization", format!("Bearer {owner}")))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get()
        .uri("/post/category/qna?orderBy=popular&period=week")
        .insert_header(("Authorization", format!("Bearer {owner}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let posts: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(posts[0]["title"], "busy post");

    // unknown category path segment
    let req = test::TestRequest::get()
        .uri("/post/category/gossip")
        .insert_header(("Authorization", format!("Bearer {owner}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
#[serial]
async fn test_attachments_are_uploaded_and_stored() {
    setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state()))
            .configure(config),
    )
    .await;

    let owner = token_for(2, "owner", Role::User);
    // minimal valid PNG
    let png: Vec<u8> = vec![
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H',
        b'D', b'R', 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00,
        0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, b'I', b'D', b'A', b'T', 0x78,
        0x9C, 0x63, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00,
        0x00, 0x00, 0x00, b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82,
    ];

    let mut body = post_form(&[
        ("title", "with image"),
        ("content", "look at this"),
        ("category", "qna"),
    ]);
    // splice a file part in before the terminator
    let tail = format!("--{BOUNDARY}--\r\n");
    body.truncate(body.len() - tail.len());
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"pic.png\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(&png);
    body.extend_from_slice(format!("\r\n{tail}").as_bytes());

    let req = test::TestRequest::post()
        .uri("/post")
        .insert_header(("Authorization", format!("Bearer {owner}")))
        .insert_header((
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let post: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let urls = post["img_url"].as_array().unwrap();
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0], "https://img.test/pic.png");
}
