use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::cookie::{time::Duration as CookieDuration, Cookie};
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt as _;

use crate::auth::Auth;
use crate::cache::ViewDedupCache;
use crate::error::ApiError;
use crate::models::*;
use crate::repo::Repo;
use crate::service::{CommentService, PostService, UserService};
use crate::storage::ImageStore;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/user")
            .service(web::resource("/register").route(web::post().to(register)))
            .service(web::resource("/login").route(web::post().to(login)))
            .service(web::resource("/logout").route(web::post().to(logout)))
            .service(web::resource("/profile/{id}").route(web::get().to(profile)))
            .service(web::resource("/update").route(web::patch().to(update_user)))
            .service(web::resource("/delete/{id}").route(web::delete().to(delete_user))),
    );
    cfg.service(
        web::scope("/post")
            .service(web::resource("/search").route(web::get().to(search_posts)))
            .service(web::resource("/category/{category}").route(web::get().to(list_posts)))
            .service(web::resource("").route(web::post().to(create_post)))
            .service(
                web::resource("/{id}/category/{category}")
                    .route(web::patch().to(update_post))
                    .route(web::delete().to(delete_post)),
            )
            .service(
                web::resource("/{post_id}/comments")
                    .route(web::post().to(create_comment))
                    .route(web::get().to(list_comments)),
            )
            .service(
                web::resource("/{post_id}/comments/{comment_id}")
                    .route(web::post().to(create_reply))
                    .route(web::patch().to(update_comment))
                    .route(web::delete().to(delete_comment)),
            )
            .service(web::resource("/{id}").route(web::get().to(get_post))),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserService>,
    pub posts: Arc<PostService>,
    pub comments: Arc<CommentService>,
    pub image_store: Arc<dyn ImageStore>,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn Repo>,
        view_cache: Arc<dyn ViewDedupCache>,
        image_store: Arc<dyn ImageStore>,
    ) -> Self {
        Self {
            users: Arc::new(UserService::new(repo.clone())),
            posts: Arc::new(PostService::new(repo.clone(), view_cache)),
            comments: Arc::new(CommentService::new(repo)),
            image_store,
        }
    }
}

// ---------------- user handlers ----------------

#[utoipa::path(
    post,
    path = "/user/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created"),
        (status = 400, description = "Password confirmation mismatch"),
        (status = 409, description = "Email or nickname already in use")
    )
)]
pub async fn register(
    data: web::Data<AppState>,
    payload: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    data.users.register(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({"message": "registered"})))
}

#[utoipa::path(
    post,
    path = "/user/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Tokens issued, cookies set", body = LoginResponse),
        (status = 401, description = "Bad credentials")
    )
)]
pub async fn login(
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let tokens = data.users.login(payload.into_inner()).await?;

    let access_cookie = Cookie::build("Authorization", tokens.access_token.clone())
        .path("/")
        .http_only(true)
        .max_age(CookieDuration::minutes(60))
        .finish();
    let refresh_cookie = Cookie::build("refreshToken", tokens.refresh_token.clone())
        .path("/")
        .http_only(true)
        .max_age(CookieDuration::days(1))
        .finish();

    Ok(HttpResponse::Ok()
        .cookie(access_cookie)
        .cookie(refresh_cookie)
        .json(tokens))
}

#[utoipa::path(
    post,
    path = "/user/logout",
    responses(
        (status = 200, description = "Cookies cleared"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn logout(_auth: Auth) -> Result<HttpResponse, ApiError> {
    let mut access_cookie = Cookie::build("Authorization", "").path("/").http_only(true).finish();
    access_cookie.make_removal();
    let mut refresh_cookie = Cookie::build("refreshToken", "").path("/").http_only(true).finish();
    refresh_cookie.make_removal();

    Ok(HttpResponse::Ok()
        .cookie(access_cookie)
        .cookie(refresh_cookie)
        .json(serde_json::json!({"message": "logged out"})))
}

#[utoipa::path(
    get,
    path = "/user/profile/{id}",
    params(("id" = Id, Path, description = "User id")),
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 404, description = "User not found")
    )
)]
pub async fn profile(
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let profile = data.users.profile(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(profile))
}

#[utoipa::path(
    patch,
    path = "/user/update",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserProfile),
        (status = 409, description = "Email or nickname already in use")
    )
)]
pub async fn update_user(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, ApiError> {
    let profile = data
        .users
        .update(&auth.actor(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(profile))
}

#[utoipa::path(
    delete,
    path = "/user/delete/{id}",
    params(("id" = Id, Path, description = "User id")),
    responses(
        (status = 204, description = "Account removed"),
        (status = 403, description = "Not your account"),
        (status = 404, description = "User not found")
    )
)]
pub async fn delete_user(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    data.users.delete(&auth.actor(), path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- post handlers ----------------

#[derive(Debug, serde::Deserialize)]
pub struct ListPostsQuery {
    #[serde(rename = "orderBy")]
    pub order_by: Option<String>,
    pub period: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub target: Option<String>,
}

#[utoipa::path(
    get,
    path = "/post/search",
    params(
        ("query" = String, Query, description = "Search term"),
        ("target" = Option<String>, Query, description = "title or user; both when absent")
    ),
    responses(
        (status = 200, description = "Matching posts the caller may see", body = [Post]),
        (status = 400, description = "Missing search term")
    )
)]
pub async fn search_posts(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, ApiError> {
    let term = query
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or(ApiError::BadRequest("search query is required"))?;
    let target = SearchTarget::from_query(query.target.as_deref());
    let posts = data.posts.search(&auth.actor(), term, target).await?;
    Ok(HttpResponse::Ok().json(posts))
}

#[utoipa::path(
    get,
    path = "/post/category/{category}",
    params(
        ("category" = String, Path, description = "notice, qna or inquiry"),
        ("orderBy" = Option<String>, Query, description = "recent (default) or popular"),
        ("period" = Option<String>, Query, description = "week/month/year, popular only")
    ),
    responses(
        (status = 200, description = "Posts the caller may see", body = [Post]),
        (status = 400, description = "Unknown category")
    )
)]
pub async fn list_posts(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ListPostsQuery>,
) -> Result<HttpResponse, ApiError> {
    let category = PostCategory::parse(&path.into_inner())
        .ok_or(ApiError::BadRequest("unknown post category"))?;
    let order = PostOrder::from_query(query.order_by.as_deref());
    let period = ListPeriod::from_query(query.period.as_deref());
    let posts = data
        .posts
        .list(&auth.actor(), category, order, period)
        .await?;
    Ok(HttpResponse::Ok().json(posts))
}

#[utoipa::path(
    get,
    path = "/post/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post detail, view counted", body = Post),
        (status = 403, description = "Inquiry belongs to someone else"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post = data.posts.get(&auth.actor(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

const IMAGE_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MB per attachment
const MAX_ATTACHMENTS: usize = 5;

const ALLOWED_MIME: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

/// Fields of the multipart post form; everything optional so create and
/// update can share the reader.
#[derive(Default)]
struct PostForm {
    title: Option<String>,
    content: Option<String>,
    category: Option<String>,
    files: Vec<(String, Vec<u8>)>,
}

async fn read_post_form(mut payload: Multipart) -> Result<PostForm, ApiError> {
    let mut form = PostForm::default();
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::BadRequest("malformed multipart payload")
    })? {
        let name = field
            .content_disposition()
            .get_name()
            .unwrap_or_default()
            .to_string();
        let filename = field
            .content_disposition()
            .get_filename()
            .map(|f| f.to_string());

        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            log::error!("stream read error: {e}");
            ApiError::Internal
        })? {
            if bytes.len() + chunk.len() > IMAGE_SIZE_LIMIT {
                return Err(ApiError::BadRequest("attachment too large"));
            }
            bytes.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "title" => form.title = Some(String::from_utf8_lossy(&bytes).into_owned()),
            "content" => form.content = Some(String::from_utf8_lossy(&bytes).into_owned()),
            "category" => form.category = Some(String::from_utf8_lossy(&bytes).into_owned()),
            "file" => {
                if form.files.len() >= MAX_ATTACHMENTS {
                    return Err(ApiError::BadRequest("too many attachments"));
                }
                let mime = infer::get(&bytes)
                    .map(|t| t.mime_type().to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                if !ALLOWED_MIME.contains(&mime.as_str()) {
                    return Err(ApiError::BadRequest("unsupported attachment type"));
                }
                form.files
                    .push((filename.unwrap_or_else(|| "upload".into()), bytes));
            }
            _ => {}
        }
    }
    Ok(form)
}

/// Pushes every attachment to object storage; `None` when there are none,
/// so updates without new files keep the stored URLs.
async fn upload_attachments(
    store: &Arc<dyn ImageStore>,
    files: Vec<(String, Vec<u8>)>,
) -> Result<Option<Vec<String>>, ApiError> {
    if files.is_empty() {
        return Ok(None);
    }
    let mut urls = Vec::with_capacity(files.len());
    for (filename, bytes) in files {
        let url = store.upload(&bytes, &filename).await.map_err(|e| {
            log::error!("image upload failed: {e}");
            ApiError::Internal
        })?;
        urls.push(url);
    }
    Ok(Some(urls))
}

#[utoipa::path(
    post,
    path = "/post",
    responses(
        (status = 201, description = "Post created", body = Post),
        (status = 400, description = "Missing field or bad attachment"),
        (status = 403, description = "Notice category requires admin")
    )
)]
pub async fn create_post(
    auth: Auth,
    data: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let form = read_post_form(payload).await?;
    let title = form
        .title
        .filter(|t| !t.trim().is_empty())
        .ok_or(ApiError::BadRequest("title is required"))?;
    let content = form
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or(ApiError::BadRequest("content is required"))?;
    let category = form
        .category
        .as_deref()
        .and_then(PostCategory::parse)
        .ok_or(ApiError::BadRequest("unknown post category"))?;

    let img_url = upload_attachments(&data.image_store, form.files).await?;
    let post = data
        .posts
        .create(
            &auth.actor(),
            &auth.0.nickname,
            title,
            content,
            category,
            img_url,
        )
        .await?;
    Ok(HttpResponse::Created().json(post))
}

#[utoipa::path(
    patch,
    path = "/post/{id}/category/{category}",
    params(
        ("id" = Id, Path, description = "Post id"),
        ("category" = String, Path, description = "Category path segment")
    ),
    responses(
        (status = 200, description = "Post updated", body = Post),
        (status = 403, description = "Not the owner / not admin"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn update_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<(Id, String)>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let (id, _category) = path.into_inner(); // stored category decides authorization
    let form = read_post_form(payload).await?;
    let img_url = upload_attachments(&data.image_store, form.files).await?;
    let post = data
        .posts
        .update(
            &auth.actor(),
            id,
            UpdatePost {
                title: form.title,
                content: form.content,
                img_url,
            },
        )
        .await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    delete,
    path = "/post/{id}/category/{category}",
    params(
        ("id" = Id, Path, description = "Post id"),
        ("category" = String, Path, description = "Category path segment")
    ),
    responses(
        (status = 200, description = "Post soft-deleted"),
        (status = 403, description = "Not the owner / not admin"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn delete_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<(Id, String)>,
) -> Result<HttpResponse, ApiError> {
    let (id, _category) = path.into_inner();
    data.posts.delete(&auth.actor(), id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"status": "ok"})))
}

// ---------------- comment handlers ----------------

fn comment_content(body: CommentBody) -> Result<String, ApiError> {
    let content = body.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::BadRequest("comment content is required"));
    }
    Ok(content)
}

#[utoipa::path(
    post,
    path = "/post/{post_id}/comments",
    request_body = CommentBody,
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 400, description = "Empty content"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn create_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<CommentBody>,
) -> Result<HttpResponse, ApiError> {
    let content = comment_content(payload.into_inner())?;
    let comment = data
        .comments
        .create(&auth.actor(), &auth.0.nickname, path.into_inner(), content)
        .await?;
    Ok(HttpResponse::Created().json(comment))
}

#[utoipa::path(
    post,
    path = "/post/{post_id}/comments/{comment_id}",
    request_body = CommentBody,
    responses(
        (status = 201, description = "Reply created", body = Comment),
        (status = 400, description = "Empty content or parent already has a reply"),
        (status = 404, description = "Parent comment not found")
    )
)]
pub async fn create_reply(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
    payload: web::Json<CommentBody>,
) -> Result<HttpResponse, ApiError> {
    let (post_id, parent_id) = path.into_inner();
    let content = comment_content(payload.into_inner())?;
    let reply = data
        .comments
        .reply(&auth.actor(), &auth.0.nickname, post_id, parent_id, content)
        .await?;
    Ok(HttpResponse::Created().json(reply))
}

#[utoipa::path(
    get,
    path = "/post/{post_id}/comments",
    params(("post_id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Top-level comments with replies", body = [CommentThread]),
        (status = 403, description = "Inquiry belongs to someone else"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn list_comments(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let threads = data
        .comments
        .list(&auth.actor(), path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(threads))
}

#[utoipa::path(
    patch,
    path = "/post/{post_id}/comments/{comment_id}",
    request_body = CommentBody,
    responses(
        (status = 200, description = "Comment updated", body = Comment),
        (status = 403, description = "Not the comment owner"),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn update_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
    payload: web::Json<CommentBody>,
) -> Result<HttpResponse, ApiError> {
    let (_post_id, comment_id) = path.into_inner();
    let content = comment_content(payload.into_inner())?;
    let comment = data
        .comments
        .update(&auth.actor(), comment_id, content)
        .await?;
    Ok(HttpResponse::Ok().json(comment))
}

#[utoipa::path(
    delete,
    path = "/post/{post_id}/comments/{comment_id}",
    responses(
        (status = 200, description = "Comment soft-deleted"),
        (status = 403, description = "Neither owner nor admin"),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn delete_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
) -> Result<HttpResponse, ApiError> {
    let (_post_id, comment_id) = path.into_inner();
    data.comments.delete(&auth.actor(), comment_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"status": "ok"})))
}
