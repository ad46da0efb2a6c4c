use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "post_category", rename_all = "lowercase")]
pub enum PostCategory {
    Notice,
    Qna,
    Inquiry,
}

impl PostCategory {
    /// Parses the `{category}` path segment; `None` for anything unknown.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "notice" => Some(PostCategory::Notice),
            "qna" => Some(PostCategory::Qna),
            "inquiry" => Some(PostCategory::Inquiry),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String, // argon2 hash, never serialized
    pub nickname: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String, // already hashed
    pub nickname: String,
}

/// Partial user update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub nickname: Option<String>,
    pub password: Option<String>, // already hashed
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserProfile {
    pub id: Id,
    pub email: String,
    pub nickname: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            nickname: u.nickname,
            role: u.role,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Post {
    pub id: Id,
    pub title: String,
    pub content: String,
    pub category: PostCategory,
    pub view_cnt: i32,
    pub img_url: Option<Vec<String>>,
    pub is_delete: bool, // soft delete marker
    pub user_id: Id,
    pub user_nickname: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub category: PostCategory,
    pub img_url: Option<Vec<String>>,
    pub user_id: Id,
    pub user_nickname: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub content: Option<String>,
    pub img_url: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Comment {
    pub id: Id,
    pub content: String,
    pub user_id: Id,
    pub user_nickname: String,
    pub post_id: Id,
    pub parent_comment_id: Option<Id>, // null => top-level
    pub is_delete: bool,               // soft delete marker
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub content: String,
    pub user_id: Id,
    pub user_nickname: String,
    pub post_id: Id,
    pub parent_comment_id: Option<Id>,
}

/// A top-level comment together with its (at most one) reply, as surfaced by
/// the comment listing endpoint. Thread structure survives soft deletion.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommentThread {
    pub id: Id,
    pub content: String,
    pub user_id: Id,
    pub user_nickname: String,
    pub post_id: Id,
    pub is_delete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub replies: Vec<Comment>,
}

impl CommentThread {
    pub fn new(comment: Comment, replies: Vec<Comment>) -> Self {
        Self {
            id: comment.id,
            content: comment.content,
            user_id: comment.user_id,
            user_nickname: comment.user_nickname,
            post_id: comment.post_id,
            is_delete: comment.is_delete,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
            replies,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOrder {
    Recent,
    Popular,
}

impl PostOrder {
    /// Anything other than an explicit `popular` sorts by recency.
    pub fn from_query(raw: Option<&str>) -> Self {
        match raw {
            Some("popular") => PostOrder::Popular,
            _ => PostOrder::Recent,
        }
    }
}

/// Recency window for popularity-ordered listings. Unknown values are
/// ignored rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListPeriod {
    Week,
    Month,
    Year,
}

impl ListPeriod {
    pub fn from_query(raw: Option<&str>) -> Option<Self> {
        match raw {
            Some("week") => Some(ListPeriod::Week),
            Some("month") => Some(ListPeriod::Month),
            Some("year") => Some(ListPeriod::Year),
            _ => None,
        }
    }

    pub fn window_start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            ListPeriod::Week => now - Duration::days(7),
            ListPeriod::Month => now.checked_sub_months(Months::new(1)).unwrap_or(now),
            ListPeriod::Year => now.checked_sub_months(Months::new(12)).unwrap_or(now),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTarget {
    All,
    Title,
    Author,
}

impl SearchTarget {
    pub fn from_query(raw: Option<&str>) -> Self {
        match raw {
            Some("title") => SearchTarget::Title,
            Some("user") => SearchTarget::Author,
            _ => SearchTarget::All,
        }
    }
}

// ---------------- request / response bodies ----------------

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub nickname: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoginResponse {
    pub user_id: Id,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub nickname: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CommentBody {
    pub content: String,
}
