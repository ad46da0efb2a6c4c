use crate::models::{
    Comment, CommentBody, CommentThread, LoginRequest, LoginResponse, Post, RegisterRequest,
    UpdateUserRequest, UserProfile,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::register,
        crate::routes::login,
        crate::routes::logout,
        crate::routes::profile,
        crate::routes::update_user,
        crate::routes::delete_user,
        crate::routes::search_posts,
        crate::routes::list_posts,
        crate::routes::get_post,
        crate::routes::create_post,
        crate::routes::update_post,
        crate::routes::delete_post,
        crate::routes::create_comment,
        crate::routes::create_reply,
        crate::routes::list_comments,
        crate::routes::update_comment,
        crate::routes::delete_comment,
    ),
    components(schemas(
        RegisterRequest, LoginRequest, LoginResponse, UpdateUserRequest, UserProfile,
        Post, Comment, CommentThread, CommentBody
    )),
    tags(
        (name = "users", description = "Account operations"),
        (name = "posts", description = "Post operations"),
        (name = "comments", description = "Comment operations"),
    )
)]
pub struct ApiDoc;
