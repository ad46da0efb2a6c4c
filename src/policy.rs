//! Visibility and authorization rules shared by the post and comment
//! services.
//!
//! Every function here is a pure predicate over already-loaded entities:
//! no I/O, no tree walks. Each comment carries its own denormalized owner
//! id, so nothing ever needs to climb the reply chain to decide access.

use crate::models::{Comment, Id, Post, PostCategory, Role};

/// Shown in place of the content of a soft-deleted comment.
pub const DELETED_COMMENT_PLACEHOLDER: &str = "This comment has been deleted.";

/// The authenticated caller, as produced by JWT validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Id,
    pub role: Role,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Single-post read gate. Inquiry posts are private to their owner and
/// administrators; everything else is world-readable.
pub fn can_view_post(actor: &Actor, post: &Post) -> bool {
    post.category != PostCategory::Inquiry || post.user_id == actor.id || actor.is_admin()
}

/// Per-row filter for list and search endpoints. Rows that fail the
/// predicate are dropped from the result set, not turned into errors.
pub fn visible_in_list(actor: &Actor, post: &Post) -> bool {
    if actor.is_admin() {
        return true;
    }
    match post.category {
        PostCategory::Inquiry => post.user_id == actor.id,
        PostCategory::Notice | PostCategory::Qna => true,
    }
}

/// Notices may only be created by administrators.
pub fn can_create_post(actor: &Actor, category: PostCategory) -> bool {
    category != PostCategory::Notice || actor.is_admin()
}

/// Update/delete gate. Notices are administered by role alone; ownership
/// is not meaningful for them. Other categories are owner-only.
pub fn can_modify_post(actor: &Actor, post: &Post) -> bool {
    match post.category {
        PostCategory::Notice => actor.is_admin(),
        PostCategory::Qna | PostCategory::Inquiry => post.user_id == actor.id,
    }
}

pub fn can_update_comment(actor: &Actor, comment: &Comment) -> bool {
    comment.user_id == actor.id
}

/// Owners may delete their own comments; admins may delete any.
pub fn can_delete_comment(actor: &Actor, comment: &Comment) -> bool {
    comment.user_id == actor.id || actor.is_admin()
}

/// Replaces the content of a soft-deleted comment with a placeholder so the
/// surrounding thread keeps its shape. Applied on read, never persisted.
pub fn mask_if_deleted(mut comment: Comment) -> Comment {
    if comment.is_delete {
        comment.content = DELETED_COMMENT_PLACEHOLDER.to_string();
    }
    comment
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn actor(id: Id, role: Role) -> Actor {
        Actor { id, role }
    }

    fn post(owner: Id, category: PostCategory) -> Post {
        Post {
            id: 1,
            title: "t".into(),
            content: "c".into(),
            category,
            view_cnt: 0,
            img_url: None,
            is_delete: false,
            user_id: owner,
            user_nickname: "owner".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn comment(owner: Id, deleted: bool) -> Comment {
        Comment {
            id: 7,
            content: "hello".into(),
            user_id: owner,
            user_nickname: "owner".into(),
            post_id: 1,
            parent_comment_id: None,
            is_delete: deleted,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn inquiry_hidden_from_strangers() {
        let p = post(1, PostCategory::Inquiry);
        assert!(!can_view_post(&actor(2, Role::User), &p));
        assert!(can_view_post(&actor(1, Role::User), &p));
        assert!(can_view_post(&actor(9, Role::Admin), &p));
    }

    #[test]
    fn non_inquiry_readable_by_anyone() {
        for cat in [PostCategory::Notice, PostCategory::Qna] {
            assert!(can_view_post(&actor(42, Role::User), &post(1, cat)));
        }
    }

    #[test]
    fn list_filter_hides_foreign_inquiries_only() {
        let a = actor(2, Role::User);
        assert!(visible_in_list(&a, &post(1, PostCategory::Notice)));
        assert!(visible_in_list(&a, &post(1, PostCategory::Qna)));
        assert!(!visible_in_list(&a, &post(1, PostCategory::Inquiry)));
        assert!(visible_in_list(&a, &post(2, PostCategory::Inquiry)));
        assert!(visible_in_list(&actor(3, Role::Admin), &post(1, PostCategory::Inquiry)));
    }

    #[test]
    fn notice_creation_is_admin_only() {
        assert!(can_create_post(&actor(9, Role::Admin), PostCategory::Notice));
        assert!(!can_create_post(&actor(1, Role::User), PostCategory::Notice));
        assert!(can_create_post(&actor(1, Role::User), PostCategory::Qna));
        assert!(can_create_post(&actor(1, Role::User), PostCategory::Inquiry));
    }

    #[test]
    fn notice_modification_ignores_ownership() {
        let p = post(1, PostCategory::Notice);
        assert!(can_modify_post(&actor(9, Role::Admin), &p));
        // even the row owner cannot touch a notice without the admin role
        assert!(!can_modify_post(&actor(1, Role::User), &p));
    }

    #[test]
    fn qna_modification_is_owner_only() {
        let p = post(1, PostCategory::Qna);
        assert!(can_modify_post(&actor(1, Role::User), &p));
        assert!(!can_modify_post(&actor(2, Role::User), &p));
    }

    #[test]
    fn comment_update_owner_only_delete_owner_or_admin() {
        let c = comment(2, false);
        assert!(can_update_comment(&actor(2, Role::User), &c));
        assert!(!can_update_comment(&actor(1, Role::User), &c));
        assert!(!can_update_comment(&actor(9, Role::Admin), &c));
        assert!(can_delete_comment(&actor(2, Role::User), &c));
        assert!(can_delete_comment(&actor(9, Role::Admin), &c));
        assert!(!can_delete_comment(&actor(1, Role::User), &c));
    }

    #[test]
    fn deleted_comments_are_masked() {
        let masked = mask_if_deleted(comment(1, true));
        assert_eq!(masked.content, DELETED_COMMENT_PLACEHOLDER);
        let untouched = mask_if_deleted(comment(1, false));
        assert_eq!(untouched.content, "hello");
    }
}
