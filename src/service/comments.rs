use std::sync::Arc;

use crate::error::ApiError;
use crate::models::*;
use crate::policy::{self, Actor};
use crate::repo::{Repo, RepoError};

pub struct CommentService {
    repo: Arc<dyn Repo>,
}

impl CommentService {
    pub fn new(repo: Arc<dyn Repo>) -> Self {
        Self { repo }
    }

    pub async fn create(
        &self,
        actor: &Actor,
        nickname: &str,
        post_id: Id,
        content: String,
    ) -> Result<Comment, ApiError> {
        if self.repo.find_active_post(post_id).await?.is_none() {
            return Err(ApiError::NotFound);
        }
        let comment = self
            .repo
            .create_comment(NewComment {
                content,
                user_id: actor.id,
                user_nickname: nickname.to_string(),
                post_id,
                parent_comment_id: None,
            })
            .await?;
        Ok(comment)
    }

    /// Replies are single-depth: a parent may carry at most one, and a
    /// deleted reply still occupies the slot.
    pub async fn reply(
        &self,
        actor: &Actor,
        nickname: &str,
        post_id: Id,
        parent_id: Id,
        content: String,
    ) -> Result<Comment, ApiError> {
        if self
            .repo
            .find_active_comment(parent_id)
            .await?
            .is_none()
        {
            return Err(ApiError::NotFound);
        }
        if self.repo.find_reply_to(parent_id).await?.is_some() {
            return Err(ApiError::BadRequest("comment already has a reply"));
        }
        match self
            .repo
            .create_comment(NewComment {
                content,
                user_id: actor.id,
                user_nickname: nickname.to_string(),
                post_id,
                parent_comment_id: Some(parent_id),
            })
            .await
        {
            Ok(comment) => Ok(comment),
            // lost the race against a concurrent reply to the same parent
            Err(RepoError::Conflict) => {
                Err(ApiError::BadRequest("comment already has a reply"))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Full thread of a post: top-level comments oldest first, each with
    /// its reply, soft-deleted rows masked in place.
    pub async fn list(&self, actor: &Actor, post_id: Id) -> Result<Vec<CommentThread>, ApiError> {
        // the post is addressed even when soft-deleted: the Inquiry
        // ownership check still needs it
        let post = self
            .repo
            .find_post(post_id)
            .await?
            .ok_or(ApiError::NotFound)?;
        if !policy::can_view_post(actor, &post) {
            return Err(ApiError::Forbidden);
        }

        let top_level = self.repo.list_top_level_comments(post_id).await?;
        let mut threads = Vec::with_capacity(top_level.len());
        for comment in top_level {
            let replies: Vec<Comment> = self
                .repo
                .find_reply_to(comment.id)
                .await?
                .map(policy::mask_if_deleted)
                .into_iter()
                .collect();
            threads.push(CommentThread::new(policy::mask_if_deleted(comment), replies));
        }
        Ok(threads)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        comment_id: Id,
        content: String,
    ) -> Result<Comment, ApiError> {
        let comment = self
            .repo
            .find_active_comment(comment_id)
            .await?
            .ok_or(ApiError::NotFound)?;
        if !policy::can_update_comment(actor, &comment) {
            return Err(ApiError::Forbidden);
        }
        let updated = self.repo.update_comment(comment_id, &content).await?;
        Ok(updated)
    }

    pub async fn delete(&self, actor: &Actor, comment_id: Id) -> Result<(), ApiError> {
        let comment = self
            .repo
            .find_active_comment(comment_id)
            .await?
            .ok_or(ApiError::NotFound)?;
        if !policy::can_delete_comment(actor, &comment) {
            return Err(ApiError::Forbidden);
        }
        self.repo.soft_delete_comment(comment_id).await?;
        Ok(())
    }
}
