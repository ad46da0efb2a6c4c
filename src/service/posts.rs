use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::cache::{view_key, ViewDedupCache};
use crate::error::ApiError;
use crate::models::*;
use crate::policy::{self, Actor};
use crate::repo::Repo;

/// A viewer bumps a post's counter at most once per day.
pub const VIEW_DEDUP_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct PostService {
    repo: Arc<dyn Repo>,
    view_cache: Arc<dyn ViewDedupCache>,
}

impl PostService {
    pub fn new(repo: Arc<dyn Repo>, view_cache: Arc<dyn ViewDedupCache>) -> Self {
        Self { repo, view_cache }
    }

    /// Category listing. The recency window only narrows popularity
    /// rankings; recency ordering always spans everything.
    pub async fn list(
        &self,
        actor: &Actor,
        category: PostCategory,
        order: PostOrder,
        period: Option<ListPeriod>,
    ) -> Result<Vec<Post>, ApiError> {
        let since = match (order, period) {
            (PostOrder::Popular, Some(p)) => Some(p.window_start(Utc::now())),
            _ => None,
        };
        let posts = self.repo.list_posts(category, order, since).await?;
        Ok(posts
            .into_iter()
            .filter(|p| policy::visible_in_list(actor, p))
            .collect())
    }

    pub async fn search(
        &self,
        actor: &Actor,
        query: &str,
        target: SearchTarget,
    ) -> Result<Vec<Post>, ApiError> {
        let posts = self.repo.search_posts(query, target).await?;
        Ok(posts
            .into_iter()
            .filter(|p| policy::visible_in_list(actor, p))
            .collect())
    }

    /// Detail read. The first view per (post, viewer) in a 24h window
    /// increments the counter; later views within the window are no-ops.
    pub async fn get(&self, actor: &Actor, id: Id) -> Result<Post, ApiError> {
        let post = self
            .repo
            .find_active_post(id)
            .await?
            .ok_or(ApiError::NotFound)?;
        if !policy::can_view_post(actor, &post) {
            return Err(ApiError::Forbidden);
        }

        let key = view_key(id, actor.id);
        if !self.view_cache.get(&key).await {
            self.repo.increment_view_cnt(id).await?;
            self.view_cache.set(&key, VIEW_DEDUP_TTL).await;
        }

        // reload so the response carries the fresh counter
        self.repo
            .find_active_post(id)
            .await?
            .ok_or(ApiError::NotFound)
    }

    pub async fn create(
        &self,
        actor: &Actor,
        nickname: &str,
        title: String,
        content: String,
        category: PostCategory,
        img_url: Option<Vec<String>>,
    ) -> Result<Post, ApiError> {
        if !policy::can_create_post(actor, category) {
            return Err(ApiError::Forbidden);
        }
        let post = self
            .repo
            .create_post(NewPost {
                title,
                content,
                category,
                img_url,
                user_id: actor.id,
                user_nickname: nickname.to_string(),
            })
            .await?;
        Ok(post)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: Id,
        upd: UpdatePost,
    ) -> Result<Post, ApiError> {
        let post = self
            .repo
            .find_active_post(id)
            .await?
            .ok_or(ApiError::NotFound)?;
        if !policy::can_modify_post(actor, &post) {
            return Err(ApiError::Forbidden);
        }
        let updated = self.repo.update_post(id, upd).await?;
        Ok(updated)
    }

    pub async fn delete(&self, actor: &Actor, id: Id) -> Result<(), ApiError> {
        let post = self
            .repo
            .find_active_post(id)
            .await?
            .ok_or(ApiError::NotFound)?;
        if !policy::can_modify_post(actor, &post) {
            return Err(ApiError::Forbidden);
        }
        self.repo.soft_delete_post(id).await?;
        Ok(())
    }
}
