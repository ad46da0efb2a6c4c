use chrono::{DateTime, Utc};

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("storage error: {0}")]
    Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn find_user(&self, id: Id) -> RepoResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn find_user_by_nickname(&self, nickname: &str) -> RepoResult<Option<User>>;
    async fn update_user(&self, id: Id, upd: UpdateUser) -> RepoResult<User>;
    /// Hard delete; owned posts and comments go with the account.
    async fn delete_user(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn create_post(&self, new: NewPost) -> RepoResult<Post>;
    /// Soft-deleted rows included; used where ownership checks must still
    /// reach a deleted post.
    async fn find_post(&self, id: Id) -> RepoResult<Option<Post>>;
    /// The activeOnly() variant every normal read goes through.
    async fn find_active_post(&self, id: Id) -> RepoResult<Option<Post>>;
    async fn list_posts(
        &self,
        category: PostCategory,
        order: PostOrder,
        since: Option<DateTime<Utc>>,
    ) -> RepoResult<Vec<Post>>;
    async fn search_posts(&self, query: &str, target: SearchTarget) -> RepoResult<Vec<Post>>;
    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post>;
    async fn increment_view_cnt(&self, id: Id) -> RepoResult<()>;
    async fn soft_delete_post(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// Fails with Conflict when the parent comment already has a reply
    /// (unique parent_comment_id).
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment>;
    async fn find_active_comment(&self, id: Id) -> RepoResult<Option<Comment>>;
    /// The reply hanging off a parent comment, deleted or not.
    async fn find_reply_to(&self, parent_comment_id: Id) -> RepoResult<Option<Comment>>;
    /// All top-level comments of a post, soft-deleted included, oldest first.
    async fn list_top_level_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>>;
    async fn update_comment(&self, id: Id, content: &str) -> RepoResult<Comment>;
    async fn soft_delete_comment(&self, id: Id) -> RepoResult<()>;
}

pub trait Repo: UserRepo + PostRepo + CommentRepo {}

impl<T> Repo for T where T: UserRepo + PostRepo + CommentRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    #[derive(Default)]
    struct State {
        users: HashMap<Id, User>,
        posts: HashMap<Id, Post>,
        comments: HashMap<Id, Comment>,
        next_id: Id,
    }

    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self::default()
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            if s.users
                .values()
                .any(|u| u.email == new.email || u.nickname == new.nickname)
            {
                return Err(RepoError::Conflict);
            }
            let now = Utc::now();
            let id = Self::next_id(&mut s);
            let user = User {
                id,
                email: new.email,
                password: new.password,
                nickname: new.nickname,
                role: Role::User,
                created_at: now,
                updated_at: now,
            };
            s.users.insert(id, user.clone());
            Ok(user)
        }

        async fn find_user(&self, id: Id) -> RepoResult<Option<User>> {
            let s = self.state.read().unwrap();
            Ok(s.users.get(&id).cloned())
        }

        async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
            let s = self.state.read().unwrap();
            Ok(s.users.values().find(|u| u.email == email).cloned())
        }

        async fn find_user_by_nickname(&self, nickname: &str) -> RepoResult<Option<User>> {
            let s = self.state.read().unwrap();
            Ok(s.users.values().find(|u| u.nickname == nickname).cloned())
        }

        async fn update_user(&self, id: Id, upd: UpdateUser) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();

            // uniqueness checks before taking the mutable borrow
            if let Some(ref email) = upd.email {
                if s.users.values().any(|u| u.email == *email && u.id != id) {
                    return Err(RepoError::Conflict);
                }
            }
            if let Some(ref nickname) = upd.nickname {
                if s.users.values().any(|u| u.nickname == *nickname && u.id != id) {
                    return Err(RepoError::Conflict);
                }
            }

            let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(email) = upd.email {
                user.email = email;
            }
            if let Some(nickname) = upd.nickname {
                user.nickname = nickname;
            }
            if let Some(password) = upd.password {
                user.password = password;
            }
            user.updated_at = Utc::now();
            Ok(user.clone())
        }

        async fn delete_user(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            if s.users.remove(&id).is_none() {
                return Err(RepoError::NotFound);
            }
            // emulate the FK cascades of the relational schema
            s.posts.retain(|_, p| p.user_id != id);
            s.comments.retain(|_, c| c.user_id != id);
            Ok(())
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            let now = Utc::now();
            let id = Self::next_id(&mut s);
            let post = Post {
                id,
                title: new.title,
                content: new.content,
                category: new.category,
                view_cnt: 0,
                img_url: new.img_url,
                is_delete: false,
                user_id: new.user_id,
                user_nickname: new.user_nickname,
                created_at: now,
                updated_at: now,
            };
            s.posts.insert(id, post.clone());
            Ok(post)
        }

        async fn find_post(&self, id: Id) -> RepoResult<Option<Post>> {
            let s = self.state.read().unwrap();
            Ok(s.posts.get(&id).cloned())
        }

        async fn find_active_post(&self, id: Id) -> RepoResult<Option<Post>> {
            let s = self.state.read().unwrap();
            Ok(s.posts.get(&id).filter(|p| !p.is_delete).cloned())
        }

        async fn list_posts(
            &self,
            category: PostCategory,
            order: PostOrder,
            since: Option<DateTime<Utc>>,
        ) -> RepoResult<Vec<Post>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .posts
                .values()
                .filter(|p| p.category == category && !p.is_delete)
                .filter(|p| since.map(|cutoff| p.created_at >= cutoff).unwrap_or(true))
                .cloned()
                .collect();
            match order {
                PostOrder::Popular => v.sort_by(|a, b| b.view_cnt.cmp(&a.view_cnt)),
                PostOrder::Recent => v.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            }
            Ok(v)
        }

        async fn search_posts(&self, query: &str, target: SearchTarget) -> RepoResult<Vec<Post>> {
            let s = self.state.read().unwrap();
            let needle = query.to_lowercase();
            let v = s
                .posts
                .values()
                .filter(|p| !p.is_delete)
                .filter(|p| {
                    let title_hit = p.title.to_lowercase().contains(&needle);
                    let author_hit = p.user_nickname.to_lowercase().contains(&needle);
                    match target {
                        SearchTarget::Title => title_hit,
                        SearchTarget::Author => author_hit,
                        SearchTarget::All => title_hit || author_hit,
                    }
                })
                .cloned()
                .collect();
            Ok(v)
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            let post = s
                .posts
                .get_mut(&id)
                .filter(|p| !p.is_delete)
                .ok_or(RepoError::NotFound)?;
            if let Some(title) = upd.title {
                post.title = title;
            }
            if let Some(content) = upd.content {
                post.content = content;
            }
            if let Some(img_url) = upd.img_url {
                post.img_url = Some(img_url);
            }
            post.updated_at = Utc::now();
            Ok(post.clone())
        }

        async fn increment_view_cnt(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let post = s
                .posts
                .get_mut(&id)
                .filter(|p| !p.is_delete)
                .ok_or(RepoError::NotFound)?;
            post.view_cnt += 1;
            Ok(())
        }

        async fn soft_delete_post(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let post = s
                .posts
                .get_mut(&id)
                .filter(|p| !p.is_delete)
                .ok_or(RepoError::NotFound)?;
            post.is_delete = true;
            Ok(())
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            // unique parent_comment_id, same as the relational constraint
            if let Some(parent) = new.parent_comment_id {
                if s.comments
                    .values()
                    .any(|c| c.parent_comment_id == Some(parent))
                {
                    return Err(RepoError::Conflict);
                }
            }
            let now = Utc::now();
            let id = Self::next_id(&mut s);
            let comment = Comment {
                id,
                content: new.content,
                user_id: new.user_id,
                user_nickname: new.user_nickname,
                post_id: new.post_id,
                parent_comment_id: new.parent_comment_id,
                is_delete: false,
                created_at: now,
                updated_at: now,
            };
            s.comments.insert(id, comment.clone());
            Ok(comment)
        }

        async fn find_active_comment(&self, id: Id) -> RepoResult<Option<Comment>> {
            let s = self.state.read().unwrap();
            Ok(s.comments.get(&id).filter(|c| !c.is_delete).cloned())
        }

        async fn find_reply_to(&self, parent_comment_id: Id) -> RepoResult<Option<Comment>> {
            let s = self.state.read().unwrap();
            Ok(s.comments
                .values()
                .find(|c| c.parent_comment_id == Some(parent_comment_id))
                .cloned())
        }

        async fn list_top_level_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .comments
                .values()
                .filter(|c| c.post_id == post_id && c.parent_comment_id.is_none())
                .cloned()
                .collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(v)
        }

        async fn update_comment(&self, id: Id, content: &str) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            let comment = s
                .comments
                .get_mut(&id)
                .filter(|c| !c.is_delete)
                .ok_or(RepoError::NotFound)?;
            comment.content = content.to_string();
            comment.updated_at = Utc::now();
            Ok(comment.clone())
        }

        async fn soft_delete_comment(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let comment = s
                .comments
                .get_mut(&id)
                .filter(|c| !c.is_delete)
                .ok_or(RepoError::NotFound)?;
            comment.is_delete = true;
            Ok(())
        }
    }

}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    const USER_COLS: &str = "id, email, password, nickname, role, created_at, updated_at";
    const POST_COLS: &str =
        "id, title, content, category, view_cnt, img_url, is_delete, user_id, user_nickname, created_at, updated_at";
    const COMMENT_COLS: &str =
        "id, content, user_id, user_nickname, post_id, parent_comment_id, is_delete, created_at, updated_at";

    fn map_db_err(e: sqlx::Error) -> RepoError {
        match &e {
            // 23505 = unique_violation
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                RepoError::Conflict
            }
            _ => RepoError::Internal(e.to_string()),
        }
    }

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let sql = format!(
                "INSERT INTO users (email, password, nickname) VALUES ($1,$2,$3) RETURNING {USER_COLS}"
            );
            sqlx::query_as::<_, User>(&sql)
                .bind(&new.email)
                .bind(&new.password)
                .bind(&new.nickname)
                .fetch_one(&self.pool)
                .await
                .map_err(map_db_err)
        }

        async fn find_user(&self, id: Id) -> RepoResult<Option<User>> {
            let sql = format!("SELECT {USER_COLS} FROM users WHERE id = $1");
            sqlx::query_as::<_, User>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)
        }

        async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
            let sql = format!("SELECT {USER_COLS} FROM users WHERE email = $1");
            sqlx::query_as::<_, User>(&sql)
                .bind(email)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)
        }

        async fn find_user_by_nickname(&self, nickname: &str) -> RepoResult<Option<User>> {
            let sql = format!("SELECT {USER_COLS} FROM users WHERE nickname = $1");
            sqlx::query_as::<_, User>(&sql)
                .bind(nickname)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)
        }

        async fn update_user(&self, id: Id, upd: UpdateUser) -> RepoResult<User> {
            let sql = format!(
                "UPDATE users SET email = COALESCE($2, email), nickname = COALESCE($3, nickname), \
                 password = COALESCE($4, password), updated_at = now() WHERE id = $1 RETURNING {USER_COLS}"
            );
            sqlx::query_as::<_, User>(&sql)
                .bind(id)
                .bind(upd.email.as_ref())
                .bind(upd.nickname.as_ref())
                .bind(upd.password.as_ref())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)?
                .ok_or(RepoError::NotFound)
        }

        async fn delete_user(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_db_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let sql = format!(
                "INSERT INTO posts (title, content, category, img_url, user_id, user_nickname) \
                 VALUES ($1,$2,$3,$4,$5,$6) RETURNING {POST_COLS}"
            );
            sqlx::query_as::<_, Post>(&sql)
                .bind(&new.title)
                .bind(&new.content)
                .bind(new.category)
                .bind(new.img_url.as_ref())
                .bind(new.user_id)
                .bind(&new.user_nickname)
                .fetch_one(&self.pool)
                .await
                .map_err(map_db_err)
        }

        async fn find_post(&self, id: Id) -> RepoResult<Option<Post>> {
            let sql = format!("SELECT {POST_COLS} FROM posts WHERE id = $1");
            sqlx::query_as::<_, Post>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)
        }

        async fn find_active_post(&self, id: Id) -> RepoResult<Option<Post>> {
            let sql =
                format!("SELECT {POST_COLS} FROM posts WHERE id = $1 AND is_delete = FALSE");
            sqlx::query_as::<_, Post>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)
        }

        async fn list_posts(
            &self,
            category: PostCategory,
            order: PostOrder,
            since: Option<DateTime<Utc>>,
        ) -> RepoResult<Vec<Post>> {
            let order_sql = match order {
                PostOrder::Popular => "view_cnt DESC",
                PostOrder::Recent => "created_at DESC",
            };
            let mut sql = format!(
                "SELECT {POST_COLS} FROM posts WHERE category = $1 AND is_delete = FALSE"
            );
            if since.is_some() {
                sql.push_str(" AND created_at >= $2");
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(order_sql);

            let mut q = sqlx::query_as::<_, Post>(&sql).bind(category);
            if let Some(cutoff) = since {
                q = q.bind(cutoff);
            }
            q.fetch_all(&self.pool).await.map_err(map_db_err)
        }

        async fn search_posts(&self, query: &str, target: SearchTarget) -> RepoResult<Vec<Post>> {
            let where_sql = match target {
                SearchTarget::Title => "title ILIKE $1",
                SearchTarget::Author => "user_nickname ILIKE $1",
                SearchTarget::All => "(title ILIKE $1 OR user_nickname ILIKE $1)",
            };
            let sql = format!(
                "SELECT {POST_COLS} FROM posts WHERE {where_sql} AND is_delete = FALSE"
            );
            sqlx::query_as::<_, Post>(&sql)
                .bind(format!("%{query}%"))
                .fetch_all(&self.pool)
                .await
                .map_err(map_db_err)
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            let sql = format!(
                "UPDATE posts SET title = COALESCE($2, title), content = COALESCE($3, content), \
                 img_url = COALESCE($4, img_url), updated_at = now() \
                 WHERE id = $1 AND is_delete = FALSE RETURNING {POST_COLS}"
            );
            sqlx::query_as::<_, Post>(&sql)
                .bind(id)
                .bind(upd.title.as_ref())
                .bind(upd.content.as_ref())
                .bind(upd.img_url.as_ref())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)?
                .ok_or(RepoError::NotFound)
        }

        async fn increment_view_cnt(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query(
                "UPDATE posts SET view_cnt = view_cnt + 1 WHERE id = $1 AND is_delete = FALSE",
            )
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn soft_delete_post(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query(
                "UPDATE posts SET is_delete = TRUE, updated_at = now() \
                 WHERE id = $1 AND is_delete = FALSE",
            )
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
            // the UNIQUE constraint on parent_comment_id makes the losing
            // side of a concurrent duplicate reply fail right here
            let sql = format!(
                "INSERT INTO comments (content, user_id, user_nickname, post_id, parent_comment_id) \
                 VALUES ($1,$2,$3,$4,$5) RETURNING {COMMENT_COLS}"
            );
            sqlx::query_as::<_, Comment>(&sql)
                .bind(&new.content)
                .bind(new.user_id)
                .bind(&new.user_nickname)
                .bind(new.post_id)
                .bind(new.parent_comment_id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_db_err)
        }

        async fn find_active_comment(&self, id: Id) -> RepoResult<Option<Comment>> {
            let sql = format!(
                "SELECT {COMMENT_COLS} FROM comments WHERE id = $1 AND is_delete = FALSE"
            );
            sqlx::query_as::<_, Comment>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)
        }

        async fn find_reply_to(&self, parent_comment_id: Id) -> RepoResult<Option<Comment>> {
            let sql = format!(
                "SELECT {COMMENT_COLS} FROM comments WHERE parent_comment_id = $1"
            );
            sqlx::query_as::<_, Comment>(&sql)
                .bind(parent_comment_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)
        }

        async fn list_top_level_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
            let sql = format!(
                "SELECT {COMMENT_COLS} FROM comments \
                 WHERE post_id = $1 AND parent_comment_id IS NULL ORDER BY created_at ASC"
            );
            sqlx::query_as::<_, Comment>(&sql)
                .bind(post_id)
                .fetch_all(&self.pool)
                .await
                .map_err(map_db_err)
        }

        async fn update_comment(&self, id: Id, content: &str) -> RepoResult<Comment> {
            let sql = format!(
                "UPDATE comments SET content = $2, updated_at = now() \
                 WHERE id = $1 AND is_delete = FALSE RETURNING {COMMENT_COLS}"
            );
            sqlx::query_as::<_, Comment>(&sql)
                .bind(id)
                .bind(content)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)?
                .ok_or(RepoError::NotFound)
        }

        async fn soft_delete_comment(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query(
                "UPDATE comments SET is_delete = TRUE, updated_at = now() \
                 WHERE id = $1 AND is_delete = FALSE",
            )
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }
    }
}
