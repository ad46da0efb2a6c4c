use std::sync::Arc;

use crate::auth::{create_access_token, create_refresh_token, hash_password, verify_password};
use crate::error::ApiError;
use crate::models::*;
use crate::policy::Actor;
use crate::repo::Repo;

pub struct UserService {
    repo: Arc<dyn Repo>,
}

impl UserService {
    pub fn new(repo: Arc<dyn Repo>) -> Self {
        Self { repo }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<(), ApiError> {
        if self.repo.find_user_by_email(&req.email).await?.is_some() {
            return Err(ApiError::Conflict("email already in use"));
        }
        if self
            .repo
            .find_user_by_nickname(&req.nickname)
            .await?
            .is_some()
        {
            return Err(ApiError::Conflict("nickname already in use"));
        }
        if req.password != req.password_confirm {
            return Err(ApiError::BadRequest(
                "password confirmation does not match",
            ));
        }

        let hashed = hash_password(&req.password).map_err(|e| {
            log::error!("password hashing failed: {e}");
            ApiError::Internal
        })?;

        self.repo
            .create_user(NewUser {
                email: req.email,
                password: hashed,
                nickname: req.nickname,
            })
            .await?;
        Ok(())
    }

    /// One undifferentiated failure for unknown email and wrong password.
    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, ApiError> {
        let user = self
            .repo
            .find_user_by_email(&req.email)
            .await?
            .ok_or(ApiError::Unauthorized)?;
        if !verify_password(&req.password, &user.password) {
            return Err(ApiError::Unauthorized);
        }

        let access_token = create_access_token(&user).map_err(|e| {
            log::error!("token creation failed: {e}");
            ApiError::Internal
        })?;
        let refresh_token = create_refresh_token(&user).map_err(|e| {
            log::error!("token creation failed: {e}");
            ApiError::Internal
        })?;

        Ok(LoginResponse {
            user_id: user.id,
            access_token,
            refresh_token,
        })
    }

    pub async fn profile(&self, id: Id) -> Result<UserProfile, ApiError> {
        let user = self.repo.find_user(id).await?.ok_or(ApiError::NotFound)?;
        Ok(user.into())
    }

    /// Callers may only update themselves; duplicate email/nickname of
    /// another account is a conflict.
    pub async fn update(
        &self,
        actor: &Actor,
        req: UpdateUserRequest,
    ) -> Result<UserProfile, ApiError> {
        if let Some(ref email) = req.email {
            if let Some(existing) = self.repo.find_user_by_email(email).await? {
                if existing.id != actor.id {
                    return Err(ApiError::Conflict("email already in use"));
                }
            }
        }
        if let Some(ref nickname) = req.nickname {
            if let Some(existing) = self.repo.find_user_by_nickname(nickname).await? {
                if existing.id != actor.id {
                    return Err(ApiError::Conflict("nickname already in use"));
                }
            }
        }

        let password = match req.password {
            Some(plain) => Some(hash_password(&plain).map_err(|e| {
                log::error!("password hashing failed: {e}");
                ApiError::Internal
            })?),
            None => None,
        };

        let user = self
            .repo
            .update_user(
                actor.id,
                UpdateUser {
                    email: req.email,
                    nickname: req.nickname,
                    password,
                },
            )
            .await?;
        Ok(user.into())
    }

    /// Hard delete; owned posts and comments cascade away. Self or admin.
    pub async fn delete(&self, actor: &Actor, id: Id) -> Result<(), ApiError> {
        if actor.id != id && !actor.is_admin() {
            return Err(ApiError::Forbidden);
        }
        if self.repo.find_user(id).await?.is_none() {
            return Err(ApiError::NotFound);
        }
        self.repo.delete_user(id).await?;
        Ok(())
    }
}
