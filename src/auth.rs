use actix_web::{dev::Payload, Error, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use std::future::{ready, Ready};

use crate::models::{Id, Role, User};
use crate::policy::Actor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Id,
    pub email: String,
    pub nickname: String,
    pub role: Role,
    pub token_type: String, // "access" | "refresh"
    pub exp: usize,
}

fn decode_jwt(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let secret = env::var("JWT_SECRET").expect("JWT_SECRET not set");
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

fn create_token(
    user: &User,
    token_type: &str,
    ttl: chrono::Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let secret = env::var("JWT_SECRET").expect("JWT_SECRET not set");
    let expiration = chrono::Utc::now()
        .checked_add_signed(ttl)
        .expect("valid timestamp")
        .timestamp() as usize;

    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        nickname: user.nickname.clone(),
        role: user.role,
        token_type: token_type.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Short-lived token sent in the `Authorization` header/cookie.
pub fn create_access_token(user: &User) -> Result<String, jsonwebtoken::errors::Error> {
    create_token(user, "access", chrono::Duration::minutes(60))
}

/// Longer-lived token held in the `refreshToken` cookie.
pub fn create_refresh_token(user: &User) -> Result<String, jsonwebtoken::errors::Error> {
    create_token(user, "refresh", chrono::Duration::hours(24))
}

/// Extractor yielding validated `Claims`. The token is taken from the
/// `Authorization` cookie first, then from the bearer header.
pub struct Auth(pub Claims);

impl Auth {
    pub fn actor(&self) -> Actor {
        Actor { id: self.0.sub, role: self.0.role }
    }
}

impl FromRequest for Auth {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let token = req
            .cookie("Authorization")
            .map(|c| c.value().to_string())
            .or_else(|| {
                BearerAuth::from_request(req, pl)
                    .into_inner()
                    .ok()
                    .map(|b| b.token().to_string())
            });

        match token {
            Some(t) => match decode_jwt(&t) {
                Ok(claims) => ready(Ok(Auth(claims))),
                Err(_) => ready(Err(actix_web::error::ErrorUnauthorized("Invalid JWT"))),
            },
            None => ready(Err(actix_web::error::ErrorUnauthorized(
                "Authorization required",
            ))),
        }
    }
}

pub fn hash_password(plain: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(plain.as_bytes(), &salt)?
        .to_string())
}

/// Constant-time verification; a malformed stored hash counts as a mismatch.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_roundtrip() {
        let hash = hash_password("hunter2!").unwrap();
        assert!(verify_password("hunter2!", &hash));
        assert!(!verify_password("hunter3!", &hash));
        assert!(!verify_password("hunter2!", "not-a-phc-string"));
    }
}
