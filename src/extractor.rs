use axum::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::AppError;

#[derive(Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// Caller identity proven by a bearer token or the `auth_token` cookie.
pub struct AuthUser {
    pub user_id: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let cookie_token = parts
            .headers
            .get(axum::http::header::COOKIE)
            .and_then(|header| header.to_str().ok())
            .and_then(|cookies| {
                cookies.split(';').find_map(|c| {
                    let c = c.trim();
                    c.strip_prefix("auth_token=").map(|s| s.to_string())
                })
            })
            .filter(|token| !token.is_empty());
        let token = cookie_token
            .or_else(|| {
                parts
                    .headers
                    .get(axum::http::header::AUTHORIZATION)
                    .and_then(|authz| authz.to_str().ok())
                    .and_then(|s| s.strip_prefix("Bearer ").map(|s| s.trim().to_string()))
            })
            .filter(|token| !token.is_empty())
            .ok_or(AppError::Unauthorized)?;
        let secret = crate::config::JWT_SECRET.as_str();
        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|err| {
            tracing::debug!(?err, "rejected bearer token");
            AppError::Unauthorized
        })?;
        if decoded.claims.sub.trim().is_empty() {
            return Err(AppError::Unauthorized);
        }
        Ok(AuthUser {
            user_id: decoded.claims.sub,
        })
    }
}
