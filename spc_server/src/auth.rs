//! Authentication
//!
//! Argon2 password hashes, opaque bearer tokens, and the [`AuthUser`]
//! extractor that resolves the `Authorization` header of a request into the
//! signed-in user.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use spc_model::{CurrentUser, Permission, Role};
use uuid::Uuid;

use crate::api::{ApiError, AppState};

/// PHC string (`$argon2id$...`) for storage.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>())
        .map_err(|e| ApiError::Internal(format!("salt encoding failed: {}", e)))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Extracts the token from `Bearer <token>` or `Token <token>`.
pub fn parse_authorization(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    if token.is_empty() || token.contains(' ') {
        return None;
    }
    match scheme.to_ascii_lowercase().as_str() {
        "bearer" | "token" => Some(token),
        _ => None,
    }
}

/// The user behind the request's bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub is_confirmed: bool,
    pub token: String,
}

impl AuthUser {
    pub fn require(&self, permission: Permission) -> Result<(), ApiError> {
        if self.role.allows(permission) {
            Ok(())
        } else {
            tracing::warn!(user_id = self.id, role = %self.role, ?permission, "Permission denied");
            Err(ApiError::Forbidden)
        }
    }

    pub fn current_user(&self) -> CurrentUser {
        CurrentUser {
            id: self.id,
            email: self.email.clone(),
            role: self.role,
            is_confirmed: self.is_confirmed,
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                ApiError::Unauthorized("Authentication credentials were not provided.".to_string())
            })?;

        let token = parse_authorization(header)
            .ok_or_else(|| ApiError::Unauthorized("Invalid token header.".to_string()))?;

        let user = state
            .db
            .user_for_token(token)
            .await?
            .filter(|user| user.is_active)
            .ok_or_else(|| ApiError::Unauthorized("Invalid token.".to_string()))?;

        Ok(Self {
            role: user.role()?,
            id: user.id,
            email: user.email,
            is_confirmed: user.is_confirmed,
            token: token.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let stored = hash_password("s3cret").unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(verify_password("s3cret", &stored));
        assert!(!verify_password("S3cret", &stored));
    }

    #[test]
    fn hashes_are_salted() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn malformed_stored_hash_never_verifies() {
        assert!(!verify_password("x", "x"));
        assert!(!verify_password("x", "md5$salt$digest"));
        assert!(!verify_password("x", "sha256$00ff$abcdef"));
    }

    #[test]
    fn authorization_schemes() {
        assert_eq!(parse_authorization("Bearer abc"), Some("abc"));
        assert_eq!(parse_authorization("Token abc"), Some("abc"));
        assert_eq!(parse_authorization("bearer  abc "), Some("abc"));
        assert_eq!(parse_authorization("Basic abc"), None);
        assert_eq!(parse_authorization("Bearer"), None);
        assert_eq!(parse_authorization("Bearer a b"), None);
    }

    #[test]
    fn tokens_are_unique() {
        assert_ne!(new_token(), new_token());
        assert_eq!(new_token().len(), 32);
    }
}
