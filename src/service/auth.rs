use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use macros::JsonErrorResponse;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{config, utils::error::ErrorResponse};

#[derive(Serialize, Deserialize)]
pub struct Claims {
    /// The authenticated user's id.
    pub sub: Uuid,
    pub exp: i64,
}

#[derive(Clone)]
pub struct AuthService;

impl AuthService {
    /// Checks signature and expiry. The same rules apply no matter whether
    /// the token arrived in a header or a query parameter.
    pub fn validate_token(token: &str) -> AuthResult<Claims> {
        let secret = config::jwt_secret();
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|_| AuthError::InvalidToken)
    }

    #[allow(dead_code)]
    pub fn issue_token(user_id: Uuid, valid_for: chrono::Duration) -> AuthResult<String> {
        let claims = Claims {
            sub: user_id,
            exp: (Utc::now() + valid_for).timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config::jwt_secret().as_bytes()),
        )
        .map_err(|_| AuthError::TokenCreateFailed)
    }
}

#[derive(thiserror::Error, Debug, JsonErrorResponse)]
pub enum AuthError {
    #[error("Invalid or expired token")]
    #[status_code(StatusCode::UNAUTHORIZED)]
    InvalidToken,

    #[error("Missing bearer token")]
    #[status_code(StatusCode::UNAUTHORIZED)]
    MissingToken,

    #[error("Failed to create token")]
    #[status_code(StatusCode::INTERNAL_SERVER_ERROR)]
    TokenCreateFailed,
}

pub type AuthResult<T> = Result<T, AuthError>;
