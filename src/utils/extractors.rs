use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
    RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use uuid::Uuid;

use crate::service::auth::{AuthError, AuthService};

/// The authenticated caller, resolved from the `Authorization: Bearer`
/// header. Rejects the request before the handler runs when the token is
/// missing or invalid.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::MissingToken.into_response())?;
        let claims = AuthService::validate_token(bearer.token()).map_err(|e| e.into_response())?;
        Ok(Self(claims.sub))
    }
}
