use axum::{async_trait, extract::FromRequestParts, http::request::Parts, RequestPartsExt};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use super::AuthToken;
use crate::error::AppError;

/// Pulls the viewer's token out of `Authorization: Bearer <token>`.
///
/// Handlers that merely render take `Option<AuthToken>`; handlers that
/// mutate take `AuthToken` and answer 401 before any remote call is made.
#[async_trait]
impl<S> FromRequestParts<S> for AuthToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Unauthorized)?;

        let token = bearer.token().trim();
        if token.is_empty() {
            return Err(AppError::Unauthorized);
        }

        Ok(AuthToken::new(token))
    }
}
