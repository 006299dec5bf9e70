use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRef, FromRequest, FromRequestParts, Request},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    Json,
};
use tracing::{error, warn};

use crate::{
    auth::{
        claims::{Claims, TokenKind},
        jwt::JwtKeys,
        repo_types::User,
    },
    error::AppError,
    state::AppState,
};

/// The identity resolved from a bearer token. Extracting it runs the
/// whole session gate; handlers that take it never see an
/// unauthenticated request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub claims: Claims,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = auth
        .strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, AppError> {
    let token = bearer_token(headers).ok_or(AppError::Unauthorized("access token required"))?;

    let now = state.clock.now();
    let keys = JwtKeys::from_ref(state);
    let claims = keys.decode(token).map_err(|e| {
        warn!(reason = %e, "token rejected");
        AppError::Unauthorized("invalid or expired token")
    })?;

    // For guest tokens the guest row decides expiry; see below.
    let token_expired = claims.expired_at(now);
    if token_expired && claims.kind == TokenKind::Standard {
        warn!(user_id = claims.sub, "token expired");
        return Err(AppError::Unauthorized("invalid or expired token"));
    }

    let user = match state.store.find_by_id(claims.sub).await {
        Ok(Some(u)) => u,
        Ok(None) if token_expired => {
            warn!(user_id = claims.sub, "expired guest token for missing user");
            return Err(AppError::Unauthorized("invalid or expired token"));
        }
        Ok(None) => {
            warn!(user_id = claims.sub, "token for missing user");
            return Err(AppError::Unauthorized("user not found"));
        }
        Err(e) => {
            error!(error = %e, user_id = claims.sub, "user lookup failed");
            return Err(AppError::Internal(e));
        }
    };

    if user.guest_expired_at(now) {
        warn!(user_id = user.id, "guest session expired");
        return Err(AppError::Unauthorized("guest session expired"));
    }
    if token_expired {
        warn!(user_id = user.id, "guest token expired");
        return Err(AppError::Unauthorized("invalid or expired token"));
    }

    Ok(AuthUser { user, claims })
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authenticate(state, &parts.headers).await
    }
}

/// `Json<T>` whose rejection is an `AppError`, so bad bodies get the
/// usual `{success, error, field}` 400.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    T: Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
            warn!(reason = %e.body_text(), "request body rejected");
            AppError::from(e)
        })?;
        Ok(JsonBody(value))
    }
}
