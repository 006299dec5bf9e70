use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, info, instrument};

use crate::{
    auth::{
        dto::{
            AuthResponse, GuestRequest, GuestResponse, GuestUser, LoginRequest, ProfileResponse,
            PublicUser, RegisterRequest, UpdateProfileRequest, UpgradeRequest,
        },
        extractors::{authenticate, AuthUser, JsonBody},
        guest::{create_guest_session, GuestSpec},
        services,
    },
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/guest", post(create_guest))
        .route("/auth/upgrade", post(upgrade))
        .route("/auth/logout", post(logout))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/auth/profile", get(get_profile).put(update_profile))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let (user, token) = services::register_user(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            success: true,
            token,
            user: PublicUser::from(&user),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let (user, token) = services::login_user(&state, payload).await?;
    Ok(Json(AuthResponse {
        success: true,
        token,
        user: PublicUser::from(&user),
    }))
}

/// First hop of X-Forwarded-For, else the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|p| p.ip().to_string()))
}

#[instrument(skip(state, headers, payload))]
pub async fn create_guest(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    JsonBody(payload): JsonBody<GuestRequest>,
) -> Result<(StatusCode, Json<GuestResponse>), AppError> {
    let spec = GuestSpec {
        first_name: payload.first_name,
        last_name: payload.last_name,
        grade: payload.grade,
        ip_address: client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr)),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };
    let (user, token) = create_guest_session(&state, spec).await?;
    Ok((
        StatusCode::CREATED,
        Json(GuestResponse {
            success: true,
            token,
            user: GuestUser::from(&user),
        }),
    ))
}

#[instrument(skip(state, auth, payload), fields(user_id = auth.user.id))]
pub async fn upgrade(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(payload): JsonBody<UpgradeRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let (user, token) = services::upgrade_guest(&state, &auth.user, payload).await?;
    Ok(Json(AuthResponse {
        success: true,
        token,
        user: PublicUser::from(&user),
    }))
}

#[instrument(skip(auth), fields(user_id = auth.user.id))]
pub async fn get_profile(auth: AuthUser) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        success: true,
        user: PublicUser::from(&auth.user),
    })
}

#[instrument(skip(state, auth, payload), fields(user_id = auth.user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(payload): JsonBody<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = services::update_profile(&state, &auth.user, payload).await?;
    Ok(Json(ProfileResponse {
        success: true,
        user: PublicUser::from(&user),
    }))
}

/// Tokens are not revocable and the client drops its copy whatever the
/// answer, so every caller gets 204; the gate only decides what is logged.
#[instrument(skip(state, headers))]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    match authenticate(&state, &headers).await {
        Ok(auth) => info!(
            user_id = auth.user.id,
            is_guest = auth.user.is_guest,
            "user logged out"
        ),
        Err(e) => debug!(reason = %e, "logout without a live session"),
    }
    StatusCode::NO_CONTENT
}
