use axum::extract::FromRef;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        claims::{TokenKind, TokenPayload},
        credentials::{
            check_password, hash_password, non_blank, normalize_email, normalize_mobile,
            normalize_name, verify_password,
        },
        dto::{LoginRequest, RegisterRequest, UpdateProfileRequest, UpgradeRequest},
        jwt::JwtKeys,
        repo_types::{NewUser, ProfileChanges, UpgradeCredentials, User},
    },
    error::AppError,
    state::AppState,
};

fn issue_standard(state: &AppState, user: &User) -> Result<String, AppError> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.issue(&TokenPayload::for_user(user), TokenKind::Standard, state.clock.now())?;
    Ok(token)
}

/// Refuses with 409 when `email`/`mobile` belong to someone other than `owner`.
async fn ensure_available(
    state: &AppState,
    email: Option<&str>,
    mobile: Option<&str>,
    owner: Option<i64>,
) -> Result<(), AppError> {
    if let Some(email) = email {
        if let Some(other) = state.store.find_by_email(email).await? {
            if Some(other.id) != owner {
                warn!(email = %email, "email already registered");
                return Err(AppError::Conflict("Email already registered".into()));
            }
        }
    }
    if let Some(mobile) = mobile {
        if let Some(other) = state.store.find_by_mobile(mobile).await? {
            if Some(other.id) != owner {
                warn!(mobile = %mobile, "mobile already registered");
                return Err(AppError::Conflict("Mobile number already registered".into()));
            }
        }
    }
    Ok(())
}

#[instrument(skip(state, req))]
pub async fn register_user(
    state: &AppState,
    req: RegisterRequest,
) -> Result<(User, String), AppError> {
    let email = non_blank(req.email).map(|e| normalize_email(&e)).transpose()?;
    let mobile = non_blank(req.mobile).map(|m| normalize_mobile(&m)).transpose()?;
    if email.is_none() && mobile.is_none() {
        return Err(AppError::validation("email", "Email or mobile is required"));
    }
    check_password(&req.password)?;
    let first_name = normalize_name("firstName", &req.first_name)?;
    let last_name = normalize_name("lastName", &req.last_name)?;

    ensure_available(state, email.as_deref(), mobile.as_deref(), None).await?;

    let password_hash = hash_password(&req.password)?;
    let user = state
        .store
        .create_user(NewUser {
            email,
            mobile,
            password_hash,
            first_name,
            last_name,
            grade: non_blank(req.grade),
            created_at: state.clock.now(),
        })
        .await?;

    let token = issue_standard(state, &user)?;
    info!(user_id = user.id, "user registered");
    Ok((user, token))
}

#[instrument(skip(state, req))]
pub async fn login_user(state: &AppState, req: LoginRequest) -> Result<(User, String), AppError> {
    let (key, found) = match (non_blank(req.email), non_blank(req.mobile)) {
        (Some(email), _) => {
            let email = normalize_email(&email)?;
            state.limiter.check(&email, state.clock.now())?;
            let found = state.store.find_by_email(&email).await?;
            (email, found)
        }
        (None, Some(mobile)) => {
            let mobile = normalize_mobile(&mobile)?;
            state.limiter.check(&mobile, state.clock.now())?;
            let found = state.store.find_by_mobile(&mobile).await?;
            (mobile, found)
        }
        (None, None) => {
            return Err(AppError::validation("email", "Email or mobile is required"));
        }
    };

    // Unknown identity, credential-less row and wrong password look the same.
    let verified = match &found {
        Some(User {
            password_hash: Some(hash),
            ..
        }) => verify_password(&req.password, hash)?,
        _ => false,
    };
    let user = match found {
        Some(user) if verified => user,
        _ => {
            warn!("login rejected");
            state.limiter.record_failure(&key, state.clock.now());
            return Err(AppError::Unauthorized("invalid credentials"));
        }
    };
    state.limiter.reset(&key);

    let now = state.clock.now();
    state.store.record_login(user.id, now).await?;
    let user = User {
        last_login: Some(now),
        ..user
    };

    let token = issue_standard(state, &user)?;
    info!(user_id = user.id, "user logged in");
    Ok((user, token))
}

/// Turns the authenticated guest into a full account in place; the id is kept.
#[instrument(skip(state, guest, req), fields(user_id = guest.id))]
pub async fn upgrade_guest(
    state: &AppState,
    guest: &User,
    req: UpgradeRequest,
) -> Result<(User, String), AppError> {
    if !guest.is_guest {
        return Err(AppError::Unauthorized("not a guest account"));
    }

    let email = normalize_email(&req.email)?;
    check_password(&req.password)?;
    let mobile = non_blank(req.mobile).map(|m| normalize_mobile(&m)).transpose()?;

    ensure_available(state, Some(email.as_str()), mobile.as_deref(), Some(guest.id)).await?;

    let password_hash = hash_password(&req.password)?;
    let user = state
        .store
        .upgrade_guest(
            guest.id,
            UpgradeCredentials {
                email,
                mobile,
                password_hash,
            },
        )
        .await?
        .ok_or(AppError::Unauthorized("not a guest account"))?;

    let token = issue_standard(state, &user)?;
    info!(user_id = user.id, "guest upgraded");
    Ok((user, token))
}

pub async fn update_profile(
    state: &AppState,
    user: &User,
    req: UpdateProfileRequest,
) -> Result<User, AppError> {
    let changes = ProfileChanges {
        first_name: req
            .first_name
            .map(|n| normalize_name("firstName", &n))
            .transpose()?,
        last_name: req
            .last_name
            .map(|n| normalize_name("lastName", &n))
            .transpose()?,
        // a blank string clears the column
        grade: req.grade.map(|g| non_blank(Some(g))),
        avatar: req.avatar.map(|a| non_blank(Some(a))),
    };

    state
        .store
        .update_profile(user.id, changes)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}
