use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::auth::repo_types::User;

/// Request body for registration. One of email/mobile is required.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub grade: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestRequest {
    pub first_name: String,
    pub last_name: String,
    pub grade: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeRequest {
    pub email: String,
    pub password: String,
    pub mobile: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub grade: Option<String>,
    pub avatar: Option<String>,
}

/// Response returned after register, login or upgrade.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct GuestResponse {
    pub success: bool,
    pub token: String,
    pub user: GuestUser,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub success: bool,
    pub user: PublicUser,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: i64,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub grade: Option<String>,
    pub avatar: Option<String>,
    pub is_guest: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub guest_expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            mobile: u.mobile.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            grade: u.grade.clone(),
            avatar: u.avatar.clone(),
            is_guest: u.is_guest,
            guest_expires_at: u.guest_expires_at,
            created_at: u.created_at,
            last_login: u.last_login,
        }
    }
}

/// Minimal view handed back when a guest is created.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestUser {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub grade: Option<String>,
    pub is_guest: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&User> for GuestUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            grade: u.grade.clone(),
            is_guest: u.is_guest,
            created_at: u.created_at,
        }
    }
}
