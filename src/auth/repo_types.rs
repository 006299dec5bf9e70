use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// User record in the database. Guests have no credentials.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: Option<String>,
    pub mobile: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // Argon2 hash, not exposed in JSON
    pub first_name: String,
    pub last_name: String,
    pub grade: Option<String>,
    pub avatar: Option<String>,
    pub is_guest: bool,
    pub guest_expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub last_login: Option<OffsetDateTime>,
}

impl User {
    /// Guest whose row-level expiry has passed. This is the authority for
    /// guest validity, independent of the token's own `exp`.
    pub fn guest_expired_at(&self, now: OffsetDateTime) -> bool {
        self.is_guest && self.guest_expires_at.map_or(true, |exp| exp <= now)
    }
}

/// Audit row written alongside every guest token.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct GuestSession {
    pub id: i64,
    pub session_token: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub grade: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewGuest {
    pub first_name: String,
    pub last_name: String,
    pub grade: Option<String>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Partial profile update; `None` leaves the column untouched.
/// For the optional columns `Some(None)` clears the value.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub grade: Option<Option<String>>,
    pub avatar: Option<Option<String>>,
}

#[derive(Debug, Clone)]
pub struct UpgradeCredentials {
    pub email: String,
    pub mobile: Option<String>,
    pub password_hash: String,
}
