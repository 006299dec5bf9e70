use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::User;

/// Type of JWT: full account or guest. Selects the expiry window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    #[serde(alias = "Standard")]
    Standard,
    #[serde(alias = "Guest")]
    Guest,
}

/// Identity carried inside a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    pub user_id: i64,
    pub is_guest: bool,
    pub email: Option<String>,
    pub mobile: Option<String>,
}

impl TokenPayload {
    pub fn for_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            is_guest: user.is_guest,
            email: user.email.clone(),
            mobile: user.mobile.clone(),
        }
    }
}

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,       // user ID
    pub is_guest: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    pub iat: usize,     // issued at (unix timestamp)
    pub exp: usize,     // expires at (unix timestamp)
    pub iss: String,
    pub aud: String,
    pub jti: Uuid,      // makes every issued token string unique
    pub kind: TokenKind,
}

impl Claims {
    /// A token is valid while `now < exp`.
    pub fn expired_at(&self, now: OffsetDateTime) -> bool {
        (self.exp as i64) <= now.unix_timestamp()
    }
}
