use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{
    auth::claims::{Claims, TokenKind, TokenPayload},
    config::JwtConfig,
    state::AppState,
};

/// Why a token was refused. Callers treat every variant as "not authenticated".
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
            _ => TokenError::Malformed,
        }
    }
}

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub standard_ttl: Duration,
    pub guest_ttl: Duration,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            standard_ttl: Duration::days(cfg.ttl_days),
            guest_ttl: Duration::hours(cfg.guest_ttl_hours),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Standard => self.standard_ttl,
            TokenKind::Guest => self.guest_ttl,
        }
    }

    pub fn issue(
        &self,
        payload: &TokenPayload,
        kind: TokenKind,
        now: OffsetDateTime,
    ) -> anyhow::Result<String> {
        let exp = now + self.ttl(kind);
        let claims = Claims {
            sub: payload.user_id,
            is_guest: payload.is_guest,
            email: payload.email.clone(),
            mobile: payload.mobile.clone(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4(),
            kind,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id = payload.user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    /// Checks signature, issuer and audience but not expiry.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        // exp is compared against the injected clock, not the system clock
        validation.validate_exp = false;
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }

    pub fn verify(&self, token: &str, now: OffsetDateTime) -> Result<Claims, TokenError> {
        let claims = self.decode(token)?;
        if claims.expired_at(now) {
            return Err(TokenError::Expired);
        }
        debug!(user_id = claims.sub, kind = ?claims.kind, "jwt verified");
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::from(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_days: 7,
            guest_ttl_hours: 24,
        })
    }

    fn payload(user_id: i64, is_guest: bool) -> TokenPayload {
        TokenPayload {
            user_id,
            is_guest,
            email: (!is_guest).then(|| "a@x.com".to_string()),
            mobile: None,
        }
    }

    const T0: OffsetDateTime = datetime!(2026-03-01 12:00 UTC);

    #[test]
    fn issue_and_verify_standard_token() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let token = keys.issue(&payload(42, false), TokenKind::Standard, T0).expect("issue");
        let claims = keys.verify(&token, T0).expect("verify");
        assert_eq!(claims.sub, 42);
        assert!(!claims.is_guest);
        assert_eq!(claims.email.as_deref(), Some("a@x.com"));
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.kind, TokenKind::Standard);
    }

    #[test]
    fn standard_token_lives_seven_days() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys.issue(&payload(1, false), TokenKind::Standard, T0).unwrap();
        let almost = T0 + Duration::days(7) - Duration::seconds(1);
        assert!(keys.verify(&token, almost).is_ok());
        assert_eq!(
            keys.verify(&token, T0 + Duration::days(7)).unwrap_err(),
            TokenError::Expired
        );
    }

    #[test]
    fn guest_token_lives_one_day() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys.issue(&payload(7, true), TokenKind::Guest, T0).unwrap();
        let claims = keys.verify(&token, T0 + Duration::hours(23)).unwrap();
        assert!(claims.is_guest);
        assert_eq!(claims.kind, TokenKind::Guest);
        assert_eq!(
            keys.verify(&token, T0 + Duration::hours(24) + Duration::seconds(1))
                .unwrap_err(),
            TokenError::Expired
        );
    }

    #[test]
    fn tokens_are_unique_per_issue() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let a = keys.issue(&payload(1, true), TokenKind::Guest, T0).unwrap();
        let b = keys.issue(&payload(1, true), TokenKind::Guest, T0).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn verify_rejects_foreign_signature() {
        let ours = make_keys("our-secret", "iss", "aud");
        let theirs = make_keys("their-secret", "iss", "aud");
        let token = theirs.issue(&payload(1, false), TokenKind::Standard, T0).unwrap();
        assert_eq!(ours.verify(&token, T0).unwrap_err(), TokenError::InvalidSignature);
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good = make_keys("same-secret", "good-iss", "good-aud");
        let bad = make_keys("same-secret", "bad-iss", "bad-aud");
        let token = good.issue(&payload(1, false), TokenKind::Standard, T0).unwrap();
        assert_eq!(bad.verify(&token, T0).unwrap_err(), TokenError::InvalidSignature);
    }

    #[test]
    fn verify_rejects_garbage_as_malformed() {
        let keys = make_keys("dev-secret", "iss", "aud");
        assert_eq!(keys.verify("not-a-token", T0).unwrap_err(), TokenError::Malformed);
        assert_eq!(keys.verify("", T0).unwrap_err(), TokenError::Malformed);
    }
}
