use serde::Deserialize;
use time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_days: i64,
    pub guest_ttl_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuestConfig {
    pub ttl_hours: i64,
    /// 0 disables the in-process sweep.
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub max_attempts: u32,
    pub window_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub guest: GuestConfig,
    pub rate_limit: RateLimitConfig,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let guest_ttl_hours = env_or("GUEST_TTL_HOURS", 24);
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "learnquest".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "learnquest-users".into()),
            ttl_days: env_or("JWT_TTL_DAYS", 7),
            guest_ttl_hours,
        };
        let guest = GuestConfig {
            ttl_hours: guest_ttl_hours,
            sweep_interval_secs: env_or("GUEST_SWEEP_INTERVAL_SECS", 3600),
        };
        let rate_limit = RateLimitConfig {
            max_attempts: env_or("LOGIN_MAX_ATTEMPTS", 5),
            window_secs: env_or("LOGIN_WINDOW_SECS", 15 * 60),
        };
        Ok(Self {
            database_url,
            jwt,
            guest,
            rate_limit,
        })
    }
}

impl GuestConfig {
    pub fn ttl(&self) -> Duration {
        Duration::hours(self.ttl_hours)
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::seconds(self.window_secs)
    }
}
