use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::auth::repo_types::{
    GuestSession, NewGuest, NewUser, ProfileChanges, UpgradeCredentials, User,
};

/// Mints the guest token once the user row (and so its id) exists.
pub type IssueGuestToken<'a> = &'a (dyn Fn(&User) -> anyhow::Result<String> + Send + Sync);

/// Persistence for users and guest sessions.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_mobile(&self, mobile: &str) -> anyhow::Result<Option<User>>;
    async fn create_user(&self, new: NewUser) -> anyhow::Result<User>;
    /// Inserts the guest user and its session row atomically.
    async fn create_guest(
        &self,
        new: NewGuest,
        issue: IssueGuestToken<'_>,
    ) -> anyhow::Result<(User, GuestSession)>;
    async fn record_login(&self, id: i64, at: OffsetDateTime) -> anyhow::Result<()>;
    async fn update_profile(&self, id: i64, changes: ProfileChanges)
        -> anyhow::Result<Option<User>>;
    /// Returns `None` when the row is no longer a guest.
    async fn upgrade_guest(
        &self,
        id: i64,
        creds: UpgradeCredentials,
    ) -> anyhow::Result<Option<User>>;
    async fn delete_expired_guest_sessions(&self, now: OffsetDateTime) -> anyhow::Result<u64>;
    async fn demote_expired_guests(&self, now: OffsetDateTime) -> anyhow::Result<u64>;
}

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, mobile, password_hash, first_name, last_name, grade, avatar,
                   is_guest, guest_expires_at, created_at, last_login
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, mobile, password_hash, first_name, last_name, grade, avatar,
                   is_guest, guest_expires_at, created_at, last_login
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_mobile(&self, mobile: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, mobile, password_hash, first_name, last_name, grade, avatar,
                   is_guest, guest_expires_at, created_at, last_login
            FROM users
            WHERE mobile = $1
            "#,
        )
        .bind(mobile)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, new: NewUser) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, mobile, password_hash, first_name, last_name, grade,
                               is_guest, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7)
            RETURNING id, email, mobile, password_hash, first_name, last_name, grade, avatar,
                      is_guest, guest_expires_at, created_at, last_login
            "#,
        )
        .bind(new.email)
        .bind(new.mobile)
        .bind(new.password_hash)
        .bind(new.first_name)
        .bind(new.last_name)
        .bind(new.grade)
        .bind(new.created_at)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn create_guest(
        &self,
        new: NewGuest,
        issue: IssueGuestToken<'_>,
    ) -> anyhow::Result<(User, GuestSession)> {
        // Dropping the transaction on any early return rolls the user back.
        let mut tx = self.db.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (first_name, last_name, grade, is_guest, guest_expires_at, created_at)
            VALUES ($1, $2, $3, TRUE, $4, $5)
            RETURNING id, email, mobile, password_hash, first_name, last_name, grade, avatar,
                      is_guest, guest_expires_at, created_at, last_login
            "#,
        )
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.grade)
        .bind(new.expires_at)
        .bind(new.created_at)
        .fetch_one(&mut *tx)
        .await?;

        let token = issue(&user)?;

        let session = sqlx::query_as::<_, GuestSession>(
            r#"
            INSERT INTO guest_sessions (session_token, created_at, expires_at, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, session_token, created_at, expires_at, ip_address, user_agent
            "#,
        )
        .bind(token)
        .bind(new.created_at)
        .bind(new.expires_at)
        .bind(new.ip_address)
        .bind(new.user_agent)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((user, session))
    }

    async fn record_login(&self, id: i64, at: OffsetDateTime) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE users SET last_login = $2 WHERE id = $1"#)
            .bind(id)
            .bind(at)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn update_profile(
        &self,
        id: i64,
        changes: ProfileChanges,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET first_name = COALESCE($2, first_name),
                last_name  = COALESCE($3, last_name),
                grade      = CASE WHEN $4 THEN $5 ELSE grade END,
                avatar     = CASE WHEN $6 THEN $7 ELSE avatar END
            WHERE id = $1
            RETURNING id, email, mobile, password_hash, first_name, last_name, grade, avatar,
                      is_guest, guest_expires_at, created_at, last_login
            "#,
        )
        .bind(id)
        .bind(changes.first_name)
        .bind(changes.last_name)
        .bind(changes.grade.is_some())
        .bind(changes.grade.flatten())
        .bind(changes.avatar.is_some())
        .bind(changes.avatar.flatten())
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn upgrade_guest(
        &self,
        id: i64,
        creds: UpgradeCredentials,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET email = $2,
                mobile = $3,
                password_hash = $4,
                is_guest = FALSE,
                guest_expires_at = NULL
            WHERE id = $1 AND is_guest = TRUE
            RETURNING id, email, mobile, password_hash, first_name, last_name, grade, avatar,
                      is_guest, guest_expires_at, created_at, last_login
            "#,
        )
        .bind(id)
        .bind(creds.email)
        .bind(creds.mobile)
        .bind(creds.password_hash)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn delete_expired_guest_sessions(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        let res = sqlx::query(r#"DELETE FROM guest_sessions WHERE expires_at <= $1"#)
            .bind(now)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected())
    }

    async fn demote_expired_guests(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
            UPDATE users
            SET is_guest = FALSE, guest_expires_at = NULL
            WHERE is_guest = TRUE AND guest_expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected())
    }
}
