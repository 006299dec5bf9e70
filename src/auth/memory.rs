use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::auth::repo::{IssueGuestToken, UserStore};
use crate::auth::repo_types::{
    GuestSession, NewGuest, NewUser, ProfileChanges, UpgradeCredentials, User,
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    sessions: Vec<GuestSession>,
    next_user_id: i64,
    next_session_id: i64,
}

/// In-process store used by unit tests in place of postgres.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    /// Makes the next session sweep fail once.
    pub fail_session_sweep: AtomicBool,
    /// Makes the next `find_by_id` fail once.
    pub fail_lookup: AtomicBool,
}

impl InMemoryStore {
    pub fn users(&self) -> Vec<User> {
        self.tables.lock().users.clone()
    }

    pub fn sessions(&self) -> Vec<GuestSession> {
        self.tables.lock().sessions.clone()
    }

    /// Overwrites a user row in place, e.g. to backdate an expiry.
    pub fn put_user(&self, user: User) {
        let mut t = self.tables.lock();
        if let Some(slot) = t.users.iter_mut().find(|u| u.id == user.id) {
            *slot = user;
        }
    }

    pub fn delete_user(&self, id: i64) {
        self.tables.lock().users.retain(|u| u.id != id);
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        if self.fail_lookup.swap(false, Ordering::SeqCst) {
            anyhow::bail!("users table unavailable");
        }
        Ok(self.tables.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .tables
            .lock()
            .users
            .iter()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned())
    }

    async fn find_by_mobile(&self, mobile: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .tables
            .lock()
            .users
            .iter()
            .find(|u| u.mobile.as_deref() == Some(mobile))
            .cloned())
    }

    async fn create_user(&self, new: NewUser) -> anyhow::Result<User> {
        let mut t = self.tables.lock();
        t.next_user_id += 1;
        let user = User {
            id: t.next_user_id,
            email: new.email,
            mobile: new.mobile,
            password_hash: Some(new.password_hash),
            first_name: new.first_name,
            last_name: new.last_name,
            grade: new.grade,
            avatar: None,
            is_guest: false,
            guest_expires_at: None,
            created_at: new.created_at,
            last_login: None,
        };
        t.users.push(user.clone());
        Ok(user)
    }

    async fn create_guest(
        &self,
        new: NewGuest,
        issue: IssueGuestToken<'_>,
    ) -> anyhow::Result<(User, GuestSession)> {
        let mut t = self.tables.lock();
        let user = User {
            id: t.next_user_id + 1,
            email: None,
            mobile: None,
            password_hash: None,
            first_name: new.first_name,
            last_name: new.last_name,
            grade: new.grade,
            avatar: None,
            is_guest: true,
            guest_expires_at: Some(new.expires_at),
            created_at: new.created_at,
            last_login: None,
        };
        // Nothing is written until the token exists.
        let token = issue(&user)?;
        let session = GuestSession {
            id: t.next_session_id + 1,
            session_token: token,
            created_at: new.created_at,
            expires_at: new.expires_at,
            ip_address: new.ip_address,
            user_agent: new.user_agent,
        };
        t.next_user_id += 1;
        t.next_session_id += 1;
        t.users.push(user.clone());
        t.sessions.push(session.clone());
        Ok((user, session))
    }

    async fn record_login(&self, id: i64, at: OffsetDateTime) -> anyhow::Result<()> {
        if let Some(u) = self.tables.lock().users.iter_mut().find(|u| u.id == id) {
            u.last_login = Some(at);
        }
        Ok(())
    }

    async fn update_profile(
        &self,
        id: i64,
        changes: ProfileChanges,
    ) -> anyhow::Result<Option<User>> {
        let mut t = self.tables.lock();
        let Some(u) = t.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(v) = changes.first_name {
            u.first_name = v;
        }
        if let Some(v) = changes.last_name {
            u.last_name = v;
        }
        if let Some(grade) = changes.grade {
            u.grade = grade;
        }
        if let Some(avatar) = changes.avatar {
            u.avatar = avatar;
        }
        Ok(Some(u.clone()))
    }

    async fn upgrade_guest(
        &self,
        id: i64,
        creds: UpgradeCredentials,
    ) -> anyhow::Result<Option<User>> {
        let mut t = self.tables.lock();
        let Some(u) = t.users.iter_mut().find(|u| u.id == id && u.is_guest) else {
            return Ok(None);
        };
        u.email = Some(creds.email);
        u.mobile = creds.mobile;
        u.password_hash = Some(creds.password_hash);
        u.is_guest = false;
        u.guest_expires_at = None;
        Ok(Some(u.clone()))
    }

    async fn delete_expired_guest_sessions(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        if self.fail_session_sweep.swap(false, Ordering::SeqCst) {
            anyhow::bail!("guest_sessions table unavailable");
        }
        let mut t = self.tables.lock();
        let before = t.sessions.len();
        t.sessions.retain(|s| s.expires_at > now);
        Ok((before - t.sessions.len()) as u64)
    }

    async fn demote_expired_guests(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        let mut t = self.tables.lock();
        let mut demoted = 0;
        for u in t
            .users
            .iter_mut()
            .filter(|u| u.is_guest && u.guest_expires_at.is_some_and(|exp| exp <= now))
        {
            u.is_guest = false;
            u.guest_expires_at = None;
            demoted += 1;
        }
        Ok(demoted)
    }
}
