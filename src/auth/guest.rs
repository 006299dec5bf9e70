use std::time::Duration;

use axum::extract::FromRef;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        claims::{TokenKind, TokenPayload},
        credentials::{non_blank, normalize_name},
        jwt::JwtKeys,
        repo::UserStore,
        repo_types::{NewGuest, User},
    },
    clock::Clock,
    error::AppError,
    state::AppState,
};

/// Who is asking for a guest identity, and from where.
#[derive(Debug, Clone)]
pub struct GuestSpec {
    pub first_name: String,
    pub last_name: String,
    pub grade: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Creates a guest user, mints its guest token, and records the session,
/// all in one store transaction.
#[instrument(skip(state, spec))]
pub async fn create_guest_session(
    state: &AppState,
    spec: GuestSpec,
) -> Result<(User, String), AppError> {
    let first_name = normalize_name("firstName", &spec.first_name)?;
    let last_name = normalize_name("lastName", &spec.last_name)?;

    let now = state.clock.now();
    let new = NewGuest {
        first_name,
        last_name,
        grade: non_blank(spec.grade),
        created_at: now,
        expires_at: now + state.config.guest.ttl(),
        ip_address: spec.ip_address,
        user_agent: spec.user_agent,
    };

    let keys = JwtKeys::from_ref(state);
    let issue = |user: &User| keys.issue(&TokenPayload::for_user(user), TokenKind::Guest, now);
    let (user, session) = state.store.create_guest(new, &issue).await?;

    info!(
        user_id = user.id,
        session_id = session.id,
        expires_at = %session.expires_at,
        "guest session created"
    );
    Ok((user, session.session_token))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions_deleted: u64,
    pub guests_demoted: u64,
}

/// Deletes expired guest sessions, then demotes expired guest users.
/// The two steps are independent: a failure in one is logged and the other
/// still runs. Re-running is a no-op.
pub async fn cleanup_expired_guest_sessions(
    store: &dyn UserStore,
    clock: &dyn Clock,
) -> SweepReport {
    let now = clock.now();
    let mut report = SweepReport::default();

    match store.delete_expired_guest_sessions(now).await {
        Ok(n) => report.sessions_deleted = n,
        Err(e) => warn!(error = %e, "guest session sweep failed"),
    }

    // Demoted guests keep their row but have no credential to log in with.
    match store.demote_expired_guests(now).await {
        Ok(n) => report.guests_demoted = n,
        Err(e) => warn!(error = %e, "guest demotion sweep failed"),
    }

    report
}

/// Periodic sweep task. Also prunes closed rate-limit windows.
pub async fn run_sweep_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let report = cleanup_expired_guest_sessions(&*state.store, &*state.clock).await;
        if report != SweepReport::default() {
            info!(
                sessions_deleted = report.sessions_deleted,
                guests_demoted = report.guests_demoted,
                "guest sweep"
            );
        }
        state.limiter.prune(state.clock.now());
    }
}

/// Spawns the sweep unless disabled by config.
pub fn spawn_sweeper(state: &AppState) -> Option<tokio::task::JoinHandle<()>> {
    let secs = state.config.guest.sweep_interval_secs;
    if secs == 0 {
        info!("in-process guest sweep disabled");
        return None;
    }
    Some(tokio::spawn(run_sweep_loop(state.clone(), secs)))
}
