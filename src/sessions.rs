use crate::{
    error::{AppError, Result},
    models::{Role, UserId},
};
use base64::Engine;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, info};

const MIN_TTL: u64 = 60;
const MAX_TTL: u64 = 86_400;
pub const DEFAULT_TTL: u64 = 3_600;

/// A logged-in user. The token is the bearer credential.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// In-memory session table keyed by token. Sessions are not persisted; a
/// restart logs everyone out.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Session>>,
    ttl_seconds: u64,
}

impl SessionStore {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl_seconds: clamp_ttl(Some(ttl_seconds)),
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn create_session(&self, user_id: UserId, role: Role) -> Session {
        let now = Utc::now();
        let session = Session {
            token: generate_token(),
            user_id,
            role,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(self.ttl_seconds as i64),
        };

        self.sessions.insert(session.token.clone(), session.clone());
        info!("Session created for user {} ({})", user_id, role.as_str());
        session
    }

    /// Looks up a live session. An expired one is dropped on the spot.
    pub fn resolve(&self, token: &str) -> Result<Session> {
        let session = self
            .sessions
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(AppError::SessionNotFound)?;

        if session.is_expired() {
            self.sessions.remove(token);
            debug!("Session for user {} expired", session.user_id);
            return Err(AppError::SessionExpired);
        }
        Ok(session)
    }

    /// Ends a session. Unknown tokens are ignored.
    pub fn terminate(&self, token: &str) {
        if let Some((_, session)) = self.sessions.remove(token) {
            info!("Session terminated for user {}", session.user_id);
        }
    }

    pub fn is_active(&self, token: &str) -> bool {
        self.sessions
            .get(token)
            .map(|entry| !entry.value().is_expired())
            .unwrap_or(false)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn start_expiry_task(self) {
        tokio::spawn(async move {
            let mut interval = time::interval(Duration::from_secs(30));
            info!("Started session expiry background task (30s interval)");

            loop {
                interval.tick().await;
                self.cleanup_expired_sessions();
            }
        });
    }

    fn cleanup_expired_sessions(&self) {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.expires_at > now);

        let purged = before.saturating_sub(self.sessions.len());
        if purged > 0 {
            debug!("Purged {} expired sessions", purged);
        }
    }
}

pub fn clamp_ttl(ttl: Option<u64>) -> u64 {
    ttl.unwrap_or(DEFAULT_TTL).clamp(MIN_TTL, MAX_TTL)
}

fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let token_bytes: [u8; 32] = rng.gen();
    base64::engine::general_purpose::STANDARD.encode(token_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_resolve() {
        let store = SessionStore::new(DEFAULT_TTL);
        let user_id = UserId::new();

        let session = store.create_session(user_id, Role::Admin);
        assert!(!session.is_expired());
        assert!(store.is_active(&session.token));

        let resolved = store.resolve(&session.token).unwrap();
        assert_eq!(resolved.user_id, user_id);
        assert_eq!(resolved.role, Role::Admin);
    }

    #[test]
    fn test_tokens_are_unique() {
        let store = SessionStore::new(DEFAULT_TTL);
        let user_id = UserId::new();
        let a = store.create_session(user_id, Role::User);
        let b = store.create_session(user_id, Role::User);
        assert_ne!(a.token, b.token);
        assert_eq!(store.active_sessions(), 2);
    }

    #[test]
    fn test_ttl_clamping() {
        assert_eq!(clamp_ttl(None), DEFAULT_TTL);
        assert_eq!(clamp_ttl(Some(1)), MIN_TTL);
        assert_eq!(clamp_ttl(Some(1_000_000)), MAX_TTL);
        assert_eq!(SessionStore::new(5).ttl_seconds(), MIN_TTL);
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let store = SessionStore::new(DEFAULT_TTL);
        let session = store.create_session(UserId::new(), Role::User);

        store.terminate(&session.token);
        store.terminate(&session.token);
        store.terminate("never-issued");

        assert!(!store.is_active(&session.token));
        assert!(matches!(
            store.resolve(&session.token),
            Err(AppError::SessionNotFound)
        ));
    }

    #[test]
    fn test_expired_session_is_rejected() {
        let store = SessionStore::new(DEFAULT_TTL);
        let session = store.create_session(UserId::new(), Role::User);
        {
            let mut entry = store.sessions.get_mut(&session.token).unwrap();
            entry.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }

        assert!(!store.is_active(&session.token));
        assert!(matches!(
            store.resolve(&session.token),
            Err(AppError::SessionExpired)
        ));
        // resolve drops it
        assert_eq!(store.active_sessions(), 0);
    }

    #[test]
    fn test_cleanup_purges_only_expired() {
        let store = SessionStore::new(DEFAULT_TTL);
        let stale = store.create_session(UserId::new(), Role::User);
        let live = store.create_session(UserId::new(), Role::User);
        store.sessions.get_mut(&stale.token).unwrap().expires_at =
            Utc::now() - chrono::Duration::seconds(1);

        store.cleanup_expired_sessions();

        assert_eq!(store.active_sessions(), 1);
        assert!(store.is_active(&live.token));
    }
}
