use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use tracing::{debug, warn};

use crate::models::Role;
use crate::store::SharedStore;

pub const TOKEN_KEY: &str = "authToken";
/// Older builds stored the token here
pub const LEGACY_TOKEN_KEY: &str = "token";
pub const ROLE_KEY: &str = "userRole";
pub const MEMBER_ID_KEY: &str = "memberId";
pub const USER_NAME_KEY: &str = "userName";
pub const CREATED_AT_KEY: &str = "sessionCreatedAt";

/// Sessions last a day unless configured otherwise.
pub const DEFAULT_SESSION_TIMEOUT_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub role: Role,
    pub member_id: Option<String>,
    pub user_name: Option<String>,
    /// Epoch milliseconds. Sessions written before this was tracked have none.
    pub created_at: Option<i64>,
}

impl Session {
    pub fn new(token: impl Into<String>, role: Role) -> Self {
        Self {
            token: token.into(),
            role,
            member_id: None,
            user_name: None,
            created_at: Some(Utc::now().timestamp_millis()),
        }
    }

    pub fn is_expired_at(&self, now_ms: i64, timeout_ms: i64) -> bool {
        match self.created_at {
            Some(created) => now_ms - created > timeout_ms,
            None => false,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Time left before expiry, for display
    pub fn time_until_expiry(&self, now_ms: i64, timeout_ms: i64) -> Option<Duration> {
        self.created_at
            .map(|created| Duration::milliseconds(created + timeout_ms - now_ms))
    }
}

/// Reads and writes the login session in the shared store.
#[derive(Clone)]
pub struct SessionStore {
    store: SharedStore,
    timeout_ms: i64,
}

impl SessionStore {
    pub fn new(store: SharedStore) -> Self {
        Self::with_timeout(store, DEFAULT_SESSION_TIMEOUT_MS)
    }

    pub fn with_timeout(store: SharedStore, timeout_ms: i64) -> Self {
        Self { store, timeout_ms }
    }

    pub fn timeout_ms(&self) -> i64 {
        self.timeout_ms
    }

    /// The current session, or `None` when logged out or expired.
    /// An expired session is cleared as a side effect.
    pub fn load(&self) -> Option<Session> {
        self.load_at(Utc::now().timestamp_millis())
    }

    pub(crate) fn load_at(&self, now_ms: i64) -> Option<Session> {
        let token = self
            .read(TOKEN_KEY)
            .or_else(|| self.read(LEGACY_TOKEN_KEY))
            .filter(|t| !t.is_empty())?;

        let session = Session {
            token,
            role: self.read(ROLE_KEY).map(Role::from).unwrap_or_default(),
            member_id: self.read(MEMBER_ID_KEY),
            user_name: self.read(USER_NAME_KEY),
            created_at: self.read(CREATED_AT_KEY).and_then(|v| v.parse().ok()),
        };

        if session.is_expired_at(now_ms, self.timeout_ms) {
            debug!(created_at = ?session.created_at, "Session expired");
            if let Err(e) = self.clear() {
                warn!(error = %e, "Failed to clear expired session");
            }
            return None;
        }
        Some(session)
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        let created_at = session
            .created_at
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        self.write(TOKEN_KEY, &session.token)?;
        self.write(ROLE_KEY, session.role.as_str())?;
        match session.member_id.as_deref() {
            Some(id) => self.write(MEMBER_ID_KEY, id)?,
            None => self.store.remove_item(MEMBER_ID_KEY)?,
        }
        match session.user_name.as_deref() {
            Some(name) => self.write(USER_NAME_KEY, name)?,
            None => self.store.remove_item(USER_NAME_KEY)?,
        }
        self.write(CREATED_AT_KEY, &created_at.to_string())?;
        // Drop any token left behind by an older build
        self.store.remove_item(LEGACY_TOKEN_KEY)?;
        debug!(role = %session.role, "Session saved");
        Ok(())
    }

    /// Remove every session key, including the legacy token.
    pub fn clear(&self) -> Result<()> {
        for key in [
            TOKEN_KEY,
            LEGACY_TOKEN_KEY,
            ROLE_KEY,
            MEMBER_ID_KEY,
            USER_NAME_KEY,
            CREATED_AT_KEY,
        ] {
            self.store
                .remove_item(key)
                .with_context(|| format!("Failed to remove session key: {}", key))?;
        }
        Ok(())
    }

    pub fn token(&self) -> Option<String> {
        self.load().map(|s| s.token)
    }

    pub fn is_valid(&self) -> bool {
        self.load().is_some()
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get_item(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Failed to read session key");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.store
            .set_item(key, value)
            .with_context(|| format!("Failed to save session key: {}", key))
    }
}
