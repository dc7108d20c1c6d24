use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use super::credentials::{CredentialStore, SavedCredentials};
use super::session::{Session, SessionStore};
use crate::api::ApiClient;
use crate::models::ValidationError;

pub const LOGIN_PAGE: &str = "index.html";
pub const HOME_PAGE: &str = "home.html";

/// Where a page guard sends the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Stay,
    Login,
    /// Signed in but not allowed here; show `message` on the home page
    Home { message: String },
}

impl Navigation {
    pub fn location(&self) -> Option<&'static str> {
        match self {
            Navigation::Stay => None,
            Navigation::Login => Some(LOGIN_PAGE),
            Navigation::Home { .. } => Some(HOME_PAGE),
        }
    }
}

/// Login, logout and page guards.
#[derive(Clone)]
pub struct Auth {
    api: ApiClient,
    credentials: CredentialStore,
}

impl Auth {
    pub fn new(api: ApiClient, credentials: CredentialStore) -> Self {
        Self { api, credentials }
    }

    fn sessions(&self) -> &SessionStore {
        self.api.sessions()
    }

    /// Sign in and persist the session. With `remember`, the login id and
    /// password are kept for next time; otherwise any saved login is dropped.
    pub async fn login(&self, login_id: &str, password: &str, remember: bool) -> Result<Session> {
        let login_id = login_id.trim();
        if login_id.is_empty() || password.is_empty() {
            return Err(ValidationError::new("Enter your login ID and password").into());
        }

        let result = self.api.login(login_id, password).await?;
        let session = Session {
            token: result.token,
            role: result.role,
            member_id: result.member_id,
            user_name: result.name,
            created_at: Some(Utc::now().timestamp_millis()),
        };
        self.sessions().save(&session)?;
        info!(role = %session.role, "Logged in");

        if remember {
            if let Err(e) = self.credentials.remember(login_id, password) {
                warn!(error = %e, "Could not save login credentials");
            }
        } else {
            self.credentials.forget()?;
        }
        Ok(session)
    }

    /// Sign out. The server call is best effort; local state is always cleared.
    pub async fn logout(&self, clear_credentials: bool) -> Result<()> {
        if self.sessions().token().is_some() {
            if let Err(e) = self.api.logout().await {
                warn!(error = %e, "Server logout failed");
            }
        }
        self.sessions().clear()?;
        self.api.clear_all_cache();
        if clear_credentials {
            self.credentials.forget()?;
        }
        info!("Logged out");
        Ok(())
    }

    pub fn is_logged_in(&self) -> bool {
        self.sessions().is_valid()
    }

    pub fn is_admin(&self) -> bool {
        self.user_info().map(|s| s.is_admin()).unwrap_or(false)
    }

    pub fn is_super_admin(&self) -> bool {
        self.user_info()
            .map(|s| s.role.is_super_admin())
            .unwrap_or(false)
    }

    pub fn user_info(&self) -> Option<Session> {
        self.sessions().load()
    }

    pub fn load_saved_credentials(&self) -> Option<SavedCredentials> {
        match self.credentials.load() {
            Ok(saved) => saved,
            Err(e) => {
                warn!(error = %e, "Failed to load saved credentials");
                None
            }
        }
    }

    pub fn require_login(&self) -> Navigation {
        if self.is_logged_in() {
            Navigation::Stay
        } else {
            Navigation::Login
        }
    }

    pub fn require_admin(&self) -> Navigation {
        match self.user_info() {
            None => Navigation::Login,
            Some(session) if session.is_admin() => Navigation::Stay,
            Some(_) => Navigation::Home {
                message: "You do not have permission to view this page".to_string(),
            },
        }
    }
}
