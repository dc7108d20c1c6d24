use std::sync::Arc;

use anyhow::{bail, Context, Result};
use attendance_core::auth::{CredentialStore, KeyringVault};
use attendance_core::{ApiClient, Auth, Config, FileStore, Navigation, SessionStore, SharedStore, TtlCache};
use tracing::debug;

/// Everything a command needs, wired from the saved config.
pub struct AppContext {
    pub config: Config,
    pub api: ApiClient,
    pub auth: Auth,
    pub cache: TtlCache,
}

impl AppContext {
    pub fn open(config: Config) -> Result<Self> {
        let cache_dir = config.cache_dir()?;
        let store: SharedStore = Arc::new(
            FileStore::open_with_quota(&cache_dir, config.storage_quota_bytes)
                .with_context(|| format!("Failed to open store in {}", cache_dir.display()))?,
        );
        debug!(dir = %cache_dir.display(), api = %config.api_url, "Opened local store");

        let sessions = SessionStore::with_timeout(store.clone(), config.session_timeout_ms);
        let cache = TtlCache::with_default_ttl(store.clone(), config.cache_ttl_ms);
        let api = ApiClient::new(&config.api_url, sessions)?.with_cache(cache.clone());
        let credentials = CredentialStore::new(store, Arc::new(KeyringVault));
        let auth = Auth::new(api.clone(), credentials);

        Ok(Self {
            config,
            api,
            auth,
            cache,
        })
    }

    pub fn require_login(&self) -> Result<()> {
        guard(self.auth.require_login())
    }

    pub fn require_admin(&self) -> Result<()> {
        guard(self.auth.require_admin())
    }
}

fn guard(navigation: Navigation) -> Result<()> {
    match navigation {
        Navigation::Stay => Ok(()),
        Navigation::Login => bail!("Not signed in. Run `attendance login` first."),
        Navigation::Home { message } => bail!(message),
    }
}
