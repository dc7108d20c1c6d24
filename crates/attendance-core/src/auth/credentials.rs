use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use keyring::Entry;
use tracing::{debug, warn};

use crate::store::SharedStore;

const SERVICE_NAME: &str = "attendance-portal";

pub const SAVED_LOGIN_ID_KEY: &str = "saved_login_id";
pub const REMEMBER_ME_KEY: &str = "remember_me";
/// Older builds kept a Base64 password in the store; only ever removed now
pub const LEGACY_PASSWORD_KEY: &str = "saved_password";

/// Where remembered passwords live.
pub trait SecretVault: Send + Sync {
    fn set_secret(&self, account: &str, secret: &str) -> Result<()>;
    fn get_secret(&self, account: &str) -> Result<Option<String>>;
    fn delete_secret(&self, account: &str) -> Result<()>;
}

/// The OS keychain via `keyring`.
pub struct KeyringVault;

impl SecretVault for KeyringVault {
    fn set_secret(&self, account: &str, secret: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, account).context("Failed to create keyring entry")?;
        entry
            .set_password(secret)
            .context("Failed to store password in keychain")?;
        Ok(())
    }

    fn get_secret(&self, account: &str) -> Result<Option<String>> {
        let entry = Entry::new(SERVICE_NAME, account).context("Failed to create keyring entry")?;
        match entry.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(anyhow!(e).context("Failed to retrieve password from keychain")),
        }
    }

    fn delete_secret(&self, account: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, account).context("Failed to create keyring entry")?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow!(e).context("Failed to delete credential from keychain")),
        }
    }
}

/// Process-local vault for tests and machines without a keychain.
#[derive(Default)]
pub struct MemoryVault {
    secrets: Mutex<HashMap<String, String>>,
}

impl SecretVault for MemoryVault {
    fn set_secret(&self, account: &str, secret: &str) -> Result<()> {
        let mut secrets = self.secrets.lock().map_err(|_| anyhow!("Vault lock poisoned"))?;
        secrets.insert(account.to_string(), secret.to_string());
        Ok(())
    }

    fn get_secret(&self, account: &str) -> Result<Option<String>> {
        let secrets = self.secrets.lock().map_err(|_| anyhow!("Vault lock poisoned"))?;
        Ok(secrets.get(account).cloned())
    }

    fn delete_secret(&self, account: &str) -> Result<()> {
        let mut secrets = self.secrets.lock().map_err(|_| anyhow!("Vault lock poisoned"))?;
        secrets.remove(account);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedCredentials {
    pub login_id: String,
    pub password: String,
    pub remember_me: bool,
}

/// Remembered login: the id in the store, the password in the vault.
#[derive(Clone)]
pub struct CredentialStore {
    store: SharedStore,
    vault: Arc<dyn SecretVault>,
}

impl CredentialStore {
    pub fn new(store: SharedStore, vault: Arc<dyn SecretVault>) -> Self {
        Self { store, vault }
    }

    pub fn remember(&self, login_id: &str, password: &str) -> Result<()> {
        self.vault.set_secret(login_id, password)?;
        self.store.set_item(SAVED_LOGIN_ID_KEY, login_id)?;
        self.store.set_item(REMEMBER_ME_KEY, "true")?;
        self.store.remove_item(LEGACY_PASSWORD_KEY)?;
        debug!(login_id, "Saved login credentials");
        Ok(())
    }

    /// Drop any saved login. Vault failures are logged, not returned.
    pub fn forget(&self) -> Result<()> {
        if let Some(login_id) = self.store.get_item(SAVED_LOGIN_ID_KEY)? {
            if let Err(e) = self.vault.delete_secret(&login_id) {
                warn!(login_id, error = %e, "Failed to delete saved password");
            }
        }
        for key in [SAVED_LOGIN_ID_KEY, REMEMBER_ME_KEY, LEGACY_PASSWORD_KEY] {
            self.store.remove_item(key)?;
        }
        Ok(())
    }

    /// Saved credentials when "remember me" was set and the password is still in the vault.
    pub fn load(&self) -> Result<Option<SavedCredentials>> {
        let remember_me = self.store.get_item(REMEMBER_ME_KEY)?.as_deref() == Some("true");
        if !remember_me {
            return Ok(None);
        }
        let Some(login_id) = self.store.get_item(SAVED_LOGIN_ID_KEY)? else {
            return Ok(None);
        };
        let Some(password) = self.vault.get_secret(&login_id)? else {
            return Ok(None);
        };
        Ok(Some(SavedCredentials {
            login_id,
            password,
            remember_me,
        }))
    }

    pub fn has_credentials(&self) -> bool {
        matches!(self.load(), Ok(Some(_)))
    }
}
