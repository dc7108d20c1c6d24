//! Authentication: the login session and remembered credentials.
//!
//! - `SessionStore`: token, role and user fields in the shared store, with expiry
//! - `CredentialStore`: remembered login id, password kept in the OS keychain
//! - `Auth`: login/logout against the API plus page guards

pub mod credentials;
pub mod login;
pub mod session;

pub use credentials::{CredentialStore, KeyringVault, MemoryVault, SavedCredentials, SecretVault};
pub use login::{Auth, Navigation, HOME_PAGE, LOGIN_PAGE};
pub use session::{Session, SessionStore};
