//! Core library for the attendance portal.
//!
//! Member-facing and admin-facing pages share one backend API. This crate
//! holds everything the front ends need besides drawing:
//!
//! - `store`: namespaced key-value persistence with a byte quota
//! - `cache`: TTL cache on top of the store
//! - `auth`: session and remembered-login handling
//! - `api`: typed client for the backend's action-based API
//! - `models`: events, attendance, payments, receipts, members
//! - `views`: page controllers that filter, sort and render HTML fragments
//! - `export`: CSV downloads

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod export;
pub mod models;
pub mod store;
pub mod utils;
pub mod views;

pub use api::{ApiClient, ApiError};
pub use auth::{Auth, Navigation, Session, SessionStore};
pub use cache::TtlCache;
pub use config::Config;
pub use store::{FileStore, KeyValueStore, MemoryStore, SharedStore, StoreError};
