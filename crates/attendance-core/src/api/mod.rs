//! Client for the portal's action-based backend API.
//!
//! One URL serves every action. Requests carry the session token both as a
//! parameter and as a bearer header; responses share the `ApiEnvelope` shape.

pub mod client;
pub mod envelope;
pub mod error;

pub use client::{ApiClient, LoginResult};
pub use envelope::ApiEnvelope;
pub use error::ApiError;
