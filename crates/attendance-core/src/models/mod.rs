//! Data models for portal entities.
//!
//! Every payload comes from a spreadsheet-backed API, so all fields are
//! tolerant of absence and mixed JSON types:
//!
//! - `Event`, `EventDraft`, `EventDetail`: events and the member's own response
//! - `AttendanceRecord`, `Attendance`, `Checkin`: attendance rows
//! - `Payment`, `Receipt`: fees and receipts
//! - `Member`, `Role`, `Masters`, `UserProfile`: people and lookup lists
//! - `DashboardStats`, `Analytics`, `Series`: aggregated admin data

pub mod analytics;
pub mod attendance;
pub(crate) mod de;
pub mod event;
pub mod member;
pub mod payment;

use thiserror::Error;

pub use analytics::{
    Analytics, AnalyticsPeriod, AnalyticsQuery, AnalyticsSummary, DashboardAlert, DashboardStats,
    MemberAnalytics, Series, Trend,
};
pub use attendance::{Attendance, AttendanceRecord, AttendanceStatus, Checkin, CheckinResult, PaymentSummary};
pub use event::{Event, EventDetail, EventDraft, EventStats};
pub use member::{
    validate_password_change, Masters, Member, MemberDraft, ProfileStats, ProfileUpdate, Role,
    UserProfile,
};
pub use payment::{Payment, PaymentMethod, PaymentStatus, Receipt};

/// A form that cannot be submitted. The message is shown to the user as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
