use serde::{Deserialize, Serialize};

use super::de;
use super::payment::PaymentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AttendanceStatus {
    Attend,
    Absent,
    Pending,
    /// No answer yet
    None,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 4] = [
        AttendanceStatus::Attend,
        AttendanceStatus::Absent,
        AttendanceStatus::Pending,
        AttendanceStatus::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Attend => "attend",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Pending => "pending",
            AttendanceStatus::None => "none",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AttendanceStatus::Attend => "Attending",
            AttendanceStatus::Absent => "Absent",
            AttendanceStatus::Pending => "Undecided",
            AttendanceStatus::None => "No response",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            AttendanceStatus::Attend => "✓",
            AttendanceStatus::Absent => "✗",
            AttendanceStatus::Pending => "?",
            AttendanceStatus::None => "-",
        }
    }
}

impl From<String> for AttendanceStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or(AttendanceStatus::None)
    }
}

impl From<AttendanceStatus> for String {
    fn from(value: AttendanceStatus) -> Self {
        value.as_str().to_string()
    }
}

impl std::str::FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "attend" => Ok(AttendanceStatus::Attend),
            "absent" => Ok(AttendanceStatus::Absent),
            "pending" => Ok(AttendanceStatus::Pending),
            "none" | "" => Ok(AttendanceStatus::None),
            other => Err(format!("Unknown attendance status: {}", other)),
        }
    }
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Payment embedded in an attendance row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentSummary {
    #[serde(default, deserialize_with = "de::string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<PaymentStatus>,
    #[serde(default, deserialize_with = "de::amount")]
    pub amount: i64,
    #[serde(rename = "paidAt")]
    pub paid_at: Option<String>,
}

impl PaymentSummary {
    pub fn status(&self) -> PaymentStatus {
        self.status.unwrap_or(PaymentStatus::Pending)
    }
}

/// One row of the member's own attendance history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(rename = "eventId", default, deserialize_with = "de::string_or_number")]
    pub event_id: Option<String>,
    #[serde(rename = "eventName", default, deserialize_with = "de::text")]
    pub event_name: String,
    #[serde(rename = "eventDate", default, deserialize_with = "de::text")]
    pub event_date: String,
    #[serde(rename = "eventLocation")]
    pub event_location: Option<String>,
    #[serde(default)]
    pub status: Option<AttendanceStatus>,
    pub notes: Option<String>,
    pub payment: Option<PaymentSummary>,
}

impl AttendanceRecord {
    pub fn status(&self) -> AttendanceStatus {
        self.status.unwrap_or(AttendanceStatus::None)
    }
}

/// One member's row on an event roster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Attendance {
    #[serde(default, deserialize_with = "de::string_or_number")]
    pub id: Option<String>,
    #[serde(rename = "memberId", default, deserialize_with = "de::string_or_number")]
    pub member_id: Option<String>,
    #[serde(rename = "memberName", default, deserialize_with = "de::text")]
    pub member_name: String,
    #[serde(default, deserialize_with = "de::string_or_number")]
    pub grade: Option<String>,
    #[serde(rename = "studentNumber", default, deserialize_with = "de::string_or_number")]
    pub student_number: Option<String>,
    #[serde(default)]
    pub status: Option<AttendanceStatus>,
    pub notes: Option<String>,
    #[serde(rename = "checkedInAt")]
    pub checked_in_at: Option<String>,
    pub payment: Option<PaymentSummary>,
}

impl Attendance {
    pub fn status(&self) -> AttendanceStatus {
        self.status.unwrap_or(AttendanceStatus::None)
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment
            .as_ref()
            .map(PaymentSummary::status)
            .unwrap_or(PaymentStatus::Pending)
    }

    pub fn is_paid(&self) -> bool {
        matches!(self.payment_status(), PaymentStatus::Paid | PaymentStatus::Confirmed)
            && self.payment.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Checkin {
    #[serde(rename = "memberId", default, deserialize_with = "de::text")]
    pub member_id: String,
    #[serde(rename = "memberName", default, deserialize_with = "de::text")]
    pub member_name: String,
    #[serde(rename = "checkedInAt", default, deserialize_with = "de::text")]
    pub checked_in_at: String,
    #[serde(rename = "paymentConfirmed", default, deserialize_with = "de::flag")]
    pub payment_confirmed: bool,
}

/// Response to a check-in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckinResult {
    #[serde(rename = "memberId", default, deserialize_with = "de::text")]
    pub member_id: String,
    #[serde(rename = "memberName", alias = "userName", default, deserialize_with = "de::text")]
    pub member_name: String,
    /// Set when the member pays on site and the fee is still open
    #[serde(rename = "requiresPayment", default, deserialize_with = "de::flag")]
    pub requires_payment: bool,
    #[serde(default, deserialize_with = "de::amount")]
    pub amount: i64,
}
