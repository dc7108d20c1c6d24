use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::attendance::Attendance;
use super::{de, ValidationError};
use crate::utils::{format_time, parse_date};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    // Member endpoints key events by `event_id`, admin endpoints by `id`
    #[serde(default, alias = "eventId", deserialize_with = "de::string_or_number")]
    pub event_id: Option<String>,
    #[serde(rename = "id", default, deserialize_with = "de::string_or_number")]
    pub row_id: Option<String>,
    pub title: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "de::text")]
    pub date: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub location: Option<String>,
    #[serde(default, deserialize_with = "de::amount")]
    pub fee_amount: i64,
    pub attendance_deadline: Option<String>,
    pub deadline: Option<String>,
    pub cancellation_fee_date: Option<String>,
    /// The caller's own answer, as returned by the events listing
    pub my_attendance_status: Option<String>,
    pub attendance_type: Option<String>,
    /// The caller's own attendance row, when embedded
    pub attendance: Option<Attendance>,
    pub stats: Option<EventStats>,
    #[serde(default, deserialize_with = "de::opt_amount")]
    pub attend_count: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_amount")]
    pub absent_count: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_amount")]
    pub pending_count: Option<i64>,
    #[serde(rename = "attendanceCount", default, deserialize_with = "de::opt_amount")]
    pub attendance_count: Option<i64>,
    #[serde(rename = "totalMembers", default, deserialize_with = "de::opt_amount")]
    pub total_members: Option<i64>,
    #[serde(rename = "paidCount", default, deserialize_with = "de::opt_amount")]
    pub paid_count: Option<i64>,
    #[serde(rename = "expectedAttendees", default, deserialize_with = "de::opt_amount")]
    pub expected_attendees: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventStats {
    #[serde(rename = "attendCount", default, deserialize_with = "de::amount")]
    pub attend_count: i64,
    #[serde(rename = "totalMembers", default, deserialize_with = "de::amount")]
    pub total_members: i64,
}

impl Event {
    pub fn id(&self) -> &str {
        self.event_id
            .as_deref()
            .or(self.row_id.as_deref())
            .unwrap_or_default()
    }

    pub fn title(&self) -> &str {
        self.title
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or_default()
    }

    pub fn starts_at(&self) -> Option<NaiveDateTime> {
        parse_date(&self.date)
    }

    /// `19:00 - 21:00`, `19:00`, or `TBD` when no start time is set
    pub fn time_range(&self) -> String {
        match (self.start_time.as_deref(), self.end_time.as_deref()) {
            (Some(start), Some(end)) if !start.is_empty() && !end.is_empty() => {
                format!("{} - {}", format_time(start), format_time(end))
            }
            (Some(start), _) if !start.is_empty() => format_time(start),
            _ => "TBD".to_string(),
        }
    }

    pub fn has_fee(&self) -> bool {
        self.fee_amount > 0
    }

    /// Whether the event starts at or after `now`. Undated events count as past.
    pub fn is_upcoming(&self, now: NaiveDateTime) -> bool {
        self.starts_at().map(|start| start >= now).unwrap_or(false)
    }

    /// Attendance rate in percent from the admin counters
    pub fn attendance_rate(&self) -> f64 {
        let total = self.total_members.unwrap_or(0);
        if total > 0 {
            self.attendance_count.unwrap_or(0) as f64 / total as f64 * 100.0
        } else {
            0.0
        }
    }
}

/// The member-facing detail payload: the event plus the caller's own row.
#[derive(Debug, Clone, Default)]
pub struct EventDetail {
    pub event: Event,
    pub attendance: Option<Attendance>,
}

impl EventDetail {
    /// Accepts both `{event, attendance}` and a bare event object.
    pub fn from_payload(payload: Value) -> serde_json::Result<Self> {
        match payload {
            Value::Object(mut map) if map.contains_key("event") => {
                let event = serde_json::from_value(map.remove("event").unwrap_or_default())?;
                let attendance = match map.remove("attendance") {
                    Some(Value::Null) | None => None,
                    Some(value) => Some(serde_json::from_value(value)?),
                };
                Ok(Self { event, attendance })
            }
            other => {
                let event: Event = serde_json::from_value(other)?;
                let attendance = event.attendance.clone();
                Ok(Self { event, attendance })
            }
        }
    }
}

/// Form data for creating or editing an event.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventDraft {
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub location: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub start_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    pub fee_amount: i64,
    /// `YYYY-MM-DDTHH:MM`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance_deadline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_fee_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_participants: Option<i64>,
}

impl EventDraft {
    /// Start with the fields of an existing event, for edits and copies.
    pub fn from_event(event: &Event) -> Self {
        let starts_at = event.starts_at();
        Self {
            title: event.title().to_string(),
            description: event.description.clone().unwrap_or_default(),
            location: event.location.clone().unwrap_or_default(),
            date: starts_at
                .map(|dt| dt.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            start_time: event
                .start_time
                .as_deref()
                .map(format_time)
                .or_else(|| starts_at.map(|dt| dt.format("%H:%M").to_string()))
                .unwrap_or_default(),
            end_time: event.end_time.as_deref().map(format_time),
            fee_amount: event.fee_amount,
            attendance_deadline: event
                .attendance_deadline
                .clone()
                .or_else(|| event.deadline.clone()),
            cancellation_fee_date: event.cancellation_fee_date.clone(),
            max_participants: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::new("Enter an event name"));
        }
        if self.date.trim().is_empty() {
            return Err(ValidationError::new("Choose the event date"));
        }
        if self.start_time.trim().is_empty() {
            return Err(ValidationError::new("Choose the start time"));
        }
        if self.fee_amount < 0 {
            return Err(ValidationError::new("The fee cannot be negative"));
        }
        let starts_at = parse_date(&format!("{}T{}", self.date.trim(), self.start_time.trim()))
            .ok_or_else(|| ValidationError::new("The event date or time is not valid"))?;
        if let Some(deadline) = self.attendance_deadline.as_deref().filter(|d| !d.is_empty()) {
            let deadline = parse_date(deadline)
                .ok_or_else(|| ValidationError::new("The deadline is not a valid date"))?;
            if deadline > starts_at {
                return Err(ValidationError::new(
                    "The deadline must be before the event starts",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_and_admin_shapes_parse() {
        let member: Event = serde_json::from_str(
            r#"{"event_id": "E1", "title": "Camp", "date": "2024-06-01", "fee_amount": "2,000", "my_attendance_status": "attend"}"#,
        )
        .unwrap();
        assert_eq!(member.id(), "E1");
        assert_eq!(member.title(), "Camp");
        assert_eq!(member.fee_amount, 2000);

        let admin: Event = serde_json::from_str(
            r#"{"id": 12, "name": "Hike", "date": "2024-06-02", "attendanceCount": 3, "totalMembers": 4}"#,
        )
        .unwrap();
        assert_eq!(admin.id(), "12");
        assert_eq!(admin.title(), "Hike");
        assert_eq!(admin.attendance_rate(), 75.0);
    }

    #[test]
    fn test_time_range() {
        let mut event = Event {
            start_time: Some("19:00:00".to_string()),
            end_time: Some("21:30:00".to_string()),
            ..Default::default()
        };
        assert_eq!(event.time_range(), "19:00 - 21:30");
        event.end_time = None;
        assert_eq!(event.time_range(), "19:00");
        event.start_time = None;
        assert_eq!(event.time_range(), "TBD");
    }

    #[test]
    fn test_detail_payload_variants() {
        let wrapped = serde_json::json!({
            "event": {"event_id": "E1", "title": "Camp", "date": "2024-06-01"},
            "attendance": {"status": "absent", "notes": "sick"}
        });
        let detail = EventDetail::from_payload(wrapped).unwrap();
        assert_eq!(detail.event.id(), "E1");
        assert_eq!(detail.attendance.unwrap().notes.as_deref(), Some("sick"));

        let bare = serde_json::json!({"id": "E2", "title": "Meetup", "date": "2024-06-01"});
        let detail = EventDetail::from_payload(bare).unwrap();
        assert_eq!(detail.event.id(), "E2");
        assert!(detail.attendance.is_none());
    }

    #[test]
    fn test_draft_validation() {
        let mut draft = EventDraft {
            title: "Camp".to_string(),
            date: "2024-06-01".to_string(),
            start_time: "10:00".to_string(),
            ..Default::default()
        };
        assert!(draft.validate().is_ok());

        draft.attendance_deadline = Some("2024-06-02T10:00".to_string());
        assert_eq!(
            draft.validate().unwrap_err().0,
            "The deadline must be before the event starts"
        );

        draft.attendance_deadline = Some("2024-05-29T18:00".to_string());
        assert!(draft.validate().is_ok());

        draft.start_time.clear();
        assert!(draft.validate().is_err());
    }

    #[test]
    fn test_draft_from_event_copies_fields() {
        let event: Event = serde_json::from_str(
            r#"{"id": "E1", "title": "Camp", "date": "2024-06-01T09:30:00", "fee_amount": 500, "deadline": "2024-05-25"}"#,
        )
        .unwrap();
        let draft = EventDraft::from_event(&event);
        assert_eq!(draft.date, "2024-06-01");
        assert_eq!(draft.start_time, "09:30");
        assert_eq!(draft.fee_amount, 500);
        assert_eq!(draft.attendance_deadline.as_deref(), Some("2024-05-25"));
    }
}
