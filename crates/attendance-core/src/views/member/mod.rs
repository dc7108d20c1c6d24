//! Pages for signed-in members.

pub mod event_detail;
pub mod events;
pub mod history;
pub mod home;
pub mod profile;
pub mod receipts;

pub use event_detail::{EventDetailAction, EventDetailPage};
pub use events::{EventsAction, EventsFilter, EventsPage};
pub use history::{HistoryAction, HistoryPage};
pub use home::{HomeAction, HomePage};
pub use profile::{ProfileAction, ProfilePage};
pub use receipts::{ReceiptsAction, ReceiptsPage};

use chrono::{Datelike, NaiveDateTime};

use crate::models::{AttendanceStatus, Event};
use crate::utils::{days_until, escape_html};

/// `Today`, `Tomorrow`, `In N days` within a week, otherwise nothing
fn relative_day(event: &Event, now: NaiveDateTime) -> Option<String> {
    match days_until(&event.date, now)? {
        0 => Some("Today".to_string()),
        1 => Some("Tomorrow".to_string()),
        n @ 2..=7 => Some(format!("In {} days", n)),
        _ => None,
    }
}

/// Warning for an unanswered event whose deadline is near or gone.
fn deadline_warning(deadline: Option<&str>, now: NaiveDateTime) -> String {
    match deadline.and_then(|d| days_until(d, now)) {
        Some(days @ 0..=3) => format!(
            r#"<span class="deadline-badge urgent">{} day(s) left to answer</span>"#,
            days
        ),
        Some(days) if days < 0 => {
            r#"<span class="deadline-badge expired">Deadline passed</span>"#.to_string()
        }
        _ => String::new(),
    }
}

/// The member's own answer as listed on an event card.
///
/// Option-style events (type `B`) store the chosen option verbatim; anything
/// other than an absence counts as attending there.
fn own_status_badge(event: &Event) -> String {
    let raw = event
        .my_attendance_status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let Some(raw) = raw else {
        return r#"<span class="status-badge status-none">Not answered</span>"#.to_string();
    };
    let status: AttendanceStatus = raw.parse().unwrap_or(AttendanceStatus::None);
    let class = match status {
        AttendanceStatus::Absent => "absent",
        AttendanceStatus::Attend => "attend",
        _ if event.attendance_type.as_deref() == Some("B") => "attend",
        _ => "none",
    };
    let label = match status {
        AttendanceStatus::None => escape_html(raw),
        known => known.label().to_string(),
    };
    format!(r#"<span class="status-badge status-{}">{}</span>"#, class, label)
}

fn date_badge(event: &Event, now: NaiveDateTime) -> String {
    match event.starts_at() {
        Some(start) => format!(
            r#"<div class="event-date-badge month-{month}"><div class="date-day">{day}</div><div class="date-month">{month:02}</div>{relative}</div>"#,
            month = start.month(),
            day = start.day(),
            relative = relative_day(event, now)
                .map(|r| format!(r#"<div class="date-relative">{}</div>"#, r))
                .unwrap_or_default(),
        ),
        None => r#"<div class="event-date-badge"><div class="date-day">?</div></div>"#.to_string(),
    }
}
