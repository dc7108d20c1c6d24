use anyhow::Result;
use chrono::{Months, NaiveDateTime, NaiveTime};
use tracing::debug;

use super::{date_badge, deadline_warning, own_status_badge};
use crate::api::ApiClient;
use crate::models::Event;
use crate::utils::{escape_html, format_currency, format_date_slash, parse_date};
use crate::views::{local_now, no_data, report_failure, Controller, Surface};

pub enum HomeAction {
    Refresh,
}

/// Landing page: events still waiting for an answer, then what is coming up.
pub struct HomePage {
    api: ApiClient,
    now: NaiveDateTime,
    pending: Vec<Event>,
    upcoming: Vec<Event>,
}

impl HomePage {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            now: local_now(),
            pending: Vec::new(),
            upcoming: Vec::new(),
        }
    }

    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }

    /// Unanswered events with an open deadline within a month, nearest deadline first
    pub fn pending_events(&self) -> &[Event] {
        &self.pending
    }

    /// Events in the next two months, soonest first
    pub fn upcoming_events(&self) -> &[Event] {
        &self.upcoming
    }

    async fn fetch(&mut self) -> Result<()> {
        let member_id = self
            .api
            .sessions()
            .load()
            .and_then(|session| session.member_id);
        let events = self.api.get_events(member_id.as_deref()).await?;
        self.split(events);
        Ok(())
    }

    fn split(&mut self, events: Vec<Event>) {
        let now = self.now;
        // Events later today still count as upcoming
        let today = now.date().and_time(NaiveTime::MIN);
        let one_month = now.checked_add_months(Months::new(1)).unwrap_or(now);
        let two_months = now.checked_add_months(Months::new(2)).unwrap_or(now);

        let mut future: Vec<(NaiveDateTime, Event)> = events
            .into_iter()
            .filter_map(|event| event.starts_at().map(|start| (start, event)))
            .filter(|(start, _)| *start >= today)
            .collect();
        future.sort_by_key(|(start, _)| *start);

        let mut pending: Vec<(NaiveDateTime, Event)> = future
            .iter()
            .filter(|(start, event)| {
                event.my_attendance_status.as_deref().unwrap_or("").is_empty()
                    && *start <= one_month
            })
            .filter_map(|(_, event)| {
                let deadline = parse_date(event.attendance_deadline.as_deref()?)?;
                (deadline >= now).then(|| (deadline, event.clone()))
            })
            .collect();
        pending.sort_by_key(|(deadline, _)| *deadline);

        debug!(
            future = future.len(),
            pending = pending.len(),
            "Sorted home events"
        );
        self.pending = pending.into_iter().map(|(_, event)| event).collect();
        self.upcoming = future
            .into_iter()
            .filter(|(start, _)| *start <= two_months)
            .map(|(_, event)| event)
            .collect();
    }

    fn event_card(&self, event: &Event) -> String {
        let answered = !event.my_attendance_status.as_deref().unwrap_or("").is_empty();
        let warning = if answered {
            String::new()
        } else {
            deadline_warning(event.attendance_deadline.as_deref(), self.now)
        };

        let mut meta = vec![format!(r#"<span class="event-time">⏰ {}</span>"#, event.time_range())];
        if let Some(location) = event.location.as_deref().filter(|l| !l.is_empty()) {
            meta.push(format!(
                r#"<span class="event-location">📍 {}</span>"#,
                escape_html(location)
            ));
        }
        if event.has_fee() {
            meta.push(format!(
                r#"<span class="event-fee">💰 Fee: {}</span>"#,
                format_currency(event.fee_amount)
            ));
        }
        if let Some(deadline) = event.attendance_deadline.as_deref() {
            meta.push(format!(
                r#"<span class="event-deadline">Answer by {}</span>"#,
                format_date_slash(deadline)
            ));
        }
        if let Some(fee_date) = event.cancellation_fee_date.as_deref() {
            meta.push(format!(
                r#"<span class="event-cancellation">Cancellation fee from {}</span>"#,
                cancellation_text(fee_date, &event.date)
            ));
        }

        let counts: String = [
            ("attend", "✓", event.attend_count),
            ("absent", "✗", event.absent_count),
            ("pending", "?", event.pending_count),
        ]
        .iter()
        .filter_map(|(class, icon, count)| {
            count.map(|n| format!(r#"<span class="count-{}">{} {}</span>"#, class, icon, n))
        })
        .collect();

        format!(
            r#"<a class="event-card-compact" href="event-detail.html?id={id}">{badge}<div class="event-content"><div class="event-header"><h4 class="event-name">{title}</h4>{warning}</div><div class="event-meta">{meta}</div><div class="event-participation-summary">{counts}</div><div class="event-status">{status}</div></div></a>"#,
            id = escape_html(event.id()),
            badge = date_badge(event, self.now),
            title = escape_html(event.title()),
            warning = warning,
            meta = meta.join(""),
            counts = counts,
            status = own_status_badge(event),
        )
    }

    fn quick_actions(&self) -> String {
        let unanswered = self
            .upcoming
            .iter()
            .filter(|e| e.my_attendance_status.as_deref().unwrap_or("").is_empty())
            .count();
        [
            ("events.html", "Events", "See what is coming up", unanswered),
            ("history.html", "History", "Your past attendance", 0),
            ("receipts.html", "Payments", "Fees and receipts", 0),
            ("profile.html", "Profile", "Your details", 0),
        ]
        .iter()
        .map(|(link, title, description, badge)| {
            let badge = if *badge > 0 {
                format!(r#"<span class="action-badge">{}</span>"#, badge)
            } else {
                String::new()
            };
            format!(
                r#"<a href="{}" class="action-card"><h4 class="action-title">{}{}</h4><p class="action-description">{}</p></a>"#,
                link, title, badge, description
            )
        })
        .collect()
    }

    fn render(&self, surface: &mut dyn Surface) {
        let pending: String = self.pending.iter().map(|e| self.event_card(e)).collect();
        surface.render("pendingEvents", pending);

        let upcoming = if self.upcoming.is_empty() {
            no_data("No upcoming events")
        } else {
            self.upcoming.iter().map(|e| self.event_card(e)).collect()
        };
        surface.render("upcomingEvents", upcoming);
        surface.render("quickActions", self.quick_actions());
    }
}

/// `6/1 (3 days before)`, `6/1 (same day)`, or just `6/1`
fn cancellation_text(fee_date: &str, event_date: &str) -> String {
    let (Some(fee), Some(event)) = (parse_date(fee_date), parse_date(event_date)) else {
        return fee_date.to_string();
    };
    let short = fee.format("%-m/%-d").to_string();
    match (event.date() - fee.date()).num_days() {
        0 => format!("{} (same day)", short),
        n if n > 0 => format!("{} ({} days before)", short, n),
        _ => short,
    }
}

impl Controller for HomePage {
    type Action = HomeAction;

    async fn load(&mut self, surface: &mut dyn Surface) {
        match self.fetch().await {
            Ok(()) => self.render(surface),
            Err(e) => report_failure(surface, "Failed to load events", &e),
        }
    }

    async fn dispatch(&mut self, action: HomeAction, surface: &mut dyn Surface) {
        match action {
            HomeAction::Refresh => {
                self.api.clear_all_cache();
                match self.fetch().await {
                    Ok(()) => {
                        self.render(surface);
                        surface.alert("Updated");
                    }
                    Err(e) => report_failure(surface, "Failed to load events", &e),
                }
            }
        }
    }
}
