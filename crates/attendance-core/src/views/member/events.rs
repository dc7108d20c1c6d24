use chrono::{Datelike, NaiveDateTime};

use super::deadline_warning;
use crate::api::ApiClient;
use crate::models::{AttendanceStatus, Event};
use crate::utils::{contains_ignore_case, escape_html, format_currency, truncate};
use crate::views::{attendance_badge, local_now, no_data, report_failure, Controller, Surface};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventsFilter {
    #[default]
    Upcoming,
    Past,
    All,
}

impl std::str::FromStr for EventsFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(EventsFilter::Upcoming),
            "past" => Ok(EventsFilter::Past),
            "all" => Ok(EventsFilter::All),
            other => Err(format!("Unknown tab: {}", other)),
        }
    }
}

pub enum EventsAction {
    SetFilter(EventsFilter),
    Search(String),
    Refresh,
}

/// The member's event list with tabs and a search box.
pub struct EventsPage {
    api: ApiClient,
    now: NaiveDateTime,
    events: Vec<Event>,
    filter: EventsFilter,
    search_query: String,
}

impl EventsPage {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            now: local_now(),
            events: Vec::new(),
            filter: EventsFilter::default(),
            search_query: String::new(),
        }
    }

    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }

    fn matches_search(event: &Event, query: &str) -> bool {
        contains_ignore_case(event.title(), query)
            || event
                .description
                .as_deref()
                .is_some_and(|d| contains_ignore_case(d, query))
            || event
                .location
                .as_deref()
                .is_some_and(|l| contains_ignore_case(l, query))
    }

    /// Events for the current tab and search. Past events newest first,
    /// otherwise soonest first.
    pub fn get_filtered_events(&self) -> Vec<&Event> {
        let mut filtered: Vec<&Event> = self
            .events
            .iter()
            .filter(|e| match self.filter {
                EventsFilter::Upcoming => e.is_upcoming(self.now),
                EventsFilter::Past => !e.is_upcoming(self.now),
                EventsFilter::All => true,
            })
            .collect();

        if !self.search_query.is_empty() {
            let query = self.search_query.to_lowercase();
            filtered.retain(|e| Self::matches_search(e, &query));
        }

        filtered.sort_by(|a, b| {
            let cmp = a.starts_at().cmp(&b.starts_at());
            if self.filter == EventsFilter::Past {
                cmp.reverse()
            } else {
                cmp
            }
        });
        filtered
    }

    fn event_card(&self, event: &Event) -> String {
        let is_past = !event.is_upcoming(self.now);
        let date = match event.starts_at() {
            Some(start) => format!(
                r#"<div class="date-day">{}</div><div class="date-month">{:02}</div><div class="date-year">{}</div>"#,
                start.day(),
                start.month(),
                start.year()
            ),
            None => r#"<div class="date-day">?</div>"#.to_string(),
        };
        let warning = if is_past {
            String::new()
        } else {
            deadline_warning(event.deadline.as_deref(), self.now)
        };
        let fee = if event.has_fee() {
            format!(r#"<div class="event-fee">💰 {}</div>"#, format_currency(event.fee_amount))
        } else {
            String::new()
        };
        let description = event
            .description
            .as_deref()
            .filter(|d| !d.is_empty())
            .map(|d| {
                format!(
                    r#"<p class="event-description">{}</p>"#,
                    escape_html(&truncate(d, 100))
                )
            })
            .unwrap_or_default();
        let status = event
            .attendance
            .as_ref()
            .map(|a| a.status())
            .unwrap_or(AttendanceStatus::None);
        let stats = event
            .stats
            .as_ref()
            .map(|s| {
                format!(
                    r#"<div class="event-stats-mini">Attending: {}/{}</div>"#,
                    s.attend_count, s.total_members
                )
            })
            .unwrap_or_default();

        format!(
            r#"<a class="event-card" href="event-detail.html?id={id}"><div class="event-card-header"><div class="event-date {when}">{date}</div><div class="event-info"><h3 class="event-name">{title}</h3><div class="event-meta"><span class="event-time">⏰ {time}</span><span class="event-location">📍 {location}</span></div>{fee}</div></div>{warning}<div class="event-card-body">{description}</div><div class="event-card-footer"><div class="attendance-status"><span class="status-label">Your answer:</span>{status}</div>{stats}</div></a>"#,
            id = escape_html(event.id()),
            when = if is_past { "past" } else { "upcoming" },
            date = date,
            title = escape_html(event.title()),
            time = event.time_range(),
            location = escape_html(event.location.as_deref().unwrap_or("TBD")),
            fee = fee,
            warning = warning,
            description = description,
            status = attendance_badge(status),
            stats = stats,
        )
    }

    fn render(&self, surface: &mut dyn Surface) {
        let events = self.get_filtered_events();
        let html = if events.is_empty() {
            no_data("No events")
        } else {
            events.iter().map(|e| self.event_card(e)).collect()
        };
        surface.render("eventsList", html);
    }

    async fn reload(&mut self, surface: &mut dyn Surface) {
        match self.api.get_events(None).await {
            Ok(events) => {
                self.events = events;
                self.render(surface);
            }
            Err(e) => report_failure(surface, "Failed to load events", &e),
        }
    }
}

impl Controller for EventsPage {
    type Action = EventsAction;

    async fn load(&mut self, surface: &mut dyn Surface) {
        self.reload(surface).await;
    }

    async fn dispatch(&mut self, action: EventsAction, surface: &mut dyn Surface) {
        match action {
            EventsAction::SetFilter(filter) => {
                self.filter = filter;
                self.render(surface);
            }
            EventsAction::Search(query) => {
                self.search_query = query;
                self.render(surface);
            }
            EventsAction::Refresh => {
                self.api.clear_all_cache();
                self.reload(surface).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use serde_json::json;

    use super::*;
    use crate::api::client::tests::{logged_in_client, mock_backend};
    use crate::views::tests::at;
    use crate::views::Page;

    fn listing(_: &str) -> serde_json::Value {
        json!({"success": true, "data": [
            {"event_id": "E1", "title": "Summer Camp", "date": "2024-07-20", "location": "Lake"},
            {"event_id": "E2", "title": "Meeting", "date": "2024-06-10", "description": "Camp planning"},
            {"event_id": "E3", "title": "Spring Hike", "date": "2024-04-01"},
            {"event_id": "E4", "title": "Winter Party", "date": "2024-01-15", "location": "Camp hall",
             "attendance": {"status": "attend"}}
        ]})
    }

    fn ids(page: &EventsPage) -> Vec<&str> {
        page.get_filtered_events().iter().map(|e| e.id()).collect()
    }

    #[tokio::test]
    async fn test_tabs_and_ordering() {
        let (url, _) = mock_backend(listing).await;
        let (_, api) = logged_in_client(&url);
        let mut events = EventsPage::new(api).with_now(at("2024-06-01T09:00:00"));
        let mut page = Page::new();

        events.load(&mut page).await;
        assert_eq!(ids(&events), vec!["E2", "E1"]);

        events.dispatch(EventsAction::SetFilter(EventsFilter::Past), &mut page).await;
        assert_eq!(ids(&events), vec!["E3", "E4"]);

        events.dispatch(EventsAction::SetFilter(EventsFilter::All), &mut page).await;
        assert_eq!(ids(&events), vec!["E4", "E3", "E2", "E1"]);
    }

    #[tokio::test]
    async fn test_search_covers_description_and_location() {
        let (url, _) = mock_backend(listing).await;
        let (_, api) = logged_in_client(&url);
        let mut events = EventsPage::new(api).with_now(at("2024-06-01T09:00:00"));
        let mut page = Page::new();

        events.load(&mut page).await;
        events.dispatch(EventsAction::SetFilter(EventsFilter::All), &mut page).await;
        events.dispatch(EventsAction::Search("CAMP".into()), &mut page).await;
        assert_eq!(ids(&events), vec!["E4", "E2", "E1"]);

        // Same filter twice gives the same result
        let first = page.container("eventsList").unwrap().to_string();
        events.dispatch(EventsAction::Search("CAMP".into()), &mut page).await;
        assert_eq!(page.container("eventsList").unwrap(), first);
        assert!(first.contains("status-attend"));

        events.dispatch(EventsAction::Search("nothing".into()), &mut page).await;
        assert!(page.container("eventsList").unwrap().contains("No events"));
    }

    #[tokio::test]
    async fn test_refresh_bypasses_cache() {
        let (url, recorded) = mock_backend(listing).await;
        let (_, api) = logged_in_client(&url);
        let mut events = EventsPage::new(api);
        let mut page = Page::new();

        events.load(&mut page).await;
        events.load(&mut page).await;
        assert_eq!(recorded.hits.load(Ordering::SeqCst), 1);

        events.dispatch(EventsAction::Refresh, &mut page).await;
        assert_eq!(recorded.hits.load(Ordering::SeqCst), 2);
    }
}
