use anyhow::{anyhow, Result};
use chrono::{Datelike, NaiveDateTime};
use tracing::info;

use crate::api::ApiClient;
use crate::models::{Event, EventDraft};
use crate::utils::{cmp_ignore_case, contains_ignore_case, escape_html, format_currency};
use crate::views::{local_now, no_data, report_failure, Controller, Surface};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventStatusFilter {
    #[default]
    All,
    Upcoming,
    Past,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventSort {
    #[default]
    DateDesc,
    DateAsc,
    NameAsc,
    NameDesc,
}

impl std::str::FromStr for EventSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date_desc" => Ok(EventSort::DateDesc),
            "date_asc" => Ok(EventSort::DateAsc),
            "name_asc" => Ok(EventSort::NameAsc),
            "name_desc" => Ok(EventSort::NameDesc),
            other => Err(format!("Unknown sort: {}", other)),
        }
    }
}

impl std::str::FromStr for EventStatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(EventStatusFilter::All),
            "upcoming" => Ok(EventStatusFilter::Upcoming),
            "past" => Ok(EventStatusFilter::Past),
            other => Err(format!("Unknown status filter: {}", other)),
        }
    }
}

pub enum AdminEventsAction {
    SetStatus(EventStatusFilter),
    Search(String),
    SetSort(EventSort),
    Edit(String),
    ViewAttendances(String),
    Duplicate(String),
    Delete(String),
}

/// Every event, with per-event attendance and revenue.
pub struct AdminEventsPage {
    api: ApiClient,
    now: NaiveDateTime,
    events: Vec<Event>,
    status: EventStatusFilter,
    sort: EventSort,
    search_query: String,
}

impl AdminEventsPage {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            now: local_now(),
            events: Vec::new(),
            status: EventStatusFilter::default(),
            sort: EventSort::default(),
            search_query: String::new(),
        }
    }

    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }

    pub fn get_sorted_events(&self) -> Vec<&Event> {
        let mut sorted: Vec<&Event> = self
            .events
            .iter()
            .filter(|e| match self.status {
                EventStatusFilter::All => true,
                EventStatusFilter::Upcoming => e.is_upcoming(self.now),
                EventStatusFilter::Past => !e.is_upcoming(self.now),
            })
            .collect();

        if !self.search_query.is_empty() {
            let query = self.search_query.to_lowercase();
            sorted.retain(|e| {
                contains_ignore_case(e.title(), &query)
                    || e.description
                        .as_deref()
                        .is_some_and(|d| contains_ignore_case(d, &query))
            });
        }

        sorted.sort_by(|a, b| match self.sort {
            EventSort::DateDesc => b.starts_at().cmp(&a.starts_at()),
            EventSort::DateAsc => a.starts_at().cmp(&b.starts_at()),
            EventSort::NameAsc => cmp_ignore_case(a.title(), b.title()),
            EventSort::NameDesc => cmp_ignore_case(b.title(), a.title()),
        });
        sorted
    }

    fn event_card(&self, event: &Event) -> String {
        let is_past = !event.is_upcoming(self.now);
        let (day, month) = event
            .starts_at()
            .map(|d| (d.day().to_string(), format!("{:02}", d.month())))
            .unwrap_or_default();
        let fee = if event.has_fee() {
            format!(r#"<span class="event-fee">💰 {}</span>"#, format_currency(event.fee_amount))
        } else {
            String::new()
        };
        let revenue = if event.has_fee() {
            format!(
                r#"<div class="stat-item"><div class="stat-label">Revenue</div><div class="stat-value">{}</div></div>"#,
                format_currency(event.paid_count.unwrap_or(0) * event.fee_amount)
            )
        } else {
            String::new()
        };
        let id = escape_html(event.id());

        format!(
            r#"<div class="event-card" data-event-id="{id}"><div class="event-card-header"><div class="event-date {when}"><div class="date-day">{day}</div><div class="date-month">{month}</div></div><div class="event-info"><h3 class="event-name">{title}</h3><div class="event-meta"><span class="event-time">⏰ {time}</span><span class="event-location">📍 {location}</span>{fee}</div></div></div><div class="event-card-body"><div class="event-stats"><div class="stat-item"><div class="stat-label">Attending</div><div class="stat-value">{attending}/{total}</div></div><div class="stat-item"><div class="stat-label">Rate</div><div class="stat-value">{rate:.1}%</div></div>{revenue}</div></div><div class="event-card-footer"><button data-action="edit" data-id="{id}">Edit</button><button data-action="attendances" data-id="{id}">Attendance</button><button data-action="duplicate" data-id="{id}">Duplicate</button><button class="btn-danger" data-action="delete" data-id="{id}">Delete</button></div></div>"#,
            id = id,
            when = if is_past { "past" } else { "upcoming" },
            day = day,
            month = month,
            title = escape_html(event.title()),
            time = event.time_range(),
            location = escape_html(event.location.as_deref().unwrap_or("TBD")),
            fee = fee,
            attending = event.attendance_count.unwrap_or(0),
            total = event.total_members.unwrap_or(0),
            rate = event.attendance_rate(),
            revenue = revenue,
        )
    }

    fn render(&self, surface: &mut dyn Surface) {
        let events = self.get_sorted_events();
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

    async fn duplicate(&self, event_id: &str) -> Result<()> {
        let event = self
            .events
            .iter()
            .find(|e| e.id() == event_id)
            .ok_or_else(|| anyhow!("Event {} was not found", event_id))?;
        let mut draft = EventDraft::from_event(event);
        draft.title = format!("{} (copy)", draft.title);
        self.api.create_event(&draft).await?;
        info!(event_id, "Duplicated event");
        Ok(())
    }
}

impl Controller for AdminEventsPage {
    type Action = AdminEventsAction;

    async fn load(&mut self, surface: &mut dyn Surface) {
        self.reload(surface).await;
    }

    async fn dispatch(&mut self, action: AdminEventsAction, surface: &mut dyn Surface) {
        match action {
            AdminEventsAction::SetStatus(status) => {
                self.status = status;
                self.render(surface);
            }
            AdminEventsAction::Search(query) => {
                self.search_query = query;
                self.render(surface);
            }
            AdminEventsAction::SetSort(sort) => {
                self.sort = sort;
                self.render(surface);
            }
            AdminEventsAction::Edit(id) => surface.redirect(&format!("event-form.html?id={}", id)),
            AdminEventsAction::ViewAttendances(id) => {
                surface.redirect(&format!("event-detail.html?id={}", id))
            }
            AdminEventsAction::Duplicate(id) => match self.duplicate(&id).await {
                Ok(()) => {
                    surface.alert("Event duplicated");
                    self.reload(surface).await;
                }
                Err(e) => report_failure(surface, "Failed to duplicate the event", &e),
            },
            AdminEventsAction::Delete(id) => match self.api.delete_event(&id).await {
                Ok(()) => {
                    info!(event_id = %id, "Deleted event");
                    surface.alert("Event deleted");
                    self.reload(surface).await;
                }
                Err(e) => report_failure(surface, "Failed to delete the event", &e),
            },
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

    fn backend(action: &str) -> serde_json::Value {
        match action {
            "getEvents" => json!({"success": true, "data": [
                {"id": "E1", "title": "beach cleanup", "date": "2024-07-01", "description": "Bring gloves"},
                {"id": "E2", "title": "Annual meeting", "date": "2024-05-01T19:00:00", "fee_amount": 1000,
                 "paidCount": 3, "attendanceCount": 4, "totalMembers": 8},
                {"id": "E3", "title": "Camp", "date": "2024-08-10", "start_time": "09:00"}
            ]}),
            _ => json!({"success": true}),
        }
    }

    fn ids(page: &AdminEventsPage) -> Vec<&str> {
        page.get_sorted_events().iter().map(|e| e.id()).collect()
    }

    #[tokio::test]
    async fn test_sorts_and_filters() {
        let (url, _) = mock_backend(backend).await;
        let (_, api) = logged_in_client(&url);
        let mut events = AdminEventsPage::new(api).with_now(at("2024-06-01T00:00:00"));
        let mut page = Page::new();
        events.load(&mut page).await;

        assert_eq!(ids(&events), vec!["E3", "E1", "E2"]);
        events.dispatch(AdminEventsAction::SetSort(EventSort::DateAsc), &mut page).await;
        assert_eq!(ids(&events), vec!["E2", "E1", "E3"]);
        events.dispatch(AdminEventsAction::SetSort(EventSort::NameAsc), &mut page).await;
        assert_eq!(ids(&events), vec!["E2", "E1", "E3"]);
        events.dispatch(AdminEventsAction::SetSort(EventSort::NameDesc), &mut page).await;
        assert_eq!(ids(&events), vec!["E3", "E1", "E2"]);

        events
            .dispatch(AdminEventsAction::SetStatus(EventStatusFilter::Upcoming), &mut page)
            .await;
        assert_eq!(ids(&events), vec!["E3", "E1"]);
        events.dispatch(AdminEventsAction::Search("GLOVES".into()), &mut page).await;
        assert_eq!(ids(&events), vec!["E1"]);

        events
            .dispatch(AdminEventsAction::SetStatus(EventStatusFilter::Past), &mut page)
            .await;
        assert!(page.container("eventsList").unwrap().contains("No events"));
    }

    #[tokio::test]
    async fn test_card_shows_rate_and_revenue() {
        let (url, _) = mock_backend(backend).await;
        let (_, api) = logged_in_client(&url);
        let mut events = AdminEventsPage::new(api).with_now(at("2024-06-01T00:00:00"));
        let mut page = Page::new();
        events.load(&mut page).await;

        let list = page.container("eventsList").unwrap();
        assert!(list.contains("4/8"));
        assert!(list.contains("50.0%"));
        assert!(list.contains("¥3,000"));
    }

    #[tokio::test]
    async fn test_duplicate_and_delete() {
        let (url, recorded) = mock_backend(backend).await;
        let (_, api) = logged_in_client(&url);
        let mut events = AdminEventsPage::new(api);
        let mut page = Page::new();
        events.load(&mut page).await;

        events
            .dispatch(AdminEventsAction::Duplicate("E3".into()), &mut page)
            .await;
        let body = recorded.last_body.lock().unwrap().clone().unwrap();
        assert_eq!(body["action"], "createEvent");
        assert_eq!(body["title"], "Camp (copy)");
        assert_eq!(body["start_time"], "09:00");

        events.dispatch(AdminEventsAction::Delete("E1".into()), &mut page).await;
        let body = recorded.last_body.lock().unwrap().clone().unwrap();
        assert_eq!(body["action"], "deleteEvent");
        assert_eq!(page.last_alert(), Some("Event deleted"));
        // load, duplicate + reload, delete + reload
        assert_eq!(recorded.hits.load(Ordering::SeqCst), 5);

        events.dispatch(AdminEventsAction::Duplicate("nope".into()), &mut page).await;
        assert!(page.last_alert().unwrap().contains("was not found"));
    }

    #[tokio::test]
    async fn test_navigation() {
        let (_, api) = logged_in_client("http://127.0.0.1:9/exec");
        let mut events = AdminEventsPage::new(api);
        let mut page = Page::new();
        events.dispatch(AdminEventsAction::Edit("E1".into()), &mut page).await;
        assert_eq!(page.last_redirect(), Some("event-form.html?id=E1"));
        events
            .dispatch(AdminEventsAction::ViewAttendances("E1".into()), &mut page)
            .await;
        assert_eq!(page.last_redirect(), Some("event-detail.html?id=E1"));
    }
}
