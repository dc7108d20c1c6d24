use anyhow::Result;
use chrono::NaiveDateTime;
use tracing::info;

use crate::api::{ApiClient, ApiError};
use crate::models::{EventDraft, ValidationError};
use crate::utils::{escape_html, parse_date};
use crate::views::{local_now, report_failure, Controller, Surface};

const EVENTS_PAGE: &str = "events.html";

pub enum EventFormAction {
    /// `allow_past` confirms that a new event may start in the past
    Submit { draft: EventDraft, allow_past: bool },
    Cancel,
}

/// Create a new event, or edit one when constructed with an id.
pub struct EventFormPage {
    api: ApiClient,
    now: NaiveDateTime,
    event_id: Option<String>,
    draft: EventDraft,
}

impl EventFormPage {
    pub fn new(api: ApiClient, event_id: Option<String>) -> Self {
        Self {
            api,
            now: local_now(),
            event_id: event_id.filter(|id| !id.trim().is_empty()),
            draft: EventDraft::default(),
        }
    }

    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }

    pub fn is_edit_mode(&self) -> bool {
        self.event_id.is_some()
    }

    /// The form's current contents: the loaded event, or blank for a new one
    pub fn draft(&self) -> &EventDraft {
        &self.draft
    }

    fn render(&self, surface: &mut dyn Surface) {
        let (title, button) = if self.is_edit_mode() {
            ("Edit event", "Update")
        } else {
            ("New event", "Create")
        };
        let d = &self.draft;
        surface.render(
            "eventForm",
            format!(
                r#"<h2 id="formTitle">{}</h2><form id="eventForm"><input id="eventName" value="{}"><textarea id="eventDescription">{}</textarea><input id="eventLocation" value="{}"><input type="date" id="eventDate" value="{}"><input type="time" id="eventTime" value="{}"><input id="deadline" value="{}"><input type="number" id="eventFee" value="{}"><button id="submitBtn" type="submit">{}</button></form>"#,
                title,
                escape_html(&d.title),
                escape_html(&d.description),
                escape_html(&d.location),
                escape_html(&d.date),
                escape_html(&d.start_time),
                escape_html(d.attendance_deadline.as_deref().unwrap_or_default()),
                if d.fee_amount > 0 { d.fee_amount.to_string() } else { String::new() },
                button
            ),
        );
    }

    async fn save(&self, draft: &EventDraft, allow_past: bool) -> Result<()> {
        draft.validate()?;
        match &self.event_id {
            Some(id) => {
                self.api.update_event(id, draft).await?;
                info!(event_id = %id, "Updated event");
            }
            None => {
                let starts_at = parse_date(&format!("{}T{}", draft.date.trim(), draft.start_time.trim()));
                if !allow_past && starts_at.is_some_and(|s| s < self.now) {
                    return Err(ValidationError::new("The event date is in the past").into());
                }
                self.api.create_event(draft).await?;
                info!(title = %draft.title, "Created event");
            }
        }
        Ok(())
    }
}

impl Controller for EventFormPage {
    type Action = EventFormAction;

    async fn load(&mut self, surface: &mut dyn Surface) {
        if let Some(id) = &self.event_id {
            match self.api.get_event(id).await {
                Ok(detail) => self.draft = EventDraft::from_event(&detail.event),
                Err(e) => {
                    report_failure(surface, "Failed to load the event", &e);
                    if !ApiError::is_unauthorized(&e) {
                        surface.redirect(EVENTS_PAGE);
                    }
                    return;
                }
            }
        }
        self.render(surface);
    }

    async fn dispatch(&mut self, action: EventFormAction, surface: &mut dyn Surface) {
        match action {
            EventFormAction::Submit { draft, allow_past } => {
                let draft = EventDraft {
                    title: draft.title.trim().to_string(),
                    description: draft.description.trim().to_string(),
                    location: draft.location.trim().to_string(),
                    ..draft
                };
                match self.save(&draft, allow_past).await {
                    Ok(()) => {
                        surface.alert(if self.is_edit_mode() {
                            "Event updated"
                        } else {
                            "Event created"
                        });
                        surface.redirect(EVENTS_PAGE);
                    }
                    Err(e) => {
                        self.draft = draft;
                        report_failure(surface, "Failed to save the event", &e);
                    }
                }
            }
            EventFormAction::Cancel => surface.redirect(EVENTS_PAGE),
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
            "getEvent" => json!({"success": true, "data": {
                "id": "E1", "title": "Camp", "date": "2024-08-10T09:00:00",
                "location": "Lake", "fee_amount": 3000, "deadline": "2024-08-01T18:00"
            }}),
            _ => json!({"success": true}),
        }
    }

    fn draft(date: &str) -> EventDraft {
        EventDraft {
            title: "  Hike ".into(),
            date: date.into(),
            start_time: "10:00".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_edit_mode_fills_and_updates() {
        let (url, recorded) = mock_backend(backend).await;
        let (_, api) = logged_in_client(&url);
        let mut form = EventFormPage::new(api, Some("E1".into()));
        let mut page = Page::new();

        form.load(&mut page).await;
        assert!(form.is_edit_mode());
        assert_eq!(form.draft().start_time, "09:00");
        let html = page.container("eventForm").unwrap();
        assert!(html.contains("Edit event") && html.contains(r#"value="Lake""#));

        let mut edited = form.draft().clone();
        edited.fee_amount = 3500;
        form.dispatch(
            EventFormAction::Submit { draft: edited, allow_past: false },
            &mut page,
        )
        .await;
        let body = recorded.last_body.lock().unwrap().clone().unwrap();
        assert_eq!(body["action"], "updateEvent");
        assert_eq!(body["eventId"], "E1");
        assert_eq!(body["fee_amount"], 3500);
        assert_eq!(page.last_alert(), Some("Event updated"));
        assert_eq!(page.last_redirect(), Some(EVENTS_PAGE));
    }

    #[tokio::test]
    async fn test_create_checks_past_dates() {
        let (url, recorded) = mock_backend(backend).await;
        let (_, api) = logged_in_client(&url);
        let mut form = EventFormPage::new(api, None).with_now(at("2024-06-01T12:00:00"));
        let mut page = Page::new();

        form.load(&mut page).await;
        assert!(page.container("eventForm").unwrap().contains("New event"));

        form.dispatch(
            EventFormAction::Submit { draft: draft("2024-05-01"), allow_past: false },
            &mut page,
        )
        .await;
        assert_eq!(page.last_alert(), Some("The event date is in the past"));
        assert_eq!(recorded.hits.load(Ordering::SeqCst), 0);

        form.dispatch(
            EventFormAction::Submit { draft: draft("2024-05-01"), allow_past: true },
            &mut page,
        )
        .await;
        let body = recorded.last_body.lock().unwrap().clone().unwrap();
        assert_eq!(body["action"], "createEvent");
        assert_eq!(body["title"], "Hike");
        assert_eq!(page.last_alert(), Some("Event created"));
    }

    #[tokio::test]
    async fn test_invalid_draft_is_kept() {
        let (url, recorded) = mock_backend(backend).await;
        let (_, api) = logged_in_client(&url);
        let mut form = EventFormPage::new(api, None);
        let mut page = Page::new();

        let mut bad = draft("2024-09-01");
        bad.attendance_deadline = Some("2024-09-02T10:00".into());
        form.dispatch(EventFormAction::Submit { draft: bad, allow_past: true }, &mut page)
            .await;
        assert_eq!(
            page.last_alert(),
            Some("The deadline must be before the event starts")
        );
        assert_eq!(form.draft().title, "Hike");
        assert!(page.redirects.is_empty());
        assert_eq!(recorded.hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_load_failure_returns_to_list() {
        let (url, _) = mock_backend(|_| json!({"success": false, "error": "Event not found"})).await;
        let (_, api) = logged_in_client(&url);
        let mut form = EventFormPage::new(api, Some("E9".into()));
        let mut page = Page::new();

        form.load(&mut page).await;
        assert_eq!(page.last_alert(), Some("Failed to load the event: Event not found"));
        assert_eq!(page.last_redirect(), Some(EVENTS_PAGE));
    }
}
