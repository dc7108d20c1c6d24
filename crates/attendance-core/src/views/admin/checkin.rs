use anyhow::Result;
use chrono::{NaiveDateTime, NaiveTime};
use tracing::info;

use crate::api::ApiClient;
use crate::models::{Checkin, CheckinResult, Event, ValidationError};
use crate::utils::{escape_html, format_currency, format_date, format_time, parse_date};
use crate::views::{local_now, no_data, rate, report_failure, Controller, Surface};

pub enum CheckinAction {
    /// `None` clears the selection
    SelectEvent(Option<String>),
    /// Manual entry or a scanned member code
    Checkin(String),
    /// Record the on-site payment for a member who was just checked in
    ConfirmPayment(String),
    SkipPayment,
    Refresh,
}

/// Door check-in for today's and upcoming events.
pub struct CheckinPage {
    api: ApiClient,
    now: NaiveDateTime,
    events: Vec<Event>,
    event: Option<Event>,
    checkins: Vec<Checkin>,
    awaiting_payment: Option<CheckinResult>,
}

impl CheckinPage {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            now: local_now(),
            events: Vec::new(),
            event: None,
            checkins: Vec::new(),
            awaiting_payment: None,
        }
    }

    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }

    pub fn selected_event(&self) -> Option<&Event> {
        self.event.as_ref()
    }

    /// The member whose on-site payment is waiting for confirmation
    pub fn awaiting_payment(&self) -> Option<&CheckinResult> {
        self.awaiting_payment.as_ref()
    }

    /// Events from today 00:00 onwards
    pub fn upcoming_events(&self) -> Vec<&Event> {
        let today = self.now.date().and_time(NaiveTime::MIN);
        self.events.iter().filter(|e| e.is_upcoming(today)).collect()
    }

    /// Newest first
    pub fn sorted_checkins(&self) -> Vec<&Checkin> {
        let mut sorted: Vec<&Checkin> = self.checkins.iter().collect();
        sorted.sort_by(|a, b| parse_date(&b.checked_in_at).cmp(&parse_date(&a.checked_in_at)));
        sorted
    }

    /// `(expected, checked in, rate)`
    pub fn stats(&self) -> (usize, usize, f64) {
        let expected = self
            .event
            .as_ref()
            .and_then(|e| e.expected_attendees)
            .unwrap_or(0)
            .max(0) as usize;
        let checked_in = self.checkins.len();
        (expected, checked_in, rate(checked_in, expected))
    }

    fn render_event_select(&self, surface: &mut dyn Surface) {
        let events = self.upcoming_events();
        let html = if events.is_empty() {
            r#"<option value="">No events</option>"#.to_string()
        } else {
            let selected = self.event.as_ref().map(Event::id);
            let options: String = events
                .iter()
                .map(|e| {
                    format!(
                        r#"<option value="{}"{}>{} - {}</option>"#,
                        escape_html(e.id()),
                        if selected == Some(e.id()) { " selected" } else { "" },
                        format_date(&e.date),
                        escape_html(e.title())
                    )
                })
                .collect();
            format!(r#"<option value="">Choose an event</option>{}"#, options)
        };
        surface.render("eventSelect", html);
    }

    fn render_event(&self, surface: &mut dyn Surface) {
        let html = match &self.event {
            Some(event) => {
                let mut when = format_date(&event.date);
                if event.start_time.as_deref().is_some_and(|t| !t.is_empty()) {
                    when = format!("{} {}", when, event.time_range());
                }
                format!(
                    r#"<h3 id="selectedEventName">{}</h3><span id="selectedEventDate">{}</span><span id="selectedEventLocation">{}</span>"#,
                    escape_html(event.title()),
                    when,
                    escape_html(event.location.as_deref().unwrap_or("TBD"))
                )
            }
            None => String::new(),
        };
        surface.render("checkinUI", html);
    }

    fn render_checkins(&self, surface: &mut dyn Surface) {
        let checkins = self.sorted_checkins();
        let html = if checkins.is_empty() {
            no_data("No check-ins yet")
        } else {
            checkins
                .iter()
                .map(|c| {
                    format!(
                        r#"<div class="checkin-item"><div class="checkin-time">{}</div><div class="checkin-member"><div class="member-name">{}</div><div class="member-id">{}</div></div>{}</div>"#,
                        format_time(&c.checked_in_at),
                        escape_html(&c.member_name),
                        escape_html(&c.member_id),
                        if c.payment_confirmed {
                            r#"<div class="payment-status"><span class="status-badge status-confirmed">Paid</span></div>"#
                        } else {
                            ""
                        }
                    )
                })
                .collect()
        };
        surface.render("checkinsList", html);

        let (expected, checked_in, rate) = self.stats();
        surface.render(
            "checkinStats",
            format!(
                r#"<span id="expectedCount">{}</span><span id="checkedInCount">{}</span><span id="checkinRate">{:.1}</span><div class="checkin-rate-bar" style="width: {:.1}%"></div>"#,
                expected, checked_in, rate, rate
            ),
        );
    }

    fn render_payment_prompt(&self, surface: &mut dyn Surface) {
        let html = self
            .awaiting_payment
            .as_ref()
            .map(|r| {
                format!(
                    r#"<div id="paymentConfirmModal"><span id="paymentMemberName">{}</span><span id="paymentAmount">{}</span><button id="confirmPaymentBtn" data-id="{}">Payment received</button><button id="skipPaymentBtn">Skip</button></div>"#,
                    escape_html(&r.member_name),
                    format_currency(r.amount),
                    escape_html(&r.member_id)
                )
            })
            .unwrap_or_default();
        surface.render("paymentConfirm", html);
    }

    async fn load_checkins(&mut self, surface: &mut dyn Surface) {
        let Some(event_id) = self.event.as_ref().map(|e| e.id().to_string()) else {
            return;
        };
        match self.api.get_checkin_list(&event_id).await {
            Ok(checkins) => {
                self.checkins = checkins;
                self.render_checkins(surface);
            }
            Err(e) => report_failure(surface, "Failed to load check-ins", &e),
        }
    }

    async fn select_event(&mut self, event_id: Option<String>, surface: &mut dyn Surface) {
        self.checkins.clear();
        self.awaiting_payment = None;
        let Some(event_id) = event_id.filter(|id| !id.is_empty()) else {
            self.event = None;
            self.render_event(surface);
            return;
        };
        match self.api.get_event(&event_id).await {
            Ok(detail) => {
                self.event = Some(detail.event);
                self.render_event(surface);
                self.load_checkins(surface).await;
            }
            Err(e) => report_failure(surface, "Failed to load the event", &e),
        }
    }

    fn current_event_id(&self) -> Result<String> {
        self.event
            .as_ref()
            .map(|e| e.id().to_string())
            .ok_or_else(|| ValidationError::new("Choose an event first").into())
    }

    async fn checkin(&self, member_id: &str) -> Result<CheckinResult> {
        let member_id = member_id.trim();
        if member_id.is_empty() {
            return Err(ValidationError::new("Enter a member ID").into());
        }
        let event_id = self.current_event_id()?;
        let result = self.api.checkin(&event_id, member_id).await?;
        info!(%event_id, member_id, requires_payment = result.requires_payment, "Checked in");
        Ok(result)
    }

    async fn confirm_payment(&self, member_id: &str) -> Result<()> {
        let event_id = self.current_event_id()?;
        self.api.checkin_with_payment(&event_id, member_id).await?;
        info!(%event_id, member_id, "Recorded on-site payment");
        Ok(())
    }
}

impl Controller for CheckinPage {
    type Action = CheckinAction;

    async fn load(&mut self, surface: &mut dyn Surface) {
        match self.api.get_events(None).await {
            Ok(events) => {
                self.events = events;
                self.render_event_select(surface);
            }
            Err(e) => report_failure(surface, "Failed to load events", &e),
        }
    }

    async fn dispatch(&mut self, action: CheckinAction, surface: &mut dyn Surface) {
        match action {
            CheckinAction::SelectEvent(event_id) => self.select_event(event_id, surface).await,
            CheckinAction::Checkin(member_id) => match self.checkin(&member_id).await {
                Ok(result) => {
                    surface.render(
                        "checkinResult",
                        format!(
                            r#"<div class="checkin-success"><div class="success-icon">✓</div><h3>{}</h3><p>Checked in</p><p class="checkin-time">{}</p></div>"#,
                            escape_html(&result.member_name),
                            local_now().format("%H:%M")
                        ),
                    );
                    self.awaiting_payment = result.requires_payment.then_some(result);
                    self.render_payment_prompt(surface);
                    self.load_checkins(surface).await;
                }
                Err(e) => report_failure(surface, "Check-in failed", &e),
            },
            CheckinAction::ConfirmPayment(member_id) => {
                match self.confirm_payment(&member_id).await {
                    Ok(()) => {
                        surface.alert("Payment confirmed");
                        self.awaiting_payment = None;
                        self.render_payment_prompt(surface);
                        self.load_checkins(surface).await;
                    }
                    Err(e) => report_failure(surface, "Failed to confirm the payment", &e),
                }
            }
            CheckinAction::SkipPayment => {
                self.awaiting_payment = None;
                self.render_payment_prompt(surface);
            }
            CheckinAction::Refresh => self.load_checkins(surface).await,
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
                {"id": "E0", "name": "Old meeting", "date": "2024-05-31T18:00:00"},
                {"id": "E1", "name": "Camp", "date": "2024-06-01T09:00:00"},
                {"id": "E2", "name": "Hike", "date": "2024-06-20"}
            ]}),
            "getEvent" => json!({"success": true, "data": {
                "id": "E1", "name": "Camp", "date": "2024-06-01", "start_time": "09:00",
                "expectedAttendees": 4
            }}),
            "getCheckinList" => json!({"success": true, "data": [
                {"memberId": "M1", "memberName": "Sato", "checkedInAt": "2024-06-01T08:50:00"},
                {"memberId": "M2", "memberName": "Abe", "checkedInAt": "2024-06-01T09:10:00",
                 "paymentConfirmed": true}
            ]}),
            "checkin" => json!({"success": true, "data": {
                "memberId": "M3", "memberName": "Kato", "requiresPayment": true, "amount": 2000
            }}),
            _ => json!({"success": true}),
        }
    }

    #[tokio::test]
    async fn test_select_event_lists_newest_first() {
        let (url, _) = mock_backend(backend).await;
        let (_, api) = logged_in_client(&url);
        let mut checkin = CheckinPage::new(api).with_now(at("2024-06-01T12:00:00"));
        let mut page = Page::new();

        checkin.load(&mut page).await;
        let ids: Vec<&str> = checkin.upcoming_events().iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["E1", "E2"]);
        assert!(!page.container("eventSelect").unwrap().contains("Old meeting"));

        checkin
            .dispatch(CheckinAction::SelectEvent(Some("E1".into())), &mut page)
            .await;
        let names: Vec<&str> = checkin
            .sorted_checkins()
            .iter()
            .map(|c| c.member_name.as_str())
            .collect();
        assert_eq!(names, vec!["Abe", "Sato"]);
        assert_eq!(checkin.stats(), (4, 2, 50.0));
        assert!(page.container("checkinUI").unwrap().contains("2024-06-01 09:00"));
        assert!(page.container("checkinStats").unwrap().contains("50.0"));
    }

    #[tokio::test]
    async fn test_manual_checkin_validation() {
        let (url, recorded) = mock_backend(backend).await;
        let (_, api) = logged_in_client(&url);
        let mut checkin = CheckinPage::new(api);
        let mut page = Page::new();

        checkin.dispatch(CheckinAction::Checkin("  ".into()), &mut page).await;
        assert_eq!(page.last_alert(), Some("Enter a member ID"));
        checkin.dispatch(CheckinAction::Checkin("M3".into()), &mut page).await;
        assert_eq!(page.last_alert(), Some("Choose an event first"));
        assert_eq!(recorded.hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_checkin_with_on_site_payment() {
        let (url, recorded) = mock_backend(backend).await;
        let (_, api) = logged_in_client(&url);
        let mut checkin = CheckinPage::new(api);
        let mut page = Page::new();
        checkin
            .dispatch(CheckinAction::SelectEvent(Some("E1".into())), &mut page)
            .await;

        checkin.dispatch(CheckinAction::Checkin(" M3 ".into()), &mut page).await;
        assert!(page.container("checkinResult").unwrap().contains("Kato"));
        assert_eq!(checkin.awaiting_payment().unwrap().amount, 2000);
        assert!(page.container("paymentConfirm").unwrap().contains("¥2,000"));

        checkin
            .dispatch(CheckinAction::ConfirmPayment("M3".into()), &mut page)
            .await;
        let body = recorded.last_body.lock().unwrap().clone().unwrap();
        assert_eq!(body["action"], "checkinWithPayment");
        assert_eq!(body["eventId"], "E1");
        assert_eq!(body["memberId"], "M3");
        assert!(checkin.awaiting_payment().is_none());
        assert_eq!(page.container("paymentConfirm"), Some(""));
    }
}
