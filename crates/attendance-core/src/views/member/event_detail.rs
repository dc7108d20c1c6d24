use anyhow::Result;
use chrono::NaiveDateTime;
use tracing::info;

use crate::api::{ApiClient, ApiError};
use crate::models::{AttendanceStatus, EventDetail, PaymentMethod, PaymentStatus, ValidationError};
use crate::utils::{escape_html, format_currency, format_date, format_date_time, is_past};
use crate::views::{
    attendance_badge, local_now, payment_badge, rate, report_failure, Controller, Surface,
};

const EVENTS_PAGE: &str = "events.html";

pub enum EventDetailAction {
    SubmitAttendance {
        status: AttendanceStatus,
        notes: String,
    },
    SubmitPayment {
        method: Option<PaymentMethod>,
        notes: String,
    },
}

/// One event from the member's side: answer, pay, see who is coming.
pub struct EventDetailPage {
    api: ApiClient,
    now: NaiveDateTime,
    event_id: String,
    detail: Option<EventDetail>,
}

impl EventDetailPage {
    pub fn new(api: ApiClient, event_id: impl Into<String>) -> Self {
        Self {
            api,
            now: local_now(),
            event_id: event_id.into(),
            detail: None,
        }
    }

    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }

    pub fn detail(&self) -> Option<&EventDetail> {
        self.detail.as_ref()
    }

    fn deadline(detail: &EventDetail) -> Option<&str> {
        detail
            .event
            .deadline
            .as_deref()
            .or(detail.event.attendance_deadline.as_deref())
            .filter(|d| !d.is_empty())
    }

    /// Answers are frozen once the deadline has passed.
    pub fn is_closed(&self) -> bool {
        self.detail
            .as_ref()
            .and_then(Self::deadline)
            .is_some_and(|d| is_past(d, self.now))
    }

    fn render(&self, surface: &mut dyn Surface) {
        let Some(detail) = &self.detail else {
            return;
        };
        let event = &detail.event;
        let closed = self.is_closed();

        let fee = if event.has_fee() {
            format_currency(event.fee_amount)
        } else {
            "Free".to_string()
        };
        let deadline = Self::deadline(detail)
            .map(|d| {
                format!(
                    r#"<div class="detail-row"><span class="label">Deadline</span><span class="{}">{}</span>{}</div>"#,
                    if closed { "text-danger" } else { "" },
                    format_date_time(d),
                    if closed {
                        r#"<span class="deadline-note text-danger">The deadline has passed</span>"#
                    } else {
                        ""
                    }
                )
            })
            .unwrap_or_default();
        let description = event
            .description
            .as_deref()
            .map(|d| format!(r#"<p class="event-description">{}</p>"#, escape_html(d)))
            .unwrap_or_default();
        surface.render(
            "eventInfo",
            format!(
                r#"<h2 id="eventName">{}</h2><div class="detail-row"><span class="label">Date</span><span>{}</span></div><div class="detail-row"><span class="label">Time</span><span>{}</span></div><div class="detail-row"><span class="label">Location</span><span>{}</span></div><div class="detail-row"><span class="label">Fee</span><span>{}</span></div>{}{}"#,
                escape_html(event.title()),
                format_date(&event.date),
                event.time_range(),
                escape_html(event.location.as_deref().unwrap_or("TBD")),
                fee,
                deadline,
                description
            ),
        );

        let current = detail
            .attendance
            .as_ref()
            .map(|a| a.status())
            .unwrap_or(AttendanceStatus::None);
        let notes = detail
            .attendance
            .as_ref()
            .and_then(|a| a.notes.as_deref())
            .map(|n| format!(r#"<p class="attendance-notes">{}</p>"#, escape_html(n)))
            .unwrap_or_default();
        let buttons: String = [
            AttendanceStatus::Attend,
            AttendanceStatus::Absent,
            AttendanceStatus::Pending,
        ]
        .iter()
        .map(|status| {
            let active = *status == current;
            format!(
                r#"<button class="attendance-btn{}" data-status="{}"{}>{}</button>"#,
                if active { " active" } else { "" },
                status.as_str(),
                if active || closed { " disabled" } else { "" },
                status.label()
            )
        })
        .collect();
        surface.render(
            "attendanceStatus",
            format!(
                r#"{}{}<div class="attendance-buttons">{}</div>"#,
                attendance_badge(current),
                notes,
                buttons
            ),
        );

        let payment = if !event.has_fee() {
            String::new()
        } else {
            match detail.attendance.as_ref().and_then(|a| a.payment.as_ref()) {
                None => format!(
                    r#"{}<span class="payment-amount">{}</span><div class="payment-form"></div>"#,
                    payment_badge(PaymentStatus::Pending),
                    format_currency(event.fee_amount)
                ),
                Some(payment) => format!(
                    r#"{}<span class="payment-amount">{}</span>{}{}"#,
                    payment_badge(payment.status()),
                    format_currency(payment.amount),
                    payment
                        .paid_at
                        .as_deref()
                        .map(|p| format!(r#"<span class="payment-date">{}</span>"#, format_date_time(p)))
                        .unwrap_or_default(),
                    if payment.status() == PaymentStatus::Pending {
                        r#"<div class="payment-form"></div>"#
                    } else {
                        ""
                    }
                ),
            }
        };
        surface.render("paymentSection", payment);

        let stats = event
            .stats
            .as_ref()
            .map(|s| {
                format!(
                    r#"<span id="totalAttendees">{}</span> / <span id="totalMembers">{}</span> attending (<span id="attendanceRate">{:.1}</span>%)"#,
                    s.attend_count,
                    s.total_members,
                    rate(s.attend_count.max(0) as usize, s.total_members.max(0) as usize)
                )
            })
            .unwrap_or_default();
        surface.render("eventStats", stats);
    }

    async fn reload(&mut self, surface: &mut dyn Surface) {
        match self.api.get_event(&self.event_id).await {
            Ok(detail) => {
                self.detail = Some(detail);
                self.render(surface);
            }
            Err(e) => {
                report_failure(surface, "Failed to load the event", &e);
                if !ApiError::is_unauthorized(&e) {
                    surface.redirect(EVENTS_PAGE);
                }
            }
        }
    }

    async fn submit_attendance(&self, status: AttendanceStatus, notes: &str) -> Result<()> {
        if self.is_closed() {
            return Err(ValidationError::new("The deadline for answers has passed").into());
        }
        self.api
            .submit_attendance(&self.event_id, status, notes)
            .await?;
        info!(event_id = %self.event_id, status = status.as_str(), "Submitted attendance");
        Ok(())
    }

    async fn submit_payment(&self, method: Option<&PaymentMethod>, notes: &str) -> Result<()> {
        let method = method.ok_or_else(|| ValidationError::new("Choose a payment method"))?;
        let amount = self
            .detail
            .as_ref()
            .map(|d| d.event.fee_amount)
            .unwrap_or_default();
        self.api
            .submit_payment(&self.event_id, amount, method, notes)
            .await?;
        info!(event_id = %self.event_id, method = method.as_str(), "Submitted payment");
        Ok(())
    }
}

impl Controller for EventDetailPage {
    type Action = EventDetailAction;

    async fn load(&mut self, surface: &mut dyn Surface) {
        if self.event_id.trim().is_empty() {
            surface.alert("No event was specified");
            surface.redirect(EVENTS_PAGE);
            return;
        }
        self.reload(surface).await;
    }

    async fn dispatch(&mut self, action: EventDetailAction, surface: &mut dyn Surface) {
        let (result, done, context) = match action {
            EventDetailAction::SubmitAttendance { status, notes } => (
                self.submit_attendance(status, &notes).await,
                "Your answer was saved",
                "Failed to save your answer",
            ),
            EventDetailAction::SubmitPayment { method, notes } => (
                self.submit_payment(method.as_ref(), &notes).await,
                "Your payment was recorded",
                "Failed to record the payment",
            ),
        };
        match result {
            Ok(()) => {
                surface.alert(done);
                self.reload(surface).await;
            }
            Err(e) => report_failure(surface, context, &e),
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
                "event": {"event_id": "E1", "title": "Camp", "date": "2024-06-20", "fee_amount": 3000,
                          "deadline": "2024-06-10T23:59:00", "stats": {"attendCount": 3, "totalMembers": 4}},
                "attendance": {"status": "pending", "payment": {"status": "pending", "amount": 3000}}
            }}),
            _ => json!({"success": true}),
        }
    }

    #[tokio::test]
    async fn test_render_open_event() {
        let (url, _) = mock_backend(backend).await;
        let (_, api) = logged_in_client(&url);
        let mut detail = EventDetailPage::new(api, "E1").with_now(at("2024-06-01T09:00:00"));
        let mut page = Page::new();

        detail.load(&mut page).await;
        assert!(!detail.is_closed());
        assert!(page.container("eventInfo").unwrap().contains("¥3,000"));
        let status = page.container("attendanceStatus").unwrap();
        assert!(status.contains(r#"attendance-btn active" data-status="pending" disabled"#));
        assert!(page.container("paymentSection").unwrap().contains("payment-form"));
        assert!(page.container("eventStats").unwrap().contains("75.0"));
    }

    #[tokio::test]
    async fn test_submit_after_deadline_is_blocked() {
        let (url, recorded) = mock_backend(backend).await;
        let (_, api) = logged_in_client(&url);
        let mut detail = EventDetailPage::new(api, "E1").with_now(at("2024-06-11T09:00:00"));
        let mut page = Page::new();

        detail.load(&mut page).await;
        let hits = recorded.hits.load(Ordering::SeqCst);
        detail
            .dispatch(
                EventDetailAction::SubmitAttendance {
                    status: AttendanceStatus::Attend,
                    notes: String::new(),
                },
                &mut page,
            )
            .await;
        assert_eq!(page.last_alert(), Some("The deadline for answers has passed"));
        assert_eq!(recorded.hits.load(Ordering::SeqCst), hits);
    }

    #[tokio::test]
    async fn test_submit_attendance_and_payment() {
        let (url, recorded) = mock_backend(backend).await;
        let (_, api) = logged_in_client(&url);
        let mut detail = EventDetailPage::new(api, "E1").with_now(at("2024-06-01T09:00:00"));
        let mut page = Page::new();
        detail.load(&mut page).await;

        detail
            .dispatch(
                EventDetailAction::SubmitPayment {
                    method: None,
                    notes: String::new(),
                },
                &mut page,
            )
            .await;
        assert_eq!(page.last_alert(), Some("Choose a payment method"));

        detail
            .dispatch(
                EventDetailAction::SubmitPayment {
                    method: Some(PaymentMethod::PayPay),
                    notes: "sent".into(),
                },
                &mut page,
            )
            .await;
        let body = recorded.last_body.lock().unwrap().clone().unwrap();
        assert_eq!(body["action"], "submitPayment");
        assert_eq!(body["amount"], 3000);
        assert_eq!(body["method"], "paypay");
        assert_eq!(page.last_alert(), Some("Your payment was recorded"));

        detail
            .dispatch(
                EventDetailAction::SubmitAttendance {
                    status: AttendanceStatus::Attend,
                    notes: "Bringing a tent".into(),
                },
                &mut page,
            )
            .await;
        let body = recorded.last_body.lock().unwrap().clone().unwrap();
        assert_eq!(body["status"], "attend");
        assert_eq!(body["notes"], "Bringing a tent");
    }

    #[tokio::test]
    async fn test_missing_event_id() {
        let (_, api) = logged_in_client("http://127.0.0.1:9/exec");
        let mut detail = EventDetailPage::new(api, "");
        let mut page = Page::new();
        detail.load(&mut page).await;
        assert_eq!(page.last_redirect(), Some(EVENTS_PAGE));
    }
}
