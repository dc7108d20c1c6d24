use anyhow::Result;
use tracing::info;

use crate::api::{ApiClient, ApiError};
use crate::export::CsvFile;
use crate::models::{Attendance, AttendanceStatus, Event, PaymentStatus};
use crate::utils::{
    cmp_ignore_case, contains_ignore_case, escape_html, format_currency, format_date,
    format_date_time, format_time,
};
use crate::views::{no_data, rate, report_failure, Controller, Surface};

const EVENTS_PAGE: &str = "events.html";

pub enum AdminEventDetailAction {
    /// `None` shows every row
    SetStatus(Option<AttendanceStatus>),
    Search(String),
    Refresh,
    Edit,
    UpdateAttendance {
        attendance_id: String,
        status: AttendanceStatus,
    },
    /// Changes the payment attached to an attendance row
    UpdatePayment {
        attendance_id: String,
        status: PaymentStatus,
    },
    Export,
}

/// Roster counts. The payment figures are only set for events with a fee.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RosterStats {
    pub total: usize,
    pub attend: usize,
    pub absent: usize,
    pub pending: usize,
    pub no_response: usize,
    pub attendance_rate: f64,
    pub paid: Option<usize>,
    pub unpaid: Option<usize>,
    pub revenue: Option<i64>,
}

/// Staff view of one event and its full attendance roster.
pub struct AdminEventDetailPage {
    api: ApiClient,
    event_id: String,
    event: Option<Event>,
    attendances: Vec<Attendance>,
    status: Option<AttendanceStatus>,
    search_query: String,
}

impl AdminEventDetailPage {
    pub fn new(api: ApiClient, event_id: impl Into<String>) -> Self {
        Self {
            api,
            event_id: event_id.into(),
            event: None,
            attendances: Vec::new(),
            status: None,
            search_query: String::new(),
        }
    }

    pub fn event(&self) -> Option<&Event> {
        self.event.as_ref()
    }

    fn fee(&self) -> i64 {
        self.event.as_ref().map(|e| e.fee_amount).unwrap_or(0)
    }

    pub fn stats(&self) -> RosterStats {
        let count = |status: AttendanceStatus| {
            self.attendances
                .iter()
                .filter(|a| a.status() == status)
                .count()
        };
        let total = self.attendances.len();
        let attend = count(AttendanceStatus::Attend);
        let mut stats = RosterStats {
            total,
            attend,
            absent: count(AttendanceStatus::Absent),
            pending: count(AttendanceStatus::Pending),
            no_response: count(AttendanceStatus::None),
            attendance_rate: rate(attend, total),
            ..Default::default()
        };

        let fee = self.fee();
        if fee > 0 {
            let paid = self.attendances.iter().filter(|a| a.is_paid()).count();
            let unpaid = self
                .attendances
                .iter()
                .filter(|a| a.payment_status() == PaymentStatus::Pending)
                .count();
            stats.paid = Some(paid);
            stats.unpaid = Some(unpaid);
            stats.revenue = Some(paid as i64 * fee);
        }
        stats
    }

    pub fn get_filtered_attendances(&self) -> Vec<&Attendance> {
        let mut filtered: Vec<&Attendance> = self
            .attendances
            .iter()
            .filter(|a| self.status.map_or(true, |s| a.status() == s))
            .collect();

        if !self.search_query.is_empty() {
            let query = self.search_query.to_lowercase();
            filtered.retain(|a| {
                contains_ignore_case(&a.member_name, &query)
                    || a.student_number
                        .as_deref()
                        .is_some_and(|n| contains_ignore_case(n, &query))
            });
        }

        filtered.sort_by(|a, b| cmp_ignore_case(&a.member_name, &b.member_name));
        filtered
    }

    fn render_event(&self, event: &Event, surface: &mut dyn Surface) {
        let fee = if event.has_fee() {
            format_currency(event.fee_amount)
        } else {
            "Free".to_string()
        };
        let deadline = event
            .deadline
            .as_deref()
            .or(event.attendance_deadline.as_deref())
            .map(format_date_time)
            .unwrap_or_default();
        surface.render(
            "eventInfo",
            format!(
                r#"<h2 id="eventName">{}</h2><span id="eventDate">{}</span><span id="eventTime">{}</span><span id="eventLocation">{}</span><span id="eventFee">{}</span><span id="eventDeadline">{}</span><p id="eventDescription">{}</p>"#,
                escape_html(event.title()),
                format_date(&event.date),
                event.time_range(),
                escape_html(event.location.as_deref().unwrap_or("TBD")),
                fee,
                deadline,
                escape_html(event.description.as_deref().unwrap_or_default())
            ),
        );
    }

    fn render_stats(&self, surface: &mut dyn Surface) {
        let stats = self.stats();
        let mut html = format!(
            r#"<span id="totalMembers">{}</span><span id="attendingCount">{}</span><span id="absentCount">{}</span><span id="pendingCount">{}</span><span id="noResponseCount">{}</span><span id="attendanceRate">{:.1}</span><div class="rate-bar" style="width: {:.1}%"></div>"#,
            stats.total,
            stats.attend,
            stats.absent,
            stats.pending,
            stats.no_response,
            stats.attendance_rate,
            stats.attendance_rate
        );
        if let (Some(paid), Some(unpaid), Some(revenue)) = (stats.paid, stats.unpaid, stats.revenue) {
            html.push_str(&format!(
                r#"<span id="paidCount">{}</span><span id="unpaidCount">{}</span><span id="totalRevenue">{}</span>"#,
                paid,
                unpaid,
                format_currency(revenue)
            ));
        }
        surface.render("stats", html);
    }

    fn attendance_row(&self, attendance: &Attendance) -> String {
        let id = escape_html(attendance.id.as_deref().unwrap_or_default());
        let current = attendance.status();
        let status_options: String = AttendanceStatus::ALL
            .iter()
            .map(|s| {
                format!(
                    r#"<option value="{}"{}>{}</option>"#,
                    s.as_str(),
                    if *s == current { " selected" } else { "" },
                    s.label()
                )
            })
            .collect();
        let payment = if self.fee() > 0 {
            let paid = attendance.payment_status();
            let options: String = [PaymentStatus::Pending, PaymentStatus::Paid, PaymentStatus::Confirmed]
                .iter()
                .map(|s| {
                    format!(
                        r#"<option value="{}"{}>{}</option>"#,
                        s.as_str(),
                        if *s == paid { " selected" } else { "" },
                        s.label()
                    )
                })
                .collect();
            format!(r#"<td><select class="payment-select" data-id="{}">{}</select></td>"#, id, options)
        } else {
            String::new()
        };

        format!(
            r#"<tr class="attendance-row"><td><input type="checkbox" class="attendance-checkbox" value="{id}"></td><td>{name}</td><td>{grade}</td><td>{number}</td><td><select class="status-select" data-id="{id}">{status}</select></td>{payment}<td>{notes}</td><td>{checked_in}</td></tr>"#,
            id = id,
            name = escape_html(&attendance.member_name),
            grade = escape_html(attendance.grade.as_deref().unwrap_or("-")),
            number = escape_html(attendance.student_number.as_deref().unwrap_or("-")),
            status = status_options,
            payment = payment,
            notes = escape_html(attendance.notes.as_deref().filter(|n| !n.is_empty()).unwrap_or("-")),
            checked_in = attendance
                .checked_in_at
                .as_deref()
                .map(format_time)
                .unwrap_or_else(|| "-".to_string()),
        )
    }

    fn render_attendances(&self, surface: &mut dyn Surface) {
        let rows = self.get_filtered_attendances();
        let html = if rows.is_empty() {
            no_data("No matching members")
        } else {
            rows.iter().map(|a| self.attendance_row(a)).collect()
        };
        surface.render("attendancesList", html);
    }

    async fn reload(&mut self, surface: &mut dyn Surface) {
        let result = futures::try_join!(
            self.api.get_event(&self.event_id),
            self.api.get_attendances(&self.event_id)
        );
        match result {
            Ok((detail, attendances)) => {
                self.render_event(&detail.event, surface);
                self.event = Some(detail.event);
                self.attendances = attendances;
                self.render_attendances(surface);
                self.render_stats(surface);
            }
            Err(e) => report_failure(surface, "Failed to load the event", &e),
        }
    }

    async fn update_payment(&self, attendance_id: &str, status: PaymentStatus) -> Result<bool> {
        let payment_id = self
            .attendances
            .iter()
            .find(|a| a.id.as_deref() == Some(attendance_id))
            .and_then(|a| a.payment.as_ref())
            .and_then(|p| p.id.as_deref());
        let Some(payment_id) = payment_id else {
            return Ok(false);
        };
        self.api.update_payment(payment_id, status).await?;
        info!(payment_id, status = status.as_str(), "Updated payment");
        Ok(true)
    }

    pub fn export_csv(&self) -> Option<CsvFile> {
        let event = self.event.as_ref()?;
        let has_fee = event.has_fee();
        let mut headers = vec!["Name", "Grade", "Student number", "Attendance", "Notes", "Check-in time"];
        if has_fee {
            headers.insert(4, "Payment");
        }
        let mut csv = CsvFile::new(format!("{}_attendance.csv", event.title()), &headers);
        for a in &self.attendances {
            let mut row = vec![
                a.member_name.clone(),
                a.grade.clone().unwrap_or_default(),
                a.student_number.clone().unwrap_or_default(),
                a.status().label().to_string(),
                a.notes.clone().unwrap_or_default(),
                a.checked_in_at.as_deref().map(format_time).unwrap_or_default(),
            ];
            if has_fee {
                row.insert(4, a.payment_status().label().to_string());
            }
            csv.push_row(row);
        }
        Some(csv)
    }
}

impl Controller for AdminEventDetailPage {
    type Action = AdminEventDetailAction;

    async fn load(&mut self, surface: &mut dyn Surface) {
        if self.event_id.trim().is_empty() {
            surface.alert("No event was specified");
            surface.redirect(EVENTS_PAGE);
            return;
        }
        self.reload(surface).await;
    }

    async fn dispatch(&mut self, action: AdminEventDetailAction, surface: &mut dyn Surface) {
        match action {
            AdminEventDetailAction::SetStatus(status) => {
                self.status = status;
                self.render_attendances(surface);
            }
            AdminEventDetailAction::Search(query) => {
                self.search_query = query;
                self.render_attendances(surface);
            }
            AdminEventDetailAction::Refresh => self.reload(surface).await,
            AdminEventDetailAction::Edit => {
                surface.redirect(&format!("event-form.html?id={}", self.event_id))
            }
            AdminEventDetailAction::UpdateAttendance {
                attendance_id,
                status,
            } => {
                match self.api.update_attendance(&attendance_id, status).await {
                    Ok(()) => {
                        info!(%attendance_id, status = status.as_str(), "Updated attendance");
                        surface.alert("Attendance updated");
                    }
                    Err(e) => {
                        report_failure(surface, "Failed to update attendance", &e);
                        if ApiError::is_unauthorized(&e) {
                            return;
                        }
                    }
                }
                // Reload either way so the select shows the stored value
                self.reload(surface).await;
            }
            AdminEventDetailAction::UpdatePayment {
                attendance_id,
                status,
            } => {
                match self.update_payment(&attendance_id, status).await {
                    Ok(false) => return,
                    Ok(true) => surface.alert("Payment updated"),
                    Err(e) => {
                        report_failure(surface, "Failed to update the payment", &e);
                        if ApiError::is_unauthorized(&e) {
                            return;
                        }
                    }
                }
                self.reload(surface).await;
            }
            AdminEventDetailAction::Export => match self.export_csv() {
                Some(csv) => {
                    info!(rows = csv.record_count(), file = %csv.filename, "Exported roster");
                    surface.download(csv);
                    surface.alert("Attendance exported");
                }
                None => surface.alert("No data to export"),
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
    use crate::views::Page;

    fn backend(action: &str) -> serde_json::Value {
        match action {
            "getEvent" => json!({"success": true, "data": {
                "id": "E1", "title": "Camp", "date": "2024-08-10", "fee_amount": 2000
            }}),
            "getAttendances" => json!({"success": true, "data": [
                {"id": "A1", "memberName": "Tanaka", "studentNumber": "S100", "status": "attend",
                 "payment": {"id": "P1", "status": "paid", "amount": 2000}},
                {"id": "A2", "memberName": "abe", "status": "absent"},
                {"id": "A3", "memberName": "Sato", "studentNumber": "S200", "status": "attend",
                 "checkedInAt": "2024-08-10T09:05:00", "payment": {"id": "P3", "status": "pending"}},
                {"id": "A4", "memberName": "Kato"}
            ]}),
            _ => json!({"success": true}),
        }
    }

    async fn loaded() -> (AdminEventDetailPage, Page, crate::api::client::tests::Recorded) {
        let (url, recorded) = mock_backend(backend).await;
        let (_, api) = logged_in_client(&url);
        let mut detail = AdminEventDetailPage::new(api, "E1");
        let mut page = Page::new();
        detail.load(&mut page).await;
        (detail, page, recorded)
    }

    #[tokio::test]
    async fn test_stats_and_rows() {
        let (detail, page, _) = loaded().await;
        let stats = detail.stats();
        assert_eq!(
            stats,
            RosterStats {
                total: 4,
                attend: 2,
                absent: 1,
                pending: 0,
                no_response: 1,
                attendance_rate: 50.0,
                paid: Some(1),
                unpaid: Some(3),
                revenue: Some(2000),
            }
        );
        assert!(page.container("stats").unwrap().contains("¥2,000"));
        let rows = page.container("attendancesList").unwrap();
        assert!(rows.contains("payment-select"));
        assert!(rows.contains("09:05"));
    }

    #[tokio::test]
    async fn test_filter_and_search() {
        let (mut detail, mut page, _) = loaded().await;
        let names = |d: &AdminEventDetailPage| {
            d.get_filtered_attendances()
                .iter()
                .map(|a| a.member_name.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&detail), vec!["abe", "Kato", "Sato", "Tanaka"]);

        detail
            .dispatch(AdminEventDetailAction::SetStatus(Some(AttendanceStatus::Attend)), &mut page)
            .await;
        assert_eq!(names(&detail), vec!["Sato", "Tanaka"]);
        detail
            .dispatch(AdminEventDetailAction::Search("s1".into()), &mut page)
            .await;
        assert_eq!(names(&detail), vec!["Tanaka"]);
        detail
            .dispatch(AdminEventDetailAction::SetStatus(Some(AttendanceStatus::Pending)), &mut page)
            .await;
        assert!(page.container("attendancesList").unwrap().contains("No matching members"));
    }

    #[tokio::test]
    async fn test_updates_send_ids_and_reload() {
        let (mut detail, mut page, recorded) = loaded().await;

        detail
            .dispatch(
                AdminEventDetailAction::UpdatePayment {
                    attendance_id: "A3".into(),
                    status: PaymentStatus::Confirmed,
                },
                &mut page,
            )
            .await;
        let body = recorded.last_body.lock().unwrap().clone().unwrap();
        assert_eq!(body["action"], "updatePayment");
        assert_eq!(body["paymentId"], "P3");
        assert_eq!(page.last_alert(), Some("Payment updated"));

        // No payment row: nothing to update
        let hits = recorded.hits.load(Ordering::SeqCst);
        detail
            .dispatch(
                AdminEventDetailAction::UpdatePayment {
                    attendance_id: "A2".into(),
                    status: PaymentStatus::Paid,
                },
                &mut page,
            )
            .await;
        assert_eq!(recorded.hits.load(Ordering::SeqCst), hits);

        detail
            .dispatch(
                AdminEventDetailAction::UpdateAttendance {
                    attendance_id: "A4".into(),
                    status: AttendanceStatus::Absent,
                },
                &mut page,
            )
            .await;
        let body = recorded.last_body.lock().unwrap().clone().unwrap();
        assert_eq!(body["attendanceId"], "A4");
        assert_eq!(body["status"], "absent");
    }

    #[tokio::test]
    async fn test_export_inserts_payment_column() {
        let (mut detail, mut page, _) = loaded().await;
        detail.dispatch(AdminEventDetailAction::Export, &mut page).await;

        let csv = &page.downloads[0];
        assert_eq!(csv.filename, "Camp_attendance.csv");
        assert_eq!(
            csv.rows[0],
            vec!["Name", "Grade", "Student number", "Attendance", "Payment", "Notes", "Check-in time"]
        );
        assert_eq!(csv.rows[1][4], "Paid");
        assert_eq!(csv.rows[4][3], "No response");
        assert_eq!(csv.record_count(), 4);
    }
}
