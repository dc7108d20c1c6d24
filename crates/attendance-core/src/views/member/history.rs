use chrono::{Datelike, NaiveDateTime};
use tracing::info;

use crate::api::ApiClient;
use crate::export::CsvFile;
use crate::models::{AttendanceRecord, AttendanceStatus};
use crate::utils::{escape_html, format_date, parse_date};
use crate::views::{local_now, no_data, payment_badge, rate, report_failure, Controller, Surface};

const YEARS_SHOWN: i32 = 5;

pub enum HistoryAction {
    SetYear(i32),
    /// `None` shows every status
    SetStatus(Option<AttendanceStatus>),
    Export,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryStats {
    pub total: usize,
    pub attend: usize,
    pub absent: usize,
    pub pending: usize,
    pub attendance_rate: f64,
}

impl HistoryStats {
    /// Rate with one decimal, e.g. `66.7`
    pub fn rate_text(&self) -> String {
        format!("{:.1}", self.attendance_rate)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonthBucket {
    pub total: usize,
    pub attend: usize,
}

/// The member's own attendance, by year.
pub struct HistoryPage {
    api: ApiClient,
    now: NaiveDateTime,
    history: Vec<AttendanceRecord>,
    year: i32,
    status: Option<AttendanceStatus>,
}

fn record_date(record: &AttendanceRecord) -> Option<NaiveDateTime> {
    parse_date(&record.event_date)
}

impl HistoryPage {
    pub fn new(api: ApiClient) -> Self {
        let now = local_now();
        Self {
            api,
            now,
            history: Vec::new(),
            year: now.year(),
            status: None,
        }
    }

    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self.year = now.year();
        self
    }

    fn year_records(&self) -> impl Iterator<Item = &AttendanceRecord> {
        let year = self.year;
        self.history
            .iter()
            .filter(move |r| record_date(r).map(|d| d.year()) == Some(year))
    }

    /// Stats cover the whole selected year, ignoring the status filter.
    pub fn stats(&self) -> HistoryStats {
        let mut stats = HistoryStats::default();
        for record in self.year_records() {
            stats.total += 1;
            match record.status() {
                AttendanceStatus::Attend => stats.attend += 1,
                AttendanceStatus::Absent => stats.absent += 1,
                AttendanceStatus::Pending => stats.pending += 1,
                AttendanceStatus::None => {}
            }
        }
        stats.attendance_rate = (rate(stats.attend, stats.total) * 10.0).round() / 10.0;
        stats
    }

    /// Events and attendances per calendar month of the selected year
    pub fn monthly(&self) -> [MonthBucket; 12] {
        let mut buckets = [MonthBucket::default(); 12];
        for record in self.year_records() {
            if let Some(date) = record_date(record) {
                let bucket = &mut buckets[date.month0() as usize];
                bucket.total += 1;
                if record.status() == AttendanceStatus::Attend {
                    bucket.attend += 1;
                }
            }
        }
        buckets
    }

    /// Records for the selected year and status, newest first.
    pub fn get_filtered_history(&self) -> Vec<&AttendanceRecord> {
        let mut filtered: Vec<&AttendanceRecord> = self.year_records().collect();
        if let Some(status) = self.status {
            filtered.retain(|r| r.status() == status);
        }
        filtered.sort_by(|a, b| record_date(b).cmp(&record_date(a)));
        filtered
    }

    fn year_options(&self) -> String {
        let current = self.now.year();
        (0..YEARS_SHOWN)
            .map(|i| current - i)
            .map(|year| {
                format!(
                    r#"<option value="{0}"{1}>{0}</option>"#,
                    year,
                    if year == self.year { " selected" } else { "" }
                )
            })
            .collect()
    }

    fn history_item(record: &AttendanceRecord) -> String {
        let date = record_date(record);
        let status = record.status();
        let location = record
            .event_location
            .as_deref()
            .filter(|l| !l.is_empty())
            .map(|l| format!(r#"<span class="history-location">📍 {}</span>"#, escape_html(l)))
            .unwrap_or_default();
        let notes = record
            .notes
            .as_deref()
            .filter(|n| !n.is_empty())
            .map(|n| format!(r#"<p class="history-notes">{}</p>"#, escape_html(n)))
            .unwrap_or_default();
        let payment = record
            .payment
            .as_ref()
            .map(|p| payment_badge(p.status()))
            .unwrap_or_default();

        format!(
            r#"<a class="history-item" href="event-detail.html?id={id}"><div class="history-date"><div class="date-day">{day}</div><div class="date-weekday">{weekday}</div></div><div class="history-content"><h4 class="history-event-name">{name}</h4><div class="history-meta"><span class="history-time">⏰ {time}</span>{location}</div>{notes}</div><div class="history-status"><div class="attendance-badge status-{class}"><span class="status-icon">{icon}</span><span class="status-text">{label}</span></div>{payment}</div></a>"#,
            id = escape_html(record.event_id.as_deref().unwrap_or_default()),
            day = date.map(|d| d.day().to_string()).unwrap_or_default(),
            weekday = date.map(|d| d.format("%a").to_string()).unwrap_or_default(),
            name = escape_html(&record.event_name),
            time = date.map(|d| d.format("%H:%M").to_string()).unwrap_or_default(),
            location = location,
            notes = notes,
            class = status.as_str(),
            icon = status.icon(),
            label = status.label(),
            payment = payment,
        )
    }

    fn render_list(&self, surface: &mut dyn Surface) {
        let filtered = self.get_filtered_history();
        if filtered.is_empty() {
            surface.render("historyList", no_data("No history"));
            return;
        }
        let html: String = group_by_month(&filtered)
            .into_iter()
            .map(|(month, items)| {
                format!(
                    r#"<div class="history-month-group"><h3 class="month-header">{}</h3><div class="history-items">{}</div></div>"#,
                    month,
                    items.into_iter().map(Self::history_item).collect::<String>()
                )
            })
            .collect();
        surface.render("historyList", html);
    }

    fn render_stats(&self, surface: &mut dyn Surface) {
        let stats = self.stats();
        surface.render(
            "historyStats",
            format!(
                r#"<div class="stat"><span id="totalEvents">{}</span> events</div><div class="stat"><span id="attendCount">{}</span> attended</div><div class="stat"><span id="absentCount">{}</span> absent</div><div class="stat"><span id="attendanceRate">{}</span>%</div><div class="rate-bar" style="width: {}%"></div>"#,
                stats.total,
                stats.attend,
                stats.absent,
                stats.rate_text(),
                stats.rate_text()
            ),
        );

        let rows: String = self
            .monthly()
            .iter()
            .enumerate()
            .map(|(month0, bucket)| {
                format!(
                    r#"<tr><th>{}</th><td class="attend">{}</td><td class="total">{}</td></tr>"#,
                    month0 + 1,
                    bucket.attend,
                    bucket.total
                )
            })
            .collect();
        surface.render(
            "monthlyChart",
            format!(
                r#"<table class="monthly-chart"><tr><th>Month</th><th>Attended</th><th>Events</th></tr>{}</table>"#,
                rows
            ),
        );
    }

    fn render(&self, surface: &mut dyn Surface) {
        surface.render("yearFilter", self.year_options());
        self.render_stats(surface);
        self.render_list(surface);
    }

    /// CSV of the filtered list, or `None` when there is nothing to export.
    pub fn export_csv(&self) -> Option<CsvFile> {
        let filtered = self.get_filtered_history();
        if filtered.is_empty() {
            return None;
        }
        let mut csv = CsvFile::new(
            format!("attendance_history_{}.csv", self.year),
            &["Date", "Event", "Location", "Attendance", "Notes", "Payment"],
        );
        for record in filtered {
            let status = match record.status() {
                AttendanceStatus::None => "",
                status => status.label(),
            };
            csv.push_row([
                format_date(&record.event_date),
                record.event_name.clone(),
                record.event_location.clone().unwrap_or_default(),
                status.to_string(),
                record.notes.clone().unwrap_or_default(),
                record
                    .payment
                    .as_ref()
                    .map(|p| p.status().label().to_string())
                    .unwrap_or_default(),
            ]);
        }
        Some(csv)
    }
}

/// Group newest-first records under `YYYY-MM` headers, keeping their order.
fn group_by_month<'a>(
    records: &[&'a AttendanceRecord],
) -> Vec<(String, Vec<&'a AttendanceRecord>)> {
    let mut groups: Vec<(String, Vec<&AttendanceRecord>)> = Vec::new();
    for &record in records {
        let key = record_date(record)
            .map(|d| d.format("%Y-%m").to_string())
            .unwrap_or_default();
        match groups.last_mut() {
            Some((last, items)) if *last == key => items.push(record),
            _ => groups.push((key, vec![record])),
        }
    }
    groups
}

impl Controller for HistoryPage {
    type Action = HistoryAction;

    async fn load(&mut self, surface: &mut dyn Surface) {
        match self.api.get_attendance_history().await {
            Ok(history) => {
                self.history = history;
                self.render(surface);
            }
            Err(e) => report_failure(surface, "Failed to load history", &e),
        }
    }

    async fn dispatch(&mut self, action: HistoryAction, surface: &mut dyn Surface) {
        match action {
            HistoryAction::SetYear(year) => {
                self.year = year;
                self.render(surface);
            }
            HistoryAction::SetStatus(status) => {
                self.status = status;
                self.render_list(surface);
            }
            HistoryAction::Export => match self.export_csv() {
                Some(csv) => {
                    info!(rows = csv.record_count(), file = %csv.filename, "Exported history");
                    surface.download(csv);
                }
                None => surface.alert("No data to export"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::client::tests::{logged_in_client, mock_backend};
    use crate::views::tests::at;
    use crate::views::Page;

    async fn loaded_page() -> (HistoryPage, Page) {
        let (url, _) = mock_backend(|_| {
            json!({"success": true, "data": [
                {"eventId": "E1", "eventName": "Camp", "eventDate": "2024-03-02T10:00:00", "status": "attend",
                 "payment": {"status": "paid", "amount": 1000}},
                {"eventId": "E2", "eventName": "Meeting", "eventDate": "2024-03-20T19:00:00", "status": "absent",
                 "notes": "Work"},
                {"eventId": "E3", "eventName": "Hike", "eventDate": "2024-05-11", "status": "attend"},
                {"eventId": "E4", "eventName": "Party", "eventDate": "2024-05-30", "status": "pending"},
                {"eventId": "E5", "eventName": "Old", "eventDate": "2023-12-01", "status": "attend"}
            ]})
        })
        .await;
        let (_, api) = logged_in_client(&url);
        let mut history = HistoryPage::new(api).with_now(at("2024-06-01T12:00:00"));
        let mut page = Page::new();
        history.load(&mut page).await;
        (history, page)
    }

    #[tokio::test]
    async fn test_stats_for_year() {
        let (history, page) = loaded_page().await;
        let stats = history.stats();
        assert_eq!((stats.total, stats.attend, stats.absent, stats.pending), (4, 2, 1, 1));
        assert_eq!(stats.rate_text(), "50.0");

        let monthly = history.monthly();
        assert_eq!(monthly[2], MonthBucket { total: 2, attend: 1 });
        assert_eq!(monthly[4], MonthBucket { total: 2, attend: 1 });
        assert_eq!(monthly[0], MonthBucket::default());
        assert!(page.container("yearFilter").unwrap().contains(r#"value="2024" selected"#));
    }

    #[tokio::test]
    async fn test_filter_sort_and_grouping() {
        let (mut history, mut page) = loaded_page().await;
        let names: Vec<&str> = history
            .get_filtered_history()
            .iter()
            .map(|r| r.event_name.as_str())
            .collect();
        assert_eq!(names, vec!["Party", "Hike", "Meeting", "Camp"]);

        let groups = group_by_month(&history.get_filtered_history());
        let keys: Vec<&str> = groups.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["2024-05", "2024-03"]);

        history
            .dispatch(HistoryAction::SetStatus(Some(AttendanceStatus::Attend)), &mut page)
            .await;
        let list = page.container("historyList").unwrap();
        assert!(list.contains("Camp") && list.contains("Hike"));
        assert!(!list.contains("Meeting"));

        history.dispatch(HistoryAction::SetYear(2023), &mut page).await;
        assert_eq!(history.stats().total, 1);
    }

    #[tokio::test]
    async fn test_export() {
        let (mut history, mut page) = loaded_page().await;
        history.dispatch(HistoryAction::Export, &mut page).await;

        let csv = &page.downloads[0];
        assert_eq!(csv.filename, "attendance_history_2024.csv");
        assert_eq!(csv.record_count(), 4);
        assert_eq!(csv.rows[4], vec!["2024-03-02", "Camp", "", "Attending", "", "Paid"]);

        history.dispatch(HistoryAction::SetYear(2020), &mut page).await;
        history.dispatch(HistoryAction::Export, &mut page).await;
        assert_eq!(page.last_alert(), Some("No data to export"));
        assert_eq!(page.downloads.len(), 1);
    }
}
