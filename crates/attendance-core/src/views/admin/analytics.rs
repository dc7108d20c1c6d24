use chrono::{NaiveDate, NaiveDateTime};
use tracing::{info, warn};

use super::options;
use crate::api::ApiClient;
use crate::export::CsvFile;
use crate::models::{Analytics, AnalyticsPeriod, AnalyticsQuery, Masters, MemberAnalytics};
use crate::utils::{escape_html, format_currency};
use crate::views::{local_now, no_data, report_failure, Controller, Surface};

/// Days covered when the page opens
const DEFAULT_RANGE_DAYS: i64 = 30;

pub enum AnalyticsAction {
    SetPeriod(AnalyticsPeriod),
    SetRange { start: NaiveDate, end: NaiveDate },
    SetAffiliation(Option<String>),
    SetPosition(Option<String>),
    SetTag(Option<String>),
    Refresh,
    Export,
}

/// Attendance analytics over a date range, with member filters.
pub struct AnalyticsPage {
    api: ApiClient,
    now: NaiveDateTime,
    masters: Masters,
    query: AnalyticsQuery,
    data: Option<Analytics>,
}

impl AnalyticsPage {
    pub fn new(api: ApiClient) -> Self {
        Self::starting_at(api, local_now())
    }

    pub fn with_now(self, now: NaiveDateTime) -> Self {
        Self::starting_at(self.api, now)
    }

    fn starting_at(api: ApiClient, now: NaiveDateTime) -> Self {
        Self {
            api,
            now,
            masters: Masters::default(),
            query: AnalyticsQuery::last_days(DEFAULT_RANGE_DAYS, now),
            data: None,
        }
    }

    /// Start from `query` instead of the default range
    pub fn with_query(mut self, query: AnalyticsQuery) -> Self {
        self.query = query;
        self
    }

    pub fn query(&self) -> &AnalyticsQuery {
        &self.query
    }

    pub fn data(&self) -> Option<&Analytics> {
        self.data.as_ref()
    }

    fn render_filters(&self, surface: &mut dyn Surface) {
        let m = &self.masters;
        let q = &self.query;
        surface.render(
            "affiliationFilter",
            options(m.affiliations.iter().map(String::as_str), q.affiliation.as_deref()),
        );
        surface.render(
            "positionFilter",
            options(m.positions.iter().map(String::as_str), q.position.as_deref()),
        );
        surface.render("tagFilter", options(m.tags.iter().map(String::as_str), q.tag.as_deref()));
        surface.render(
            "dateRange",
            format!(
                r#"<input type="date" id="startDate" value="{}"><input type="date" id="endDate" value="{}">"#,
                q.start_date.format("%Y-%m-%d"),
                q.end_date.format("%Y-%m-%d")
            ),
        );
    }

    fn member_line(rank: usize, member: &MemberAnalytics) -> String {
        let details = match (member.affiliation.as_deref(), member.position.as_deref()) {
            (Some(a), Some(p)) => format!("{} / {}", escape_html(a), escape_html(p)),
            (Some(a), None) => escape_html(a),
            (None, Some(p)) => format!("/ {}", escape_html(p)),
            (None, None) => String::new(),
        };
        format!(
            r#"<div class="top-member-item"><div class="rank">{}</div><div class="member-info"><div class="member-name">{}</div><div class="member-details">{}</div></div><div class="member-stats"><div class="stat-value">{:.1}%</div><div class="stat-label">{}/{} events</div></div></div>"#,
            rank,
            escape_html(&member.name),
            details,
            member.attendance_rate,
            member.attended_count,
            member.total_events
        )
    }

    fn render_data(&self, data: &Analytics, surface: &mut dyn Surface) {
        let summary = data.summary.clone().unwrap_or_default();
        surface.render(
            "summary",
            format!(
                r#"<span id="totalEvents">{}</span><span id="totalAttendances">{}</span><span id="averageAttendanceRate">{:.1}</span><span id="totalRevenue">{}</span>"#,
                summary.total_events,
                summary.total_attendances,
                summary.average_attendance_rate,
                format_currency(summary.total_revenue)
            ),
        );

        if let Some(trend) = &data.trend {
            let rows: String = trend
                .labels
                .iter()
                .enumerate()
                .map(|(i, label)| {
                    format!(
                        "<tr><th>{}</th><td>{:.1}%</td><td>{}</td></tr>",
                        escape_html(label),
                        trend.attendance_rates.get(i).copied().unwrap_or_default(),
                        trend.attendance_counts.get(i).copied().unwrap_or_default()
                    )
                })
                .collect();
            surface.render(
                "attendanceTrendChart",
                format!(r#"<table class="chart trend">{}</table>"#, rows),
            );
        }

        let top = if data.top_members.is_empty() {
            no_data("No attendance in this range")
        } else {
            data.top_members
                .iter()
                .enumerate()
                .map(|(i, m)| Self::member_line(i + 1, m))
                .collect()
        };
        surface.render("topMembersList", top);
    }

    async fn reload(&mut self, surface: &mut dyn Surface) {
        match self.api.get_analytics(&self.query).await {
            Ok(data) => {
                self.render_data(&data, surface);
                self.data = Some(data);
            }
            Err(e) => report_failure(surface, "Failed to load analytics", &e),
        }
    }

    pub fn export_csv(&self) -> Option<CsvFile> {
        let data = self.data.as_ref()?;
        let mut csv = CsvFile::new(
            format!(
                "attendance_analytics_{}_{}.csv",
                self.query.start_date.format("%Y-%m-%d"),
                self.query.end_date.format("%Y-%m-%d")
            ),
            &["Name", "Affiliation", "Position", "Attended", "Events", "Attendance rate (%)"],
        );
        for m in &data.member_details {
            csv.push_row([
                m.name.clone(),
                m.affiliation.clone().unwrap_or_default(),
                m.position.clone().unwrap_or_default(),
                m.attended_count.to_string(),
                m.total_events.to_string(),
                format!("{:.1}", m.attendance_rate),
            ]);
        }
        Some(csv)
    }
}

impl Controller for AnalyticsPage {
    type Action = AnalyticsAction;

    async fn load(&mut self, surface: &mut dyn Surface) {
        match self.api.get_masters().await {
            Ok(masters) => self.masters = masters,
            Err(e) => warn!(error = %format!("{:#}", e), "Failed to load masters"),
        }
        self.render_filters(surface);
        self.reload(surface).await;
    }

    async fn dispatch(&mut self, action: AnalyticsAction, surface: &mut dyn Surface) {
        match action {
            AnalyticsAction::SetPeriod(period) => {
                let (start, end) = period.range(self.now);
                self.query.start_date = start;
                self.query.end_date = end;
            }
            AnalyticsAction::SetRange { start, end } => {
                self.query.start_date = start;
                self.query.end_date = end;
            }
            AnalyticsAction::SetAffiliation(value) => self.query.affiliation = value,
            AnalyticsAction::SetPosition(value) => self.query.position = value,
            AnalyticsAction::SetTag(value) => self.query.tag = value,
            AnalyticsAction::Refresh => {}
            AnalyticsAction::Export => {
                match self.export_csv() {
                    Some(csv) => {
                        info!(rows = csv.record_count(), file = %csv.filename, "Exported analytics");
                        surface.download(csv);
                        surface.alert("Analytics exported");
                    }
                    None => surface.alert("No data to export"),
                }
                return;
            }
        }
        self.render_filters(surface);
        self.reload(surface).await;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::client::tests::{logged_in_client, mock_backend};
    use crate::views::tests::at;
    use crate::views::Page;

    fn backend(action: &str) -> serde_json::Value {
        match action {
            "getMasters" => json!({"success": true, "data": {
                "affiliations": ["Tokyo"], "positions": ["Chair"], "tags": ["camp"]
            }}),
            "getAnalytics" => json!({"success": true, "data": {
                "summary": {"totalEvents": 5, "totalAttendances": 40, "averageAttendanceRate": 80,
                            "totalRevenue": 120000},
                "trend": {"labels": ["W1", "W2"], "attendanceRates": [75, 85], "attendanceCounts": [6, 7]},
                "topMembers": [{"name": "Sato", "affiliation": "Tokyo", "position": "Chair",
                                "attendedCount": 5, "totalEvents": 5, "attendanceRate": 100}],
                "memberDetails": [
                    {"name": "Sato", "affiliation": "Tokyo", "attendedCount": 5, "totalEvents": 5, "attendanceRate": 100},
                    {"name": "Abe", "attendedCount": 2, "totalEvents": 3, "attendanceRate": 66.666}
                ]
            }}),
            _ => json!({"success": false, "error": "Unknown action"}),
        }
    }

    fn query_value(recorded: &crate::api::client::tests::Recorded, key: &str) -> Option<String> {
        recorded
            .last_query
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    #[tokio::test]
    async fn test_default_range_is_last_30_days() {
        let (url, recorded) = mock_backend(backend).await;
        let (_, api) = logged_in_client(&url);
        let mut analytics = AnalyticsPage::new(api).with_now(at("2024-06-30T10:00:00"));
        let mut page = Page::new();

        analytics.load(&mut page).await;
        assert_eq!(query_value(&recorded, "startDate").as_deref(), Some("2024-05-31"));
        assert_eq!(query_value(&recorded, "endDate").as_deref(), Some("2024-06-30"));
        assert_eq!(query_value(&recorded, "tag").as_deref(), Some("all"));

        assert!(page.container("summary").unwrap().contains("¥120,000"));
        assert!(page.container("topMembersList").unwrap().contains("Tokyo / Chair"));
        assert!(page.container("attendanceTrendChart").unwrap().contains("85.0%"));
        assert!(page.container("tagFilter").unwrap().contains("camp"));
    }

    #[tokio::test]
    async fn test_filters_reload_with_params() {
        let (url, recorded) = mock_backend(backend).await;
        let (_, api) = logged_in_client(&url);
        let mut analytics = AnalyticsPage::new(api).with_now(at("2024-08-20T10:00:00"));
        let mut page = Page::new();
        analytics.load(&mut page).await;

        analytics
            .dispatch(AnalyticsAction::SetPeriod(AnalyticsPeriod::Quarter), &mut page)
            .await;
        assert_eq!(query_value(&recorded, "startDate").as_deref(), Some("2024-07-01"));

        analytics
            .dispatch(AnalyticsAction::SetAffiliation(Some("Tokyo".into())), &mut page)
            .await;
        assert_eq!(query_value(&recorded, "affiliation").as_deref(), Some("Tokyo"));
        assert!(page
            .container("affiliationFilter")
            .unwrap()
            .contains(r#"<option value="Tokyo" selected>"#));
    }

    #[tokio::test]
    async fn test_initial_query_is_sent_once() {
        let (url, recorded) = mock_backend(backend).await;
        let (_, api) = logged_in_client(&url);
        let base = AnalyticsPage::new(api).with_now(at("2024-06-30T10:00:00"));
        let mut query = base.query().clone();
        query.tag = Some("camp".into());
        let mut analytics = base.with_query(query);
        let mut page = Page::new();

        analytics.load(&mut page).await;
        assert_eq!(query_value(&recorded, "tag").as_deref(), Some("camp"));
        // getMasters and one getAnalytics
        assert_eq!(recorded.hits.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert!(page
            .container("tagFilter")
            .unwrap()
            .contains(r#"<option value="camp" selected>"#));
    }

    #[tokio::test]
    async fn test_export_member_details() {
        let (url, _) = mock_backend(backend).await;
        let (_, api) = logged_in_client(&url);
        let mut analytics = AnalyticsPage::new(api).with_now(at("2024-06-30T10:00:00"));
        let mut page = Page::new();

        analytics.dispatch(AnalyticsAction::Export, &mut page).await;
        assert_eq!(page.last_alert(), Some("No data to export"));

        analytics.load(&mut page).await;
        analytics.dispatch(AnalyticsAction::Export, &mut page).await;
        let csv = &page.downloads[0];
        assert_eq!(csv.filename, "attendance_analytics_2024-05-31_2024-06-30.csv");
        assert_eq!(csv.rows[2], vec!["Abe", "", "", "2", "3", "66.7"]);
    }
}
