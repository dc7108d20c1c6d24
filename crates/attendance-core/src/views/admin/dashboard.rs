use tracing::warn;

use super::series_table;
use crate::api::ApiClient;
use crate::models::{AnalyticsPeriod, DashboardStats};
use crate::utils::{escape_html, format_currency, format_date};
use crate::views::{payment_badge, report_failure, Controller, Surface};

pub enum DashboardAction {
    Refresh,
}

/// Staff landing page: this month's numbers, recent activity, alerts.
pub struct DashboardPage {
    api: ApiClient,
    stats: Option<DashboardStats>,
}

impl DashboardPage {
    pub fn new(api: ApiClient) -> Self {
        Self { api, stats: None }
    }

    pub fn stats(&self) -> Option<&DashboardStats> {
        self.stats.as_ref()
    }

    fn render_stats(stats: &DashboardStats, surface: &mut dyn Surface) {
        surface.render(
            "stats",
            format!(
                r#"<div class="stat-card"><span id="monthlyEvents">{}</span> events this month</div><div class="stat-card"><span id="monthlyAttendance">{}</span> attendances</div><div class="stat-card"><span id="monthlyRevenue">{}</span> revenue</div><div class="stat-card"><span id="activeMembers">{}</span> active members</div><div class="stat-card"><span id="attendanceRate">{:.1}</span>% attendance</div><div class="rate-bar" style="width: {:.1}%"></div>"#,
                stats.monthly_events,
                stats.monthly_attendance,
                format_currency(stats.monthly_revenue),
                stats.active_members,
                stats.attendance_rate,
                stats.attendance_rate
            ),
        );

        let events: String = stats
            .recent_events
            .iter()
            .map(|event| {
                format!(
                    r#"<div class="event-item"><div class="event-date">{}</div><div class="event-info"><div class="event-name">{}</div><div class="event-stats">Attending: {}/{}</div></div><a href="event-detail.html?id={}" class="btn-link">Details</a></div>"#,
                    format_date(&event.date),
                    escape_html(event.title()),
                    event.attendance_count.unwrap_or(0),
                    event.total_members.unwrap_or(0),
                    escape_html(event.id())
                )
            })
            .collect();
        surface.render("recentEvents", events);

        let payments: String = stats
            .recent_payments
            .iter()
            .map(|payment| {
                format!(
                    r#"<div class="payment-item"><div class="payment-member">{}</div><div class="payment-event">{}</div><div class="payment-amount">{}</div>{}</div>"#,
                    escape_html(&payment.member_name),
                    escape_html(&payment.event_name),
                    format_currency(payment.amount),
                    payment_badge(payment.status())
                )
            })
            .collect();
        surface.render("recentPayments", payments);

        let alerts = if stats.alerts.is_empty() {
            r#"<p class="no-alerts">No alerts</p>"#.to_string()
        } else {
            stats
                .alerts
                .iter()
                .map(|alert| {
                    format!(
                        r#"<div class="alert-item alert-{}"><div class="alert-icon">⚠️</div><div class="alert-content"><div class="alert-title">{}</div><div class="alert-message">{}</div></div>{}</div>"#,
                        escape_html(&alert.kind),
                        escape_html(&alert.title),
                        escape_html(&alert.message),
                        alert
                            .link
                            .as_deref()
                            .map(|l| format!(r#"<a href="{}" class="btn-link">Review</a>"#, escape_html(l)))
                            .unwrap_or_default()
                    )
                })
                .collect()
        };
        surface.render("alerts", alerts);
    }

    /// Charts are decoration: a failure is logged and the chart left empty.
    async fn render_charts(&self, surface: &mut dyn Surface) {
        let (attendance, revenue) = futures::join!(
            self.api.get_attendance_analytics(AnalyticsPeriod::Month),
            self.api.get_payment_analytics(AnalyticsPeriod::Month)
        );
        match attendance {
            Ok(series) => surface.render(
                "attendanceChart",
                series_table("attendance", &series, |v| format!("{}", v)),
            ),
            Err(e) => warn!(error = %format!("{:#}", e), "Failed to load attendance chart"),
        }
        match revenue {
            Ok(series) => surface.render(
                "revenueChart",
                series_table("revenue", &series, |v| format_currency(v.round() as i64)),
            ),
            Err(e) => warn!(error = %format!("{:#}", e), "Failed to load revenue chart"),
        }
    }
}

impl Controller for DashboardPage {
    type Action = DashboardAction;

    async fn load(&mut self, surface: &mut dyn Surface) {
        match self.api.get_dashboard_stats().await {
            Ok(stats) => {
                Self::render_stats(&stats, surface);
                self.stats = Some(stats);
            }
            Err(e) => {
                report_failure(surface, "Failed to load statistics", &e);
                return;
            }
        }
        self.render_charts(surface).await;
    }

    async fn dispatch(&mut self, action: DashboardAction, surface: &mut dyn Surface) {
        match action {
            DashboardAction::Refresh => {
                self.api.clear_all_cache();
                self.load(surface).await;
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
    use crate::views::Page;

    fn backend(action: &str) -> serde_json::Value {
        match action {
            "getDashboardStats" => json!({"success": true, "data": {
                "monthlyEvents": 4, "monthlyAttendance": 31, "monthlyRevenue": 45000,
                "activeMembers": 20, "attendanceRate": 77.5,
                "recentEvents": [{"id": "E1", "title": "Camp", "date": "2024-06-01",
                                  "attendanceCount": 12, "totalMembers": 20}],
                "recentPayments": [{"id": "P1", "memberName": "Sato", "eventName": "Camp",
                                    "amount": 3000, "status": "confirmed"}],
                "alerts": [{"type": "warning", "title": "Unpaid fees", "message": "3 members",
                            "link": "payments.html"}]
            }}),
            "getAttendanceAnalytics" => {
                json!({"success": true, "data": {"labels": ["W1", "W2"], "values": [10, 12]}})
            }
            _ => json!({"success": false, "error": "Not available"}),
        }
    }

    #[tokio::test]
    async fn test_load_renders_everything() {
        let (url, _) = mock_backend(backend).await;
        let (_, api) = logged_in_client(&url);
        let mut dashboard = DashboardPage::new(api);
        let mut page = Page::new();

        dashboard.load(&mut page).await;
        assert!(page.container("stats").unwrap().contains("¥45,000"));
        assert!(page.container("stats").unwrap().contains("77.5"));
        assert!(page.container("recentEvents").unwrap().contains("Attending: 12/20"));
        assert!(page.container("recentPayments").unwrap().contains("Confirmed"));
        assert!(page.container("alerts").unwrap().contains("alert-warning"));
        assert!(page.container("attendanceChart").unwrap().contains("<th>W2</th>"));
        // A failed chart stays silent
        assert!(page.container("revenueChart").is_none());
        assert!(page.alerts.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_clears_cache() {
        let (url, recorded) = mock_backend(backend).await;
        let (_, api) = logged_in_client(&url);
        let mut dashboard = DashboardPage::new(api);
        let mut page = Page::new();

        dashboard.load(&mut page).await;
        let after_load = recorded.hits.load(Ordering::SeqCst);
        dashboard.load(&mut page).await;
        // Stats come from cache, the uncached charts are fetched again
        assert_eq!(recorded.hits.load(Ordering::SeqCst), after_load + 2);

        dashboard.dispatch(DashboardAction::Refresh, &mut page).await;
        assert_eq!(recorded.hits.load(Ordering::SeqCst), after_load + 5);
    }

    #[tokio::test]
    async fn test_stats_failure_alerts() {
        let (url, _) = mock_backend(|_| json!({"success": false, "error": "Sheet missing"})).await;
        let (_, api) = logged_in_client(&url);
        let mut dashboard = DashboardPage::new(api);
        let mut page = Page::new();

        dashboard.load(&mut page).await;
        assert_eq!(page.last_alert(), Some("Failed to load statistics: Sheet missing"));
        assert!(dashboard.stats().is_none());
    }
}
