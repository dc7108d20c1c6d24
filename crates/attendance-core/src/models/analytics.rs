use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::de;
use super::event::Event;
use super::payment::Payment;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardStats {
    #[serde(rename = "monthlyEvents", default, deserialize_with = "de::amount")]
    pub monthly_events: i64,
    #[serde(rename = "monthlyAttendance", default, deserialize_with = "de::amount")]
    pub monthly_attendance: i64,
    #[serde(rename = "monthlyRevenue", default, deserialize_with = "de::amount")]
    pub monthly_revenue: i64,
    #[serde(rename = "activeMembers", default, deserialize_with = "de::amount")]
    pub active_members: i64,
    #[serde(rename = "attendanceRate", default, deserialize_with = "de::float")]
    pub attendance_rate: f64,
    #[serde(rename = "recentEvents", default)]
    pub recent_events: Vec<Event>,
    #[serde(rename = "recentPayments", default)]
    pub recent_payments: Vec<Payment>,
    #[serde(default)]
    pub alerts: Vec<DashboardAlert>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardAlert {
    /// `warning`, `info`, ...; used as a CSS modifier
    #[serde(rename = "type", default, deserialize_with = "de::text")]
    pub kind: String,
    #[serde(default, deserialize_with = "de::text")]
    pub title: String,
    #[serde(default, deserialize_with = "de::text")]
    pub message: String,
    pub link: Option<String>,
}

/// Labelled chart data from the period analytics endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub values: Vec<f64>,
}

impl Series {
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn points(&self) -> impl Iterator<Item = (&str, f64)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    #[serde(rename = "totalEvents", default, deserialize_with = "de::amount")]
    pub total_events: i64,
    #[serde(rename = "totalAttendances", default, deserialize_with = "de::amount")]
    pub total_attendances: i64,
    #[serde(rename = "averageAttendanceRate", default, deserialize_with = "de::float")]
    pub average_attendance_rate: f64,
    #[serde(rename = "totalRevenue", default, deserialize_with = "de::amount")]
    pub total_revenue: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trend {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(rename = "attendanceRates", default)]
    pub attendance_rates: Vec<f64>,
    #[serde(rename = "attendanceCounts", default)]
    pub attendance_counts: Vec<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberAnalytics {
    #[serde(default, deserialize_with = "de::text")]
    pub name: String,
    pub affiliation: Option<String>,
    pub position: Option<String>,
    #[serde(rename = "attendedCount", default, deserialize_with = "de::amount")]
    pub attended_count: i64,
    #[serde(rename = "totalEvents", default, deserialize_with = "de::amount")]
    pub total_events: i64,
    #[serde(rename = "attendanceRate", default, deserialize_with = "de::float")]
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Analytics {
    pub summary: Option<AnalyticsSummary>,
    pub trend: Option<Trend>,
    #[serde(rename = "topMembers", default)]
    pub top_members: Vec<MemberAnalytics>,
    #[serde(rename = "memberDetails", default)]
    pub member_details: Vec<MemberAnalytics>,
}

/// Preset date ranges for the analytics page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalyticsPeriod {
    Week,
    #[default]
    Month,
    Quarter,
    Year,
}

impl AnalyticsPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsPeriod::Week => "week",
            AnalyticsPeriod::Month => "month",
            AnalyticsPeriod::Quarter => "quarter",
            AnalyticsPeriod::Year => "year",
        }
    }

    /// `(start, end)` for the period ending at `now`.
    pub fn range(&self, now: NaiveDateTime) -> (NaiveDate, NaiveDate) {
        let today = now.date();
        let start = match self {
            AnalyticsPeriod::Week => today - Duration::days(7),
            AnalyticsPeriod::Month => today.with_day(1).unwrap_or(today),
            AnalyticsPeriod::Quarter => {
                let first_month = (today.month0() / 3) * 3 + 1;
                NaiveDate::from_ymd_opt(today.year(), first_month, 1).unwrap_or(today)
            }
            AnalyticsPeriod::Year => NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
        };
        (start, today)
    }
}

impl std::str::FromStr for AnalyticsPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "week" => Ok(AnalyticsPeriod::Week),
            "month" => Ok(AnalyticsPeriod::Month),
            "quarter" => Ok(AnalyticsPeriod::Quarter),
            "year" => Ok(AnalyticsPeriod::Year),
            other => Err(format!("Unknown period: {}", other)),
        }
    }
}

/// Filters sent with `getAnalytics`. `None` means "all".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub affiliation: Option<String>,
    pub position: Option<String>,
    pub tag: Option<String>,
}

impl AnalyticsQuery {
    pub fn for_period(period: AnalyticsPeriod, now: NaiveDateTime) -> Self {
        let (start_date, end_date) = period.range(now);
        Self {
            start_date,
            end_date,
            affiliation: None,
            position: None,
            tag: None,
        }
    }

    /// The `days` days up to and including today
    pub fn last_days(days: i64, now: NaiveDateTime) -> Self {
        let end_date = now.date();
        Self {
            start_date: end_date - Duration::days(days),
            end_date,
            affiliation: None,
            position: None,
            tag: None,
        }
    }

    pub fn to_params(&self) -> Value {
        let mut params = Map::new();
        params.insert("startDate".into(), json!(self.start_date.format("%Y-%m-%d").to_string()));
        params.insert("endDate".into(), json!(self.end_date.format("%Y-%m-%d").to_string()));
        for (key, value) in [
            ("affiliation", &self.affiliation),
            ("position", &self.position),
            ("tag", &self.tag),
        ] {
            params.insert(key.into(), json!(value.as_deref().unwrap_or("all")));
        }
        Value::Object(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str) -> NaiveDateTime {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(15, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_period_ranges() {
        let now = at("2024-08-20");
        let day = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();

        assert_eq!(AnalyticsPeriod::Week.range(now), (day("2024-08-13"), day("2024-08-20")));
        assert_eq!(AnalyticsPeriod::Month.range(now), (day("2024-08-01"), day("2024-08-20")));
        assert_eq!(AnalyticsPeriod::Quarter.range(now), (day("2024-07-01"), day("2024-08-20")));
        assert_eq!(AnalyticsPeriod::Year.range(now), (day("2024-01-01"), day("2024-08-20")));
    }

    #[test]
    fn test_query_params_default_to_all() {
        let mut query = AnalyticsQuery::for_period(AnalyticsPeriod::Month, at("2024-03-05"));
        query.tag = Some("camp".to_string());
        let params = query.to_params();
        assert_eq!(params["startDate"], "2024-03-01");
        assert_eq!(params["endDate"], "2024-03-05");
        assert_eq!(params["affiliation"], "all");
        assert_eq!(params["tag"], "camp");
    }

    #[test]
    fn test_last_days() {
        let query = AnalyticsQuery::last_days(30, at("2024-03-05"));
        assert_eq!(query.start_date, NaiveDate::from_ymd_opt(2024, 2, 4).unwrap());
        assert_eq!(query.end_date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }

    #[test]
    fn test_dashboard_stats_tolerates_missing_lists() {
        let stats: DashboardStats =
            serde_json::from_str(r#"{"monthlyEvents": 4, "attendanceRate": "82.5"}"#).unwrap();
        assert_eq!(stats.monthly_events, 4);
        assert_eq!(stats.attendance_rate, 82.5);
        assert!(stats.recent_events.is_empty());
        assert!(stats.alerts.is_empty());
    }

    #[test]
    fn test_series_points() {
        let series: Series =
            serde_json::from_str(r#"{"labels": ["Jan", "Feb"], "values": [3, 5]}"#).unwrap();
        assert_eq!(series.total(), 8.0);
        assert_eq!(series.points().collect::<Vec<_>>(), vec![("Jan", 3.0), ("Feb", 5.0)]);
    }
}
