//! Staff pages. Callers gate these with `Auth::require_admin`.

pub mod analytics;
pub mod checkin;
pub mod dashboard;
pub mod event_detail;
pub mod event_form;
pub mod events;
pub mod members;
pub mod payments;

pub use analytics::{AnalyticsAction, AnalyticsPage};
pub use checkin::{CheckinAction, CheckinPage};
pub use dashboard::{DashboardAction, DashboardPage};
pub use event_detail::{AdminEventDetailAction, AdminEventDetailPage, RosterStats};
pub use event_form::{EventFormAction, EventFormPage};
pub use events::{AdminEventsAction, AdminEventsPage, EventSort, EventStatusFilter};
pub use members::{MemberCounts, MembersAction, MembersPage, PhotoUpload};
pub use payments::{PaymentTab, PaymentTabStats, PaymentsAction, PaymentsPage};

use crate::models::Series;
use crate::utils::escape_html;

/// Chart data as a two-column table
fn series_table(class: &str, series: &Series, value: impl Fn(f64) -> String) -> String {
    let rows: String = series
        .points()
        .map(|(label, v)| {
            format!(
                "<tr><th>{}</th><td>{}</td></tr>",
                escape_html(label),
                value(v)
            )
        })
        .collect();
    format!(r#"<table class="chart {}">{}</table>"#, class, rows)
}

/// `<option>`s for a select, with an "All" entry first
fn options<'a>(values: impl IntoIterator<Item = &'a str>, selected: Option<&str>) -> String {
    let mut html = format!(
        r#"<option value="all"{}>All</option>"#,
        if selected.is_none() { " selected" } else { "" }
    );
    for value in values {
        html.push_str(&format!(
            r#"<option value="{0}"{1}>{0}</option>"#,
            escape_html(value),
            if selected == Some(value) { " selected" } else { "" }
        ));
    }
    html
}

/// `Some` for a real choice, `None` for an empty or "all" selection
pub fn choice(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty() && value != "all").then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_table() {
        let series = Series {
            labels: vec!["Jan".into(), "Feb".into()],
            values: vec![3.0, 5.0],
        };
        let html = series_table("attendance", &series, |v| format!("{}", v));
        assert!(html.contains("<tr><th>Feb</th><td>5</td></tr>"));
    }

    #[test]
    fn test_options_and_choice() {
        let html = options(["Tokyo", "Osaka"], Some("Osaka"));
        assert!(html.starts_with(r#"<option value="all">All</option>"#));
        assert!(html.contains(r#"<option value="Osaka" selected>Osaka</option>"#));

        assert_eq!(choice("all"), None);
        assert_eq!(choice(" "), None);
        assert_eq!(choice("Tokyo").as_deref(), Some("Tokyo"));
    }
}
