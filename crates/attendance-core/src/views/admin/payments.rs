use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use tracing::info;

use crate::api::ApiClient;
use crate::export::CsvFile;
use crate::models::{Payment, PaymentMethod};
use crate::utils::{contains_ignore_case, escape_html, format_currency, format_date, parse_date};
use crate::views::{local_now, no_data, report_failure, Controller, Surface};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaymentTab {
    #[default]
    Unpaid,
    Paid,
    Cancellation,
}

impl PaymentTab {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentTab::Unpaid => "unpaid",
            PaymentTab::Paid => "paid",
            PaymentTab::Cancellation => "cancellation",
        }
    }

    pub fn includes(&self, payment: &Payment) -> bool {
        match self {
            PaymentTab::Unpaid => !payment.is_paid() && !payment.is_cancellation_fee,
            PaymentTab::Paid => payment.is_paid() && !payment.is_cancellation_fee,
            PaymentTab::Cancellation => payment.is_cancellation_fee,
        }
    }
}

impl std::str::FromStr for PaymentTab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentTab::Unpaid),
            "paid" => Ok(PaymentTab::Paid),
            "cancellation" => Ok(PaymentTab::Cancellation),
            other => Err(format!("Unknown tab: {}", other)),
        }
    }
}

/// Count and amount shown on a tab. Cancellation only counts open fees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaymentTabStats {
    pub count: usize,
    pub amount: i64,
}

pub enum PaymentsAction {
    SwitchTab(PaymentTab),
    /// `None` shows every event
    SetEvent(Option<String>),
    SearchMember(String),
    SetMethod(Option<PaymentMethod>),
    Refresh,
    Confirm(String),
    IssueReceipt(String),
    Export,
}

/// Every payment across events, split into unpaid, paid and cancellation fees.
pub struct PaymentsPage {
    api: ApiClient,
    payments: Vec<Payment>,
    tab: PaymentTab,
    event_id: Option<String>,
    member_query: String,
    method: Option<PaymentMethod>,
}

impl PaymentsPage {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            payments: Vec::new(),
            tab: PaymentTab::default(),
            event_id: None,
            member_query: String::new(),
            method: None,
        }
    }

    pub fn tab(&self) -> PaymentTab {
        self.tab
    }

    pub fn tab_stats(&self, tab: PaymentTab) -> PaymentTabStats {
        let rows = self
            .payments
            .iter()
            .filter(|p| tab.includes(p))
            .filter(|p| tab != PaymentTab::Cancellation || !p.is_paid());
        let mut stats = PaymentTabStats::default();
        for p in rows {
            stats.count += 1;
            stats.amount += p.amount;
        }
        stats
    }

    /// Distinct events in first-seen order, as `(id, name)`
    pub fn event_options(&self) -> Vec<(&str, &str)> {
        let mut seen: Vec<(&str, &str)> = Vec::new();
        for p in &self.payments {
            if !seen.iter().any(|(id, _)| *id == p.event_id) {
                seen.push((p.event_id.as_str(), p.event_name.as_str()));
            }
        }
        seen
    }

    pub fn get_filtered_payments(&self) -> Vec<&Payment> {
        let mut filtered: Vec<&Payment> = self
            .payments
            .iter()
            .filter(|p| self.tab.includes(p))
            .filter(|p| self.event_id.as_deref().map_or(true, |id| p.event_id == id))
            .filter(|p| self.method.as_ref().map_or(true, |m| p.method() == Some(m)))
            .collect();

        if !self.member_query.is_empty() {
            let query = self.member_query.to_lowercase();
            filtered.retain(|p| contains_ignore_case(&p.member_name, &query));
        }

        filtered.sort_by(|a, b| parse_date(&b.event_date).cmp(&parse_date(&a.event_date)));
        filtered
    }

    fn payment_row(payment: &Payment) -> String {
        let id = escape_html(&payment.id);
        let kind = if payment.is_cancellation_fee {
            r#"<span class="badge badge-warning">Cancellation fee</span>"#
        } else {
            r#"<span class="badge badge-info">Fee</span>"#
        };
        let status = if payment.is_paid() {
            format!(
                r#"<span class="status-badge status-confirmed">Paid</span><br><small>{}</small>"#,
                payment.paid_at.as_deref().map(format_date).unwrap_or_default()
            )
        } else {
            r#"<span class="status-badge status-pending">Unpaid</span>"#.to_string()
        };
        let actions = if !payment.is_paid() {
            format!(r#"<button data-action="confirm" data-id="{}">Confirm payment</button>"#, id)
        } else if !payment.receipt_issued {
            format!(r#"<button data-action="receipt" data-id="{}">Issue receipt</button>"#, id)
        } else {
            format!(
                r#"<a href="{}" target="_blank" class="btn-link">View receipt</a>"#,
                escape_html(payment.receipt_url.as_deref().unwrap_or_default())
            )
        };
        format!(
            r#"<tr class="payment-row"><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td class="actions">{}</td></tr>"#,
            format_date(&payment.event_date),
            escape_html(&payment.event_name),
            escape_html(&payment.member_name),
            format_currency(payment.amount),
            escape_html(payment.method().map(|m| m.label()).unwrap_or("-")),
            kind,
            status,
            actions
        )
    }

    fn render_list(&self, surface: &mut dyn Surface) {
        let payments = self.get_filtered_payments();
        let html = if payments.is_empty() {
            no_data("No payments")
        } else {
            payments.iter().map(|p| Self::payment_row(p)).collect()
        };
        surface.render(&format!("{}List", self.tab.as_str()), html);
    }

    fn render_stats(&self, surface: &mut dyn Surface) {
        let html: String = [PaymentTab::Unpaid, PaymentTab::Paid, PaymentTab::Cancellation]
            .iter()
            .map(|tab| {
                let stats = self.tab_stats(*tab);
                format!(
                    r#"<span id="{0}Count">{1}</span><span id="{0}Amount">{2}</span>"#,
                    tab.as_str(),
                    stats.count,
                    format_currency(stats.amount)
                )
            })
            .collect();
        surface.render("paymentStats", html);
    }

    fn render_event_filter(&self, surface: &mut dyn Surface) {
        let mut html = String::from(r#"<option value="all">All events</option>"#);
        for (id, name) in self.event_options() {
            html.push_str(&format!(
                r#"<option value="{}"{}>{}</option>"#,
                escape_html(id),
                if self.event_id.as_deref() == Some(id) { " selected" } else { "" },
                escape_html(name)
            ));
        }
        surface.render("eventFilter", html);
    }

    async fn reload(&mut self, surface: &mut dyn Surface) {
        match self.api.get_payments().await {
            Ok(payments) => {
                self.payments = payments;
                self.render_list(surface);
                self.render_stats(surface);
                self.render_event_filter(surface);
            }
            Err(e) => report_failure(surface, "Failed to load payments", &e),
        }
    }

    fn find(&self, payment_id: &str) -> Result<&Payment> {
        self.payments
            .iter()
            .find(|p| p.id == payment_id)
            .ok_or_else(|| anyhow!("Payment {} was not found", payment_id))
    }

    async fn confirm(&self, payment_id: &str) -> Result<()> {
        let payment = self.find(payment_id)?;
        self.api.confirm_payment(payment_id).await?;
        info!(payment_id, member = %payment.member_name, amount = payment.amount, "Confirmed payment");
        Ok(())
    }

    async fn issue_receipt(&self, payment_id: &str) -> Result<()> {
        self.find(payment_id)?;
        self.api.issue_receipt(payment_id).await?;
        info!(payment_id, "Issued receipt");
        Ok(())
    }

    pub fn export_csv(&self, today: NaiveDate) -> Option<CsvFile> {
        let payments = self.get_filtered_payments();
        if payments.is_empty() {
            return None;
        }
        let mut csv = CsvFile::new(
            format!("payments_{}_{}.csv", self.tab.as_str(), today.format("%Y-%m-%d")),
            &["Event date", "Event", "Member", "Amount", "Method", "Kind", "Status", "Paid on"],
        );
        for p in payments {
            let paid = p.is_paid();
            csv.push_row([
                format_date(&p.event_date),
                p.event_name.clone(),
                p.member_name.clone(),
                p.amount.to_string(),
                p.method().map(|m| m.label().to_string()).unwrap_or_default(),
                if p.is_cancellation_fee { "Cancellation fee" } else { "Fee" }.to_string(),
                if paid { "Paid" } else { "Unpaid" }.to_string(),
                if paid {
                    p.paid_at.as_deref().map(format_date).unwrap_or_default()
                } else {
                    String::new()
                },
            ]);
        }
        Some(csv)
    }
}

impl Controller for PaymentsPage {
    type Action = PaymentsAction;

    async fn load(&mut self, surface: &mut dyn Surface) {
        self.reload(surface).await;
    }

    async fn dispatch(&mut self, action: PaymentsAction, surface: &mut dyn Surface) {
        match action {
            PaymentsAction::SwitchTab(tab) => {
                self.tab = tab;
                self.render_list(surface);
            }
            PaymentsAction::SetEvent(event_id) => {
                self.event_id = event_id;
                self.render_list(surface);
            }
            PaymentsAction::SearchMember(query) => {
                self.member_query = query;
                self.render_list(surface);
            }
            PaymentsAction::SetMethod(method) => {
                self.method = method;
                self.render_list(surface);
            }
            PaymentsAction::Refresh => self.reload(surface).await,
            PaymentsAction::Confirm(id) => match self.confirm(&id).await {
                Ok(()) => {
                    surface.alert("Payment confirmed");
                    self.reload(surface).await;
                }
                Err(e) => report_failure(surface, "Failed to confirm the payment", &e),
            },
            PaymentsAction::IssueReceipt(id) => match self.issue_receipt(&id).await {
                Ok(()) => {
                    surface.alert("Receipt issued");
                    self.reload(surface).await;
                }
                Err(e) => report_failure(surface, "Failed to issue the receipt", &e),
            },
            PaymentsAction::Export => match self.export_csv(local_now().date()) {
                Some(csv) => {
                    info!(rows = csv.record_count(), file = %csv.filename, "Exported payments");
                    surface.download(csv);
                    surface.alert("Payments exported");
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
    use crate::views::Page;

    fn backend(action: &str) -> serde_json::Value {
        match action {
            "getPayments" => json!({"success": true, "data": [
                {"id": "P1", "eventId": "E1", "eventName": "Camp", "eventDate": "2024-05-01",
                 "memberName": "Tanaka", "amount": 3000, "paymentMethod": "cash", "paid": false},
                {"id": "P2", "eventId": "E2", "eventName": "Hike", "eventDate": "2024-06-01",
                 "memberName": "Sato", "amount": 1000, "paymentMethod": "paypay", "paid": true,
                 "paidAt": "2024-06-02"},
                {"id": "P3", "eventId": "E2", "eventName": "Hike", "eventDate": "2024-06-01",
                 "memberName": "Abe", "amount": 1000, "paymentMethod": "bank", "paid": false},
                {"id": "P4", "eventId": "E1", "eventName": "Camp", "eventDate": "2024-05-01",
                 "memberName": "Kato", "amount": 1500, "isCancellationFee": true, "paid": false},
                {"id": "P5", "eventId": "E1", "eventName": "Camp", "eventDate": "2024-05-01",
                 "memberName": "Ito", "amount": 1500, "isCancellationFee": true, "paid": true,
                 "receiptIssued": true, "receiptUrl": "https://r/5"}
            ]}),
            _ => json!({"success": true}),
        }
    }

    fn ids(page: &PaymentsPage) -> Vec<&str> {
        page.get_filtered_payments().iter().map(|p| p.id.as_str()).collect()
    }

    async fn loaded() -> (PaymentsPage, Page, crate::api::client::tests::Recorded) {
        let (url, recorded) = mock_backend(backend).await;
        let (_, api) = logged_in_client(&url);
        let mut payments = PaymentsPage::new(api);
        let mut page = Page::new();
        payments.load(&mut page).await;
        (payments, page, recorded)
    }

    #[tokio::test]
    async fn test_tabs_and_stats() {
        let (mut payments, mut page, _) = loaded().await;

        assert_eq!(ids(&payments), vec!["P3", "P1"]);
        assert_eq!(
            payments.tab_stats(PaymentTab::Unpaid),
            PaymentTabStats { count: 2, amount: 4000 }
        );
        assert_eq!(
            payments.tab_stats(PaymentTab::Cancellation),
            PaymentTabStats { count: 1, amount: 1500 }
        );
        assert!(page.container("paymentStats").unwrap().contains(r#"<span id="paidCount">1</span>"#));

        payments
            .dispatch(PaymentsAction::SwitchTab(PaymentTab::Cancellation), &mut page)
            .await;
        assert_eq!(ids(&payments), vec!["P4", "P5"]);
        let list = page.container("cancellationList").unwrap();
        assert!(list.contains("View receipt") && list.contains("https://r/5"));
    }

    #[tokio::test]
    async fn test_filters() {
        let (mut payments, mut page, _) = loaded().await;
        assert_eq!(payments.event_options(), vec![("E1", "Camp"), ("E2", "Hike")]);

        payments
            .dispatch(PaymentsAction::SetEvent(Some("E1".into())), &mut page)
            .await;
        assert_eq!(ids(&payments), vec!["P1"]);
        payments.dispatch(PaymentsAction::SetEvent(None), &mut page).await;
        payments
            .dispatch(PaymentsAction::SetMethod(Some(PaymentMethod::Bank)), &mut page)
            .await;
        assert_eq!(ids(&payments), vec!["P3"]);
        payments
            .dispatch(PaymentsAction::SearchMember("TAN".into()), &mut page)
            .await;
        assert!(page.container("unpaidList").unwrap().contains("No payments"));
    }

    #[tokio::test]
    async fn test_confirm_and_receipt() {
        let (mut payments, mut page, recorded) = loaded().await;

        payments.dispatch(PaymentsAction::Confirm("P1".into()), &mut page).await;
        let body = recorded.last_body.lock().unwrap().clone().unwrap();
        assert_eq!(body["action"], "confirmPayment");
        assert_eq!(body["paymentId"], "P1");
        assert_eq!(page.last_alert(), Some("Payment confirmed"));

        payments.dispatch(PaymentsAction::IssueReceipt("P2".into()), &mut page).await;
        let body = recorded.last_body.lock().unwrap().clone().unwrap();
        assert_eq!(body["action"], "issueReceipt");

        payments.dispatch(PaymentsAction::Confirm("P9".into()), &mut page).await;
        assert_eq!(
            page.last_alert(),
            Some("Failed to confirm the payment: Payment P9 was not found")
        );
    }

    #[tokio::test]
    async fn test_export_follows_tab() {
        let (mut payments, mut page, _) = loaded().await;
        payments
            .dispatch(PaymentsAction::SwitchTab(PaymentTab::Paid), &mut page)
            .await;

        let csv = payments
            .export_csv(NaiveDate::from_ymd_opt(2024, 6, 5).unwrap())
            .unwrap();
        assert_eq!(csv.filename, "payments_paid_2024-06-05.csv");
        assert_eq!(
            csv.rows[1],
            vec!["2024-06-01", "Hike", "Sato", "1000", "PayPay", "Fee", "Paid", "2024-06-02"]
        );

        payments
            .dispatch(PaymentsAction::SearchMember("nobody".into()), &mut page)
            .await;
        payments.dispatch(PaymentsAction::Export, &mut page).await;
        assert_eq!(page.last_alert(), Some("No data to export"));
        assert!(page.downloads.is_empty());
    }
}
