use anyhow::Result;
use chrono::{Datelike, NaiveDateTime};

use crate::api::ApiClient;
use crate::models::{Payment, PaymentStatus, Receipt};
use crate::utils::{escape_html, format_currency, format_date, parse_date};
use crate::views::{local_now, no_data, report_failure, Controller, Surface};

pub enum ReceiptsAction {
    SetYear(i32),
    /// `None` shows every status
    SetStatus(Option<PaymentStatus>),
    /// Open the event page to pay an outstanding fee
    RegisterPayment(String),
    ViewReceipt(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaymentSummaryTotals {
    pub total_amount: i64,
    pub paid_amount: i64,
    pub unpaid_amount: i64,
    pub unpaid_count: usize,
}

/// The member's fees for a year, plus issued receipts.
pub struct ReceiptsPage {
    api: ApiClient,
    now: NaiveDateTime,
    payments: Vec<Payment>,
    receipts: Vec<Receipt>,
    year: i32,
    status: Option<PaymentStatus>,
}

fn event_year(payment: &Payment) -> Option<i32> {
    parse_date(&payment.event_date).map(|d| d.year())
}

impl ReceiptsPage {
    pub fn new(api: ApiClient) -> Self {
        let now = local_now();
        Self {
            api,
            now,
            payments: Vec::new(),
            receipts: Vec::new(),
            year: now.year(),
            status: None,
        }
    }

    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self.year = now.year();
        self
    }

    fn year_payments(&self) -> impl Iterator<Item = &Payment> {
        let year = self.year;
        self.payments
            .iter()
            .filter(move |p| event_year(p) == Some(year))
    }

    /// Payments for the selected year and status, newest event first.
    pub fn get_filtered_payments(&self) -> Vec<&Payment> {
        let mut filtered: Vec<&Payment> = self.year_payments().collect();
        if let Some(status) = self.status {
            filtered.retain(|p| p.status() == status);
        }
        filtered.sort_by(|a, b| parse_date(&b.event_date).cmp(&parse_date(&a.event_date)));
        filtered
    }

    pub fn summary(&self) -> PaymentSummaryTotals {
        self.year_payments()
            .fold(PaymentSummaryTotals::default(), |mut totals, payment| {
                totals.total_amount += payment.amount;
                if payment.status().is_settled() {
                    totals.paid_amount += payment.amount;
                } else {
                    totals.unpaid_amount += payment.amount;
                    totals.unpaid_count += 1;
                }
                totals
            })
    }

    fn payment_card(payment: &Payment) -> String {
        let status = payment.status();
        let mut info = Vec::new();
        if let Some(paid_at) = payment.paid_at.as_deref() {
            info.push(format!(
                r#"<div class="payment-info"><span class="info-label">Paid on:</span><span>{}</span></div>"#,
                format_date(paid_at)
            ));
        }
        if let Some(method) = payment.method() {
            info.push(format!(
                r#"<div class="payment-info"><span class="info-label">Method:</span><span>{}</span></div>"#,
                escape_html(method.label())
            ));
        }
        if let Some(notes) = payment.notes.as_deref().filter(|n| !n.is_empty()) {
            info.push(format!(
                r#"<div class="payment-notes"><span class="info-label">Notes:</span><p>{}</p></div>"#,
                escape_html(notes)
            ));
        }

        let mut footer = Vec::new();
        if status == PaymentStatus::Pending {
            footer.push(format!(
                r#"<button class="btn-primary btn-sm" data-action="register-payment" data-id="{}">Pay now</button>"#,
                escape_html(&payment.id)
            ));
        }
        if let (PaymentStatus::Confirmed, Some(receipt_id)) = (status, payment.receipt_id.as_deref()) {
            footer.push(format!(
                r#"<button class="btn-secondary btn-sm" data-action="view-receipt" data-id="{}">View receipt</button>"#,
                escape_html(receipt_id)
            ));
        }
        footer.push(format!(
            r#"<a href="event-detail.html?id={}" class="btn-link btn-sm">Event details</a>"#,
            escape_html(&payment.event_id)
        ));

        format!(
            r#"<div class="payment-card"><div class="payment-header"><div class="payment-event"><h4>{name}</h4><p class="payment-date">📅 {date}</p></div><div class="payment-amount">{amount}</div></div><div class="payment-body"><div class="payment-status"><span class="status-label">Status:</span><span class="status-badge status-{class}">{label}</span></div>{info}</div><div class="payment-footer">{footer}</div></div>"#,
            name = escape_html(&payment.event_name),
            date = format_date(&payment.event_date),
            amount = format_currency(payment.amount),
            class = status.as_str(),
            label = status.label(),
            info = info.join(""),
            footer = footer.join(""),
        )
    }

    fn receipt_card(receipt: &Receipt) -> String {
        format!(
            r#"<div class="receipt-card"><div class="receipt-header"><div class="receipt-number">Receipt No. {number}</div><div class="receipt-date">{issued}</div></div><div class="receipt-body"><div class="info-row"><span class="info-label">Event:</span><span>{event}</span></div><div class="info-row"><span class="info-label">Amount:</span><span class="receipt-amount">{amount}</span></div></div><div class="receipt-footer"><button class="btn-secondary btn-sm" data-action="view-receipt" data-id="{id}">Preview</button></div></div>"#,
            number = escape_html(&receipt.receipt_number),
            issued = format_date(&receipt.issued_at),
            event = escape_html(&receipt.event_name),
            amount = format_currency(receipt.amount),
            id = escape_html(&receipt.id),
        )
    }

    fn receipt_preview(receipt: &Receipt) -> String {
        format!(
            r#"<div class="receipt-preview"><div class="receipt-title">Receipt</div><div class="receipt-number">No. {number}</div><div class="receipt-section"><div class="label">Received from</div><div class="value">{member}</div></div><div class="receipt-section"><div class="label">Amount</div><div class="amount-large">{amount}</div></div><div class="receipt-section"><div class="label">For</div><div class="value">Participation fee for {event}</div></div><div class="receipt-section"><div class="label">Issued</div><div class="value">{issued}</div></div><div class="receipt-issuer">Issued by: {issuer}</div></div>"#,
            number = escape_html(&receipt.receipt_number),
            member = escape_html(receipt.member_name.as_deref().unwrap_or_default()),
            amount = format_currency(receipt.amount),
            event = escape_html(&receipt.event_name),
            issued = format_date(&receipt.issued_at),
            issuer = escape_html(receipt.issuer_name.as_deref().unwrap_or("Administrator")),
        )
    }

    fn render_payments(&self, surface: &mut dyn Surface) {
        let filtered = self.get_filtered_payments();
        let html = if filtered.is_empty() {
            no_data("No payments")
        } else {
            filtered.into_iter().map(Self::payment_card).collect()
        };
        surface.render("paymentsList", html);
    }

    fn render_summary(&self, surface: &mut dyn Surface) {
        let totals = self.summary();
        surface.render(
            "paymentSummary",
            format!(
                r#"<div class="summary-item"><span class="label">Total</span><span id="totalAmount">{}</span></div><div class="summary-item"><span class="label">Paid</span><span id="paidAmount">{}</span></div><div class="summary-item"><span class="label">Unpaid</span><span id="unpaidAmount">{}</span></div><div class="summary-item"><span class="label">Unpaid fees</span><span id="unpaidCount">{}</span></div>"#,
                format_currency(totals.total_amount),
                format_currency(totals.paid_amount),
                format_currency(totals.unpaid_amount),
                totals.unpaid_count
            ),
        );
    }

    fn render(&self, surface: &mut dyn Surface) {
        self.render_payments(surface);
        let receipts = if self.receipts.is_empty() {
            no_data("No receipts")
        } else {
            self.receipts.iter().map(Self::receipt_card).collect()
        };
        surface.render("receiptsList", receipts);
        self.render_summary(surface);
    }

    async fn fetch(&mut self) -> Result<()> {
        let (payments, receipts) =
            futures::try_join!(self.api.get_payments(), self.api.get_receipts())?;
        self.payments = payments;
        self.receipts = receipts;
        Ok(())
    }
}

impl Controller for ReceiptsPage {
    type Action = ReceiptsAction;

    async fn load(&mut self, surface: &mut dyn Surface) {
        match self.fetch().await {
            Ok(()) => self.render(surface),
            Err(e) => report_failure(surface, "Failed to load payments", &e),
        }
    }

    async fn dispatch(&mut self, action: ReceiptsAction, surface: &mut dyn Surface) {
        match action {
            ReceiptsAction::SetYear(year) => {
                self.year = year;
                self.render_payments(surface);
                self.render_summary(surface);
            }
            ReceiptsAction::SetStatus(status) => {
                self.status = status;
                self.render_payments(surface);
            }
            ReceiptsAction::RegisterPayment(payment_id) => {
                if let Some(payment) = self.payments.iter().find(|p| p.id == payment_id) {
                    surface.redirect(&format!("event-detail.html?id={}", payment.event_id));
                }
            }
            ReceiptsAction::ViewReceipt(receipt_id) => {
                match self.api.get_receipt(&receipt_id).await {
                    Ok(receipt) => {
                        surface.render("receiptContent", Self::receipt_preview(&receipt))
                    }
                    Err(e) => report_failure(surface, "Failed to load the receipt", &e),
                }
            }
        }
    }
}
