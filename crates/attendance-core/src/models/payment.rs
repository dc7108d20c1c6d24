use serde::{Deserialize, Serialize};

use super::de;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Confirmed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Confirmed => "confirmed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Unpaid",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Confirmed => "Confirmed",
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Confirmed)
    }
}

impl From<String> for PaymentStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or(PaymentStatus::Pending)
    }
}

impl From<PaymentStatus> for String {
    fn from(value: PaymentStatus) -> Self {
        value.as_str().to_string()
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "confirmed" => Ok(PaymentStatus::Confirmed),
            other => Err(format!("Unknown payment status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PaymentMethod {
    Cash,
    Bank,
    PayPay,
    LinePay,
    Other(String),
}

impl PaymentMethod {
    pub fn as_str(&self) -> &str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Bank => "bank",
            PaymentMethod::PayPay => "paypay",
            PaymentMethod::LinePay => "line_pay",
            PaymentMethod::Other(other) => other,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            PaymentMethod::Cash => "Cash on site",
            PaymentMethod::Bank => "Bank transfer",
            PaymentMethod::PayPay => "PayPay",
            PaymentMethod::LinePay => "LINE Pay",
            PaymentMethod::Other(other) if other == "other" => "Other",
            PaymentMethod::Other(other) => other,
        }
    }
}

impl From<String> for PaymentMethod {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "cash" => PaymentMethod::Cash,
            "bank" => PaymentMethod::Bank,
            "paypay" => PaymentMethod::PayPay,
            "line_pay" | "linepay" => PaymentMethod::LinePay,
            _ => PaymentMethod::Other(value),
        }
    }
}

impl From<PaymentMethod> for String {
    fn from(value: PaymentMethod) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Payment {
    #[serde(default, deserialize_with = "de::text")]
    pub id: String,
    #[serde(rename = "eventId", default, deserialize_with = "de::text")]
    pub event_id: String,
    #[serde(rename = "eventName", default, deserialize_with = "de::text")]
    pub event_name: String,
    #[serde(rename = "eventDate", default, deserialize_with = "de::text")]
    pub event_date: String,
    #[serde(rename = "memberName", default, deserialize_with = "de::text")]
    pub member_name: String,
    #[serde(default, deserialize_with = "de::amount")]
    pub amount: i64,
    /// Admin listings use `paymentMethod`, member listings `method`
    #[serde(rename = "paymentMethod")]
    pub payment_method: Option<PaymentMethod>,
    pub method: Option<PaymentMethod>,
    pub status: Option<PaymentStatus>,
    #[serde(default, deserialize_with = "de::flag")]
    pub paid: bool,
    #[serde(rename = "paidAt")]
    pub paid_at: Option<String>,
    pub notes: Option<String>,
    #[serde(rename = "isCancellationFee", default, deserialize_with = "de::flag")]
    pub is_cancellation_fee: bool,
    #[serde(rename = "receiptIssued", default, deserialize_with = "de::flag")]
    pub receipt_issued: bool,
    #[serde(rename = "receiptUrl")]
    pub receipt_url: Option<String>,
    #[serde(rename = "receiptId", default, deserialize_with = "de::string_or_number")]
    pub receipt_id: Option<String>,
}

impl Payment {
    pub fn method(&self) -> Option<&PaymentMethod> {
        self.payment_method.as_ref().or(self.method.as_ref())
    }

    pub fn status(&self) -> PaymentStatus {
        self.status.unwrap_or(if self.paid {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Pending
        })
    }

    /// Admin view of "paid": the explicit flag, or a settled status
    pub fn is_paid(&self) -> bool {
        self.paid || self.status.map(|s| s.is_settled()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(default, deserialize_with = "de::text")]
    pub id: String,
    #[serde(rename = "paymentId", default, deserialize_with = "de::string_or_number")]
    pub payment_id: Option<String>,
    #[serde(rename = "receiptNumber", default, deserialize_with = "de::text")]
    pub receipt_number: String,
    #[serde(rename = "eventName", default, deserialize_with = "de::text")]
    pub event_name: String,
    #[serde(rename = "memberName")]
    pub member_name: Option<String>,
    #[serde(rename = "issuerName")]
    pub issuer_name: Option<String>,
    #[serde(default, deserialize_with = "de::amount")]
    pub amount: i64,
    #[serde(rename = "issuedAt", default, deserialize_with = "de::text")]
    pub issued_at: String,
    pub url: Option<String>,
}
