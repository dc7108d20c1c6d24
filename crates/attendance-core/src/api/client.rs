//! API client for the portal backend.
//!
//! The backend exposes a single URL and dispatches on an `action` field,
//! taken from the query string for GET requests and from the JSON body for
//! POST requests. Every response is wrapped in an `ApiEnvelope`.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client, Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::envelope::{list_payload, unwrap_object, ApiEnvelope};
use super::ApiError;
use crate::auth::SessionStore;
use crate::cache::TtlCache;
use crate::models::{
    de, Analytics, AnalyticsPeriod, AnalyticsQuery, Attendance, AttendanceRecord,
    AttendanceStatus, Checkin, CheckinResult, DashboardStats, Event, EventDetail, EventDraft,
    Masters, Member, MemberDraft, Payment, PaymentMethod, PaymentStatus, ProfileUpdate, Receipt,
    Role, Series, UserProfile,
};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const LOGIN_ACTION: &str = "login";

/// Photo uploads are too large for a query string.
const UPLOAD_PHOTO_ACTION: &str = "uploadProfilePhoto";

/// Read-only actions whose payloads are kept in the TTL cache.
const CACHED_ACTIONS: &[&str] = &[
    "getEvents",
    "getEvent",
    "getMembers",
    "getMasters",
    "getAttendanceHistory",
    "getPayments",
    "getReceipts",
    "getDashboardStats",
];

/// Everything not named `get*` changes server state.
fn is_mutation(action: &str) -> bool {
    !action.starts_with("get")
}

/// Top-level fields of a successful login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResult {
    #[serde(default, deserialize_with = "de::text")]
    pub token: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, deserialize_with = "de::string_or_number")]
    pub member_id: Option<String>,
    #[serde(default, deserialize_with = "de::string_or_number")]
    pub name: Option<String>,
}

/// API client for the portal backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    sessions: SessionStore,
    cache: Option<TtlCache>,
}

impl ApiClient {
    pub fn new(base_url: &str, sessions: SessionStore) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid API URL: {}", base_url))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url,
            sessions,
            cache: None,
        })
    }

    /// Serve read-only actions from `cache`.
    pub fn with_cache(mut self, cache: TtlCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn cache(&self) -> Option<&TtlCache> {
        self.cache.as_ref()
    }

    /// Drop every cached payload. Used by the refresh buttons.
    pub fn clear_all_cache(&self) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.clear() {
                warn!(error = %e, "Failed to clear API cache");
            }
        }
    }

    fn cache_key(action: &str, params: &Value) -> String {
        match params {
            Value::Object(map) if !map.is_empty() => format!("{}_{}", action, params),
            _ => action.to_string(),
        }
    }

    fn auth_headers(token: Option<&str>) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    fn query_value(value: &Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Call `action` and return the envelope's payload.
    ///
    /// GET sends `action`, `token` and each param in the query string; POST
    /// sends them as one JSON object. Null params are skipped.
    pub async fn call(&self, action: &str, params: Value, method: Method) -> Result<Value> {
        let method = if action == UPLOAD_PHOTO_ACTION {
            Method::POST
        } else {
            method
        };

        let cache_key = (method == Method::GET && CACHED_ACTIONS.contains(&action))
            .then(|| Self::cache_key(action, &params));
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(payload) = cache.get::<Value>(key) {
                debug!(action, "Serving from cache");
                return Ok(payload);
            }
        }

        let token = if action == LOGIN_ACTION {
            None
        } else {
            self.sessions.token()
        };

        let params = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => anyhow::bail!("Parameters for {} must be an object, got {}", action, other),
        };

        debug!(action, method = %method, "API request");
        let request = if method == Method::GET {
            let mut url = self.base_url.clone();
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("action", action);
                if let Some(token) = token.as_deref() {
                    query.append_pair("token", token);
                }
                for (key, value) in &params {
                    if let Some(value) = Self::query_value(value) {
                        query.append_pair(key, &value);
                    }
                }
            }
            self.client.get(url)
        } else {
            let mut body = Map::new();
            body.insert("action".into(), json!(action));
            body.extend(params.into_iter().filter(|(_, v)| !v.is_null()));
            if let Some(token) = token.as_deref() {
                body.insert("token".into(), json!(token));
            }
            self.client
                .request(method, self.base_url.clone())
                .json(&Value::Object(body))
        };

        let result = self.send(action, request, token.as_deref()).await;
        if let Err(e) = &result {
            if ApiError::is_unauthorized(e) {
                warn!(action, "Session rejected by server, clearing");
                if let Err(clear_err) = self.sessions.clear() {
                    warn!(error = %clear_err, "Failed to clear session");
                }
            }
        }
        let payload = result?;

        if let Some(cache) = &self.cache {
            if let Some(key) = &cache_key {
                if let Err(e) = cache.put(key, &payload) {
                    warn!(action, error = %e, "Failed to cache response");
                }
            } else if is_mutation(action) {
                debug!(action, "Mutation, clearing cache");
                self.clear_all_cache();
            }
        }

        Ok(payload)
    }

    async fn send(
        &self,
        action: &str,
        request: reqwest::RequestBuilder,
        token: Option<&str>,
    ) -> Result<Value> {
        let response = request
            .headers(Self::auth_headers(token)?)
            .send()
            .await
            .map_err(ApiError::NetworkError)
            .with_context(|| format!("Failed to send {} request", action))?;
        let response = Self::check_response(response).await?;
        let envelope: ApiEnvelope = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
            .with_context(|| format!("Failed to parse {} response", action))?;
        Ok(envelope.into_payload()?)
    }

    async fn get<T: DeserializeOwned>(&self, action: &str, params: Value) -> Result<T> {
        let payload = self.call(action, params, Method::GET).await?;
        serde_json::from_value(payload).with_context(|| format!("Failed to parse {} data", action))
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        action: &str,
        params: Value,
        key: &str,
    ) -> Result<Vec<T>> {
        let payload = self.call(action, params, Method::GET).await?;
        list_payload(payload, key).with_context(|| format!("Failed to parse {} data", action))
    }

    async fn post(&self, action: &str, params: Value) -> Result<Value> {
        self.call(action, params, Method::POST).await
    }

    // ===== Session =====

    pub async fn login(&self, login_id: &str, password: &str) -> Result<LoginResult> {
        let payload = self
            .post(
                LOGIN_ACTION,
                json!({ "login_id": login_id, "password": password }),
            )
            .await?;
        let result: LoginResult =
            serde_json::from_value(payload).context("Failed to parse login response")?;
        if result.token.is_empty() {
            return Err(ApiError::InvalidResponse("Login response has no token".into()).into());
        }
        Ok(result)
    }

    pub async fn logout(&self) -> Result<()> {
        self.post("logout", json!({})).await?;
        Ok(())
    }

    pub async fn get_user_info(&self) -> Result<UserProfile> {
        let payload = self.call("getUserInfo", json!({}), Method::GET).await?;
        serde_json::from_value(unwrap_object(payload, "user"))
            .context("Failed to parse getUserInfo data")
    }

    pub async fn update_profile(&self, profile: &ProfileUpdate) -> Result<()> {
        self.post("updateProfile", serde_json::to_value(profile)?).await?;
        Ok(())
    }

    pub async fn change_password(&self, current: &str, new: &str) -> Result<()> {
        self.post(
            "changePassword",
            json!({ "currentPassword": current, "newPassword": new }),
        )
        .await?;
        Ok(())
    }

    /// Upload an already Base64-encoded image. Returns the stored photo URL.
    pub async fn upload_profile_photo(
        &self,
        file_data: &str,
        file_name: &str,
        mime_type: &str,
    ) -> Result<String> {
        let payload = self
            .post(
                UPLOAD_PHOTO_ACTION,
                json!({ "fileData": file_data, "fileName": file_name, "mimeType": mime_type }),
            )
            .await?;
        payload
            .get("photoURL")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ApiError::InvalidResponse("Upload response has no photoURL".into()).into())
    }

    // ===== Events =====

    /// Events visible to the caller. Member listings carry `my_attendance_status`.
    pub async fn get_events(&self, member_id: Option<&str>) -> Result<Vec<Event>> {
        let params = match member_id {
            Some(id) => json!({ "member_id": id }),
            None => json!({}),
        };
        self.get_list("getEvents", params, "events").await
    }

    pub async fn get_event(&self, event_id: &str) -> Result<EventDetail> {
        let payload = self
            .call("getEvent", json!({ "eventId": event_id }), Method::GET)
            .await?;
        EventDetail::from_payload(payload).context("Failed to parse getEvent data")
    }

    pub async fn create_event(&self, draft: &EventDraft) -> Result<Value> {
        self.post("createEvent", serde_json::to_value(draft)?).await
    }

    pub async fn update_event(&self, event_id: &str, draft: &EventDraft) -> Result<Value> {
        let mut params = serde_json::to_value(draft)?;
        if let Value::Object(map) = &mut params {
            map.insert("eventId".into(), json!(event_id));
        }
        self.post("updateEvent", params).await
    }

    pub async fn delete_event(&self, event_id: &str) -> Result<()> {
        self.post("deleteEvent", json!({ "eventId": event_id })).await?;
        Ok(())
    }

    // ===== Attendance =====

    pub async fn submit_attendance(
        &self,
        event_id: &str,
        status: AttendanceStatus,
        notes: &str,
    ) -> Result<()> {
        self.post(
            "submitAttendance",
            json!({ "eventId": event_id, "status": status.as_str(), "notes": notes }),
        )
        .await?;
        Ok(())
    }

    pub async fn get_attendance_history(&self) -> Result<Vec<AttendanceRecord>> {
        self.get_list("getAttendanceHistory", json!({}), "history")
            .await
    }

    pub async fn get_attendances(&self, event_id: &str) -> Result<Vec<Attendance>> {
        self.get_list("getAttendances", json!({ "eventId": event_id }), "attendances")
            .await
    }

    pub async fn update_attendance(
        &self,
        attendance_id: &str,
        status: AttendanceStatus,
    ) -> Result<()> {
        self.post(
            "updateAttendance",
            json!({ "attendanceId": attendance_id, "status": status.as_str() }),
        )
        .await?;
        Ok(())
    }

    // ===== Payments & receipts =====

    pub async fn submit_payment(
        &self,
        event_id: &str,
        amount: i64,
        method: &PaymentMethod,
        notes: &str,
    ) -> Result<()> {
        self.post(
            "submitPayment",
            json!({
                "eventId": event_id,
                "amount": amount,
                "method": method.as_str(),
                "notes": notes,
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn get_payments(&self) -> Result<Vec<Payment>> {
        self.get_list("getPayments", json!({}), "payments").await
    }

    pub async fn update_payment(&self, payment_id: &str, status: PaymentStatus) -> Result<()> {
        self.post(
            "updatePayment",
            json!({ "paymentId": payment_id, "status": status.as_str() }),
        )
        .await?;
        Ok(())
    }

    pub async fn confirm_payment(&self, payment_id: &str) -> Result<()> {
        self.post("confirmPayment", json!({ "paymentId": payment_id }))
            .await?;
        Ok(())
    }

    pub async fn get_receipts(&self) -> Result<Vec<Receipt>> {
        self.get_list("getReceipts", json!({}), "receipts").await
    }

    pub async fn get_receipt(&self, receipt_id: &str) -> Result<Receipt> {
        let payload = self
            .call("getReceipt", json!({ "receiptId": receipt_id }), Method::GET)
            .await?;
        serde_json::from_value(unwrap_object(payload, "receipt"))
            .context("Failed to parse getReceipt data")
    }

    pub async fn issue_receipt(&self, payment_id: &str) -> Result<Value> {
        self.post("issueReceipt", json!({ "paymentId": payment_id }))
            .await
    }

    // ===== Members =====

    pub async fn get_members(&self) -> Result<Vec<Member>> {
        self.get_list("getMembers", json!({}), "members").await
    }

    pub async fn get_member(&self, member_id: &str) -> Result<Member> {
        let payload = self
            .call("getMember", json!({ "memberId": member_id }), Method::GET)
            .await?;
        serde_json::from_value(unwrap_object(payload, "member"))
            .context("Failed to parse getMember data")
    }

    pub async fn add_member(&self, draft: &MemberDraft) -> Result<Value> {
        self.post("addMember", serde_json::to_value(draft)?).await
    }

    pub async fn update_member(&self, member_id: &str, draft: &MemberDraft) -> Result<Value> {
        let mut params = serde_json::to_value(draft)?;
        if let Value::Object(map) = &mut params {
            map.insert("memberId".into(), json!(member_id));
            map.insert("id".into(), json!(member_id));
        }
        self.post("updateMember", params).await
    }

    pub async fn update_member_role(&self, member_id: &str, role: &Role) -> Result<()> {
        self.post(
            "updateMemberRole",
            json!({ "memberId": member_id, "role": role.as_str() }),
        )
        .await?;
        Ok(())
    }

    pub async fn delete_member(&self, member_id: &str) -> Result<()> {
        self.post("deleteMember", json!({ "memberId": member_id }))
            .await?;
        Ok(())
    }

    pub async fn get_masters(&self) -> Result<Masters> {
        self.get("getMasters", json!({})).await
    }

    // ===== Check-in =====

    pub async fn get_checkin_list(&self, event_id: &str) -> Result<Vec<Checkin>> {
        self.get_list("getCheckinList", json!({ "eventId": event_id }), "checkins")
            .await
    }

    pub async fn checkin(&self, event_id: &str, member_id: &str) -> Result<CheckinResult> {
        let payload = self
            .post("checkin", json!({ "eventId": event_id, "memberId": member_id }))
            .await?;
        serde_json::from_value(payload).context("Failed to parse checkin data")
    }

    /// Check in and record the on-site payment in one step.
    pub async fn checkin_with_payment(
        &self,
        event_id: &str,
        member_id: &str,
    ) -> Result<CheckinResult> {
        let payload = self
            .post(
                "checkinWithPayment",
                json!({ "eventId": event_id, "memberId": member_id }),
            )
            .await?;
        serde_json::from_value(payload).context("Failed to parse checkinWithPayment data")
    }

    // ===== Analytics =====

    pub async fn get_dashboard_stats(&self) -> Result<DashboardStats> {
        self.get("getDashboardStats", json!({})).await
    }

    pub async fn get_attendance_analytics(&self, period: AnalyticsPeriod) -> Result<Series> {
        self.get("getAttendanceAnalytics", json!({ "period": period.as_str() }))
            .await
    }

    pub async fn get_payment_analytics(&self, period: AnalyticsPeriod) -> Result<Series> {
        self.get("getPaymentAnalytics", json!({ "period": period.as_str() }))
            .await
    }

    pub async fn get_analytics(&self, query: &AnalyticsQuery) -> Result<Analytics> {
        self.get("getAnalytics", query.to_params()).await
    }
}
