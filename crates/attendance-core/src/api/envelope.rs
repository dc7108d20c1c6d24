use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::ApiError;
use crate::models::de;

/// Error string the backend uses for a missing or stale token.
pub const UNAUTHORIZED: &str = "Unauthorized";

/// Every backend response: `{success, data?, error?, message?, ...}`.
///
/// Some actions put their result in `data`, others (notably `login` and the
/// member events listing) put fields at the top level, which land in `extra`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default, deserialize_with = "de::flag")]
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, deserialize_with = "de::string_or_number")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "de::string_or_number")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApiEnvelope {
    pub fn is_unauthorized(&self) -> bool {
        self.error.as_deref() == Some(UNAUTHORIZED)
    }

    /// `data` when present, otherwise the remaining top-level fields.
    pub fn into_payload(self) -> Result<Value, ApiError> {
        if self.is_unauthorized() {
            return Err(ApiError::Unauthorized);
        }
        if !self.success {
            let reason = self
                .error
                .or(self.message)
                .unwrap_or_else(|| "Request failed".to_string());
            return Err(ApiError::Rejected(reason));
        }
        match self.data {
            Some(data) if !data.is_null() => Ok(data),
            _ => Ok(Value::Object(self.extra)),
        }
    }
}

/// Parse a list that may come bare or wrapped as `{ <key>: [...] }`.
pub fn list_payload<T: DeserializeOwned>(payload: Value, key: &str) -> serde_json::Result<Vec<T>> {
    match payload {
        Value::Array(_) => serde_json::from_value(payload),
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(list) => serde_json::from_value(list),
        },
        _ => Ok(Vec::new()),
    }
}

/// Unwrap `{ <key>: {...} }` when the object is wrapped, else keep it as is.
pub fn unwrap_object(payload: Value, key: &str) -> Value {
    match payload {
        Value::Object(mut map) if map.get(key).is_some_and(Value::is_object) => {
            map.remove(key).unwrap_or_default()
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: Value) -> ApiEnvelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_data_payload_wins() {
        let payload = envelope(json!({"success": true, "data": [1, 2], "count": 2}))
            .into_payload()
            .unwrap();
        assert_eq!(payload, json!([1, 2]));
    }

    #[test]
    fn test_top_level_fields_become_payload() {
        let payload = envelope(json!({
            "success": true, "token": "t", "role": "admin", "member_id": 7, "name": "Sato"
        }))
        .into_payload()
        .unwrap();
        assert_eq!(payload["token"], "t");
        assert_eq!(payload["member_id"], 7);
        assert!(payload.get("success").is_none());
    }

    #[test]
    fn test_failure_and_unauthorized() {
        let err = envelope(json!({"success": false, "error": "Event not found"}))
            .into_payload()
            .unwrap_err();
        assert!(matches!(err, ApiError::Rejected(ref m) if m == "Event not found"));

        let err = envelope(json!({"success": false, "error": "Unauthorized"}))
            .into_payload()
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));

        let err = envelope(json!({"message": "nope"})).into_payload().unwrap_err();
        assert!(matches!(err, ApiError::Rejected(ref m) if m == "nope"));
    }

    #[test]
    fn test_list_payload_shapes() {
        let bare: Vec<i64> = list_payload(json!([1, 2]), "events").unwrap();
        assert_eq!(bare, vec![1, 2]);
        let wrapped: Vec<i64> = list_payload(json!({"events": [3]}), "events").unwrap();
        assert_eq!(wrapped, vec![3]);
        let missing: Vec<i64> = list_payload(json!({}), "events").unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_unwrap_object() {
        assert_eq!(unwrap_object(json!({"user": {"name": "A"}}), "user"), json!({"name": "A"}));
        assert_eq!(unwrap_object(json!({"name": "A"}), "user"), json!({"name": "A"}));
    }
}
