//! Request and error-response records.
//!
//! Both formats carry the same logical shape:
//!
//! ```text
//! request:  { "function": <string>, "data": <any> }
//! error:    { "error": <string>, "function": <string> }
//! ```
//!
//! A successful response has no envelope; it is the handler's value as-is.

use serde::{Deserialize, Serialize};

/// Decoded payload value: null, bool, number, string, array or object.
pub type Payload = serde_json::Value;

/// A request decoded from one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Name of the function to invoke. `None` means the frame is ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Argument passed to the handler.
    #[serde(default)]
    pub data: Payload,
}

impl Request {
    /// Build a request for `function` carrying `data`.
    pub fn new(function: impl Into<String>, data: Payload) -> Self {
        Self {
            function: Some(function.into()),
            data,
        }
    }
}

/// Error payload sent back when a call fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable failure message.
    pub error: String,
    /// Function the failed call named.
    pub function: String,
}

impl ErrorResponse {
    /// Build an error response for `function`.
    pub fn new(function: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            function: function.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_data_is_null() {
        let req: Request = serde_json::from_str(r#"{"function":"ping"}"#).unwrap();
        assert_eq!(req.function.as_deref(), Some("ping"));
        assert_eq!(req.data, Payload::Null);
    }

    #[test]
    fn test_missing_function_is_none() {
        let req: Request = serde_json::from_str(r#"{"data":[1,2]}"#).unwrap();
        assert!(req.function.is_none());
        assert_eq!(req.data, json!([1, 2]));
    }

    #[test]
    fn test_field_names_are_exact() {
        // Wrong casing is not an alias; the request simply has no function.
        let req: Request = serde_json::from_str(r#"{"Function":"echo"}"#).unwrap();
        assert!(req.function.is_none());
    }

    #[test]
    fn test_error_response_shape() {
        let value = serde_json::to_value(ErrorResponse::new("sum", "boom")).unwrap();
        assert_eq!(value, json!({"error": "boom", "function": "sum"}));
    }
}
