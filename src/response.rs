//! The JSON envelope every HTTP surface speaks.
//!
//! ```json
//! {"success": true, "message": "...", "data": {...}, "count": 3}
//! {"success": false, "message": "", "error": "user_id is required"}
//! ```

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl<T: Serialize> ApiResponse<T> {
    /// A successful envelope with a payload.
    #[must_use]
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error: None,
            count: None,
        }
    }

    /// Attach a result count (list endpoints).
    #[must_use]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }
}

impl ApiResponse<()> {
    /// A failure envelope carrying a human-readable error.
    #[must_use]
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: String::new(),
            data: None,
            error: Some(error.into()),
            count: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_envelope_shape() {
        let response = ApiResponse::ok("done", serde_json::json!({"post_id": "p1"}));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["post_id"], "p1");
        assert!(json.get("error").is_none());
        assert!(json.get("count").is_none());
    }

    #[test]
    fn test_count_included_when_set() {
        let response = ApiResponse::ok("list", vec![1, 2, 3]).with_count(3);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["count"], 3);
    }

    #[test]
    fn test_error_envelope_shape() {
        let response = ApiResponse::error("user_id is required");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "user_id is required");
        assert!(json.get("data").is_none());
    }
}
