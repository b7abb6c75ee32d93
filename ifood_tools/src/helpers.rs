use serde_json::Value;

/// Pulls a human-readable message out of an upstream error body. The provider is inconsistent:
/// errors arrive as `{"error": {"message": ...}}`, `{"error": {"code": ...}}`, `{"error": "..."}`
/// or `{"message": "..."}`. Falls back to the raw body.
pub fn extract_error_message(body: &str) -> String {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return body.to_string(),
    };
    match &parsed["error"] {
        Value::Object(err) => err
            .get("message")
            .or_else(|| err.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown upstream error")
            .to_string(),
        Value::String(s) => s.clone(),
        _ => parsed["message"].as_str().map(|s| s.to_string()).unwrap_or_else(|| body.to_string()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_message_variants() {
        assert_eq!(extract_error_message(r#"{"error":{"message":"bad client"}}"#), "bad client");
        assert_eq!(extract_error_message(r#"{"error":{"code":"E42"}}"#), "E42");
        assert_eq!(extract_error_message(r#"{"error":"denied"}"#), "denied");
        assert_eq!(extract_error_message(r#"{"message":"oops"}"#), "oops");
        assert_eq!(extract_error_message("plain text"), "plain text");
    }
}
