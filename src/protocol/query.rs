use serde_json::{Value, json};

use crate::constant::QueryType;

/// Control payload (`[CONTINUE]`, `[STOP]`, `[NOREPLY_WAIT]`) addressed to an
/// existing token.
pub fn control_payload(query_type: QueryType) -> Vec<u8> {
    format!("[{}]", query_type as u32).into_bytes()
}

/// The barrier query submitted by `noreply_wait`. It is not itself NOREPLY:
/// the server answers it with WAIT_COMPLETE.
pub fn noreply_wait_query() -> Value {
    json!([QueryType::NoreplyWait as u32])
}

/// A query requests no reply when its top-level options object (the third
/// element of the outer query array) contains `noreply: true`.
pub fn is_noreply(query: &Value) -> bool {
    query
        .as_array()
        .and_then(|parts| parts.get(2))
        .and_then(Value::as_object)
        .and_then(|options| options.get("noreply"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_payloads() {
        assert_eq!(control_payload(QueryType::Continue), b"[2]");
        assert_eq!(control_payload(QueryType::Stop), b"[3]");
        assert_eq!(control_payload(QueryType::NoreplyWait), b"[4]");
    }

    #[test]
    fn noreply_wait_is_not_itself_noreply() {
        let query = noreply_wait_query();
        assert_eq!(query, json!([4]));
        assert!(!is_noreply(&query));
    }

    #[test]
    fn noreply_detection() {
        assert!(is_noreply(&json!([1, [56, []], { "noreply": true }])));
        assert!(!is_noreply(&json!([1, [56, []], { "noreply": false }])));
        assert!(!is_noreply(&json!([1, [56, []], {}])));
        assert!(!is_noreply(&json!([1, [56, []]])));
        assert!(!is_noreply(&json!([1, [56, []], { "noreply": "true" }])));
        assert!(!is_noreply(&json!("not an array")));
    }
}
