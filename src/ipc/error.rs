use serde_json::{json, Map, Value};

/// Success envelope for one answered request.
pub fn ok(id: &str, result: Value) -> Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

/// Error envelope. `code` is the stable machine key (`bad_params`,
/// `invalid_cohort`, ...); `details` carries the offending input when a
/// caller can act on it.
pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    let mut error = Map::new();
    error.insert("code".to_string(), json!(code));
    error.insert("message".to_string(), json!(message.into()));
    if let Some(d) = details {
        error.insert("details".to_string(), d);
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}
