use serde_json::json;

use crate::error::TagError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Maps an engine failure onto the error envelope.
pub fn tag_err(id: &str, method: &str, e: &TagError) -> serde_json::Value {
    match e {
        TagError::Persistence(_) | TagError::Serialization(_) => {
            tracing::warn!(method, error = %e, "request failed");
        }
        TagError::NotFound(_) | TagError::InvalidArgument(_) => {
            tracing::debug!(method, error = %e, "request rejected");
        }
    }
    err(id, e.code(), e.to_string(), None)
}
