use rusqlite::{Connection, Transaction};
use serde_json::Value;

use crate::consolidate;
use crate::error::TagResult;

/// Runs `op` inside a write transaction, committing only when it succeeds.
pub fn in_transaction<T>(
    conn: &mut Connection,
    op: impl FnOnce(&Transaction<'_>) -> TagResult<T>,
) -> TagResult<T> {
    let tx = consolidate::begin(conn)?;
    let out = op(&tx)?;
    tx.commit()?;
    Ok(out)
}

/// Integer parameter; numeric strings are accepted the way form posts send them.
pub fn opt_i64(params: &Value, key: &str) -> Result<Option<i64>, String> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => as_i64(v)
            .map(Some)
            .ok_or_else(|| format!("{key} must be an integer")),
    }
}

pub fn req_i64(params: &Value, key: &str) -> Result<i64, String> {
    opt_i64(params, key)?.ok_or_else(|| format!("missing {key}"))
}

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn opt_usize(params: &Value, key: &str) -> Result<Option<usize>, String> {
    match opt_i64(params, key)? {
        Some(n) if n < 0 => Err(format!("{key} must not be negative")),
        Some(n) => Ok(Some(n as usize)),
        None => Ok(None),
    }
}

/// Trimmed string parameter; blank values read as absent.
pub fn opt_str(params: &Value, key: &str) -> Result<Option<String>, String> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(_) => Err(format!("{key} must be a string")),
    }
}

pub fn req_str(params: &Value, key: &str) -> Result<String, String> {
    match params.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        None | Some(Value::Null) => Err(format!("missing {key}")),
        Some(_) => Err(format!("{key} must be a string")),
    }
}

pub fn opt_bool(params: &Value, key: &str) -> Result<Option<bool>, String> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(format!("{key} must be a boolean")),
        },
        Some(Value::String(s)) => match s.trim() {
            "1" | "true" | "on" | "yes" => Ok(Some(true)),
            "0" | "false" | "off" | "no" | "" => Ok(Some(false)),
            _ => Err(format!("{key} must be a boolean")),
        },
        Some(_) => Err(format!("{key} must be a boolean")),
    }
}

pub fn i64_list(params: &Value, key: &str) -> Result<Vec<i64>, String> {
    let Some(items) = params.get(key).and_then(|v| v.as_array()) else {
        return Err(format!("{key} must be an array of integers"));
    };
    items
        .iter()
        .map(|v| as_i64(v).ok_or_else(|| format!("{key} must be an array of integers")))
        .collect()
}

pub fn string_list(params: &Value, key: &str) -> Result<Vec<String>, String> {
    let Some(items) = params.get(key).and_then(|v| v.as_array()) else {
        return Err(format!("{key} must be an array of strings"));
    };
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| format!("{key} must be an array of strings"))
        })
        .collect()
}

/// Acting user recorded on activity rows.
pub fn actor(params: &Value) -> Result<Option<i64>, String> {
    opt_i64(params, "actor_id")
}
