use rusqlite::Connection;
use serde::Serialize;

use crate::error::TagResult;
use crate::model::{now, Tag};

/// Subject reference recorded alongside an activity.
#[derive(Debug, Clone, Copy)]
pub struct Subject<'a> {
    pub kind: &'static str,
    pub id: i64,
    pub label: Option<&'a str>,
}

impl<'a> Subject<'a> {
    pub fn tag(tag: &'a Tag) -> Self {
        Subject {
            kind: "tag",
            id: tag.id,
            label: Some(tag.name.as_str()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Activity {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action: String,
    pub subject_type: Option<String>,
    pub subject_id: Option<i64>,
    pub description: Option<String>,
    pub properties: serde_json::Value,
    pub created_at: String,
}

#[derive(Debug, Default, Clone)]
pub struct ActivityFilter {
    pub action: Option<String>,
    pub subject_id: Option<i64>,
    pub limit: usize,
}

/// Appends one activity row. Rows are never updated afterwards.
pub fn log<P: Serialize>(
    conn: &Connection,
    actor: Option<i64>,
    action: &str,
    subject: Option<Subject<'_>>,
    properties: &P,
) -> TagResult<i64> {
    let payload = serde_json::to_string(properties)?;
    let description = default_description(action, subject.and_then(|s| s.label));
    conn.execute(
        "INSERT INTO manage_activities(
            user_id, action, subject_type, subject_id, description, properties, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            actor,
            action,
            subject.map(|s| s.kind),
            subject.map(|s| s.id),
            &description,
            &payload,
            now(),
        ),
    )?;
    Ok(conn.last_insert_rowid())
}

/// `"tag.merged"` + `"News"` -> `"Tag.Merged · News"`.
fn default_description(action: &str, label: Option<&str>) -> String {
    let mut out = String::with_capacity(action.len() + 16);
    let mut boundary = true;
    for ch in action.replace('_', " ").chars() {
        if boundary && ch.is_alphabetic() {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        boundary = !ch.is_alphanumeric();
    }
    if let Some(label) = label.filter(|l| !l.is_empty()) {
        out.push_str(" · ");
        out.push_str(label);
    }
    out
}

pub fn list(conn: &Connection, filter: &ActivityFilter) -> TagResult<Vec<Activity>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, action, subject_type, subject_id, description, properties, created_at
         FROM manage_activities
         WHERE (?1 IS NULL OR action = ?1)
           AND (?2 IS NULL OR subject_id = ?2)
         ORDER BY id DESC
         LIMIT ?3",
    )?;
    let rows = stmt.query_map(
        (filter.action.as_deref(), filter.subject_id, filter.limit as i64),
        |row| {
            let raw: String = row.get(6)?;
            Ok((
                Activity {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    action: row.get(2)?,
                    subject_type: row.get(3)?,
                    subject_id: row.get(4)?,
                    description: row.get(5)?,
                    properties: serde_json::Value::Null,
                    created_at: row.get(7)?,
                },
                raw,
            ))
        },
    )?;

    let mut out = Vec::new();
    for row in rows {
        let (mut activity, raw) = row?;
        activity.properties = serde_json::from_str(&raw)?;
        out.push(activity);
    }
    Ok(out)
}
