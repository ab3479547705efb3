use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Serialize, Serializer};
use std::fmt;

use crate::error::{TagError, TagResult};

/// Namespace a tag belongs to. Tags in different contexts are never compared or
/// merged. Values the daemon does not know are preserved as `Other` so rows
/// written by newer clients stay addressable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagContext {
    Posts,
    Attachments,
    Labs,
    Classrooms,
    Programs,
    Projects,
    Spaces,
    Other(String),
}

/// Contexts offered by the admin screens, with their display labels.
pub const CATALOG_CONTEXTS: &[(&str, &str)] = &[
    ("posts", "Announcements"),
    ("attachments", "Attachments"),
    ("labs", "Research labs"),
    ("classrooms", "Classrooms"),
    ("programs", "Programs"),
    ("projects", "Research projects"),
];

impl TagContext {
    pub fn parse(raw: &str) -> TagContext {
        match raw {
            "posts" => TagContext::Posts,
            "attachments" => TagContext::Attachments,
            "labs" => TagContext::Labs,
            "classrooms" => TagContext::Classrooms,
            "programs" => TagContext::Programs,
            "projects" => TagContext::Projects,
            "spaces" => TagContext::Spaces,
            other => TagContext::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TagContext::Posts => "posts",
            TagContext::Attachments => "attachments",
            TagContext::Labs => "labs",
            TagContext::Classrooms => "classrooms",
            TagContext::Programs => "programs",
            TagContext::Projects => "projects",
            TagContext::Spaces => "spaces",
            TagContext::Other(s) => s.as_str(),
        }
    }

    /// Whether new tags may be created in this context from the catalog screens.
    pub fn is_catalog(&self) -> bool {
        CATALOG_CONTEXTS.iter().any(|(v, _)| *v == self.as_str())
    }

    /// Space subtype a context is bound to, if it is space-like.
    pub fn space_type(&self) -> Option<SpaceType> {
        match self {
            TagContext::Labs => Some(SpaceType::Lab),
            TagContext::Classrooms => Some(SpaceType::Classroom),
            _ => None,
        }
    }
}

impl fmt::Display for TagContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TagContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Discriminator stored in `spaces.space_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceType {
    Lab,
    Classroom,
}

impl SpaceType {
    pub fn code(self) -> i64 {
        match self {
            SpaceType::Lab => 2,
            SpaceType::Classroom => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<SpaceType> {
        match code {
            2 => Some(SpaceType::Lab),
            3 => Some(SpaceType::Classroom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Tag {
    pub id: i64,
    pub context: TagContext,
    pub name: String,
    pub name_en: Option<String>,
    pub slug: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub is_active: bool,
    pub sort_order: i64,
    pub last_used_at: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

pub const TAG_COLUMNS: &str = "id, context, name, name_en, slug, description, color, \
     is_active, sort_order, last_used_at, created_at, updated_at";

pub fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    let context: String = row.get(1)?;
    let is_active: i64 = row.get(7)?;
    Ok(Tag {
        id: row.get(0)?,
        context: TagContext::parse(&context),
        name: row.get(2)?,
        name_en: row.get(3)?,
        slug: row.get(4)?,
        description: row.get(5)?,
        color: row.get(6)?,
        is_active: is_active != 0,
        sort_order: row.get(8)?,
        last_used_at: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

/// Timestamp format used for every `*_at` column.
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn find_tag(conn: &Connection, id: i64) -> rusqlite::Result<Option<Tag>> {
    conn.query_row(
        &format!("SELECT {TAG_COLUMNS} FROM tags WHERE id = ?"),
        [id],
        tag_from_row,
    )
    .optional()
}

pub fn require_tag(conn: &Connection, id: i64) -> TagResult<Tag> {
    find_tag(conn, id)?.ok_or_else(|| TagError::not_found(format!("tag {id}")))
}

/// Looks a tag up by case-insensitive name within a context.
///
/// The comparison happens in Rust rather than through SQLite's `LOWER()`, which
/// only folds ASCII.
pub fn find_by_name_ci(
    conn: &Connection,
    context: &TagContext,
    name: &str,
    active_only: bool,
    except_id: Option<i64>,
) -> rusqlite::Result<Option<Tag>> {
    let needle = name.to_lowercase();
    let mut stmt = conn.prepare(&format!(
        "SELECT {TAG_COLUMNS} FROM tags WHERE context = ? ORDER BY id"
    ))?;
    let rows = stmt.query_map([context.as_str()], tag_from_row)?;
    for tag in rows {
        let tag = tag?;
        if active_only && !tag.is_active {
            continue;
        }
        if except_id == Some(tag.id) {
            continue;
        }
        if tag.name.to_lowercase() == needle {
            return Ok(Some(tag));
        }
    }
    Ok(None)
}
