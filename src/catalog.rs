//! Tag catalog operations behind the admin tag screens and pickers.

use regex::Regex;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Transaction};
use serde::Serialize;
use std::sync::OnceLock;

use crate::activity::{self, Subject};
use crate::error::{TagError, TagResult};
use crate::model::{self, now, SpaceType, Tag, TagContext, TAG_COLUMNS};
use crate::slug;

const MAX_COLOR_LEN: usize = 32;

pub const DEFAULT_PER_PAGE: usize = 15;
pub const DEFAULT_OPTIONS_LIMIT: usize = 30;

fn color_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(#?[0-9a-fA-F]{3,8}|[a-zA-Z][\w\-:./]+)$").expect("valid color regex")
    })
}

/// Accepts hex codes (`#1a2b3c`) and design tokens (`emerald-500`, `bg:red`).
pub fn validate_color(color: &str) -> TagResult<()> {
    if color.chars().count() > MAX_COLOR_LEN {
        return Err(TagError::invalid(format!(
            "color must be at most {MAX_COLOR_LEN} characters"
        )));
    }
    if !color_pattern().is_match(color) {
        return Err(TagError::invalid(format!("invalid color: {color}")));
    }
    Ok(())
}

/// Row values for a tag about to be inserted; the slug is derived on insert.
#[derive(Debug, Clone)]
pub struct NewTag {
    pub context: TagContext,
    pub name: String,
    pub name_en: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub is_active: bool,
    pub sort_order: i64,
    pub last_used_at: Option<String>,
}

pub fn insert_tag(conn: &Connection, tag: &NewTag) -> TagResult<Tag> {
    let slug = slug::generate_unique_slug(conn, &tag.name, &tag.context, None)?;
    let ts = now();
    conn.execute(
        "INSERT INTO tags(
            context, name, name_en, slug, description, color,
            is_active, sort_order, last_used_at, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            tag.context.as_str(),
            &tag.name,
            &tag.name_en,
            &slug,
            &tag.description,
            &tag.color,
            tag.is_active,
            tag.sort_order,
            &tag.last_used_at,
            &ts,
            &ts,
        ),
    )?;
    model::require_tag(conn, conn.last_insert_rowid())
}

#[derive(Debug, Clone)]
pub struct CreateTag {
    pub context: String,
    pub name: String,
    pub name_en: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct UpdateTag {
    pub name: String,
    pub name_en: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub is_active: bool,
    pub sort_order: Option<i64>,
}

#[derive(Serialize)]
struct CreatedProperties<'a> {
    context: &'a TagContext,
    color: &'a Option<String>,
}

#[derive(Serialize)]
struct UpdatedProperties {
    name_changed: bool,
    is_active: bool,
}

#[derive(Serialize)]
struct DeactivatedProperties<'a> {
    context: &'a TagContext,
}

fn clean_name(raw: &str) -> TagResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(TagError::invalid("name must not be empty"));
    }
    Ok(name.to_string())
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn ensure_unique_active_name(
    conn: &Connection,
    context: &TagContext,
    name: &str,
    except_id: Option<i64>,
) -> TagResult<()> {
    if let Some(other) = model::find_by_name_ci(conn, context, name, true, except_id)? {
        return Err(TagError::invalid(format!(
            "an active tag named \"{}\" already exists in {context} (id {})",
            other.name, other.id
        )));
    }
    Ok(())
}

pub fn create_tag(tx: &Transaction<'_>, input: CreateTag, actor: Option<i64>) -> TagResult<Tag> {
    let context = TagContext::parse(input.context.trim());
    if !context.is_catalog() {
        return Err(TagError::invalid(format!("unknown context: {}", input.context)));
    }
    let name = clean_name(&input.name)?;
    let color = blank_to_none(input.color);
    if let Some(c) = &color {
        validate_color(c)?;
    }
    let is_active = input.is_active.unwrap_or(true);
    if is_active {
        ensure_unique_active_name(tx, &context, &name, None)?;
    }

    let tag = insert_tag(
        tx,
        &NewTag {
            context,
            name,
            name_en: blank_to_none(input.name_en),
            description: blank_to_none(input.description),
            color,
            is_active,
            sort_order: 0,
            last_used_at: is_active.then(now),
        },
    )?;

    activity::log(
        tx,
        actor,
        "tag.created",
        Some(Subject::tag(&tag)),
        &CreatedProperties {
            context: &tag.context,
            color: &tag.color,
        },
    )?;
    tracing::info!(tag_id = tag.id, context = %tag.context, "created tag");
    Ok(tag)
}

pub fn update_tag(
    tx: &Transaction<'_>,
    id: i64,
    input: UpdateTag,
    actor: Option<i64>,
) -> TagResult<Tag> {
    let current = model::require_tag(tx, id)?;
    let name = clean_name(&input.name)?;
    let color = blank_to_none(input.color);
    if let Some(c) = &color {
        validate_color(c)?;
    }
    if input.is_active {
        ensure_unique_active_name(tx, &current.context, &name, Some(id))?;
    }

    let name_changed = current.name != name;
    let slug = if name_changed {
        slug::generate_unique_slug(tx, &name, &current.context, Some(id))?
    } else {
        current.slug.clone()
    };
    let ts = now();
    let last_used_at = match (&current.last_used_at, input.is_active) {
        (None, true) => Some(ts.clone()),
        (existing, _) => existing.clone(),
    };

    tx.execute(
        "UPDATE tags
         SET name = ?, name_en = ?, slug = ?, description = ?, color = ?,
             is_active = ?, sort_order = ?, last_used_at = ?, updated_at = ?
         WHERE id = ?",
        (
            &name,
            blank_to_none(input.name_en),
            &slug,
            blank_to_none(input.description),
            &color,
            input.is_active,
            input.sort_order.unwrap_or(current.sort_order),
            &last_used_at,
            &ts,
            id,
        ),
    )?;
    let tag = model::require_tag(tx, id)?;

    activity::log(
        tx,
        actor,
        "tag.updated",
        Some(Subject::tag(&tag)),
        &UpdatedProperties {
            name_changed,
            is_active: tag.is_active,
        },
    )?;
    tracing::info!(tag_id = id, name_changed, "updated tag");
    Ok(tag)
}

/// Soft delete: the row stays so historical associations remain valid.
pub fn deactivate_tag(tx: &Transaction<'_>, id: i64, actor: Option<i64>) -> TagResult<Tag> {
    let current = model::require_tag(tx, id)?;
    tx.execute(
        "UPDATE tags SET is_active = 0, updated_at = ? WHERE id = ?",
        (now(), id),
    )?;
    let tag = model::require_tag(tx, id)?;
    activity::log(
        tx,
        actor,
        "tag.deactivated",
        Some(Subject::tag(&tag)),
        &DeactivatedProperties {
            context: &current.context,
        },
    )?;
    tracing::info!(tag_id = id, "deactivated tag");
    Ok(tag)
}

#[derive(Debug, Clone, Serialize)]
pub struct TagSummary {
    #[serde(flatten)]
    pub tag: Tag,
    pub usage_count: i64,
}

/// Per-context association count for the `tags` row aliased as `t`.
fn usage_count_sql() -> String {
    format!(
        "CASE t.context
            WHEN 'posts' THEN (SELECT COUNT(*) FROM post_tag pt WHERE pt.tag_id = t.id)
            WHEN 'labs' THEN (
                SELECT COUNT(*) FROM space_tag st
                JOIN spaces s ON s.id = st.space_id
                WHERE st.tag_id = t.id AND s.space_type = {lab})
            WHEN 'classrooms' THEN (
                SELECT COUNT(*) FROM space_tag st
                JOIN spaces s ON s.id = st.space_id
                WHERE st.tag_id = t.id AND s.space_type = {classroom})
            WHEN 'spaces' THEN (SELECT COUNT(*) FROM space_tag st WHERE st.tag_id = t.id)
            ELSE 0
         END",
        lab = SpaceType::Lab.code(),
        classroom = SpaceType::Classroom.code(),
    )
}

fn summary_columns() -> String {
    TAG_COLUMNS
        .split(", ")
        .map(|c| format!("t.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn summary_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TagSummary> {
    Ok(TagSummary {
        tag: model::tag_from_row(row)?,
        usage_count: row.get(12)?,
    })
}

pub fn get_tag(conn: &Connection, id: i64) -> TagResult<TagSummary> {
    let sql = format!(
        "SELECT {}, {} AS usage_count FROM tags t WHERE t.id = ?",
        summary_columns(),
        usage_count_sql()
    );
    conn.query_row(&sql, [id], summary_from_row)
        .optional()?
        .ok_or_else(|| TagError::not_found(format!("tag {id}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    Active,
    Inactive,
}

impl StatusFilter {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(StatusFilter::Active),
            "inactive" => Some(StatusFilter::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TagListFilter {
    pub keyword: Option<String>,
    pub status: Option<StatusFilter>,
    pub context: Option<String>,
    pub per_page: Option<usize>,
    pub page: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageMeta {
    pub current_page: usize,
    pub from: Option<usize>,
    pub to: Option<usize>,
    pub last_page: usize,
    pub per_page: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagPage {
    pub data: Vec<TagSummary>,
    pub meta: PageMeta,
}

fn keyword_pattern(keyword: &str) -> String {
    format!("%{}%", keyword.to_lowercase())
}

pub fn list_tags(conn: &Connection, filter: &TagListFilter) -> TagResult<TagPage> {
    let per_page = filter.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(5, 100);
    let page = filter.page.unwrap_or(1).max(1);

    let mut clauses = Vec::new();
    let mut bind = Vec::new();
    if let Some(context) = filter.context.as_deref().filter(|c| !c.is_empty()) {
        clauses.push("t.context = ?");
        bind.push(Value::Text(context.to_string()));
    }
    match filter.status {
        Some(StatusFilter::Active) => clauses.push("t.is_active = 1"),
        Some(StatusFilter::Inactive) => clauses.push("t.is_active = 0"),
        None => {}
    }
    if let Some(keyword) = filter.keyword.as_deref().filter(|k| !k.is_empty()) {
        clauses.push(
            "(LOWER(t.name) LIKE ? OR LOWER(IFNULL(t.name_en, '')) LIKE ? OR LOWER(t.slug) LIKE ?)",
        );
        let pattern = keyword_pattern(keyword);
        for _ in 0..3 {
            bind.push(Value::Text(pattern.clone()));
        }
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM tags t {where_sql}"),
        params_from_iter(bind.iter()),
        |r| r.get(0),
    )?;
    let total = total as usize;
    let last_page = total.div_ceil(per_page).max(1);
    // Pages past the end show the last page; keeps the offset bounded by `total`.
    let page = page.min(last_page);

    let offset = (page - 1) * per_page;
    let sql = format!(
        "SELECT {}, {} AS usage_count FROM tags t {where_sql}
         ORDER BY t.is_active DESC, usage_count DESC, t.name ASC
         LIMIT {per_page} OFFSET {offset}",
        summary_columns(),
        usage_count_sql(),
    );
    let mut stmt = conn.prepare(&sql)?;
    let data = stmt
        .query_map(params_from_iter(bind.iter()), summary_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let (from, to) = if data.is_empty() {
        (None, None)
    } else {
        (Some(offset + 1), Some(offset + data.len()))
    };

    Ok(TagPage {
        data,
        meta: PageMeta {
            current_page: page,
            from,
            to,
            last_page,
            per_page,
            total,
        },
    })
}

#[derive(Debug, Clone, Default)]
pub struct OptionsFilter {
    pub context: Option<String>,
    pub keyword: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagOption {
    pub id: i64,
    pub value: i64,
    pub label: String,
    pub slug: String,
    pub color: Option<String>,
    pub usage_count: i64,
}

/// Active tags for pickers, most used first.
pub fn tag_options(conn: &Connection, filter: &OptionsFilter) -> TagResult<Vec<TagOption>> {
    let limit = filter.limit.unwrap_or(DEFAULT_OPTIONS_LIMIT).clamp(5, 100);
    let mut sql = format!(
        "SELECT {}, {} AS usage_count FROM tags t WHERE t.is_active = 1",
        summary_columns(),
        usage_count_sql()
    );
    let mut bind = Vec::new();
    if let Some(context) = filter.context.as_deref().filter(|c| !c.is_empty()) {
        sql.push_str(" AND t.context = ?");
        bind.push(Value::Text(context.to_string()));
    }
    if let Some(keyword) = filter.keyword.as_deref().filter(|k| !k.is_empty()) {
        sql.push_str(
            " AND (LOWER(t.name) LIKE ? OR LOWER(IFNULL(t.name_en, '')) LIKE ? OR LOWER(t.slug) LIKE ?)",
        );
        let pattern = keyword_pattern(keyword);
        for _ in 0..3 {
            bind.push(Value::Text(pattern.clone()));
        }
    }
    sql.push_str(&format!(" ORDER BY usage_count DESC, t.name ASC LIMIT {limit}"));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(bind.iter()), summary_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        let summary = row?;
        out.push(TagOption {
            id: summary.tag.id,
            value: summary.tag.id,
            label: summary.tag.name,
            slug: summary.tag.slug,
            color: summary.tag.color,
            usage_count: summary.usage_count,
        });
    }
    Ok(out)
}

/// Makes sure every name exists as a tag in every context, creating the
/// missing ones. Matching is case-insensitive; no activity is recorded.
pub fn register<S: AsRef<str>, C: AsRef<str>>(
    tx: &Transaction<'_>,
    names: &[S],
    contexts: &[C],
) -> TagResult<Vec<Tag>> {
    let mut seen = std::collections::HashSet::new();
    let names: Vec<&str> = names
        .iter()
        .map(|n| n.as_ref().trim())
        .filter(|n| !n.is_empty() && seen.insert(n.to_string()))
        .collect();

    let mut created = Vec::new();
    for context in contexts {
        let context = TagContext::parse(context.as_ref().trim());
        for name in &names {
            if model::find_by_name_ci(tx, &context, name, false, None)?.is_some() {
                continue;
            }
            created.push(insert_tag(tx, &registered(&context, name))?);
        }
    }
    if !created.is_empty() {
        tracing::info!(created = created.len(), "registered tags");
    }
    Ok(created)
}

fn registered(context: &TagContext, name: &str) -> NewTag {
    NewTag {
        context: context.clone(),
        name: name.to_string(),
        name_en: None,
        description: None,
        color: None,
        is_active: true,
        sort_order: 0,
        last_used_at: None,
    }
}

/// Existing tag with this name in `context`, or a freshly created one.
/// Returns `None` for a blank name.
pub fn find_or_create(
    tx: &Transaction<'_>,
    context: &TagContext,
    name: &str,
) -> TagResult<Option<Tag>> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(None);
    }
    if let Some(existing) = model::find_by_name_ci(tx, context, name, false, None)? {
        return Ok(Some(existing));
    }
    Ok(Some(insert_tag(tx, &registered(context, name))?))
}
