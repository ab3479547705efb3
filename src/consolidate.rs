//! Tag consolidation: merging several tags into one and splitting one tag into
//! several.
//!
//! Both entry points take an open [`Transaction`] and never commit it. Callers
//! start it with [`begin`], which takes SQLite's write lock up front, and commit
//! once the operation returns `Ok`. Dropping the transaction on any error path
//! rolls every statement back, so partial reassignment is never observable.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::collections::HashSet;

use crate::activity::{self, Subject};
use crate::catalog::{self, NewTag};
use crate::error::{TagError, TagResult};
use crate::model::{self, now, SpaceType, Tag, TagContext};

/// Opens the transaction every consolidation runs in.
///
/// `IMMEDIATE` acquires the database write lock before the first read, which
/// serialises concurrent merges and splits touching the same tag rows.
pub fn begin(conn: &mut Connection) -> rusqlite::Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub affected_resources: usize,
    pub deactivated_tags: usize,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SplitOutcome {
    pub created: Vec<Tag>,
    pub deactivated_original: bool,
}

#[derive(Serialize)]
struct MergedProperties<'a> {
    target_id: i64,
    source_ids: &'a [i64],
    context: &'a TagContext,
    affected_resources: usize,
    deactivated: usize,
}

#[derive(Serialize)]
struct SplitProperties<'a> {
    context: &'a TagContext,
    keep_original: bool,
    created_tag_ids: Vec<i64>,
}

/// How associations move from source tags to the target, chosen by context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reassignment {
    /// `post_tag` rows.
    PostTags,
    /// `space_tag` rows, restricted to one space subtype when `scope` is set.
    SpaceTags { scope: Option<SpaceType> },
    /// No association table is known for the context; nothing moves.
    Noop,
}

impl Reassignment {
    pub fn for_context(context: &TagContext) -> Self {
        match context {
            TagContext::Posts => Reassignment::PostTags,
            TagContext::Labs | TagContext::Classrooms => Reassignment::SpaceTags {
                scope: context.space_type(),
            },
            TagContext::Spaces => Reassignment::SpaceTags { scope: None },
            TagContext::Attachments
            | TagContext::Programs
            | TagContext::Projects
            | TagContext::Other(_) => Reassignment::Noop,
        }
    }

    /// Moves every association of `source_ids` onto `target_id` and returns the
    /// number of distinct owning entities touched.
    pub fn apply(
        self,
        conn: &Connection,
        target_id: i64,
        source_ids: &[i64],
    ) -> rusqlite::Result<usize> {
        match self {
            Reassignment::PostTags => reassign(conn, "post_tag", "post_id", None, target_id, source_ids),
            Reassignment::SpaceTags { scope } => {
                reassign(conn, "space_tag", "space_id", scope, target_id, source_ids)
            }
            Reassignment::Noop => Ok(0),
        }
    }
}

fn reassign(
    conn: &Connection,
    table: &str,
    owner: &str,
    scope: Option<SpaceType>,
    target_id: i64,
    source_ids: &[i64],
) -> rusqlite::Result<usize> {
    if source_ids.is_empty() {
        return Ok(0);
    }

    let placeholders = vec!["?"; source_ids.len()].join(", ");
    let mut bind: Vec<Value> = source_ids.iter().map(|id| Value::Integer(*id)).collect();

    let (select_sql, delete_sql) = match scope {
        Some(space_type) => {
            bind.push(Value::Integer(space_type.code()));
            (
                format!(
                    "SELECT a.{owner} FROM {table} a
                     JOIN spaces s ON s.id = a.{owner}
                     WHERE a.tag_id IN ({placeholders}) AND s.space_type = ?
                     ORDER BY a.{owner}, a.tag_id"
                ),
                format!(
                    "DELETE FROM {table}
                     WHERE tag_id IN ({placeholders})
                       AND {owner} IN (SELECT id FROM spaces WHERE space_type = ?)"
                ),
            )
        }
        None => (
            format!(
                "SELECT {owner} FROM {table}
                 WHERE tag_id IN ({placeholders})
                 ORDER BY {owner}, tag_id"
            ),
            format!("DELETE FROM {table} WHERE tag_id IN ({placeholders})"),
        ),
    };

    let owners = {
        let mut stmt = conn.prepare(&select_sql)?;
        let rows = stmt.query_map(params_from_iter(bind.iter()), |r| r.get::<_, i64>(0))?;
        rows.collect::<Result<Vec<_>, _>>()?
    };
    if owners.is_empty() {
        return Ok(0);
    }

    let mut exists_stmt = conn.prepare(&format!(
        "SELECT EXISTS(SELECT 1 FROM {table} WHERE {owner} = ? AND tag_id = ?)"
    ))?;
    let mut insert_stmt =
        conn.prepare(&format!("INSERT INTO {table}({owner}, tag_id) VALUES(?, ?)"))?;

    let mut affected = HashSet::new();
    for owner_id in owners {
        affected.insert(owner_id);
        let exists: bool = exists_stmt.query_row((owner_id, target_id), |r| r.get(0))?;
        if exists {
            tracing::debug!(table, owner_id, target_id, "target already associated, dropping source row");
            continue;
        }
        insert_stmt.execute((owner_id, target_id))?;
    }

    conn.execute(&delete_sql, params_from_iter(bind.iter()))?;
    Ok(affected.len())
}

/// Merges `source_ids` into `target_id`.
///
/// Unknown source ids and the target's own id are ignored. When no source
/// remains the call returns a zero outcome without touching anything.
pub fn merge_tags(
    tx: &Transaction<'_>,
    target_id: i64,
    source_ids: &[i64],
    actor: Option<i64>,
) -> TagResult<MergeOutcome> {
    let target = model::require_tag(tx, target_id)?;

    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for &id in source_ids {
        if id == target.id || !seen.insert(id) {
            continue;
        }
        if let Some(tag) = model::find_tag(tx, id)? {
            sources.push(tag);
        }
    }

    if sources.is_empty() {
        tracing::debug!(target_id, "merge has no sources left, nothing to do");
        return Ok(MergeOutcome::default());
    }

    if sources.iter().any(|s| s.context != target.context) {
        return Err(TagError::invalid("Merge requires tags in the same context."));
    }

    let processed: Vec<i64> = sources.iter().map(|s| s.id).collect();

    // Reviving the target must not leave two active tags with one name.
    if !target.is_active {
        if let Some(clash) =
            model::find_by_name_ci(tx, &target.context, &target.name, true, Some(target.id))?
        {
            if !processed.contains(&clash.id) {
                return Err(TagError::invalid(format!(
                    "an active tag named \"{}\" already exists in {} (id {})",
                    clash.name, target.context, clash.id
                )));
            }
        }
    }

    let strategy = Reassignment::for_context(&target.context);
    tracing::debug!(context = %target.context, ?strategy, "reassigning associations");
    let affected_resources = strategy.apply(tx, target.id, &processed)?;

    let ts = now();
    tx.execute(
        "UPDATE tags SET is_active = 1, last_used_at = ?, updated_at = ? WHERE id = ?",
        (&ts, &ts, target.id),
    )?;

    let mut deactivated_tags = 0;
    for source in sources.iter().filter(|s| s.is_active) {
        tx.execute(
            "UPDATE tags
             SET is_active = 0, last_used_at = COALESCE(last_used_at, ?), updated_at = ?
             WHERE id = ?",
            (&ts, &ts, source.id),
        )?;
        deactivated_tags += 1;
    }

    activity::log(
        tx,
        actor,
        "tag.merged",
        Some(Subject::tag(&target)),
        &MergedProperties {
            target_id: target.id,
            source_ids: &processed,
            context: &target.context,
            affected_resources,
            deactivated: deactivated_tags,
        },
    )?;

    tracing::info!(
        target_id = target.id,
        context = %target.context,
        sources = processed.len(),
        affected_resources,
        deactivated_tags,
        "merged tags"
    );

    Ok(MergeOutcome {
        affected_resources,
        deactivated_tags,
    })
}

/// Splits `names` (comma / newline delimited entries) into trimmed, non-blank,
/// exactly-deduplicated names in first-seen order.
pub fn normalize_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .flat_map(|entry| entry.as_ref().split([',', '\n']))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_string()))
        .map(str::to_string)
        .collect()
}

/// Creates a new tag for every name not already present in the tag's context,
/// and deactivates the original unless `keep_original` is set.
pub fn split_tag<S: AsRef<str>>(
    tx: &Transaction<'_>,
    tag_id: i64,
    names: &[S],
    keep_original: bool,
    color: Option<&str>,
    actor: Option<i64>,
) -> TagResult<SplitOutcome> {
    let tag = model::require_tag(tx, tag_id)?;
    if let Some(color) = color {
        catalog::validate_color(color)?;
    }

    let names = normalize_names(names);
    if names.is_empty() {
        return Ok(SplitOutcome::default());
    }

    let mut created = Vec::new();
    for name in &names {
        if let Some(existing) = model::find_by_name_ci(tx, &tag.context, name, false, None)? {
            tracing::debug!(name = %name, existing_id = existing.id, "split name already exists, skipping");
            continue;
        }
        let new_tag = catalog::insert_tag(
            tx,
            &NewTag {
                context: tag.context.clone(),
                name: name.clone(),
                name_en: None,
                description: None,
                color: color.map(str::to_string).or_else(|| tag.color.clone()),
                is_active: true,
                sort_order: 0,
                last_used_at: None,
            },
        )?;
        created.push(new_tag);
    }

    let mut deactivated_original = false;
    if !keep_original && tag.is_active {
        tx.execute(
            "UPDATE tags SET is_active = 0, updated_at = ? WHERE id = ?",
            (now(), tag.id),
        )?;
        deactivated_original = true;
    }

    activity::log(
        tx,
        actor,
        "tag.split",
        Some(Subject::tag(&tag)),
        &SplitProperties {
            context: &tag.context,
            keep_original,
            created_tag_ids: created.iter().map(|t| t.id).collect(),
        },
    )?;

    tracing::info!(
        tag_id = tag.id,
        context = %tag.context,
        created = created.len(),
        deactivated_original,
        "split tag"
    );

    Ok(SplitOutcome {
        created,
        deactivated_original,
    })
}
