use rusqlite::{Connection, OptionalExtension, Transaction};

use crate::error::{TagError, TagResult};
use crate::model::{self, now, SpaceType, TagContext};

/// A taggable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Post(i64),
    Space(i64),
}

impl Owner {
    fn table(self) -> (&'static str, &'static str) {
        match self {
            Owner::Post(_) => ("post_tag", "post_id"),
            Owner::Space(_) => ("space_tag", "space_id"),
        }
    }

    fn id(self) -> i64 {
        match self {
            Owner::Post(id) | Owner::Space(id) => id,
        }
    }
}

enum Accepts {
    Posts,
    Space(SpaceType),
}

impl Accepts {
    fn allows(&self, context: &TagContext) -> bool {
        match self {
            Accepts::Posts => *context == TagContext::Posts,
            Accepts::Space(space_type) => {
                *context == TagContext::Spaces || context.space_type() == Some(*space_type)
            }
        }
    }
}

fn resolve_owner(conn: &Connection, owner: Owner) -> TagResult<Accepts> {
    match owner {
        Owner::Post(id) => {
            let found: Option<i64> = conn
                .query_row("SELECT id FROM posts WHERE id = ?", [id], |r| r.get(0))
                .optional()?;
            found
                .map(|_| Accepts::Posts)
                .ok_or_else(|| TagError::not_found(format!("post {id}")))
        }
        Owner::Space(id) => {
            let code: Option<i64> = conn
                .query_row("SELECT space_type FROM spaces WHERE id = ?", [id], |r| r.get(0))
                .optional()?;
            let code = code.ok_or_else(|| TagError::not_found(format!("space {id}")))?;
            SpaceType::from_code(code)
                .map(Accepts::Space)
                .ok_or_else(|| TagError::invalid(format!("space {id} has unknown type {code}")))
        }
    }
}

/// Associates `tag_ids` with `owner`, skipping pairs that already exist.
///
/// Every tag that gains an association has its `last_used_at` refreshed.
/// Returns the number of new association rows.
pub fn attach_tags(tx: &Transaction<'_>, owner: Owner, tag_ids: &[i64]) -> TagResult<usize> {
    let accepts = resolve_owner(tx, owner)?;
    for &tag_id in tag_ids {
        let tag = model::require_tag(tx, tag_id)?;
        if !accepts.allows(&tag.context) {
            return Err(TagError::invalid(format!(
                "tag {} belongs to {} and cannot be attached here",
                tag.id, tag.context
            )));
        }
    }

    let (table, column) = owner.table();
    let mut exists_stmt = tx.prepare(&format!(
        "SELECT EXISTS(SELECT 1 FROM {table} WHERE {column} = ? AND tag_id = ?)"
    ))?;
    let mut insert_stmt =
        tx.prepare(&format!("INSERT INTO {table}({column}, tag_id) VALUES(?, ?)"))?;

    let ts = now();
    let mut attached = 0;
    for &tag_id in tag_ids {
        let exists: bool = exists_stmt.query_row((owner.id(), tag_id), |r| r.get(0))?;
        if exists {
            continue;
        }
        insert_stmt.execute((owner.id(), tag_id))?;
        tx.execute("UPDATE tags SET last_used_at = ? WHERE id = ?", (&ts, tag_id))?;
        attached += 1;
    }

    tracing::debug!(?owner, attached, "attached tags");
    Ok(attached)
}

pub fn tag_ids_for(conn: &Connection, owner: Owner) -> TagResult<Vec<i64>> {
    let (table, column) = owner.table();
    let mut stmt = conn.prepare(&format!(
        "SELECT tag_id FROM {table} WHERE {column} = ? ORDER BY tag_id"
    ))?;
    let ids = stmt
        .query_map([owner.id()], |r| r.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}
