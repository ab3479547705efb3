use rand::distributions::Alphanumeric;
use rand::Rng;
use rusqlite::{Connection, OptionalExtension};

use crate::model::TagContext;

/// Lowercase, dash-separated ASCII slug for a display name.
///
/// Common Latin diacritics are folded, other non-ASCII letters are dropped.
/// Returns an empty string when nothing survives (e.g. a CJK-only name).
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;

    let push = |out: &mut String, piece: &str, pending: &mut bool| {
        if *pending && !out.is_empty() {
            out.push('-');
        }
        *pending = false;
        out.push_str(piece);
    };

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            let lower = ch.to_ascii_lowercase();
            push(&mut out, lower.encode_utf8(&mut [0u8; 4]), &mut pending_dash);
        } else if ch == '@' {
            pending_dash = true;
            push(&mut out, "at", &mut pending_dash);
            pending_dash = true;
        } else if let Some(folded) = fold_latin(ch) {
            push(&mut out, folded, &mut pending_dash);
        } else if ch.is_whitespace() || ch == '-' || ch == '_' {
            pending_dash = true;
        }
    }

    out
}

fn fold_latin(ch: char) -> Option<&'static str> {
    let s = match ch.to_lowercase().next()? {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' => "a",
        'æ' => "ae",
        'ç' | 'č' | 'ć' => "c",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ě' => "e",
        'ì' | 'í' | 'î' | 'ï' | 'ī' => "i",
        'ñ' | 'ń' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' => "o",
        'œ' => "oe",
        'ß' => "ss",
        'š' | 'ś' => "s",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' => "u",
        'ý' | 'ÿ' => "y",
        'ž' | 'ź' | 'ż' => "z",
        _ => return None,
    };
    Some(s)
}

fn random_base() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}

/// Slug for `name` that no other tag in `context` uses, suffixing `-1`, `-2`, ...
/// on collision. `ignore_id` excludes the tag being renamed.
pub fn generate_unique_slug(
    conn: &Connection,
    name: &str,
    context: &TagContext,
    ignore_id: Option<i64>,
) -> rusqlite::Result<String> {
    let mut base = slugify(name);
    if base.is_empty() {
        base = random_base();
    }

    let mut candidate = base.clone();
    let mut suffix = 1;
    while slug_taken(conn, &candidate, context, ignore_id)? {
        candidate = format!("{base}-{suffix}");
        suffix += 1;
    }
    Ok(candidate)
}

fn slug_taken(
    conn: &Connection,
    slug: &str,
    context: &TagContext,
    ignore_id: Option<i64>,
) -> rusqlite::Result<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM tags
             WHERE context = ?1 AND slug = ?2 AND (?3 IS NULL OR id != ?3)
             LIMIT 1",
            (context.as_str(), slug, ignore_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators_and_folds_case() {
        assert_eq!(slugify("  New   Tag "), "new-tag");
        assert_eq!(slugify("AI_Research--Lab"), "ai-research-lab");
        assert_eq!(slugify("C++ Lab"), "c-lab");
        assert_eq!(slugify("Café Crème"), "cafe-creme");
        assert_eq!(slugify("team@dept"), "team-at-dept");
    }

    #[test]
    fn slugify_drops_unmapped_scripts() {
        assert_eq!(slugify("系務公告"), "");
        assert_eq!(slugify("系務 2025"), "2025");
    }

    #[test]
    fn unique_slug_suffixes_within_context_only() {
        let conn = crate::db::open_in_memory().expect("db");
        for (ctx, slug) in [("posts", "news"), ("posts", "news-1"), ("labs", "events")] {
            conn.execute(
                "INSERT INTO tags(context, name, slug, is_active, sort_order) VALUES(?, ?, ?, 1, 0)",
                (ctx, slug, slug),
            )
            .expect("insert");
        }

        let posts = TagContext::Posts;
        assert_eq!(generate_unique_slug(&conn, "News", &posts, None).expect("slug"), "news-2");
        assert_eq!(generate_unique_slug(&conn, "Events", &posts, None).expect("slug"), "events");

        let own_id: i64 = conn
            .query_row("SELECT id FROM tags WHERE slug = 'news'", [], |r| r.get(0))
            .expect("id");
        assert_eq!(
            generate_unique_slug(&conn, "News", &posts, Some(own_id)).expect("slug"),
            "news"
        );
    }

    #[test]
    fn unique_slug_falls_back_to_random_base() {
        let conn = crate::db::open_in_memory().expect("db");
        let slug = generate_unique_slug(&conn, "系務公告", &TagContext::Posts, None).expect("slug");
        assert_eq!(slug.len(), 8);
        assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
