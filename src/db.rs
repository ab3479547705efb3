use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "tags.sqlite3";

pub fn open_db(workspace: &Path, busy_timeout: Duration) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(busy_timeout)?;
    init_schema(&conn)?;
    Ok(conn)
}

#[cfg(test)]
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tags(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            context TEXT NOT NULL,
            name TEXT NOT NULL,
            slug TEXT NOT NULL,
            description TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            created_at TEXT,
            updated_at TEXT,
            UNIQUE(context, slug)
        )",
        [],
    )?;
    // Workspaces created before tag lifecycle tracking lack these columns.
    ensure_tags_lifecycle_columns(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tags_context ON tags(context)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tags_is_active ON tags(is_active)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tags_last_used_at ON tags(last_used_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS posts(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS post_tag(
            post_id INTEGER NOT NULL,
            tag_id INTEGER NOT NULL,
            PRIMARY KEY(post_id, tag_id),
            FOREIGN KEY(post_id) REFERENCES posts(id),
            FOREIGN KEY(tag_id) REFERENCES tags(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_post_tag_tag ON post_tag(tag_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS spaces(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            space_type INTEGER NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_spaces_type ON spaces(space_type)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS space_tag(
            space_id INTEGER NOT NULL,
            tag_id INTEGER NOT NULL,
            PRIMARY KEY(space_id, tag_id),
            FOREIGN KEY(space_id) REFERENCES spaces(id),
            FOREIGN KEY(tag_id) REFERENCES tags(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_space_tag_tag ON space_tag(tag_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS manage_activities(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER,
            action TEXT NOT NULL,
            subject_type TEXT,
            subject_id INTEGER,
            description TEXT,
            properties TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_manage_activities_subject
         ON manage_activities(subject_type, subject_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_manage_activities_action ON manage_activities(action)",
        [],
    )?;

    Ok(())
}

fn ensure_tags_lifecycle_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "tags", "name_en")? {
        conn.execute("ALTER TABLE tags ADD COLUMN name_en TEXT", [])?;
    }
    if !table_has_column(conn, "tags", "color")? {
        conn.execute("ALTER TABLE tags ADD COLUMN color TEXT", [])?;
    }
    if !table_has_column(conn, "tags", "is_active")? {
        conn.execute(
            "ALTER TABLE tags ADD COLUMN is_active INTEGER NOT NULL DEFAULT 1",
            [],
        )?;
    }
    if !table_has_column(conn, "tags", "last_used_at")? {
        conn.execute("ALTER TABLE tags ADD COLUMN last_used_at TEXT", [])?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
