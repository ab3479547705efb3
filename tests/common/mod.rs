#![allow(dead_code)]

use rusqlite::Connection;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::Duration;
use tempfile::TempDir;

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_tagd");
        let mut child = Command::new(exe)
            .env_remove("TAGD_WORKSPACE")
            .env("TAGD_LOG", "warn")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn tagd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Sidecar {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn request_ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Sends a request expected to fail and returns its error code.
    pub fn request_err(&mut self, method: &str, params: serde_json::Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .pointer("/error/code")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string()
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A running daemon with a freshly selected workspace, plus a direct
/// connection to the same database for seeding and inspection.
pub struct Workspace {
    pub sidecar: Sidecar,
    pub db: Connection,
    pub dir: TempDir,
}

pub fn open_workspace() -> Workspace {
    let dir = tempfile::Builder::new()
        .prefix("tagd-ipc")
        .tempdir()
        .expect("temp dir");
    let mut sidecar = Sidecar::spawn();
    sidecar.request_ok(
        "workspace.select",
        json!({ "path": dir.path().to_string_lossy() }),
    );
    let db = Connection::open(dir.path().join("tags.sqlite3")).expect("open workspace db");
    db.busy_timeout(Duration::from_secs(5)).expect("busy timeout");
    Workspace { sidecar, db, dir }
}

impl Workspace {
    pub fn create_tag(&mut self, context: &str, name: &str) -> i64 {
        let res = self.sidecar.request_ok(
            "tags.create",
            json!({ "context": context, "name": name, "color": "#336699" }),
        );
        res.pointer("/tag/id").and_then(|v| v.as_i64()).expect("tag id")
    }

    pub fn post(&self, title: &str) -> i64 {
        self.db
            .execute("INSERT INTO posts(title) VALUES(?)", [title])
            .expect("insert post");
        self.db.last_insert_rowid()
    }

    pub fn space(&self, name: &str, space_type: i64) -> i64 {
        self.db
            .execute(
                "INSERT INTO spaces(name, space_type) VALUES(?, ?)",
                (name, space_type),
            )
            .expect("insert space");
        self.db.last_insert_rowid()
    }

    pub fn attach_post(&mut self, post_id: i64, tag_ids: &[i64]) {
        self.sidecar.request_ok(
            "posts.attachTags",
            json!({ "post_id": post_id, "tag_ids": tag_ids }),
        );
    }

    pub fn attach_space(&mut self, space_id: i64, tag_ids: &[i64]) {
        self.sidecar.request_ok(
            "spaces.attachTags",
            json!({ "space_id": space_id, "tag_ids": tag_ids }),
        );
    }

    pub fn post_tags(&mut self, post_id: i64) -> Vec<i64> {
        let res = self
            .sidecar
            .request_ok("posts.tags", json!({ "post_id": post_id }));
        ids(&res["tagIds"])
    }

    pub fn space_tags(&mut self, space_id: i64) -> Vec<i64> {
        let res = self
            .sidecar
            .request_ok("spaces.tags", json!({ "space_id": space_id }));
        ids(&res["tagIds"])
    }

    pub fn tag(&mut self, tag_id: i64) -> serde_json::Value {
        self.sidecar
            .request_ok("tags.get", json!({ "tag_id": tag_id }))
            .get("tag")
            .cloned()
            .expect("tag")
    }

    pub fn count(&self, table: &str) -> i64 {
        self.db
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .expect("count")
    }

    /// Every row of the tag and association tables, for before/after checks.
    pub fn dump(&self) -> Vec<String> {
        let mut out = Vec::new();
        for sql in [
            "SELECT id || '|' || context || '|' || name || '|' || slug || '|' || is_active
                    || '|' || IFNULL(last_used_at, '') || '|' || IFNULL(updated_at, '')
             FROM tags ORDER BY id",
            "SELECT 'p' || post_id || '|' || tag_id FROM post_tag ORDER BY post_id, tag_id",
            "SELECT 's' || space_id || '|' || tag_id FROM space_tag ORDER BY space_id, tag_id",
            "SELECT 'a' || id || '|' || action FROM manage_activities ORDER BY id",
        ] {
            let mut stmt = self.db.prepare(sql).expect("prepare dump");
            let rows = stmt
                .query_map([], |r| r.get::<_, String>(0))
                .expect("dump query")
                .collect::<Result<Vec<_>, _>>()
                .expect("dump rows");
            out.extend(rows);
        }
        out
    }
}

pub fn ids(value: &serde_json::Value) -> Vec<i64> {
    value
        .as_array()
        .expect("array")
        .iter()
        .map(|v| v.as_i64().expect("integer id"))
        .collect()
}
