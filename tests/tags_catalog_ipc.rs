mod common;

use common::{open_workspace, Sidecar};
use serde_json::json;

#[test]
fn requests_before_workspace_selection() {
    let mut sidecar = Sidecar::spawn();
    let health = sidecar.request_ok("health", json!({}));
    assert_eq!(health["workspacePath"], json!(null));

    assert_eq!(
        sidecar.request_err("tags.merge", json!({ "target_id": 1, "source_ids": [2] })),
        "no_workspace"
    );
    let list = sidecar.request_ok("tags.list", json!({}));
    assert_eq!(list["tableReady"], json!(false));
    assert_eq!(
        sidecar.request_err("tags.unknown", json!({})),
        "not_implemented"
    );
}

#[test]
fn create_update_deactivate_round() {
    let mut ws = open_workspace();
    let created = ws.sidecar.request_ok(
        "tags.create",
        json!({ "context": "posts", "name": "Old Tag", "description": "first" }),
    );
    let id = created.pointer("/tag/id").and_then(|v| v.as_i64()).expect("id");
    assert_eq!(created.pointer("/tag/slug"), Some(&json!("old-tag")));

    assert_eq!(
        ws.sidecar
            .request_err("tags.create", json!({ "context": "posts", "name": "old tag" })),
        "bad_params"
    );
    assert_eq!(
        ws.sidecar
            .request_err("tags.create", json!({ "context": "nowhere", "name": "x" })),
        "bad_params"
    );

    let updated = ws.sidecar.request_ok(
        "tags.update",
        json!({ "tag_id": id, "name": "Latest News", "sort_order": 8, "is_active": true }),
    );
    assert_eq!(updated.pointer("/tag/slug"), Some(&json!("latest-news")));
    assert_eq!(updated.pointer("/tag/sort_order"), Some(&json!(8)));

    let gone = ws
        .sidecar
        .request_ok("tags.deactivate", json!({ "tag_id": id }));
    assert_eq!(gone.pointer("/tag/is_active"), Some(&json!(false)));
    assert_eq!(ws.count("tags"), 1);

    let actions: Vec<String> = ws
        .sidecar
        .request_ok("activity.list", json!({ "subject_id": id }))["activities"]
        .as_array()
        .expect("activities")
        .iter()
        .map(|a| a["action"].as_str().expect("action").to_string())
        .collect();
    assert_eq!(actions, vec!["tag.deactivated", "tag.updated", "tag.created"]);
}

#[test]
fn list_and_options_filter_by_context_and_status() {
    let mut ws = open_workspace();
    let busy = ws.create_tag("posts", "Busy");
    let idle = ws.create_tag("posts", "Idle");
    ws.create_tag("labs", "Optics");
    for title in ["a", "b"] {
        let post = ws.post(title);
        ws.attach_post(post, &[busy]);
    }
    ws.sidecar
        .request_ok("tags.deactivate", json!({ "tag_id": idle }));

    let page = ws
        .sidecar
        .request_ok("tags.list", json!({ "context": "posts", "per_page": 50 }));
    let listed: Vec<i64> = page["data"]
        .as_array()
        .expect("data")
        .iter()
        .map(|t| t["id"].as_i64().expect("id"))
        .collect();
    assert_eq!(listed, vec![busy, idle]);
    assert_eq!(page["data"][0]["usage_count"], json!(2));
    assert_eq!(page["meta"]["total"], json!(2));
    assert_eq!(page["meta"]["per_page"], json!(50));

    let active = ws
        .sidecar
        .request_ok("tags.list", json!({ "status": "active", "keyword": "opt" }));
    assert_eq!(active["meta"]["total"], json!(1));
    assert_eq!(active["data"][0]["name"], json!("Optics"));

    let far = ws
        .sidecar
        .request_ok("tags.list", json!({ "page": i64::MAX }));
    assert_eq!(far["meta"]["current_page"], json!(1));
    assert_eq!(far["meta"]["total"], json!(3));

    let options = ws
        .sidecar
        .request_ok("tags.options", json!({ "context": "posts" }));
    assert_eq!(
        options["data"],
        json!([{
            "id": busy,
            "value": busy,
            "label": "Busy",
            "slug": "busy",
            "color": "#336699",
            "usage_count": 2,
        }])
    );
}

#[test]
fn register_find_or_create_and_contexts() {
    let mut ws = open_workspace();
    ws.create_tag("posts", "Seminar");

    let res = ws.sidecar.request_ok(
        "tags.register",
        json!({ "names": ["seminar", "Workshop"], "contexts": ["posts", "projects"] }),
    );
    assert_eq!(res["created"].as_array().expect("created").len(), 3);

    let found = ws.sidecar.request_ok(
        "tags.findOrCreate",
        json!({ "context": "projects", "name": "WORKSHOP" }),
    );
    assert_eq!(found.pointer("/tag/name"), Some(&json!("Workshop")));
    assert_eq!(ws.count("tags"), 4);

    let contexts = ws.sidecar.request_ok("tags.contexts", json!({}));
    let values: Vec<&str> = contexts["contexts"]
        .as_array()
        .expect("contexts")
        .iter()
        .map(|c| c["value"].as_str().expect("value"))
        .collect();
    assert_eq!(
        values,
        vec!["posts", "attachments", "labs", "classrooms", "programs", "projects"]
    );
}

#[test]
fn attaching_checks_owner_and_context() {
    let mut ws = open_workspace();
    let lab_tag = ws.create_tag("labs", "Lasers");
    let post = ws.post("P");
    assert_eq!(
        ws.sidecar.request_err(
            "posts.attachTags",
            json!({ "post_id": post, "tag_ids": [lab_tag] })
        ),
        "bad_params"
    );
    assert_eq!(
        ws.sidecar.request_err(
            "spaces.attachTags",
            json!({ "space_id": 77, "tag_ids": [lab_tag] })
        ),
        "not_found"
    );
    assert!(ws.post_tags(post).is_empty());
}
