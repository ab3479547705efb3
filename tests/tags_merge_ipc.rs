mod common;

use common::open_workspace;
use serde_json::json;

#[test]
fn merge_moves_posts_onto_target_once_each() {
    let mut ws = open_workspace();
    let t1 = ws.create_tag("posts", "Admissions");
    let t2 = ws.create_tag("posts", "Enrollment");
    let p1 = ws.post("P1");
    let p2 = ws.post("P2");
    let p3 = ws.post("P3");
    ws.attach_post(p1, &[t1]);
    ws.attach_post(p2, &[t1, t2]);
    ws.attach_post(p3, &[t2]);

    let res = ws.sidecar.request_ok(
        "tags.merge",
        json!({ "target_id": t1, "source_ids": [t2], "actor_id": 4 }),
    );
    assert_eq!(res.pointer("/result/deactivated_tags"), Some(&json!(1)));
    assert_eq!(res.pointer("/result/affected_resources"), Some(&json!(2)));

    for post in [p1, p2, p3] {
        assert_eq!(ws.post_tags(post), vec![t1]);
    }
    assert_eq!(ws.tag(t1)["is_active"], json!(true));
    assert_eq!(ws.tag(t1)["usage_count"], json!(3));
    let source = ws.tag(t2);
    assert_eq!(source["is_active"], json!(false));
    assert_eq!(source["usage_count"], json!(0));
}

#[test]
fn merge_records_compatible_activity_payload() {
    let mut ws = open_workspace();
    let target = ws.create_tag("labs", "Machine Learning");
    let a = ws.create_tag("labs", "ML");
    let b = ws.create_tag("labs", "Deep Learning");
    let lab = ws.space("Vision Lab", 2);
    ws.attach_space(lab, &[a, b]);

    ws.sidecar.request_ok(
        "tags.merge",
        json!({ "target_id": target, "source_ids": [a, b, target], "actor_id": 4 }),
    );

    let res = ws
        .sidecar
        .request_ok("activity.list", json!({ "action": "tag.merged" }));
    let activities = res["activities"].as_array().expect("activities");
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0]["user_id"], json!(4));
    assert_eq!(activities[0]["subject_type"], json!("tag"));
    assert_eq!(activities[0]["subject_id"], json!(target));
    assert_eq!(
        activities[0]["properties"],
        json!({
            "target_id": target,
            "source_ids": [a, b],
            "context": "labs",
            "affected_resources": 1,
            "deactivated": 2,
        })
    );
    assert_eq!(ws.space_tags(lab), vec![target]);
}

#[test]
fn cross_context_merge_is_rejected_and_changes_nothing() {
    let mut ws = open_workspace();
    let posts_tag = ws.create_tag("posts", "Events");
    let lab_tag = ws.create_tag("labs", "Events");
    let post = ws.post("P");
    let lab = ws.space("L", 2);
    ws.attach_post(post, &[posts_tag]);
    ws.attach_space(lab, &[lab_tag]);
    let before = ws.dump();

    let code = ws.sidecar.request_err(
        "tags.merge",
        json!({ "target_id": posts_tag, "source_ids": [lab_tag] }),
    );
    assert_eq!(code, "bad_params");
    assert_eq!(ws.dump(), before);
}

#[test]
fn self_only_merge_is_a_no_op() {
    let mut ws = open_workspace();
    let t1 = ws.create_tag("posts", "Solo");
    let post = ws.post("P");
    ws.attach_post(post, &[t1]);
    let before = ws.dump();

    let res = ws.sidecar.request_ok(
        "tags.merge",
        json!({ "target_id": t1, "source_ids": [t1] }),
    );
    assert_eq!(
        res["result"],
        json!({ "affected_resources": 0, "deactivated_tags": 0 })
    );
    assert_eq!(ws.dump(), before);
}

#[test]
fn merge_validates_ids_before_touching_anything() {
    let mut ws = open_workspace();
    let t1 = ws.create_tag("posts", "Kept");
    let t2 = ws.create_tag("posts", "Other");
    let before = ws.dump();

    assert_eq!(
        ws.sidecar.request_err("tags.merge", json!({ "target_id": 9999, "source_ids": [t1] })),
        "not_found"
    );
    assert_eq!(
        ws.sidecar.request_err("tags.merge", json!({ "target_id": t1, "source_ids": [t2, 9999] })),
        "not_found"
    );
    assert_eq!(
        ws.sidecar.request_err("tags.merge", json!({ "target_id": t1, "source_ids": [] })),
        "bad_params"
    );
    assert_eq!(
        ws.sidecar.request_err("tags.merge", json!({ "target_id": t1, "source_ids": "2" })),
        "bad_params"
    );
    assert_eq!(
        ws.sidecar.request_err("tags.merge", json!({ "source_ids": [t2] })),
        "bad_params"
    );
    assert_eq!(ws.dump(), before);
}

#[test]
fn classroom_merge_leaves_lab_associations() {
    let mut ws = open_workspace();
    let target = ws.create_tag("classrooms", "Projector");
    let source = ws.create_tag("classrooms", "Beamer");
    let room = ws.space("R101", 3);
    ws.attach_space(room, &[source]);
    let lab = ws.space("L1", 2);
    ws.db
        .execute(
            "INSERT INTO space_tag(space_id, tag_id) VALUES(?, ?)",
            (lab, source),
        )
        .expect("stray lab row");

    let res = ws.sidecar.request_ok(
        "tags.merge",
        json!({ "target_id": target, "source_ids": [source] }),
    );
    assert_eq!(res.pointer("/result/affected_resources"), Some(&json!(1)));
    assert_eq!(ws.space_tags(room), vec![target]);
    assert_eq!(ws.space_tags(lab), vec![source]);
}
