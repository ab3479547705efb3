use crate::assoc::{self, Owner};
use crate::ipc::error::{err, ok, tag_err};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn owner_from(req: &Request) -> Result<Owner, String> {
    match req.method.as_str() {
        m if m.starts_with("posts.") => helpers::req_i64(&req.params, "post_id").map(Owner::Post),
        _ => helpers::req_i64(&req.params, "space_id").map(Owner::Space),
    }
}

fn handle_attach(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let owner = match owner_from(req) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let tag_ids = match helpers::i64_list(&req.params, "tag_ids") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    match helpers::in_transaction(conn, |tx| assoc::attach_tags(tx, owner, &tag_ids)) {
        Ok(attached) => ok(&req.id, json!({ "attached": attached })),
        Err(e) => tag_err(&req.id, &req.method, &e),
    }
}

fn handle_tag_ids(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let owner = match owner_from(req) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    match assoc::tag_ids_for(conn, owner) {
        Ok(ids) => ok(&req.id, json!({ "tagIds": ids })),
        Err(e) => tag_err(&req.id, &req.method, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "posts.attachTags" | "spaces.attachTags" => Some(handle_attach(state, req)),
        "posts.tags" | "spaces.tags" => Some(handle_tag_ids(state, req)),
        _ => None,
    }
}
