use crate::activity::{self, ActivityFilter};
use crate::ipc::error::{err, ok, tag_err};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

const DEFAULT_LIMIT: usize = 50;

fn handle_activity_list(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "activities": [] }));
    };
    let action = match helpers::opt_str(&req.params, "action") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let subject_id = match helpers::opt_i64(&req.params, "subject_id") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let limit = match helpers::opt_usize(&req.params, "limit") {
        Ok(v) => v.unwrap_or(DEFAULT_LIMIT).clamp(1, 500),
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let filter = ActivityFilter {
        action,
        subject_id,
        limit,
    };
    match activity::list(conn, &filter) {
        Ok(activities) => ok(&req.id, json!({ "activities": activities })),
        Err(e) => tag_err(&req.id, &req.method, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "activity.list" => Some(handle_activity_list(state, req)),
        _ => None,
    }
}
