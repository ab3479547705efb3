use crate::catalog::{self, CreateTag, OptionsFilter, StatusFilter, TagListFilter, UpdateTag};
use crate::consolidate;
use crate::error::TagError;
use crate::ipc::error::{err, ok, tag_err};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use crate::model::{self, TagContext, CATALOG_CONTEXTS};
use serde_json::{json, Value};

fn handle_tags_merge(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let target_id = match helpers::req_i64(&req.params, "target_id") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let source_ids = match helpers::i64_list(&req.params, "source_ids") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    if source_ids.is_empty() {
        return err(
            &req.id,
            "bad_params",
            "select at least one tag to merge",
            Some(json!({ "field": "source_ids" })),
        );
    }
    let actor = match helpers::actor(&req.params) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let result = helpers::in_transaction(conn, |tx| {
        model::require_tag(tx, target_id)?;
        for &id in &source_ids {
            model::require_tag(tx, id)?;
        }
        consolidate::merge_tags(tx, target_id, &source_ids, actor)
    });

    match result {
        Ok(outcome) => ok(
            &req.id,
            json!({ "message": "Tags merged.", "result": outcome }),
        ),
        Err(e) => tag_err(&req.id, &req.method, &e),
    }
}

fn handle_tags_split(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let tag_id = match helpers::req_i64(&req.params, "tag_id") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    // A single string is split on commas and newlines by the engine.
    let names = match req.params.get("names") {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(_)) => match helpers::string_list(&req.params, "names") {
            Ok(v) => v,
            Err(m) => return err(&req.id, "bad_params", m, None),
        },
        None | Some(Value::Null) => return err(&req.id, "bad_params", "missing names", None),
        Some(_) => {
            return err(
                &req.id,
                "bad_params",
                "names must be a string or an array of strings",
                None,
            )
        }
    };
    let keep_original = match helpers::opt_bool(&req.params, "keep_original") {
        Ok(v) => v.unwrap_or(true),
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let color = match helpers::opt_str(&req.params, "color") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let actor = match helpers::actor(&req.params) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let result = helpers::in_transaction(conn, |tx| {
        model::require_tag(tx, tag_id)?;
        if consolidate::normalize_names(&names).is_empty() {
            return Err(TagError::invalid("names must contain at least one tag name"));
        }
        consolidate::split_tag(tx, tag_id, &names, keep_original, color.as_deref(), actor)
    });

    match result {
        Ok(outcome) => ok(
            &req.id,
            json!({
                "message": "Created new tags.",
                "created": outcome.created,
                "deactivated_original": outcome.deactivated_original,
            }),
        ),
        Err(e) => tag_err(&req.id, &req.method, &e),
    }
}

fn handle_tags_create(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let p = &req.params;
    let input = (|| -> Result<(CreateTag, Option<i64>), String> {
        Ok((
            CreateTag {
                context: helpers::req_str(p, "context")?,
                name: helpers::req_str(p, "name")?,
                name_en: helpers::opt_str(p, "name_en")?,
                description: helpers::opt_str(p, "description")?,
                color: helpers::opt_str(p, "color")?,
                is_active: helpers::opt_bool(p, "is_active")?,
            },
            helpers::actor(p)?,
        ))
    })();
    let (input, actor) = match input {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    match helpers::in_transaction(conn, |tx| catalog::create_tag(tx, input, actor)) {
        Ok(tag) => ok(&req.id, json!({ "tag": tag })),
        Err(e) => tag_err(&req.id, &req.method, &e),
    }
}

fn handle_tags_update(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let p = &req.params;
    let input = (|| -> Result<(i64, UpdateTag, Option<i64>), String> {
        Ok((
            helpers::req_i64(p, "tag_id")?,
            UpdateTag {
                name: helpers::req_str(p, "name")?,
                name_en: helpers::opt_str(p, "name_en")?,
                description: helpers::opt_str(p, "description")?,
                color: helpers::opt_str(p, "color")?,
                is_active: helpers::opt_bool(p, "is_active")?.unwrap_or(true),
                sort_order: helpers::opt_i64(p, "sort_order")?,
            },
            helpers::actor(p)?,
        ))
    })();
    let (tag_id, input, actor) = match input {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    match helpers::in_transaction(conn, |tx| catalog::update_tag(tx, tag_id, input, actor)) {
        Ok(tag) => ok(&req.id, json!({ "tag": tag })),
        Err(e) => tag_err(&req.id, &req.method, &e),
    }
}

fn handle_tags_deactivate(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let tag_id = match helpers::req_i64(&req.params, "tag_id") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let actor = match helpers::actor(&req.params) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    match helpers::in_transaction(conn, |tx| catalog::deactivate_tag(tx, tag_id, actor)) {
        Ok(tag) => ok(&req.id, json!({ "tag": tag })),
        Err(e) => tag_err(&req.id, &req.method, &e),
    }
}

fn handle_tags_get(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let tag_id = match helpers::req_i64(&req.params, "tag_id") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    match catalog::get_tag(conn, tag_id) {
        Ok(tag) => ok(&req.id, json!({ "tag": tag })),
        Err(e) => tag_err(&req.id, &req.method, &e),
    }
}

fn handle_tags_list(state: &mut AppState, req: &Request) -> Value {
    let p = &req.params;
    let filter = (|| -> Result<TagListFilter, String> {
        Ok(TagListFilter {
            keyword: helpers::opt_str(p, "keyword")?,
            // Unrecognised statuses list everything.
            status: helpers::opt_str(p, "status")?
                .as_deref()
                .and_then(StatusFilter::parse),
            context: helpers::opt_str(p, "context")?,
            per_page: helpers::opt_usize(p, "per_page")?,
            page: helpers::opt_usize(p, "page")?,
        })
    })();
    let filter = match filter {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let Some(conn) = state.db.as_ref() else {
        return ok(
            &req.id,
            json!({ "data": [], "meta": null, "filters": filter, "tableReady": false }),
        );
    };

    match catalog::list_tags(conn, &filter) {
        Ok(page) => ok(
            &req.id,
            json!({
                "data": page.data,
                "meta": page.meta,
                "filters": filter,
                "tableReady": true,
            }),
        ),
        Err(e) => tag_err(&req.id, &req.method, &e),
    }
}

fn handle_tags_options(state: &mut AppState, req: &Request) -> Value {
    let p = &req.params;
    let filter = (|| -> Result<OptionsFilter, String> {
        Ok(OptionsFilter {
            context: helpers::opt_str(p, "context")?,
            keyword: helpers::opt_str(p, "keyword")?,
            limit: helpers::opt_usize(p, "limit")?,
        })
    })();
    let filter = match filter {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "data": [] }));
    };

    match catalog::tag_options(conn, &filter) {
        Ok(options) => ok(&req.id, json!({ "data": options })),
        Err(e) => tag_err(&req.id, &req.method, &e),
    }
}

fn handle_tags_register(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let names = match helpers::string_list(&req.params, "names") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let contexts = match helpers::string_list(&req.params, "contexts") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    match helpers::in_transaction(conn, |tx| catalog::register(tx, &names, &contexts)) {
        Ok(created) => ok(&req.id, json!({ "created": created })),
        Err(e) => tag_err(&req.id, &req.method, &e),
    }
}

fn handle_tags_find_or_create(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let context = match helpers::req_str(&req.params, "context") {
        Ok(v) => TagContext::parse(v.trim()),
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let name = match helpers::req_str(&req.params, "name") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    match helpers::in_transaction(conn, |tx| catalog::find_or_create(tx, &context, &name)) {
        Ok(tag) => ok(&req.id, json!({ "tag": tag })),
        Err(e) => tag_err(&req.id, &req.method, &e),
    }
}

fn handle_tags_contexts(req: &Request) -> Value {
    let contexts: Vec<Value> = CATALOG_CONTEXTS
        .iter()
        .map(|(value, label)| json!({ "value": value, "label": label }))
        .collect();
    ok(&req.id, json!({ "contexts": contexts }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "tags.merge" => Some(handle_tags_merge(state, req)),
        "tags.split" => Some(handle_tags_split(state, req)),
        "tags.create" => Some(handle_tags_create(state, req)),
        "tags.update" => Some(handle_tags_update(state, req)),
        "tags.deactivate" => Some(handle_tags_deactivate(state, req)),
        "tags.get" => Some(handle_tags_get(state, req)),
        "tags.list" => Some(handle_tags_list(state, req)),
        "tags.options" => Some(handle_tags_options(state, req)),
        "tags.register" => Some(handle_tags_register(state, req)),
        "tags.findOrCreate" => Some(handle_tags_find_or_create(state, req)),
        "tags.contexts" => Some(handle_tags_contexts(req)),
        _ => None,
    }
}
