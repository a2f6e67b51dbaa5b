use crate::catalog::{DEFAULT_LAB_CREDITS, DEFAULT_THEORY_CREDITS};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v.trim().to_string(),
        Err(resp) => return resp,
    };
    let code = match required_str(req, "code") {
        Ok(v) => v.trim().to_string(),
        Err(resp) => return resp,
    };
    let semester = match required_i64(req, "semester") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let max_internal = match required_i64(req, "maxInternal") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let max_external = match required_i64(req, "maxExternal") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let is_lab = req
        .params
        .get("isLab")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    if name.is_empty() || code.is_empty() {
        return err(&req.id, "bad_params", "name and code must not be empty", None);
    }
    if !(1..=8).contains(&semester) {
        return err(
            &req.id,
            "bad_params",
            "semester must be between 1 and 8",
            Some(json!({ "semester": semester })),
        );
    }
    if max_internal < 0 || max_external < 0 {
        return err(&req.id, "bad_params", "max marks must be non-negative", None);
    }
    let credits = req
        .params
        .get("credits")
        .and_then(|v| v.as_f64())
        .unwrap_or(if is_lab {
            DEFAULT_LAB_CREDITS
        } else {
            DEFAULT_THEORY_CREDITS
        });
    if credits <= 0.0 {
        return err(&req.id, "bad_params", "credits must be positive", None);
    }

    let existing: Option<String> = match conn
        .query_row("SELECT id FROM subjects WHERE code = ?", [&code], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if existing.is_some() {
        return err(
            &req.id,
            "duplicate_code",
            "subject code already exists",
            Some(json!({ "code": code })),
        );
    }

    // Append only. Existing rows are never rewritten, so previously computed
    // results keep grading against the schemes they were entered under.
    let subject_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO subjects(id, code, name, semester, max_internal, max_external, is_lab, credits, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &subject_id,
            &code,
            &name,
            semester,
            max_internal,
            max_external,
            is_lab as i64,
            credits,
            &now,
        ),
    ) {
        return err(&req.id, "db_query_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "subjectId": subject_id }))
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let semester = req.params.get("semester").and_then(|v| v.as_i64());

    let mut sql = String::from(
        "SELECT id, code, name, semester, max_internal, max_external, is_lab, credits
         FROM subjects",
    );
    if semester.is_some() {
        sql.push_str(" WHERE semester = ?");
    }
    sql.push_str(" ORDER BY semester, code");

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let map_row = |r: &rusqlite::Row<'_>| -> rusqlite::Result<serde_json::Value> {
        let max_internal: i64 = r.get(4)?;
        let max_external: i64 = r.get(5)?;
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "code": r.get::<_, String>(1)?,
            "name": r.get::<_, String>(2)?,
            "semester": r.get::<_, i64>(3)?,
            "maxInternal": max_internal,
            "maxExternal": max_external,
            "maxMarks": max_internal + max_external,
            "isLab": r.get::<_, i64>(6)? != 0,
            "credits": r.get::<_, f64>(7)?,
        }))
    };
    let rows = if let Some(sem) = semester {
        stmt.query_map([sem], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    } else {
        stmt.query_map([], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    };
    match rows {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.add" => Some(handle_add(state, req)),
        "subjects.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
