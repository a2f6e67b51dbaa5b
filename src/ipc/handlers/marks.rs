use crate::db;
use crate::grading::normalize_mark;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn marks_table(
    conn: &Connection,
    req: &Request,
    student_id: &str,
) -> Result<String, serde_json::Value> {
    let batch_map = db::load_batch_map(conn)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    batch_map.marks_table_for_student(student_id).ok_or_else(|| {
        err(
            &req.id,
            "invalid_cohort",
            "student id prefix is not a configured batch",
            Some(json!({ "studentId": student_id })),
        )
    })
}

fn student_exists(
    conn: &Connection,
    req: &Request,
    student_id: &str,
) -> Result<(), serde_json::Value> {
    let found: Option<String> = conn
        .query_row("SELECT id FROM students WHERE id = ?", [student_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    if found.is_none() {
        return Err(err(
            &req.id,
            "not_found",
            "student not found",
            Some(json!({ "studentId": student_id })),
        ));
    }
    Ok(())
}

fn handle_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v.trim().to_string(),
        Err(resp) => return resp,
    };
    let semester = match required_i64(req, "semester") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(entries) = req.params.get("marks").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing marks array", None);
    };
    if entries.is_empty() {
        return err(&req.id, "bad_params", "marks must not be empty", None);
    }
    if !(1..=8).contains(&semester) {
        return err(
            &req.id,
            "bad_params",
            "semester must be between 1 and 8",
            Some(json!({ "semester": semester })),
        );
    }

    let table = match marks_table(conn, req, &student_id) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    if let Err(resp) = student_exists(conn, req, &student_id) {
        return resp;
    }

    // One atomic unit per (student, semester): readers never observe a
    // half-replaced mark sheet.
    let tx = match conn.unchecked_transaction() {
        Ok(tx) => tx,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let delete_sql = format!("DELETE FROM {} WHERE student_id = ? AND semester = ?", table);
    if let Err(e) = tx.execute(&delete_sql, (&student_id, semester)) {
        return err(&req.id, "db_query_failed", e.to_string(), None);
    }

    let now = chrono::Utc::now().to_rfc3339();
    let insert_sql = format!(
        "INSERT INTO {}(student_id, subject_id, semester, internal_marks, external_marks, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        table
    );
    let mut saved = 0_usize;
    for entry in entries {
        let Some(subject_id) = entry.get("subjectId").and_then(|v| v.as_str()) else {
            return err(&req.id, "bad_params", "marks entries need subjectId", None);
        };
        let known: Option<String> = match tx
            .query_row("SELECT id FROM subjects WHERE id = ?", [subject_id], |r| {
                r.get(0)
            })
            .optional()
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if known.is_none() {
            return err(
                &req.id,
                "not_found",
                "subject not found",
                Some(json!({ "subjectId": subject_id })),
            );
        }

        // Negative or non-numeric components clamp to zero rather than fail.
        let internal = normalize_mark(entry.get("internal").and_then(|v| v.as_i64()));
        let external = normalize_mark(entry.get("external").and_then(|v| v.as_i64()));
        // A 0/0 pair means "no entry" and is not persisted.
        if internal == 0 && external == 0 {
            continue;
        }

        if let Err(e) = tx.execute(
            &insert_sql,
            (
                &student_id,
                subject_id,
                semester,
                internal,
                external,
                &now,
            ),
        ) {
            return err(&req.id, "db_query_failed", e.to_string(), None);
        }
        saved += 1;
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_query_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "saved": saved }))
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v.trim().to_string(),
        Err(resp) => return resp,
    };
    let table = match marks_table(conn, req, &student_id) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let sql = format!(
        "SELECT m.semester, m.internal_marks, m.external_marks,
                s.id, s.code, s.name, s.is_lab, s.max_internal + s.max_external
         FROM {} m
         JOIN subjects s ON m.subject_id = s.id
         WHERE m.student_id = ?
         ORDER BY m.semester, s.code",
        table
    );
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&student_id], |r| {
            Ok(json!({
                "semester": r.get::<_, i64>(0)?,
                "internalMarks": r.get::<_, i64>(1)?,
                "externalMarks": r.get::<_, i64>(2)?,
                "subjectId": r.get::<_, String>(3)?,
                "subjectCode": r.get::<_, String>(4)?,
                "subjectName": r.get::<_, String>(5)?,
                "isLab": r.get::<_, i64>(6)? != 0,
                "maxMarks": r.get::<_, i64>(7)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(marks) => ok(&req.id, json!({ "marks": marks })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.save" => Some(handle_save(state, req)),
        "marks.get" => Some(handle_get(state, req)),
        _ => None,
    }
}
