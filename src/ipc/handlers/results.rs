use crate::catalog::BatchMap;
use crate::db;
use crate::grading::{grade_student, RawMarkRecord};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

pub fn load_raw_marks(
    conn: &Connection,
    table: &str,
    student_id: &str,
) -> rusqlite::Result<Vec<RawMarkRecord>> {
    let sql = format!(
        "SELECT m.semester, s.name, s.is_lab, m.internal_marks, m.external_marks
         FROM {} m
         JOIN subjects s ON m.subject_id = s.id
         WHERE m.student_id = ?
         ORDER BY m.semester, s.code",
        table
    );
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_map([student_id], |r| {
        Ok(RawMarkRecord {
            semester: r.get(0)?,
            subject_name: r.get(1)?,
            is_lab: r.get::<_, i64>(2)? != 0,
            internal_marks: r.get(3)?,
            external_marks: r.get(4)?,
        })
    })
    .and_then(|it| it.collect())
}

fn handle_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v.trim().to_string(),
        Err(resp) => return resp,
    };

    let batch_map = match db::load_batch_map(conn) {
        Ok(m) => m,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((year, table)) = batch_map.cohort_for_student(&student_id) else {
        return err(
            &req.id,
            "invalid_cohort",
            "student id prefix is not a configured batch",
            Some(json!({ "studentId": student_id })),
        );
    };

    let found: Option<String> = match conn
        .query_row("SELECT id FROM students WHERE id = ?", [&student_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if found.is_none() {
        return err(
            &req.id,
            "not_found",
            "student not found",
            Some(json!({ "studentId": student_id })),
        );
    }

    let catalog = match db::load_catalog(conn) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let records = match load_raw_marks(conn, &table, &student_id) {
        Ok(r) => r,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let semesters_to_show = BatchMap::semesters_for_year(year);
    let result = grade_student(&records, &catalog, semesters_to_show);

    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "academicYear": year,
            "semestersToShow": semesters_to_show,
            "semesters": result.semesters,
            "overall": result.overall,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.student" => Some(handle_student(state, req)),
        _ => None,
    }
}
