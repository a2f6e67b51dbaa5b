use crate::catalog::BatchMap;
use crate::db;
use crate::grading::{aggregate_cohort, grade_student, OverallSummary, RawMarkRecord};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_i64};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct CohortStudent {
    id: String,
    name: String,
    branch: String,
    email: String,
}

fn load_cohort_students(
    conn: &Connection,
    prefix: &str,
) -> rusqlite::Result<Vec<CohortStudent>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, branch, email FROM students WHERE id LIKE ? ORDER BY id",
    )?;
    stmt.query_map([format!("{}%", prefix)], |r| {
        Ok(CohortStudent {
            id: r.get(0)?,
            name: r.get(1)?,
            branch: r.get(2)?,
            email: r.get(3)?,
        })
    })
    .and_then(|it| it.collect())
}

fn load_cohort_marks(
    conn: &Connection,
    table: &str,
    prefix: &str,
) -> rusqlite::Result<HashMap<String, Vec<RawMarkRecord>>> {
    let sql = format!(
        "SELECT m.student_id, m.semester, s.name, s.is_lab, m.internal_marks, m.external_marks
         FROM {} m
         JOIN subjects s ON m.subject_id = s.id
         WHERE m.student_id LIKE ?
         ORDER BY m.student_id, m.semester, s.code",
        table
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([format!("{}%", prefix)], |r| {
        let student_id: String = r.get(0)?;
        Ok((
            student_id,
            RawMarkRecord {
                semester: r.get(1)?,
                subject_name: r.get(2)?,
                is_lab: r.get::<_, i64>(3)? != 0,
                internal_marks: r.get(4)?,
                external_marks: r.get(5)?,
            },
        ))
    })?;

    let mut by_student: HashMap<String, Vec<RawMarkRecord>> = HashMap::new();
    for row in rows {
        let (student_id, record) = row?;
        by_student.entry(student_id).or_default().push(record);
    }
    Ok(by_student)
}

fn handle_cohort(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let year = match required_i64(req, "year") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let batch_map = match db::load_batch_map(conn) {
        Ok(m) => m,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(prefix) = batch_map.prefix_for_year(year).map(|p| p.to_string()) else {
        return err(
            &req.id,
            "invalid_cohort",
            "no batch configured for academic year",
            Some(json!({ "year": year })),
        );
    };
    let table = format!("marks_{}", prefix);

    let students = match load_cohort_students(conn, &prefix) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let catalog = match db::load_catalog(conn) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mut marks_by_student = match load_cohort_marks(conn, &table, &prefix) {
        Ok(m) => m,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let semesters_to_show = BatchMap::semesters_for_year(year);
    let mut overalls: Vec<OverallSummary> = Vec::with_capacity(students.len());
    let mut student_rows: Vec<serde_json::Value> = Vec::with_capacity(students.len());
    for s in &students {
        let records = marks_by_student.remove(&s.id).unwrap_or_default();
        let result = grade_student(&records, &catalog, semesters_to_show);
        student_rows.push(json!({
            "id": s.id,
            "name": s.name,
            "branch": s.branch,
            "email": s.email,
            "subjectCount": records.len(),
            "semesters": result.semesters,
            "overall": &result.overall,
        }));
        overalls.push(result.overall);
    }

    let analytics = aggregate_cohort(overalls.iter());

    ok(
        &req.id,
        json!({
            "year": year,
            "batchPrefix": prefix,
            "students": student_rows,
            "analytics": analytics,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.cohort" => Some(handle_cohort(state, req)),
        _ => None,
    }
}
