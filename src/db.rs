use rusqlite::Connection;
use std::path::Path;

use crate::catalog::{BatchMap, CatalogEntry, SubjectCatalog};

pub const DB_FILE: &str = "resultd.sqlite3";

/// Current batch rotation. Only used to seed an empty batches table; after
/// that the table is the source of truth and can be rotated in place.
const DEFAULT_BATCHES: &[(&str, i64)] = &[("28", 1), ("27", 2), ("26", 3), ("25", 4)];

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            branch TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS admins(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            semester INTEGER NOT NULL,
            max_internal INTEGER NOT NULL,
            max_external INTEGER NOT NULL,
            is_lab INTEGER NOT NULL,
            credits REAL NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_semester ON subjects(semester)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS batches(
            prefix TEXT PRIMARY KEY,
            academic_year INTEGER NOT NULL UNIQUE
        )",
        [],
    )?;
    seed_batches(&conn)?;

    let batch_map = load_batch_map(&conn)?;
    for prefix in batch_map.prefixes() {
        ensure_marks_table(&conn, &prefix)?;
    }

    Ok(conn)
}

fn seed_batches(conn: &Connection) -> anyhow::Result<()> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM batches", [], |r| r.get(0))?;
    if count > 0 {
        return Ok(());
    }
    for (prefix, year) in DEFAULT_BATCHES {
        conn.execute(
            "INSERT INTO batches(prefix, academic_year) VALUES(?, ?)",
            (*prefix, *year),
        )?;
    }
    Ok(())
}

/// One marks partition per batch prefix. Table names come from the batches
/// table, never from request input.
fn ensure_marks_table(conn: &Connection, prefix: &str) -> anyhow::Result<()> {
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS marks_{prefix}(
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            semester INTEGER NOT NULL,
            internal_marks INTEGER NOT NULL,
            external_marks INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY(student_id, semester, subject_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )"
    );
    conn.execute(&sql, [])?;
    let idx = format!(
        "CREATE INDEX IF NOT EXISTS idx_marks_{prefix}_student ON marks_{prefix}(student_id)"
    );
    conn.execute(&idx, [])?;
    Ok(())
}

pub fn load_batch_map(conn: &Connection) -> anyhow::Result<BatchMap> {
    let mut stmt = conn.prepare("SELECT prefix, academic_year FROM batches")?;
    let pairs = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(BatchMap::new(pairs))
}

pub fn load_catalog(conn: &Connection) -> anyhow::Result<SubjectCatalog> {
    let mut stmt = conn.prepare(
        "SELECT semester, name, is_lab, max_internal, max_external, credits FROM subjects",
    )?;
    let entries = stmt
        .query_map([], |r| {
            Ok(CatalogEntry {
                semester: r.get(0)?,
                name: r.get(1)?,
                is_lab: r.get::<_, i64>(2)? != 0,
                max_internal: r.get::<_, i64>(3)?.max(0),
                max_external: r.get::<_, i64>(4)?.max(0),
                credits: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SubjectCatalog::new(entries))
}
