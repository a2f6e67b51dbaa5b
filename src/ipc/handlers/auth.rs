use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use sha2::{Digest, Sha256};

/// Digest for at-rest storage. Credential policy beyond "never store the
/// plaintext" belongs to the deployment, not this daemon.
fn password_digest(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

fn handle_register(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v.trim().to_string(),
        Err(resp) => return resp,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let password = match required_str(req, "password") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if id.is_empty() {
        return err(&req.id, "bad_params", "id must not be empty", None);
    }
    let role = optional_str(req, "role").unwrap_or_else(|| "Student".to_string());
    let now = chrono::Utc::now().to_rfc3339();
    let hash = password_digest(password.trim());

    match role.as_str() {
        "Student" => {
            let branch = match required_str(req, "branch") {
                Ok(v) => v,
                Err(resp) => return resp,
            };
            let email = optional_str(req, "email")
                .unwrap_or_else(|| format!("{}@student.portal.com", id.to_lowercase()));

            let existing: Option<(String, String)> = match conn
                .query_row(
                    "SELECT id, email FROM students WHERE id = ? OR email = ?",
                    (&id, &email),
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()
            {
                Ok(v) => v,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            if let Some((existing_id, _)) = existing {
                if existing_id == id {
                    return err(&req.id, "duplicate_id", "student id already exists", None);
                }
                return err(
                    &req.id,
                    "duplicate_email",
                    "email address is already in use",
                    None,
                );
            }

            if let Err(e) = conn.execute(
                "INSERT INTO students(id, name, branch, email, password_hash, created_at)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (&id, &name, &branch, &email, &hash, &now),
            ) {
                return err(&req.id, "db_query_failed", e.to_string(), None);
            }
            ok(&req.id, json!({ "registered": true, "role": "Student", "email": email }))
        }
        "Admin" => {
            let existing: Option<String> = match conn
                .query_row("SELECT id FROM admins WHERE id = ?", [&id], |r| r.get(0))
                .optional()
            {
                Ok(v) => v,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            if existing.is_some() {
                return err(&req.id, "duplicate_id", "admin id already exists", None);
            }
            if let Err(e) = conn.execute(
                "INSERT INTO admins(id, name, password_hash, created_at) VALUES(?, ?, ?, ?)",
                (&id, &name, &hash, &now),
            ) {
                return err(&req.id, "db_query_failed", e.to_string(), None);
            }
            ok(&req.id, json!({ "registered": true, "role": "Admin" }))
        }
        other => err(
            &req.id,
            "bad_params",
            "role must be Student or Admin",
            Some(json!({ "role": other })),
        ),
    }
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v.trim().to_string(),
        Err(resp) => return resp,
    };
    let password = match required_str(req, "password") {
        Ok(v) => v.trim().to_string(),
        Err(resp) => return resp,
    };
    let hash = password_digest(&password);

    let student: Option<(String, String, String, String)> = match conn
        .query_row(
            "SELECT id, name, branch, email FROM students WHERE id = ? AND password_hash = ?",
            (&id, &hash),
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Some((sid, name, branch, email)) = student {
        return ok(
            &req.id,
            json!({
                "id": sid,
                "name": name,
                "branch": branch,
                "email": email,
                "role": "Student",
            }),
        );
    }

    let admin: Option<(String, String)> = match conn
        .query_row(
            "SELECT id, name FROM admins WHERE id = ? AND password_hash = ?",
            (&id, &hash),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Some((aid, name)) = admin {
        return ok(
            &req.id,
            json!({
                "id": aid,
                "name": name,
                "branch": "N/A",
                "email": format!("{}@portal.com", aid),
                "role": "Admin",
            }),
        );
    }

    err(&req.id, "invalid_credentials", "invalid credentials", None)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.register" => Some(handle_register(state, req)),
        "auth.login" => Some(handle_login(state, req)),
        _ => None,
    }
}
