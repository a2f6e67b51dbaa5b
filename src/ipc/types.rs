use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One request line from the portal UI process.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Daemon-lifetime state: the selected results workspace and its open
/// database. Both stay absent until `workspace.select` succeeds.
#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }
}
