use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_resultd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn resultd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn bundle_export_then_import_preserves_results() {
    let workspace_a = temp_dir("resultd-bundle-src");
    let workspace_b = temp_dir("resultd-bundle-dst");
    let bundle_path = temp_dir("resultd-bundle-out").join("portal.resultdbundle");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace_a.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "auth.register",
        json!({
            "id": "25EE0009",
            "name": "Divya",
            "branch": "EEE",
            "password": "secret",
        }),
    );
    let subject = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "subjects.add",
        json!({
            "name": "Machines",
            "code": "EE305",
            "semester": 5,
            "maxInternal": 30,
            "maxExternal": 70,
            "isLab": false,
        }),
    );
    let subject_id = subject
        .get("subjectId")
        .and_then(|v| v.as_str())
        .expect("subjectId")
        .to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "marks.save",
        json!({
            "studentId": "25EE0009",
            "semester": 5,
            "marks": [ { "subjectId": subject_id, "internal": 24, "external": 58 } ],
        }),
    );
    let before = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "results.student",
        json!({ "studentId": "25EE0009" }),
    );

    let export = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle_path.to_string_lossy() }),
    );
    assert_eq!(
        export.get("bundleFormat").and_then(|v| v.as_str()),
        Some("resultd-workspace-v1")
    );
    assert!(export
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .map(|s| s.len() == 64)
        .unwrap_or(false));

    let import = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "backup.importWorkspaceBundle",
        json!({
            "inPath": bundle_path.to_string_lossy(),
            "workspacePath": workspace_b.to_string_lossy(),
        }),
    );
    assert_eq!(
        import.get("bundleFormatDetected").and_then(|v| v.as_str()),
        Some("resultd-workspace-v1")
    );

    // The imported workspace serves identical results.
    let after = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "results.student",
        json!({ "studentId": "25EE0009" }),
    );
    assert_eq!(before, after);

    drop(stdin);
    let _ = child.wait();
}
