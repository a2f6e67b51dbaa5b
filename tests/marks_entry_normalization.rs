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

fn request_raw(
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
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request_raw(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
}

#[test]
fn mark_entry_clamps_skips_and_replaces() {
    let workspace = temp_dir("resultd-marks-normalization");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "auth.register",
        json!({
            "id": "26ME0003",
            "name": "Kiran",
            "branch": "ME",
            "password": "secret",
        }),
    );

    let mut subject_ids = Vec::new();
    for (i, code) in ["ME201", "ME202", "ME203"].iter().enumerate() {
        let added = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{}", i),
            "subjects.add",
            json!({
                "name": format!("Subject {}", code),
                "code": code,
                "semester": 3,
                "maxInternal": 30,
                "maxExternal": 70,
                "isLab": false,
            }),
        );
        subject_ids.push(
            added
                .get("subjectId")
                .and_then(|v| v.as_str())
                .expect("subjectId")
                .to_string(),
        );
    }

    // Negative internal clamps to 0; the all-zero entry is dropped entirely.
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "marks.save",
        json!({
            "studentId": "26ME0003",
            "semester": 3,
            "marks": [
                { "subjectId": subject_ids[0], "internal": -5, "external": 40 },
                { "subjectId": subject_ids[1], "internal": 0, "external": 0 },
                { "subjectId": subject_ids[2], "internal": 18, "external": 42 },
            ],
        }),
    );
    assert_eq!(saved.get("saved").and_then(|v| v.as_u64()), Some(2));

    let raw = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "marks.get",
        json!({ "studentId": "26ME0003" }),
    );
    let marks = raw.get("marks").and_then(|v| v.as_array()).expect("marks");
    assert_eq!(marks.len(), 2);
    let clamped = marks
        .iter()
        .find(|m| m.get("subjectCode").and_then(|v| v.as_str()) == Some("ME201"))
        .expect("clamped row");
    assert_eq!(
        clamped.get("internalMarks").and_then(|v| v.as_i64()),
        Some(0)
    );
    assert_eq!(
        clamped.get("externalMarks").and_then(|v| v.as_i64()),
        Some(40)
    );

    // Saving the same (student, semester) again replaces the whole sheet.
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "marks.save",
        json!({
            "studentId": "26ME0003",
            "semester": 3,
            "marks": [
                { "subjectId": subject_ids[1], "internal": 22, "external": 55 },
            ],
        }),
    );
    assert_eq!(saved.get("saved").and_then(|v| v.as_u64()), Some(1));

    let raw = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "marks.get",
        json!({ "studentId": "26ME0003" }),
    );
    let marks = raw.get("marks").and_then(|v| v.as_array()).expect("marks");
    assert_eq!(marks.len(), 1);
    assert_eq!(
        marks[0].get("subjectCode").and_then(|v| v.as_str()),
        Some("ME202")
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn oversized_marks_persist_and_grade_without_error() {
    let workspace = temp_dir("resultd-marks-oversized");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "auth.register",
        json!({
            "id": "28CS0009",
            "name": "Tara",
            "branch": "CSE",
            "password": "secret",
        }),
    );
    let subject = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "subjects.add",
        json!({
            "name": "Algorithms",
            "code": "CS204",
            "semester": 2,
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

    // A mark past the 32-bit boundary round-trips intact.
    let huge = 4294967296_i64;
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "marks.save",
        json!({
            "studentId": "28CS0009",
            "semester": 2,
            "marks": [ { "subjectId": subject_id, "internal": huge, "external": 1 } ],
        }),
    );
    assert_eq!(saved.get("saved").and_then(|v| v.as_u64()), Some(1));

    let raw = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "marks.get",
        json!({ "studentId": "28CS0009" }),
    );
    let marks = raw.get("marks").and_then(|v| v.as_array()).expect("marks");
    assert_eq!(
        marks[0].get("internalMarks").and_then(|v| v.as_i64()),
        Some(huge)
    );

    // Grading still answers: the external bound fails it, nothing panics.
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "results.student",
        json!({ "studentId": "28CS0009" }),
    );
    let detail = &result["semesters"][0]["details"][0];
    assert_eq!(detail.get("internalMarks").and_then(|v| v.as_i64()), Some(huge));
    assert_eq!(
        detail.get("passStatus").and_then(|v| v.as_str()),
        Some("Fail")
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn unconfigured_batch_prefix_is_rejected_before_any_write() {
    let workspace = temp_dir("resultd-marks-bad-prefix");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let resp = request_raw(
        &mut stdin,
        &mut reader,
        "2",
        "marks.save",
        json!({
            "studentId": "99XX0001",
            "semester": 1,
            "marks": [ { "subjectId": "whatever", "internal": 10, "external": 10 } ],
        }),
    );
    assert_eq!(error_code(&resp), "invalid_cohort");

    let resp = request_raw(
        &mut stdin,
        &mut reader,
        "3",
        "results.student",
        json!({ "studentId": "99XX0001" }),
    );
    assert_eq!(error_code(&resp), "invalid_cohort");

    drop(stdin);
    let _ = child.wait();
}
