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

fn spawn_daemon() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_rosterd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rosterd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
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
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn setup_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
) -> String {
    let _ = request_ok(
        stdin,
        reader,
        "setup-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let reg = request_ok(
        stdin,
        reader,
        "setup-user",
        "auth.register",
        json!({
            "name": "Tuan Le",
            "email": "tuan@student.example",
            "password": "secret1",
            "role": "student",
            "class": "12A1"
        }),
    );
    reg["user"]["id"].as_str().expect("user id").to_string()
}

#[test]
fn create_list_update_delete() {
    let workspace = temp_dir("rosterd-duties");
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    let user_id = setup_student(&mut stdin, &mut reader, &workspace);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "duties.create",
        json!({
            "userId": user_id,
            "date": "2024-01-15",
            "shift": "morning",
            "location": "school yard",
            "task": "sweep the yard"
        }),
    );
    assert_eq!(created["created"], json!(1));
    let duty = &created["duties"][0];
    assert_eq!(duty["status"], json!("scheduled"));
    assert_eq!(duty["date"], json!("2024-01-15"));
    let duty_id = duty["id"].as_str().expect("duty id").to_string();

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "duties.update",
        json!({ "id": duty_id, "status": "completed", "notes": "done early" }),
    );
    assert_eq!(updated["duty"]["status"], json!("completed"));
    assert_eq!(updated["duty"]["notes"], json!("done early"));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "duties.list",
        json!({ "status": "completed" }),
    );
    assert_eq!(listed["total"], json!(1));

    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "duties.list",
        json!({ "status": "missed" }),
    );
    assert_eq!(empty["total"], json!(0));

    let by_day = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "duties.list",
        json!({ "date": "2024-01-15" }),
    );
    assert_eq!(by_day["total"], json!(1));

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "duties.delete",
        json!({ "id": duty_id }),
    );
    assert_eq!(deleted["duty"]["id"], json!(duty_id));

    let gone = request(
        &mut stdin,
        &mut reader,
        "7",
        "duties.delete",
        json!({ "id": duty_id }),
    );
    assert_eq!(
        gone["error"]["code"], json!("not_found"),
        "second delete should miss"
    );

    let _ = child.kill();
}

#[test]
fn batch_create_reports_per_item_errors() {
    let workspace = temp_dir("rosterd-duties-batch");
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    let user_id = setup_student(&mut stdin, &mut reader, &workspace);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "duties.create",
        json!({
            "items": [
                {
                    "userId": user_id,
                    "date": "2024-01-15",
                    "shift": "morning",
                    "location": "yard",
                    "task": "sweep"
                },
                {
                    "userId": user_id,
                    "date": "2024-01-16",
                    "shift": "midnight",
                    "location": "yard",
                    "task": "sweep"
                },
                {
                    "userId": "no-such-user",
                    "date": "2024-01-17",
                    "shift": "evening",
                    "location": "library",
                    "task": "shelve books"
                }
            ]
        }),
    );
    assert_eq!(created["created"], json!(1));
    let errors = created["errors"].as_array().expect("errors");
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0]["index"], json!(1));
    assert_eq!(errors[0]["code"], json!("bad_params"));
    assert_eq!(errors[1]["index"], json!(2));
    assert_eq!(errors[1]["code"], json!("not_found"));

    // A batch of only bad rows fails outright and creates nothing.
    let all_bad = request(
        &mut stdin,
        &mut reader,
        "2",
        "duties.create",
        json!({ "items": [ { "userId": user_id, "date": "not-a-date", "shift": "morning", "location": "yard", "task": "sweep" } ] }),
    );
    assert_eq!(all_bad["error"]["code"], json!("bad_params"));
    let listed = request_ok(&mut stdin, &mut reader, "3", "duties.list", json!({}));
    assert_eq!(listed["total"], json!(1));

    let _ = child.kill();
}

#[test]
fn multibyte_date_param_is_rejected_not_fatal() {
    let workspace = temp_dir("rosterd-duties-dates");
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    let _ = setup_student(&mut stdin, &mut reader, &workspace);

    // Four euro signs are 12 bytes with no char boundary at byte 10.
    let bad = request(
        &mut stdin,
        &mut reader,
        "1",
        "duties.list",
        json!({ "date": "€€€€" }),
    );
    assert_eq!(bad["error"]["code"], json!("bad_params"));

    // The daemon answers the next request instead of dying on the slice.
    let listed = request_ok(&mut stdin, &mut reader, "2", "duties.list", json!({}));
    assert_eq!(listed["total"], json!(0));

    let _ = child.kill();
}

#[test]
fn upcoming_respects_window_and_injected_today() {
    let workspace = temp_dir("rosterd-duties-upcoming");
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    let user_id = setup_student(&mut stdin, &mut reader, &workspace);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "duties.create",
        json!({
            "items": [
                { "userId": user_id, "date": "2024-01-10", "shift": "morning", "location": "yard", "task": "sweep" },
                { "userId": user_id, "date": "2024-01-11", "shift": "morning", "location": "yard", "task": "sweep", "status": "completed" },
                { "userId": user_id, "date": "2024-01-14", "shift": "evening", "location": "library", "task": "shelve" },
                { "userId": user_id, "date": "2024-02-01", "shift": "morning", "location": "yard", "task": "sweep" }
            ]
        }),
    );

    let up = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "duties.upcoming",
        json!({ "userId": user_id, "today": "2024-01-09", "days": 7 }),
    );
    assert_eq!(up["total"], json!(2));
    // Soonest first; the completed duty and the far one are excluded.
    assert_eq!(up["duties"][0]["date"], json!("2024-01-10"));
    assert_eq!(up["duties"][1]["date"], json!("2024-01-14"));

    let _ = child.kill();
}
