use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_err, get_required_str, now_rfc3339, parse_day, parse_shift, parse_status, password_digest,
    query_duties, DutyFilter, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::DutyStatus;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Minimal record parser: handles quoted fields with embedded commas and
/// doubled quotes, one record per input line. Fields containing raw
/// newlines are not supported, so a duty exported with multi-line notes
/// will not re-import cleanly.
fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' {
            if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                buf.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
            i += 1;
            continue;
        }
        if ch == ',' && !in_quotes {
            out.push(buf);
            buf = String::new();
            i += 1;
            continue;
        }
        buf.push(ch);
        i += 1;
    }
    out.push(buf);
    out
}

fn opt_field(fields: &[String], idx: usize) -> Option<String> {
    fields
        .get(idx)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn exchange_export_json(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, email, role, class_name, phone, created_at, updated_at
             FROM users ORDER BY created_at",
        )
        .map_err(db_err)?;
    let users = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "email": r.get::<_, String>(2)?,
                "role": r.get::<_, String>(3)?,
                "class": r.get::<_, Option<String>>(4)?,
                "phone": r.get::<_, Option<String>>(5)?,
                "createdAt": r.get::<_, String>(6)?,
                "updatedAt": r.get::<_, String>(7)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    let duties = query_duties(conn, &DutyFilter::default())?;
    let duties_json: Vec<serde_json::Value> = duties
        .iter()
        .map(|d| serde_json::to_value(d).unwrap_or_else(|_| json!({})))
        .collect();

    let mut stmt = conn
        .prepare(
            "SELECT id, user_id, title, message, kind, is_read, created_at
             FROM notifications ORDER BY created_at",
        )
        .map_err(db_err)?;
    let notifications = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "userId": r.get::<_, String>(1)?,
                "title": r.get::<_, String>(2)?,
                "message": r.get::<_, String>(3)?,
                "kind": r.get::<_, String>(4)?,
                "isRead": r.get::<_, i64>(5)? != 0,
                "createdAt": r.get::<_, String>(6)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    Ok(json!({
        "exportedAt": now_rfc3339(),
        "users": users,
        "duties": duties_json,
        "notifications": notifications,
    }))
}

fn exchange_export_csv(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let kind = get_required_str(params, "kind")?;
    let text = match kind.as_str() {
        "users" => {
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, email, role, class_name, phone
                     FROM users ORDER BY created_at",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map([], |r| {
                    Ok(vec![
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, String>(3)?,
                        r.get::<_, Option<String>>(4)?.unwrap_or_default(),
                        r.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    ])
                })
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(db_err)?;
            let mut text = String::from("id,name,email,role,class,phone\n");
            for row in rows {
                let cells: Vec<String> = row.iter().map(|c| csv_quote(c)).collect();
                text.push_str(&cells.join(","));
                text.push('\n');
            }
            text
        }
        "duties" => {
            let duties = query_duties(conn, &DutyFilter::default())?;
            let mut text = String::from("id,userId,date,shift,location,task,status,notes\n");
            for d in duties {
                let cells = [
                    d.id.clone(),
                    d.user_id.clone(),
                    d.date.format("%Y-%m-%d").to_string(),
                    d.shift.as_str().to_string(),
                    d.location.clone(),
                    d.task.clone(),
                    d.status.as_str().to_string(),
                    d.notes.clone().unwrap_or_default(),
                ];
                let cells: Vec<String> = cells.iter().map(|c| csv_quote(c)).collect();
                text.push_str(&cells.join(","));
                text.push('\n');
            }
            text
        }
        _ => return Err(HandlerErr::new("bad_params", "kind must be users or duties")),
    };
    Ok(json!({ "kind": kind, "text": text }))
}

/// Users CSV: `name,email,role,class,phone[,password]`. Rows without a
/// password get a random one; an admin can set a real password afterwards
/// via users.setPassword.
fn exchange_import_users_csv(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let text = get_required_str(params, "text")?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    let mut created = 0usize;
    let mut warnings: Vec<serde_json::Value> = Vec::new();
    for (line_no, raw_line) in text.lines().enumerate() {
        if line_no == 0 {
            continue;
        }
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let fields = parse_csv_record(line);
        let mut warn = |code: &str, message: &str| {
            warnings.push(json!({
                "line": line_no + 1,
                "code": code,
                "message": message,
            }));
        };

        let Some(name) = opt_field(&fields, 0) else {
            warn("bad_row", "missing name");
            continue;
        };
        let Some(email) = opt_field(&fields, 1) else {
            warn("bad_row", "missing email");
            continue;
        };
        let Some(role) = opt_field(&fields, 2) else {
            warn("bad_row", "missing role");
            continue;
        };
        if role != "admin" && role != "student" {
            warn("bad_row", "role must be admin or student");
            continue;
        }
        let class_name = opt_field(&fields, 3);
        if role == "student" && class_name.is_none() {
            warn("bad_row", "students must have a class");
            continue;
        }
        let phone = opt_field(&fields, 4);
        let password = opt_field(&fields, 5).unwrap_or_else(|| Uuid::new_v4().to_string());

        let taken = tx
            .query_row("SELECT 1 FROM users WHERE email = ?", [&email], |r| {
                r.get::<_, i64>(0)
            })
            .optional()
            .map_err(db_err)?
            .is_some();
        if taken {
            warn("duplicate", "email already registered");
            continue;
        }

        let id = Uuid::new_v4().to_string();
        let salt = Uuid::new_v4().to_string();
        let hash = password_digest(&salt, &password);
        let now = now_rfc3339();
        tx.execute(
            "INSERT INTO users(id, name, email, role, password_salt, password_hash,
                               class_name, phone, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (&id, &name, &email, &role, &salt, &hash, &class_name, &phone, &now, &now),
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
        created += 1;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    if !warnings.is_empty() {
        tracing::warn!(count = warnings.len(), "user import rows skipped");
    }
    Ok(json!({ "created": created, "warnings": warnings }))
}

/// Duties CSV: `userId,date,shift,location,task[,status[,notes]]`. The
/// first column may be a user id or an email.
fn exchange_import_duties_csv(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let text = get_required_str(params, "text")?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    let mut created = 0usize;
    let mut warnings: Vec<serde_json::Value> = Vec::new();
    for (line_no, raw_line) in text.lines().enumerate() {
        if line_no == 0 {
            continue;
        }
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let fields = parse_csv_record(line);
        let mut warn = |code: &str, message: String| {
            warnings.push(json!({
                "line": line_no + 1,
                "code": code,
                "message": message,
            }));
        };

        let (Some(user_ref), Some(date), Some(shift), Some(location)) = (
            opt_field(&fields, 0),
            opt_field(&fields, 1),
            opt_field(&fields, 2),
            opt_field(&fields, 3),
        ) else {
            warn("bad_row", "missing required columns".to_string());
            continue;
        };

        let user_id: Option<String> = tx
            .query_row(
                "SELECT id FROM users WHERE id = ? OR email = ?",
                (&user_ref, &user_ref),
                |r| r.get(0),
            )
            .optional()
            .map_err(db_err)?;
        let Some(user_id) = user_id else {
            warn("not_found", format!("unknown user: {}", user_ref));
            continue;
        };
        let date = match parse_day(&date) {
            Ok(d) => d,
            Err(e) => {
                warn("bad_row", e.message);
                continue;
            }
        };
        let shift = match parse_shift(&shift) {
            Ok(s) => s,
            Err(e) => {
                warn("bad_row", e.message);
                continue;
            }
        };
        let task = opt_field(&fields, 4).unwrap_or_else(|| "duty".to_string());
        let status = match opt_field(&fields, 5) {
            Some(s) => match parse_status(&s) {
                Ok(s) => s,
                Err(e) => {
                    warn("bad_row", e.message);
                    continue;
                }
            },
            None => DutyStatus::Scheduled,
        };
        let notes = opt_field(&fields, 6);

        let id = Uuid::new_v4().to_string();
        let now = now_rfc3339();
        tx.execute(
            "INSERT INTO duties(id, user_id, date, shift, location, task, status, notes,
                                created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &id,
                &user_id,
                date.format("%Y-%m-%d").to_string(),
                shift.as_str(),
                &location,
                &task,
                status.as_str(),
                &notes,
                &now,
                &now,
            ),
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
        created += 1;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    if !warnings.is_empty() {
        tracing::warn!(count = warnings.len(), "duty import rows skipped");
    }
    Ok(json!({ "created": created, "warnings": warnings }))
}

fn dispatch(
    state: &mut AppState,
    req: &Request,
    f: fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exchange.exportJson" => Some(dispatch(state, req, exchange_export_json)),
        "exchange.exportCsv" => Some(dispatch(state, req, exchange_export_csv)),
        "exchange.importUsersCsv" => Some(dispatch(state, req, exchange_import_users_csv)),
        "exchange.importDutiesCsv" => Some(dispatch(state, req, exchange_import_duties_csv)),
        _ => None,
    }
}
