use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_err, get_opt_str, get_required_str, now_rfc3339, parse_day, parse_shift, parse_status,
    query_duties, user_exists, DutyFilter, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{DutyRecord, DutyStatus};
use crate::stats;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn duty_json(d: &DutyRecord) -> serde_json::Value {
    serde_json::to_value(d).unwrap_or_else(|_| json!({}))
}

fn duties_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let filter = DutyFilter::from_params(params)?;
    let duties = query_duties(conn, &filter)?;
    let out: Vec<serde_json::Value> = duties.iter().map(duty_json).collect();
    Ok(json!({ "duties": out, "total": out.len() }))
}

struct NewDuty {
    user_id: String,
    date: chrono::NaiveDate,
    shift: crate::model::Shift,
    location: String,
    task: String,
    status: DutyStatus,
    notes: Option<String>,
}

fn parse_new_duty(item: &serde_json::Value) -> Result<NewDuty, HandlerErr> {
    let user_id = get_required_str(item, "userId")?;
    let date = parse_day(&get_required_str(item, "date")?)?;
    let shift = parse_shift(&get_required_str(item, "shift")?)?;
    let location = get_required_str(item, "location")?;
    let task = get_required_str(item, "task")?;
    if location.trim().is_empty() {
        return Err(HandlerErr::new("bad_params", "location must not be empty"));
    }
    if task.trim().is_empty() {
        return Err(HandlerErr::new("bad_params", "task must not be empty"));
    }
    let status = match get_opt_str(item, "status") {
        Some(s) => parse_status(&s)?,
        None => DutyStatus::Scheduled,
    };
    Ok(NewDuty {
        user_id,
        date,
        shift,
        location,
        task,
        status,
        notes: get_opt_str(item, "notes"),
    })
}

fn insert_duty(conn: &Connection, new: &NewDuty) -> Result<String, HandlerErr> {
    if !user_exists(conn, &new.user_id)? {
        return Err(HandlerErr::new("not_found", "user not found"));
    }
    let id = Uuid::new_v4().to_string();
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO duties(id, user_id, date, shift, location, task, status, notes,
                            created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &new.user_id,
            new.date.format("%Y-%m-%d").to_string(),
            new.shift.as_str(),
            &new.location,
            &new.task,
            new.status.as_str(),
            &new.notes,
            &now,
            &now,
        ),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(id)
}

/// Accepts either a single duty in `params` or a batch under `items`.
/// Batch creation is best-effort: good items land, bad ones come back as
/// per-index errors.
fn duties_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let items: Vec<serde_json::Value> = match params.get("items").and_then(|v| v.as_array()) {
        Some(arr) => arr.clone(),
        None => vec![params.clone()],
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let mut created: Vec<String> = Vec::new();
    let mut errors: Vec<serde_json::Value> = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        match parse_new_duty(item).and_then(|new| insert_duty(&tx, &new)) {
            Ok(id) => created.push(id),
            Err(e) => errors.push(json!({
                "index": idx,
                "code": e.code,
                "message": e.message,
            })),
        }
    }
    if created.is_empty() {
        // Nothing to keep; the transaction drops with the error.
        return Err(HandlerErr {
            code: "bad_params",
            message: "no valid duties in request".to_string(),
            details: Some(json!({ "errors": errors })),
        });
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    let mut out: Vec<serde_json::Value> = Vec::with_capacity(created.len());
    for id in &created {
        if let Some(d) = load_duty(conn, id)? {
            out.push(duty_json(&d));
        }
    }
    Ok(json!({ "duties": out, "created": created.len(), "errors": errors }))
}

fn load_duty(conn: &Connection, id: &str) -> Result<Option<DutyRecord>, HandlerErr> {
    let row = conn
        .query_row(
            "SELECT id, user_id, date, shift, location, task, status, notes
             FROM duties WHERE id = ?",
            [id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, String>(6)?,
                    r.get::<_, Option<String>>(7)?,
                ))
            },
        )
        .optional()
        .map_err(db_err)?;
    let Some((id, user_id, date, shift, location, task, status, notes)) = row else {
        return Ok(None);
    };
    Ok(Some(DutyRecord {
        id,
        user_id,
        date: parse_day(&date)?,
        shift: parse_shift(&shift)?,
        location,
        task,
        status: parse_status(&status)?,
        notes,
    }))
}

fn duties_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    if load_duty(conn, &id)?.is_none() {
        return Err(HandlerErr::new("not_found", "duty not found"));
    }

    if let Some(user_id) = get_opt_str(params, "userId") {
        if !user_exists(conn, &user_id)? {
            return Err(HandlerErr::new("not_found", "user not found"));
        }
        conn.execute("UPDATE duties SET user_id = ? WHERE id = ?", (&user_id, &id))
            .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    if let Some(date) = get_opt_str(params, "date") {
        let date = parse_day(&date)?;
        conn.execute(
            "UPDATE duties SET date = ? WHERE id = ?",
            (date.format("%Y-%m-%d").to_string(), &id),
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    if let Some(shift) = get_opt_str(params, "shift") {
        let shift = parse_shift(&shift)?;
        conn.execute(
            "UPDATE duties SET shift = ? WHERE id = ?",
            (shift.as_str(), &id),
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    if let Some(status) = get_opt_str(params, "status") {
        let status = parse_status(&status)?;
        conn.execute(
            "UPDATE duties SET status = ? WHERE id = ?",
            (status.as_str(), &id),
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    if let Some(location) = get_opt_str(params, "location") {
        conn.execute(
            "UPDATE duties SET location = ? WHERE id = ?",
            (&location, &id),
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    if let Some(task) = get_opt_str(params, "task") {
        conn.execute("UPDATE duties SET task = ? WHERE id = ?", (&task, &id))
            .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    if let Some(notes) = get_opt_str(params, "notes") {
        conn.execute("UPDATE duties SET notes = ? WHERE id = ?", (&notes, &id))
            .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    conn.execute(
        "UPDATE duties SET updated_at = ? WHERE id = ?",
        (now_rfc3339(), &id),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;

    let duty = load_duty(conn, &id)?
        .ok_or_else(|| HandlerErr::new("db_query_failed", "duty vanished after update"))?;
    Ok(json!({ "duty": duty_json(&duty) }))
}

fn duties_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let Some(duty) = load_duty(conn, &id)? else {
        return Err(HandlerErr::new("not_found", "duty not found"));
    };
    conn.execute("DELETE FROM duties WHERE id = ?", [&id])
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "duty": duty_json(&duty) }))
}

fn duties_upcoming(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut filter = DutyFilter::default();
    filter.user_id = get_opt_str(params, "userId");
    let duties = query_duties(conn, &filter)?;

    let today = match get_opt_str(params, "today") {
        Some(s) => parse_day(&s)?,
        None => chrono::Local::now().date_naive(),
    };
    let days = params.get("days").and_then(|v| v.as_i64()).unwrap_or(7);
    if days < 0 {
        return Err(HandlerErr::new("bad_params", "days must not be negative"));
    }

    let up = stats::upcoming(&duties, today, days);
    let out: Vec<serde_json::Value> = up.iter().map(duty_json).collect();
    Ok(json!({ "duties": out, "total": out.len() }))
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
        "duties.list" => Some(dispatch(state, req, duties_list)),
        "duties.create" => Some(dispatch(state, req, duties_create)),
        "duties.update" => Some(dispatch(state, req, duties_update)),
        "duties.delete" => Some(dispatch(state, req, duties_delete)),
        "duties.upcoming" => Some(dispatch(state, req, duties_upcoming)),
        _ => None,
    }
}
