use chrono::NaiveDate;
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::ipc::error::err;
use crate::model::{DutyRecord, DutyStatus, Shift};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn db_err(e: rusqlite::Error) -> HandlerErr {
    HandlerErr::new("db_query_failed", e.to_string())
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

pub fn get_opt_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Duty dates are calendar days. Accept plain `YYYY-MM-DD` and tolerate a
/// trailing time component (the original clients sent full timestamps).
pub fn parse_day(s: &str) -> Result<NaiveDate, HandlerErr> {
    // get() rather than a byte slice: multibyte input with no char
    // boundary at byte 10 must fall through to the parse error, not panic.
    let day = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|_| HandlerErr::new("bad_params", format!("invalid date: {}", s)))
}

pub fn parse_shift(s: &str) -> Result<Shift, HandlerErr> {
    Shift::parse(s).ok_or_else(|| {
        HandlerErr::new(
            "bad_params",
            "shift must be one of: morning, afternoon, evening",
        )
    })
}

pub fn parse_status(s: &str) -> Result<DutyStatus, HandlerErr> {
    DutyStatus::parse(s).ok_or_else(|| {
        HandlerErr::new(
            "bad_params",
            "status must be one of: scheduled, completed, missed, excused",
        )
    })
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn password_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

pub fn session_user(conn: &Connection, params: &serde_json::Value) -> Result<AuthUser, HandlerErr> {
    let token = get_required_str(params, "token")?;
    conn.query_row(
        "SELECT u.id, u.role FROM sessions s JOIN users u ON u.id = s.user_id WHERE s.token = ?",
        [&token],
        |r| {
            Ok(AuthUser {
                id: r.get(0)?,
                role: r.get(1)?,
            })
        },
    )
    .optional()
    .map_err(db_err)?
    .ok_or_else(|| HandlerErr::new("unauthorized", "invalid or expired token"))
}

pub fn require_admin(conn: &Connection, params: &serde_json::Value) -> Result<AuthUser, HandlerErr> {
    let auth = session_user(conn, params)?;
    if !auth.is_admin() {
        return Err(HandlerErr::new("forbidden", "admin role required"));
    }
    Ok(auth)
}

#[derive(Debug, Clone, Default)]
pub struct DutyFilter {
    pub user_id: Option<String>,
    pub status: Option<DutyStatus>,
    pub shift: Option<Shift>,
    pub date: Option<NaiveDate>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub year_month: Option<(i32, u32)>,
}

impl DutyFilter {
    pub fn from_params(params: &serde_json::Value) -> Result<Self, HandlerErr> {
        let mut f = DutyFilter::default();
        f.user_id = get_opt_str(params, "userId");
        if let Some(s) = get_opt_str(params, "status") {
            f.status = Some(parse_status(&s)?);
        }
        if let Some(s) = get_opt_str(params, "shift") {
            f.shift = Some(parse_shift(&s)?);
        }
        if let Some(s) = get_opt_str(params, "date") {
            f.date = Some(parse_day(&s)?);
        }
        if let Some(s) = get_opt_str(params, "startDate") {
            f.start = Some(parse_day(&s)?);
        }
        if let Some(s) = get_opt_str(params, "endDate") {
            f.end = Some(parse_day(&s)?);
        }
        Ok(f)
    }
}

/// Load duties matching the filter, newest day first. Filtering happens in
/// SQL so the pure calendar/stats code only ever sees well-formed records.
pub fn query_duties(conn: &Connection, filter: &DutyFilter) -> Result<Vec<DutyRecord>, HandlerErr> {
    let mut sql = String::from(
        "SELECT id, user_id, date, shift, location, task, status, notes
         FROM duties WHERE 1=1",
    );
    let mut args: Vec<Value> = Vec::new();
    if let Some(user_id) = &filter.user_id {
        sql.push_str(" AND user_id = ?");
        args.push(Value::Text(user_id.clone()));
    }
    if let Some(status) = filter.status {
        sql.push_str(" AND status = ?");
        args.push(Value::Text(status.as_str().to_string()));
    }
    if let Some(shift) = filter.shift {
        sql.push_str(" AND shift = ?");
        args.push(Value::Text(shift.as_str().to_string()));
    }
    if let Some(date) = filter.date {
        sql.push_str(" AND date = ?");
        args.push(Value::Text(date.format("%Y-%m-%d").to_string()));
    }
    if let Some(start) = filter.start {
        sql.push_str(" AND date >= ?");
        args.push(Value::Text(start.format("%Y-%m-%d").to_string()));
    }
    if let Some(end) = filter.end {
        sql.push_str(" AND date <= ?");
        args.push(Value::Text(end.format("%Y-%m-%d").to_string()));
    }
    if let Some((year, month)) = filter.year_month {
        sql.push_str(" AND substr(date, 1, 7) = ?");
        args.push(Value::Text(format!("{:04}-{:02}", year, month)));
    }
    sql.push_str(" ORDER BY date DESC, created_at DESC");

    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    stmt.query_map(params_from_iter(args), |r| {
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
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(db_err)?
    .into_iter()
    .map(|(id, user_id, date, shift, location, task, status, notes)| {
        Ok(DutyRecord {
            id,
            user_id,
            date: parse_day(&date)?,
            shift: parse_shift(&shift)?,
            location,
            task,
            status: parse_status(&status)?,
            notes,
        })
    })
    .collect()
}

pub fn user_exists(conn: &Connection, user_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM users WHERE id = ?", [user_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(db_err)
}

pub fn public_user_json(conn: &Connection, user_id: &str) -> Result<Option<serde_json::Value>, HandlerErr> {
    conn.query_row(
        "SELECT id, name, email, role, class_name, phone, created_at, updated_at
         FROM users WHERE id = ?",
        [user_id],
        |r| {
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
        },
    )
    .optional()
    .map_err(db_err)
}
