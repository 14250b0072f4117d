use crate::calendar;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_opt_str, parse_day, parse_status, query_duties, DutyFilter, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::stats;
use chrono::Datelike;
use rusqlite::Connection;
use serde_json::json;

fn year_month_params(params: &serde_json::Value) -> Result<(i32, u32), HandlerErr> {
    let now = chrono::Local::now().date_naive();
    let year = match params.get("year") {
        None => now.year(),
        Some(v) => v
            .as_i64()
            .and_then(|y| i32::try_from(y).ok())
            .ok_or_else(|| HandlerErr::new("bad_params", "year must be a number"))?,
    };
    let month = match params.get("month") {
        None => now.month(),
        Some(v) => v
            .as_u64()
            .and_then(|m| u32::try_from(m).ok())
            .ok_or_else(|| HandlerErr::new("bad_params", "month must be a number"))?,
    };
    Ok((year, month))
}

fn month_filter(params: &serde_json::Value, year: i32, month: u32) -> Result<DutyFilter, HandlerErr> {
    let mut filter = DutyFilter::default();
    filter.user_id = get_opt_str(params, "userId");
    if let Some(s) = get_opt_str(params, "status") {
        filter.status = Some(parse_status(&s)?);
    }
    filter.year_month = Some((year, month));
    Ok(filter)
}

fn calendar_month(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (year, month) = year_month_params(params)?;
    let duties = query_duties(conn, &month_filter(params, year, month)?)?;

    // "today" is injected for deterministic grids; callers that omit it get
    // the wall clock.
    let today = match get_opt_str(params, "today") {
        Some(s) => parse_day(&s)?,
        None => chrono::Local::now().date_naive(),
    };

    let grid = calendar::month_grid(year, month, &duties, today)
        .map_err(|e| HandlerErr::new("bad_params", e.message))?;
    let totals = stats::summarize(&duties);

    Ok(json!({
        "calendar": {
            "year": year,
            "month": month,
            "weeks": grid.weeks,
            "totalDuties": totals.total,
            "completedDuties": totals.completed,
            "missedDuties": totals.missed,
            "scheduledDuties": totals.scheduled,
        },
        "filters": {
            "year": year,
            "month": month,
            "userId": params.get("userId").cloned().unwrap_or(serde_json::Value::Null),
            "status": params.get("status").cloned().unwrap_or(serde_json::Value::Null),
        }
    }))
}

fn calendar_month_stats(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (year, month) = year_month_params(params)?;
    // Reject before touching the db so bad months fail like the grid does.
    calendar::grid_anchor(year, month).map_err(|e| HandlerErr::new("bad_params", e.message))?;
    let duties = query_duties(conn, &month_filter(params, year, month)?)?;

    let summary = stats::summarize(&duties);
    let shift_stats = stats::by_shift(&duties);
    let location_stats = stats::by_location(&duties);

    Ok(json!({
        "monthlyStats": {
            "year": year,
            "month": month,
            "summary": summary,
            "shiftStats": shift_stats,
            "locationStats": location_stats,
        }
    }))
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
        "calendar.month" => Some(dispatch(state, req, calendar_month)),
        "calendar.monthStats" => Some(dispatch(state, req, calendar_month_stats)),
        _ => None,
    }
}
