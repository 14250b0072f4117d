use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_err, get_opt_str, get_required_str, parse_day, query_duties, DutyFilter, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::DutyRecord;
use crate::stats;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;

const MONTHLY_WINDOW: u32 = 6;
const TOP_PERFORMER_LIMIT: usize = 5;

fn user_names(conn: &Connection, duties: &[DutyRecord]) -> Result<HashMap<String, (String, Option<String>)>, HandlerErr> {
    let mut out = HashMap::new();
    for d in duties {
        if out.contains_key(&d.user_id) {
            continue;
        }
        let row = conn
            .query_row(
                "SELECT name, class_name FROM users WHERE id = ?",
                [&d.user_id],
                |r| Ok((r.get::<_, String>(0)?, r.get::<_, Option<String>>(1)?)),
            )
            .optional()
            .map_err(db_err)?;
        if let Some(row) = row {
            out.insert(d.user_id.clone(), row);
        }
    }
    Ok(out)
}

fn reports_overview(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let filter = DutyFilter::from_params(params)?;
    let duties = query_duties(conn, &filter)?;

    let now = match get_opt_str(params, "now") {
        Some(s) => parse_day(&s)?,
        None => chrono::Local::now().date_naive(),
    };

    let summary = stats::summarize(&duties);
    let shift_stats = stats::by_shift(&duties);
    let location_stats = stats::by_location(&duties);
    let monthly_stats = stats::by_month(&duties, now, MONTHLY_WINDOW);

    let names = user_names(conn, &duties)?;
    let top_performers: Vec<serde_json::Value> = stats::top_performers(&duties, TOP_PERFORMER_LIMIT)
        .into_iter()
        .map(|b| {
            let (name, class) = names
                .get(&b.user_id)
                .cloned()
                .unwrap_or((String::new(), None));
            json!({
                "userId": b.user_id,
                "userName": name,
                "userClass": class,
                "summary": b.summary,
            })
        })
        .collect();

    Ok(json!({
        "report": {
            "summary": summary,
            "shiftStats": shift_stats,
            "locationStats": location_stats,
            "monthlyStats": monthly_stats,
            "topPerformers": top_performers,
        }
    }))
}

fn custom_filter(params: &serde_json::Value) -> Result<DutyFilter, HandlerErr> {
    let filters = params.get("filters").cloned().unwrap_or_else(|| json!({}));
    DutyFilter::from_params(&filters)
}

fn performance_rows(
    duties: &[DutyRecord],
    names: &HashMap<String, (String, Option<String>)>,
) -> Vec<serde_json::Value> {
    duties
        .iter()
        .map(|d| {
            let user = names.get(&d.user_id).map(|(n, _)| n.clone()).unwrap_or_default();
            json!({
                "date": d.date,
                "user": user,
                "task": d.task,
                "status": d.status,
                "shift": d.shift,
            })
        })
        .collect()
}

fn reports_custom(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let report_type = get_required_str(params, "reportType")?;
    let filter = custom_filter(params)?;
    let duties = query_duties(conn, &filter)?;
    let names = user_names(conn, &duties)?;

    let report = match report_type.as_str() {
        "performance" => json!({ "rows": performance_rows(&duties, &names) }),
        "attendance" => {
            // One group per calendar day, newest day first (query order).
            let mut days: Vec<serde_json::Value> = Vec::new();
            let mut seen: Vec<chrono::NaiveDate> = Vec::new();
            for d in &duties {
                if !seen.contains(&d.date) {
                    seen.push(d.date);
                }
            }
            for date in seen {
                let rows: Vec<serde_json::Value> = duties
                    .iter()
                    .filter(|d| d.date == date)
                    .map(|d| {
                        let user = names.get(&d.user_id).map(|(n, _)| n.clone()).unwrap_or_default();
                        json!({ "user": user, "status": d.status, "shift": d.shift })
                    })
                    .collect();
                days.push(json!({ "date": date, "rows": rows }));
            }
            json!({ "days": days })
        }
        "location" => {
            let mut groups: Vec<serde_json::Value> = Vec::new();
            for bucket in stats::by_location(&duties) {
                let rows: Vec<serde_json::Value> = duties
                    .iter()
                    .filter(|d| d.location == bucket.location)
                    .map(|d| {
                        let user = names.get(&d.user_id).map(|(n, _)| n.clone()).unwrap_or_default();
                        json!({ "date": d.date, "user": user, "task": d.task, "status": d.status })
                    })
                    .collect();
                groups.push(json!({
                    "location": bucket.location,
                    "summary": bucket.summary,
                    "rows": rows,
                }));
            }
            json!({ "locations": groups })
        }
        other => {
            return Err(HandlerErr {
                code: "bad_params",
                message: "reportType must be one of: performance, attendance, location".to_string(),
                details: Some(json!({ "reportType": other })),
            })
        }
    };

    Ok(json!({
        "reportType": report_type,
        "report": report,
        "generatedAt": crate::ipc::helpers::now_rfc3339(),
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
        "reports.overview" => Some(dispatch(state, req, reports_overview)),
        "reports.custom" => Some(dispatch(state, req, reports_custom)),
        _ => None,
    }
}
