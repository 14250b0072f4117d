use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_err, get_opt_str, get_required_str, now_rfc3339, user_exists, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const KINDS: [&str; 4] = ["reminder", "assignment", "change", "alert"];

fn notifications_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let user_id = get_opt_str(params, "userId");
    let kind = get_opt_str(params, "kind");
    if let Some(k) = &kind {
        if !KINDS.contains(&k.as_str()) {
            return Err(HandlerErr::new("bad_params", "unknown notification kind"));
        }
    }
    let is_read = params.get("isRead").and_then(|v| v.as_bool());
    let limit = params.get("limit").and_then(|v| v.as_u64()).unwrap_or(50) as usize;
    let page = params.get("page").and_then(|v| v.as_u64()).unwrap_or(1) as usize;
    if limit == 0 || page == 0 {
        return Err(HandlerErr::new("bad_params", "page and limit must be positive"));
    }

    let mut sql = String::from(
        "SELECT id, user_id, title, message, kind, is_read, created_at
         FROM notifications WHERE 1=1",
    );
    let mut args: Vec<Value> = Vec::new();
    if let Some(user_id) = &user_id {
        sql.push_str(" AND user_id = ?");
        args.push(Value::Text(user_id.clone()));
    }
    if let Some(kind) = &kind {
        sql.push_str(" AND kind = ?");
        args.push(Value::Text(kind.clone()));
    }
    if let Some(read) = is_read {
        sql.push_str(" AND is_read = ?");
        args.push(Value::Integer(read as i64));
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let rows = stmt
        .query_map(params_from_iter(args), |r| {
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

    let total = rows.len();
    let total_pages = total.div_ceil(limit);
    let start = (page - 1) * limit;
    let page_rows: Vec<serde_json::Value> =
        rows.into_iter().skip(start).take(limit).collect();

    Ok(json!({
        "notifications": page_rows,
        "total": total,
        "page": page,
        "limit": limit,
        "totalPages": total_pages,
    }))
}

fn notifications_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let user_id = get_required_str(params, "userId")?;
    let title = get_required_str(params, "title")?;
    let message = get_required_str(params, "message")?;
    let kind = get_required_str(params, "kind")?;
    if title.trim().is_empty() || message.trim().is_empty() {
        return Err(HandlerErr::new("bad_params", "title and message must not be empty"));
    }
    if !KINDS.contains(&kind.as_str()) {
        return Err(HandlerErr::new(
            "bad_params",
            "kind must be one of: reminder, assignment, change, alert",
        ));
    }
    if !user_exists(conn, &user_id)? {
        return Err(HandlerErr::new("not_found", "user not found"));
    }

    let id = Uuid::new_v4().to_string();
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO notifications(id, user_id, title, message, kind, is_read, created_at)
         VALUES(?, ?, ?, ?, ?, 0, ?)",
        (&id, &user_id, &title, &message, &kind, &now),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;

    Ok(json!({
        "notification": {
            "id": id,
            "userId": user_id,
            "title": title,
            "message": message,
            "kind": kind,
            "isRead": false,
            "createdAt": now,
        }
    }))
}

fn notifications_mark_read(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let exists = conn
        .query_row("SELECT 1 FROM notifications WHERE id = ?", [&id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(db_err)?
        .is_some();
    if !exists {
        return Err(HandlerErr::new("not_found", "notification not found"));
    }
    conn.execute("UPDATE notifications SET is_read = 1 WHERE id = ?", [&id])
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "ok": true }))
}

fn notifications_mark_all_read(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let user_id = get_required_str(params, "userId")?;
    let updated = conn
        .execute(
            "UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0",
            [&user_id],
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "updated": updated }))
}

fn notifications_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let removed = conn
        .execute("DELETE FROM notifications WHERE id = ?", [&id])
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    if removed == 0 {
        return Err(HandlerErr::new("not_found", "notification not found"));
    }
    Ok(json!({ "ok": true }))
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
        "notifications.list" => Some(dispatch(state, req, notifications_list)),
        "notifications.create" => Some(dispatch(state, req, notifications_create)),
        "notifications.markRead" => Some(dispatch(state, req, notifications_mark_read)),
        "notifications.markAllRead" => Some(dispatch(state, req, notifications_mark_all_read)),
        "notifications.delete" => Some(dispatch(state, req, notifications_delete)),
        _ => None,
    }
}
