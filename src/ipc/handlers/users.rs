use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_err, get_opt_str, get_required_str, now_rfc3339, public_user_json, require_admin,
    session_user, user_exists, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

fn users_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_admin(conn, params)?;
    let role = get_opt_str(params, "role");

    let mut stmt = conn
        .prepare(
            "SELECT id, name, email, role, class_name, phone, created_at, updated_at
             FROM users ORDER BY created_at",
        )
        .map_err(db_err)?;
    let rows = stmt
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

    let users: Vec<serde_json::Value> = match role {
        Some(role) => rows
            .into_iter()
            .filter(|u| u.get("role").and_then(|v| v.as_str()) == Some(role.as_str()))
            .collect(),
        None => rows,
    };
    Ok(json!({ "users": users, "total": users.len() }))
}

fn users_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = session_user(conn, params)?;
    let id = get_required_str(params, "id")?;
    if !auth.is_admin() && auth.id != id {
        return Err(HandlerErr::new("forbidden", "can only update your own profile"));
    }
    if !user_exists(conn, &id)? {
        return Err(HandlerErr::new("not_found", "user not found"));
    }

    if let Some(name) = get_opt_str(params, "name") {
        if name.trim().chars().count() < 2 {
            return Err(HandlerErr::new("bad_params", "name must have at least 2 characters"));
        }
        conn.execute("UPDATE users SET name = ? WHERE id = ?", (name.trim(), &id))
            .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    if let Some(class_name) = get_opt_str(params, "class") {
        conn.execute(
            "UPDATE users SET class_name = ? WHERE id = ?",
            (&class_name, &id),
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    if let Some(phone) = get_opt_str(params, "phone") {
        conn.execute("UPDATE users SET phone = ? WHERE id = ?", (&phone, &id))
            .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    // Role changes are an admin-only escalation path.
    if let Some(role) = get_opt_str(params, "role") {
        if !auth.is_admin() {
            return Err(HandlerErr::new("forbidden", "only admins may change roles"));
        }
        if role != "admin" && role != "student" {
            return Err(HandlerErr::new("bad_params", "role must be admin or student"));
        }
        conn.execute("UPDATE users SET role = ? WHERE id = ?", (&role, &id))
            .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    conn.execute(
        "UPDATE users SET updated_at = ? WHERE id = ?",
        (now_rfc3339(), &id),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;

    let user = public_user_json(conn, &id)?
        .ok_or_else(|| HandlerErr::new("db_query_failed", "user row missing"))?;
    Ok(json!({ "user": user }))
}

fn users_set_password(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = session_user(conn, params)?;
    let id = get_required_str(params, "id")?;
    let password = get_required_str(params, "password")?;
    if !auth.is_admin() && auth.id != id {
        return Err(HandlerErr::new("forbidden", "can only change your own password"));
    }
    if password.chars().count() < 6 {
        return Err(HandlerErr::new(
            "bad_params",
            "password must have at least 6 characters",
        ));
    }
    if !user_exists(conn, &id)? {
        return Err(HandlerErr::new("not_found", "user not found"));
    }

    let salt = uuid::Uuid::new_v4().to_string();
    let hash = crate::ipc::helpers::password_digest(&salt, &password);
    conn.execute(
        "UPDATE users SET password_salt = ?, password_hash = ?, updated_at = ? WHERE id = ?",
        (&salt, &hash, now_rfc3339(), &id),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    // Existing sessions for the account stay valid; only the credential changes.
    Ok(json!({ "ok": true }))
}

fn users_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = require_admin(conn, params)?;
    let id = get_required_str(params, "id")?;
    if auth.id == id {
        return Err(HandlerErr::new("bad_params", "cannot delete your own account"));
    }
    if !user_exists(conn, &id)? {
        return Err(HandlerErr::new("not_found", "user not found"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    for sql in [
        "DELETE FROM sessions WHERE user_id = ?",
        "DELETE FROM notifications WHERE user_id = ?",
        "DELETE FROM duties WHERE user_id = ?",
        "DELETE FROM users WHERE id = ?",
    ] {
        tx.execute(sql, [&id])
            .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "deleted": id }))
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
        "users.list" => Some(dispatch(state, req, users_list)),
        "users.update" => Some(dispatch(state, req, users_update)),
        "users.setPassword" => Some(dispatch(state, req, users_set_password)),
        "users.delete" => Some(dispatch(state, req, users_delete)),
        _ => None,
    }
}
