use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_err, get_opt_str, get_required_str, now_rfc3339, password_digest, public_user_json,
    session_user, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn validate_email(email: &str) -> Result<(), HandlerErr> {
    let ok = email.contains('@') && email.contains('.') && !email.starts_with('@');
    if !ok {
        return Err(HandlerErr::new("bad_params", "invalid email address"));
    }
    Ok(())
}

fn validate_role(role: &str) -> Result<(), HandlerErr> {
    match role {
        "admin" | "student" => Ok(()),
        _ => Err(HandlerErr::new(
            "bad_params",
            "role must be admin or student",
        )),
    }
}

fn auth_register(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let email = get_required_str(params, "email")?;
    let password = get_required_str(params, "password")?;
    let role = get_required_str(params, "role")?;
    let class_name = get_opt_str(params, "class");
    let phone = get_opt_str(params, "phone");

    if name.trim().chars().count() < 2 {
        return Err(HandlerErr::new("bad_params", "name must have at least 2 characters"));
    }
    validate_email(&email)?;
    if password.chars().count() < 6 {
        return Err(HandlerErr::new(
            "bad_params",
            "password must have at least 6 characters",
        ));
    }
    validate_role(&role)?;
    if role == "student" && class_name.as_deref().map_or(true, |c| c.trim().is_empty()) {
        return Err(HandlerErr::new("bad_params", "students must have a class"));
    }

    let taken = conn
        .query_row("SELECT 1 FROM users WHERE email = ?", [&email], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(db_err)?
        .is_some();
    if taken {
        return Err(HandlerErr::new("conflict", "email already registered"));
    }

    let id = Uuid::new_v4().to_string();
    let salt = Uuid::new_v4().to_string();
    let hash = password_digest(&salt, &password);
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO users(id, name, email, role, password_salt, password_hash,
                           class_name, phone, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id, name.trim(), &email, &role, &salt, &hash, &class_name, &phone, &now, &now,
        ),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;

    let user = public_user_json(conn, &id)?
        .ok_or_else(|| HandlerErr::new("db_query_failed", "user vanished after insert"))?;
    Ok(json!({ "user": user }))
}

fn auth_login(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let email = get_required_str(params, "email")?;
    let password = get_required_str(params, "password")?;

    let row = conn
        .query_row(
            "SELECT id, password_salt, password_hash FROM users WHERE email = ?",
            [&email],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            },
        )
        .optional()
        .map_err(db_err)?;
    let Some((user_id, salt, hash)) = row else {
        return Err(HandlerErr::new("not_found", "no account with that email"));
    };
    if password_digest(&salt, &password) != hash {
        return Err(HandlerErr::new("unauthorized", "wrong password"));
    }

    let token = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO sessions(token, user_id, created_at) VALUES(?, ?, ?)",
        (&token, &user_id, now_rfc3339()),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;

    let user = public_user_json(conn, &user_id)?
        .ok_or_else(|| HandlerErr::new("db_query_failed", "user row missing"))?;
    Ok(json!({ "user": user, "token": token }))
}

fn auth_logout(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let token = get_required_str(params, "token")?;
    let removed = conn
        .execute("DELETE FROM sessions WHERE token = ?", [&token])
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "removed": removed > 0 }))
}

fn auth_whoami(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = session_user(conn, params)?;
    let user = public_user_json(conn, &auth.id)?
        .ok_or_else(|| HandlerErr::new("not_found", "user row missing"))?;
    Ok(json!({ "user": user }))
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
        "auth.register" => Some(dispatch(state, req, auth_register)),
        "auth.login" => Some(dispatch(state, req, auth_login)),
        "auth.logout" => Some(dispatch(state, req, auth_logout)),
        "auth.whoami" => Some(dispatch(state, req, auth_whoami)),
        _ => None,
    }
}
