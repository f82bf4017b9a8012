use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

use super::{
    DevState,
    auth::{SessionUser, cleared_session_cookie, issue_session, session_cookie},
};
use crate::{
    models::Identity,
    resource::{Filters, ResourceKind},
};

/// LoginRequest
///
/// Development login: any seeded account, by email. No password.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
}

/// login
///
/// [Public Route] Issues a session cookie for a seeded account.
pub async fn login(
    State(state): State<DevState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, StatusCode> {
    let user = state
        .directory
        .find_by_email(&payload.email)
        .cloned()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = issue_session(&state.config, user.id).map_err(|e| {
        tracing::error!(error = %e, "failed to sign session");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    tracing::info!(user_id = %user.id, role = %user.role, "dev login");
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie(&token))],
        Json(user),
    )
        .into_response())
}

/// logout
///
/// [Public Route] Clears the session cookie. Idempotent.
pub async fn logout() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, cleared_session_cookie())],
    )
}

/// me
///
/// [Authenticated Route] The identity oracle. Answers with the identity wrapped in
/// `{"user": ...}`; 401 without a valid session.
pub async fn me(SessionUser(user): SessionUser) -> Json<Value> {
    Json(json!({ "user": user }))
}

/// list_resources
///
/// [Authenticated Route] `/{kind}/{scope}` for every resource kind. A caller may only
/// use the endpoint its role is dispatched to (403 otherwise). Each kind answers in a
/// different envelope so clients exercise every normalization path:
/// tickets bare, requests `{data}`, document threads `{data: {data}}` with paging.
pub async fn list_resources(
    SessionUser(user): SessionUser,
    State(state): State<DevState>,
    Path((kind, scope)): Path<(String, String)>,
    Query(filters): Query<BTreeMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    let kind = ResourceKind::from_segment(&kind).ok_or(StatusCode::NOT_FOUND)?;
    authorize(&user, kind, &scope)?;

    let items = filter_items(
        state.directory.collection(kind, &scope, user.id),
        &filters,
    );

    let body = match kind {
        ResourceKind::Tickets => Value::Array(items),
        ResourceKind::Requests => json!({ "data": items }),
        ResourceKind::DocumentThreads => {
            let total = items.len();
            json!({ "data": { "data": items, "current_page": 1, "total": total } })
        }
    };
    Ok(Json(body))
}

/// The same dispatch table the client uses decides which endpoint a role may call.
fn authorize(user: &Identity, kind: ResourceKind, scope: &str) -> Result<(), StatusCode> {
    let requested = format!("/{}/{}", kind, scope);
    match kind.spec().endpoint_for(&user.role) {
        Ok(allowed) if allowed == requested => Ok(()),
        Ok(_) | Err(_) => Err(StatusCode::FORBIDDEN),
    }
}

/// Applies `status` (exact match) and ignores every other filter.
fn filter_items(items: Vec<Value>, filters: &Filters) -> Vec<Value> {
    match filters.get("status") {
        Some(status) => items
            .into_iter()
            .filter(|item| item.get("status").and_then(Value::as_str) == Some(status.as_str()))
            .collect(),
        None => items,
    }
}
