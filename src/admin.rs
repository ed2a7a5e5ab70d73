//! Admin user management endpoint.
//!
//! A single action-discriminated handler, mirroring the shape of a
//! backend function: `create`, `update`, `delete` and `list` actions,
//! all restricted to callers holding the `super_admin` role. The role
//! check happens before any mutation; failure classes map to
//! 400 (validation), 401 (no valid session), 403 (insufficient role)
//! and 500 (storage).

use crate::app::AppState;
use crate::auth::{self, AuthContext};
use crate::model::{AdminRole, Role};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Request body for the user-management endpoint
#[derive(Debug, Deserialize)]
pub struct ManageUserRequest {
    /// One of `create`, `update`, `delete`, `list`
    pub action: String,

    /// Login email, required for `create`
    pub email: Option<String>,

    /// Password, required for `create`, optional for `update`
    pub password: Option<String>,

    /// Role to grant; defaults to `editor` on `create`
    pub role: Option<Role>,

    /// Target user, required for `update` and `delete`
    pub user_id: Option<String>,
}

/// One entry of the `list` action's response
#[derive(Debug, Serialize)]
struct UserSummary {
    user_id: String,
    email: String,
    role: Option<Role>,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Resolve the caller and require the `super_admin` role
///
/// Rejected with 401 when the session token is missing or invalid, and
/// with 403 when the caller holds any lesser role.
pub fn authorize_super_admin(
    headers: &HeaderMap,
    jar: &CookieJar,
    state: &AppState,
) -> Result<AuthContext, Response> {
    let token = auth::session_token(headers, jar);
    let context = auth::authenticate(token.as_deref(), &state.db)
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Não autorizado"))?;

    if !context.is_super_admin() {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "Apenas super_admin pode gerenciar usuários",
        ));
    }
    Ok(context)
}

/// Handle `POST /api/admin/users`
pub async fn manage_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(request): Json<ManageUserRequest>,
) -> Response {
    let caller = match authorize_super_admin(&headers, &jar, &state) {
        Ok(context) => context,
        Err(response) => return response,
    };

    match request.action.as_str() {
        "create" => create_user(&state, &request),
        "update" => update_user(&state, &request),
        "delete" => delete_user(&state, &caller, &request),
        "list" => list_users(&state),
        _ => error_response(StatusCode::BAD_REQUEST, "Ação inválida"),
    }
}

fn create_user(state: &AppState, request: &ManageUserRequest) -> Response {
    let (email, password) = match (&request.email, &request.password) {
        (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
            (email, password)
        }
        _ => return error_response(StatusCode::BAD_REQUEST, "Email e senha são obrigatórios"),
    };

    let user = match auth::create_user(email, password) {
        Ok(user) => user,
        Err(e) => {
            log::error!("Failed to create user {}: {}", email, e);
            return error_response(StatusCode::BAD_REQUEST, &e);
        }
    };

    let role = AdminRole {
        id: Uuid::new_v4().to_string(),
        user_id: user.user_id.clone(),
        role: request.role.unwrap_or(Role::Editor),
        created_at: Utc::now(),
    };
    if let Err(e) = state.db.insert_role(role) {
        log::error!("Failed to store role for {}: {}", email, e);
        // Remove the half-created account so the email stays usable.
        if let Err(cleanup) = auth::delete_user(&user.user_id) {
            log::error!("Cleanup of {} also failed: {}", email, cleanup);
        }
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Erro ao configurar permissões",
        );
    }

    log::info!("Admin user created: {}", email);
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "Usuário criado com sucesso",
            "user_id": user.user_id,
        })),
    )
        .into_response()
}

fn update_user(state: &AppState, request: &ManageUserRequest) -> Response {
    let Some(user_id) = request.user_id.as_deref() else {
        return error_response(StatusCode::BAD_REQUEST, "ID do usuário é obrigatório");
    };

    if let Some(role) = request.role {
        if let Err(e) = state.db.update_role(user_id, role) {
            return error_response(StatusCode::BAD_REQUEST, &e);
        }
    }
    if let Some(password) = request.password.as_deref() {
        if let Err(e) = auth::update_password(user_id, password) {
            return error_response(StatusCode::BAD_REQUEST, &e);
        }
    }

    (
        StatusCode::OK,
        Json(json!({ "success": true, "message": "Usuário atualizado com sucesso" })),
    )
        .into_response()
}

fn delete_user(state: &AppState, caller: &AuthContext, request: &ManageUserRequest) -> Response {
    let Some(user_id) = request.user_id.as_deref() else {
        return error_response(StatusCode::BAD_REQUEST, "ID do usuário é obrigatório");
    };
    if user_id == caller.user_id {
        return error_response(StatusCode::BAD_REQUEST, "Você não pode excluir a si mesmo");
    }

    // Role first; a leftover role without a user would still grant
    // nothing, but a user without cleanup keeps an orphaned login.
    if let Err(e) = state.db.delete_role_for_user(user_id) {
        log::error!("Failed to delete role for {}: {}", user_id, e);
    }
    if let Err(e) = auth::delete_user(user_id) {
        return error_response(StatusCode::BAD_REQUEST, &e);
    }

    log::info!("Admin user removed: {}", user_id);
    (
        StatusCode::OK,
        Json(json!({ "success": true, "message": "Usuário removido com sucesso" })),
    )
        .into_response()
}

fn list_users(state: &AppState) -> Response {
    let users = match auth::get_users() {
        Ok(users) => users,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
    };

    let summaries: Vec<UserSummary> = users
        .values()
        .map(|user| UserSummary {
            user_id: user.user_id.clone(),
            email: user.email.clone(),
            role: state.db.role_for_user(&user.user_id).map(|r| r.role),
        })
        .collect();

    (
        StatusCode::OK,
        Json(json!({ "success": true, "users": summaries })),
    )
        .into_response()
}
