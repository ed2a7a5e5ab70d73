//! Routing and HTTP handlers for the portal API.

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use uuid::Uuid;

use crate::admin;
use crate::aggregate;
use crate::auth::{self, AuthContext};
use crate::drilldown;
use crate::ingest;
use crate::instructions;
use crate::model::{
    AdminRole, Category, Item, ItemKind, PortalConfig, Role, CONFIG_HEADER_SUBTITLE,
    CONFIG_HEADER_TITLE, CONFIG_PRIMARY_COLOR, CONFIG_SECONDARY_COLOR,
};
use crate::store::{Database, DATABASE_DIR};
use chrono::Utc;

/// Shared application state
pub struct AppState {
    pub db: Arc<Database>,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct ListQuery {
    include_inactive: Option<bool>,
    category_id: Option<String>,
}

#[derive(Deserialize)]
struct ConfigUpdate {
    key: String,
    value: String,
}

#[derive(Deserialize)]
struct CategoryPayload {
    name: String,
    description: Option<String>,
    icon: Option<String>,
    order: Option<i32>,
    active: Option<bool>,
}

#[derive(Deserialize)]
struct ItemPayload {
    category_id: String,
    name: String,
    description: Option<String>,
    url: Option<String>,
    kind: ItemKind,
    icon: Option<String>,
    order: Option<i32>,
    active: Option<bool>,
    instruction_prompt: Option<String>,
}

/// Start the portal server on the given port
pub async fn run(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    auth::init_users()?;
    let db = Arc::new(Database::open(DATABASE_DIR)?);

    let state = Arc::new(AppState { db });

    let app = Router::new()
        .route("/api/auth/login", post(handle_login))
        .route("/api/auth/logout", post(handle_logout))
        .route("/api/config", get(get_config).put(update_config))
        .route("/api/categories", get(list_categories).post(create_category))
        .route(
            "/api/categories/:id",
            put(update_category).delete(delete_category),
        )
        .route("/api/items", get(list_items).post(create_item))
        .route("/api/items/:id", put(update_item).delete(delete_item))
        .route("/api/items/:id/dashboard", get(get_dashboard))
        .route("/api/items/:id/rows", get(get_rows))
        .route("/api/items/:id/upload", post(upload_spreadsheet))
        .route("/api/admin/users", post(admin::manage_users))
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    println!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await?;

    Ok(())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Resolve the caller and require any admin role
///
/// Used by every mutating content endpoint; the check happens before any
/// storage mutation is attempted.
fn require_admin(
    headers: &HeaderMap,
    jar: &CookieJar,
    state: &AppState,
) -> Result<AuthContext, Response> {
    let token = auth::session_token(headers, jar);
    let context = auth::authenticate(token.as_deref(), &state.db)
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Não autorizado"))?;

    if !context.is_admin() {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "Acesso restrito a administradores",
        ));
    }
    Ok(context)
}

// Authentication

async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(credentials): Json<LoginRequest>,
) -> Response {
    match auth::verify_user(&credentials.email, &credentials.password) {
        Ok(Some(user)) => {
            let token = auth::create_session(&user);
            let role = state.db.role_for_user(&user.user_id).map(|r| r.role);
            let cookie = Cookie::new("session", token.clone());
            (
                jar.add(cookie),
                Json(json!({
                    "success": true,
                    "token": token,
                    "user_id": user.user_id,
                    "email": user.email,
                    "role": role,
                })),
            )
                .into_response()
        }
        Ok(None) => error_response(StatusCode::UNAUTHORIZED, "Email ou senha inválidos"),
        Err(e) => {
            log::error!("Login failed for {}: {}", credentials.email, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Erro de autenticação")
        }
    }
}

async fn handle_logout(headers: HeaderMap, jar: CookieJar) -> Response {
    if let Some(token) = auth::session_token(&headers, &jar) {
        auth::destroy_session(&token);
    }
    let cookie = Cookie::new("session", "");
    (jar.add(cookie), Json(json!({ "success": true }))).into_response()
}

// Portal configuration

async fn get_config(State(state): State<Arc<AppState>>) -> Json<PortalConfig> {
    let pairs = state.db.config_pairs();
    Json(PortalConfig::from_pairs(
        pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
    ))
}

async fn update_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(update): Json<ConfigUpdate>,
) -> Response {
    if let Err(response) = require_admin(&headers, &jar, &state) {
        return response;
    }

    let known = [
        CONFIG_PRIMARY_COLOR,
        CONFIG_SECONDARY_COLOR,
        CONFIG_HEADER_TITLE,
        CONFIG_HEADER_SUBTITLE,
    ];
    if !known.contains(&update.key.as_str()) {
        return error_response(StatusCode::BAD_REQUEST, "Chave de configuração desconhecida");
    }

    match state.db.set_config(&update.key, &update.value) {
        Ok(_) => Json(json!({ "success": true })).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

// Categories

async fn list_categories(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    let categories = state
        .db
        .list_categories(query.include_inactive.unwrap_or(false));
    Json(categories).into_response()
}

async fn create_category(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<CategoryPayload>,
) -> Response {
    if let Err(response) = require_admin(&headers, &jar, &state) {
        return response;
    }
    if payload.name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Nome é obrigatório");
    }

    let now = Utc::now();
    let category = Category {
        id: Uuid::new_v4().to_string(),
        name: payload.name,
        description: payload.description,
        icon: payload.icon.unwrap_or_else(|| "folder".to_string()),
        order: payload.order.unwrap_or(0),
        active: payload.active.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };

    match state.db.insert_category(category.clone()) {
        Ok(_) => (StatusCode::OK, Json(category)).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

async fn update_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<CategoryPayload>,
) -> Response {
    if let Err(response) = require_admin(&headers, &jar, &state) {
        return response;
    }
    if payload.name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Nome é obrigatório");
    }
    let Some(existing) = state.db.get_category(&id) else {
        return error_response(StatusCode::NOT_FOUND, "Categoria não encontrada");
    };

    let category = Category {
        name: payload.name,
        description: payload.description,
        icon: payload.icon.unwrap_or(existing.icon.clone()),
        order: payload.order.unwrap_or(existing.order),
        active: payload.active.unwrap_or(existing.active),
        updated_at: Utc::now(),
        ..existing
    };

    match state.db.update_category(category.clone()) {
        Ok(_) => (StatusCode::OK, Json(category)).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

async fn delete_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    if let Err(response) = require_admin(&headers, &jar, &state) {
        return response;
    }
    if state.db.get_category(&id).is_none() {
        return error_response(StatusCode::NOT_FOUND, "Categoria não encontrada");
    }

    match state.db.delete_category(&id) {
        Ok(_) => Json(json!({ "success": true })).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

// Items

async fn list_items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    let items = state.db.list_items(
        query.category_id.as_deref(),
        query.include_inactive.unwrap_or(false),
    );
    Json(items).into_response()
}

async fn create_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<ItemPayload>,
) -> Response {
    if let Err(response) = require_admin(&headers, &jar, &state) {
        return response;
    }
    if payload.name.trim().is_empty() || payload.category_id.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Nome e categoria são obrigatórios");
    }

    let now = Utc::now();
    let item = Item {
        id: Uuid::new_v4().to_string(),
        category_id: payload.category_id,
        name: payload.name,
        description: payload.description,
        url: payload.url,
        kind: payload.kind,
        icon: payload.icon.unwrap_or_else(|| "link".to_string()),
        order: payload.order.unwrap_or(0),
        active: payload.active.unwrap_or(true),
        instruction_prompt: payload.instruction_prompt,
        created_at: now,
        updated_at: now,
    };

    match state.db.insert_item(item.clone()) {
        Ok(_) => (StatusCode::OK, Json(item)).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

async fn update_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<ItemPayload>,
) -> Response {
    if let Err(response) = require_admin(&headers, &jar, &state) {
        return response;
    }
    if payload.name.trim().is_empty() || payload.category_id.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Nome e categoria são obrigatórios");
    }
    let Some(existing) = state.db.get_item(&id) else {
        return error_response(StatusCode::NOT_FOUND, "Item não encontrado");
    };

    let item = Item {
        category_id: payload.category_id,
        name: payload.name,
        description: payload.description,
        url: payload.url,
        kind: payload.kind,
        icon: payload.icon.unwrap_or(existing.icon.clone()),
        order: payload.order.unwrap_or(existing.order),
        active: payload.active.unwrap_or(existing.active),
        instruction_prompt: payload.instruction_prompt,
        updated_at: Utc::now(),
        ..existing
    };

    match state.db.update_item(item.clone()) {
        Ok(_) => (StatusCode::OK, Json(item)).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

async fn delete_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    if let Err(response) = require_admin(&headers, &jar, &state) {
        return response;
    }
    if state.db.get_item(&id).is_none() {
        return error_response(StatusCode::NOT_FOUND, "Item não encontrado");
    }

    match state.db.delete_item(&id) {
        Ok(_) => Json(json!({ "success": true })).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

// Dashboard

/// Compute the full chart payload for a dashboard item: parsed
/// configuration, per-group series, optional team comparison and the
/// drill-down column projection
async fn get_dashboard(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let Some(item) = state.db.get_item(&id) else {
        return error_response(StatusCode::NOT_FOUND, "Dashboard não encontrado");
    };

    let rows = state.db.rows_for_item(&id);

    // Distinct sheet names in first-seen order, for the fallback group.
    let mut known_sheets: Vec<String> = Vec::new();
    for row in &rows {
        if !known_sheets.contains(&row.sheet_name) {
            known_sheets.push(row.sheet_name.clone());
        }
    }

    let config = instructions::parse(item.instruction_prompt.as_deref(), &known_sheets);
    let series = aggregate::aggregate(&rows, &config);
    let team_comparison = aggregate::compare_teams(&rows, &config);
    let drilldown_columns = rows
        .first()
        .map(|row| drilldown::project_columns(&config, row))
        .unwrap_or_default();

    Json(json!({
        "item": item,
        "config": config,
        "series": series,
        "team_comparison": team_comparison,
        "drilldown_columns": drilldown_columns,
        "total_rows": rows.len(),
    }))
    .into_response()
}

async fn get_rows(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    if state.db.get_item(&id).is_none() {
        return error_response(StatusCode::NOT_FOUND, "Item não encontrado");
    }
    Json(state.db.rows_for_item(&id)).into_response()
}

/// Handle a spreadsheet upload for a dashboard item
///
/// Replaces the item's stored rows with the workbook's contents. The
/// pipeline is not transactional: a mid-upload failure leaves whatever
/// batches were already inserted, and the response reports the stage
/// that failed.
async fn upload_spreadsheet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Response {
    if let Err(response) = require_admin(&headers, &jar, &state) {
        return response;
    }
    let Some(item) = state.db.get_item(&id) else {
        return error_response(StatusCode::NOT_FOUND, "Item não encontrado");
    };
    if item.kind != ItemKind::Dashboard {
        return error_response(StatusCode::BAD_REQUEST, "Item não é um dashboard");
    }

    let mut file_data = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap_or(None) {
        if field.name() == Some("spreadsheet") {
            file_data = field.bytes().await.unwrap_or_default().to_vec();
        }
    }
    if file_data.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Nenhum arquivo recebido");
    }

    match ingest::upload_workbook(state.db.as_ref(), &id, &file_data) {
        Ok(stats) => {
            log::info!(
                "Upload for item {}: {} rows from {} sheets",
                id,
                stats.rows,
                stats.sheets
            );
            Json(json!({ "success": true, "stats": stats })).into_response()
        }
        Err(e) => {
            log::error!("Upload for item {} failed: {}", id, e);
            let status = match e.stage {
                ingest::UploadStage::Parsing => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_response(status, &e.to_string())
        }
    }
}

/// Create the first super_admin account directly against the store,
/// used when the portal is bootstrapped with no users yet
pub fn bootstrap_super_admin(
    db: &Database,
    email: &str,
    password: &str,
) -> Result<String, String> {
    let user = auth::create_user(email, password)?;
    db.insert_role(AdminRole {
        id: Uuid::new_v4().to_string(),
        user_id: user.user_id.clone(),
        role: Role::SuperAdmin,
        created_at: Utc::now(),
    })?;
    Ok(user.user_id)
}
