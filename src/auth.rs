//! Admin authentication: password verification, session tokens and the
//! per-request [`AuthContext`].
//!
//! Users are stored in `database/users.json` keyed by email, with argon2
//! password hashes. Sessions live in an in-process map and expire after
//! 24 hours; the session token doubles as the bearer token for API
//! calls. Roles are not stored here: they come from the `admin_roles`
//! table and are joined into the [`AuthContext`] on every request.

use crate::model::Role;
use crate::store::{Database, DATABASE_DIR};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// A registered admin user
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthUser {
    /// Unique identifier (UUID), referenced by the admin_roles table
    pub user_id: String,

    /// Email address, the login identifier
    pub email: String,

    /// Argon2 hash of the user's password
    pub password_hash: String,

    /// Account creation timestamp
    pub created_at: DateTime<Utc>,
}

/// An authenticated session
#[derive(Debug, Clone)]
pub struct Session {
    /// User the session belongs to
    pub user_id: String,

    /// Login email of the user
    pub email: String,

    /// Time when the session expires
    pub expires_at: SystemTime,
}

/// Per-request authentication context
///
/// Built from the session token plus a role lookup, and passed
/// explicitly to whatever needs it; created on sign-in, gone on
/// sign-out or expiry.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub email: String,

    /// Admin role, if the user has one
    pub role: Option<Role>,
}

impl AuthContext {
    /// Whether the context grants access to the admin panel at all
    pub fn is_admin(&self) -> bool {
        self.role.is_some()
    }

    /// Whether the context may manage other admin users
    pub fn is_super_admin(&self) -> bool {
        self.role == Some(Role::SuperAdmin)
    }
}

lazy_static! {
    static ref SESSIONS: RwLock<HashMap<String, Session>> = RwLock::new(HashMap::new());
}

const USERS_FILE: &str = "users.json";
const SESSION_DURATION: u64 = 24 * 60 * 60; // 24 hours in seconds

fn users_path() -> PathBuf {
    Path::new(DATABASE_DIR).join(USERS_FILE)
}

/// Initialize the auth storage
///
/// Creates the database directory and an empty users file if they don't
/// exist. Call once at startup.
pub fn init_users() -> std::io::Result<()> {
    if !Path::new(DATABASE_DIR).exists() {
        create_dir_all(DATABASE_DIR)?;
    }

    let path = users_path();
    if !path.exists() {
        let mut file = File::create(path)?;
        file.write_all(b"{}")?;
    }

    Ok(())
}

fn read_users(path: &Path) -> Result<HashMap<String, AuthUser>, String> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return Err("Failed to open users file".to_string()),
    };

    let mut contents = String::new();
    if file.read_to_string(&mut contents).is_err() {
        return Err("Failed to read users file".to_string());
    }

    serde_json::from_str(&contents).map_err(|_| "Failed to parse users data".to_string())
}

fn write_users(path: &Path, users: &HashMap<String, AuthUser>) -> Result<(), String> {
    let json = serde_json::to_string_pretty(users)
        .map_err(|_| "Failed to serialize users data".to_string())?;

    let mut file =
        File::create(path).map_err(|_| "Failed to create users file".to_string())?;
    file.write_all(json.as_bytes())
        .map_err(|_| "Failed to write users data".to_string())
}

/// Get all registered users, keyed by email
pub fn get_users() -> Result<HashMap<String, AuthUser>, String> {
    read_users(&users_path())
}

fn create_user_at(path: &Path, email: &str, password: &str) -> Result<AuthUser, String> {
    if email.is_empty() || password.is_empty() {
        return Err("Email and password cannot be empty".to_string());
    }

    let mut users = read_users(path)?;
    if users.contains_key(email) {
        return Err("Email address is already registered".to_string());
    }

    let user = AuthUser {
        user_id: Uuid::new_v4().to_string(),
        email: email.to_string(),
        password_hash: hash_password(password)?,
        created_at: Utc::now(),
    };

    users.insert(email.to_string(), user.clone());
    write_users(path, &users)?;
    Ok(user)
}

/// Register a new admin user
///
/// # Errors
/// * Returns an error if the email is already registered or a field is
///   empty
pub fn create_user(email: &str, password: &str) -> Result<AuthUser, String> {
    create_user_at(&users_path(), email, password)
}

fn update_password_at(path: &Path, user_id: &str, new_password: &str) -> Result<(), String> {
    if new_password.is_empty() {
        return Err("Password cannot be empty".to_string());
    }

    let mut users = read_users(path)?;
    let user = users
        .values_mut()
        .find(|u| u.user_id == user_id)
        .ok_or_else(|| "User not found".to_string())?;
    user.password_hash = hash_password(new_password)?;
    write_users(path, &users)
}

/// Set a new password for an existing user
pub fn update_password(user_id: &str, new_password: &str) -> Result<(), String> {
    update_password_at(&users_path(), user_id, new_password)
}

fn delete_user_at(path: &Path, user_id: &str) -> Result<(), String> {
    let mut users = read_users(path)?;
    let before = users.len();
    users.retain(|_, u| u.user_id != user_id);
    if users.len() == before {
        return Err("User not found".to_string());
    }
    write_users(path, &users)
}

/// Remove a user account
pub fn delete_user(user_id: &str) -> Result<(), String> {
    delete_user_at(&users_path(), user_id)
}

/// Verify login credentials
///
/// # Returns
/// * `Ok(Some(user))` when the email exists and the password matches
/// * `Ok(None)` for a wrong password or unknown email
pub fn verify_user(email: &str, password: &str) -> Result<Option<AuthUser>, String> {
    let users = get_users()?;

    match users.get(email) {
        Some(user) if verify_password(password, &user.password_hash)? => Ok(Some(user.clone())),
        _ => Ok(None),
    }
}

fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    match argon2.hash_password(password.as_bytes(), &salt) {
        Ok(hash) => Ok(hash.to_string()),
        Err(_) => Err("Password hashing failed".to_string()),
    }
}

fn verify_password(password: &str, hash: &str) -> Result<bool, String> {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(hash) => hash,
        Err(_) => return Err("Invalid password hash format".to_string()),
    };

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false), // Password didn't match
    }
}

/// Create a session for an authenticated user
///
/// # Returns
/// * `String` - The session token, also used as the API bearer token
pub fn create_session(user: &AuthUser) -> String {
    let token = Uuid::new_v4().to_string();
    let session = Session {
        user_id: user.user_id.clone(),
        email: user.email.clone(),
        expires_at: SystemTime::now() + Duration::from_secs(SESSION_DURATION),
    };

    let mut sessions = SESSIONS.write().unwrap();
    sessions.insert(token.clone(), session);

    token
}

/// Look up a session token, ignoring expired sessions
pub fn validate_session(token: &str) -> Option<Session> {
    let sessions = SESSIONS.read().unwrap();

    match sessions.get(token) {
        Some(session) if session.expires_at > SystemTime::now() => Some(session.clone()),
        _ => None,
    }
}

/// Tear down a session on sign-out
pub fn destroy_session(token: &str) {
    let mut sessions = SESSIONS.write().unwrap();
    sessions.remove(token);
}

/// Extract the session token from a request
///
/// Accepts an `Authorization: Bearer` header (API clients) or the
/// `session` cookie (browser), in that order.
pub fn session_token(headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
    if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }
    jar.get("session").map(|cookie| cookie.value().to_string())
}

/// Build the request's [`AuthContext`] from its session token
///
/// Joins the session against the admin_roles table; `None` when the
/// token is missing, unknown or expired.
pub fn authenticate(token: Option<&str>, db: &Database) -> Option<AuthContext> {
    let session = validate_session(token?)?;
    let role = db.role_for_user(&session.user_id).map(|r| r.role);
    Some(AuthContext {
        user_id: session.user_id,
        email: session.email,
        role,
    })
}
