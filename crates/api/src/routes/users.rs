//! Admin user management.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use tradepost_core::{Pagination, Role, UserId};

use crate::db::UserRepository;
use crate::error::{AppError, Result};
use crate::extract::{Json, Path, Query};
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::User;
use crate::services::{AuthError, AuthService};
use crate::state::AppState;

/// Build the `/users` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create).get(list))
        .route("/{id}", get(show).patch(update).delete(remove))
        .route("/{id}/assign-admin", post(assign_admin))
}

/// New user body.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<Role>,
}

/// Profile update body.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// A page of users.
#[derive(Debug, Serialize)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: i64,
}

fn not_found_user(e: AuthError) -> AppError {
    match e {
        AuthError::UserNotFound => AppError::NotFound("User not found".to_string()),
        other => other.into(),
    }
}

/// `POST /users` (admin)
///
/// # Errors
///
/// 400 on invalid input, 409 if the email is taken.
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>)> {
    let user = AuthService::new(state.pool())
        .create_user(
            &body.email,
            &body.password,
            &body.name,
            body.role.unwrap_or(Role::User),
        )
        .await?;

    tracing::info!(admin_id = %admin.id, user_id = %user.id, role = %user.role, "Admin created user");
    Ok((StatusCode::CREATED, Json(user)))
}

/// `GET /users` (admin)
///
/// # Errors
///
/// 500 on database failure.
pub async fn list(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Query(page): Query<Pagination>,
) -> Result<Json<UserPage>> {
    let (users, total) = UserRepository::new(state.pool())
        .list(page.normalized())
        .await?;
    Ok(Json(UserPage { users, total }))
}

/// `GET /users/{id}` (self or admin)
///
/// # Errors
///
/// 403 for someone else's account, 404 if missing.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Path(id): Path<UserId>,
) -> Result<Json<User>> {
    if !current.can_access(id) {
        return Err(AppError::Forbidden(
            "You can only view your own account".to_string(),
        ));
    }

    let user = AuthService::new(state.pool())
        .get_user(id)
        .await
        .map_err(not_found_user)?;
    Ok(Json(user))
}

/// `PATCH /users/{id}` (self or admin)
///
/// # Errors
///
/// 403 for someone else's account, 404 if missing, 409 if the email is taken.
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Path(id): Path<UserId>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<User>> {
    if !current.can_access(id) {
        return Err(AppError::Forbidden(
            "You can only update your own account".to_string(),
        ));
    }

    let user = AuthService::new(state.pool())
        .update_user(
            id,
            body.name.as_deref(),
            body.email.as_deref(),
            body.password.as_deref(),
        )
        .await
        .map_err(not_found_user)?;
    Ok(Json(user))
}

/// `DELETE /users/{id}` (admin)
///
/// # Errors
///
/// 400 when deleting yourself, 404 if missing, 409 if the user has orders.
pub async fn remove(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<UserId>,
) -> Result<StatusCode> {
    if admin.id == id {
        return Err(AppError::BadRequest(
            "You cannot delete your own account".to_string(),
        ));
    }

    UserRepository::new(state.pool()).delete(id).await?;
    tracing::info!(admin_id = %admin.id, user_id = %id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /users/{id}/assign-admin` (admin)
///
/// # Errors
///
/// 404 if missing, 409 if already an admin.
pub async fn assign_admin(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<UserId>,
) -> Result<Json<User>> {
    let users = UserRepository::new(state.pool());
    let user = users
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    if user.role.is_admin() {
        return Err(AppError::Conflict("User is already an admin".to_string()));
    }

    let user = users.set_role(id, Role::Admin).await?;
    tracing::info!(admin_id = %admin.id, user_id = %id, "User promoted to admin");
    Ok(Json(user))
}
