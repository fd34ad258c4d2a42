//! Authentication route handlers.
//!
//! Password accounts and Google sign-in. Both end the same way: the
//! session id is rotated and a [`CurrentUser`] is stored in the session.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::error::{AppError, Result};
use crate::extract::{Json, Query};
use crate::middleware::{RequireAuth, clear_current_user, set_current_user};
use crate::models::{CurrentUser, session_keys};
use crate::services::AuthService;
use crate::services::auth::AuthError;
use crate::services::google::generate_state;
use crate::state::AppState;

/// Build the `/auth` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/profile", get(profile))
        .route("/google", get(google_login))
        .route("/google/callback", get(google_callback))
}

/// Registration body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Login body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Query parameters from the Google OAuth callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// `POST /auth/register`
///
/// # Errors
///
/// 400 on invalid input, 409 if the email is taken.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<CurrentUser>)> {
    let user = AuthService::new(state.pool())
        .register(&body.email, &body.password, &body.name)
        .await?;

    tracing::info!(user_id = %user.id, role = %user.role, "User registered");
    Ok((StatusCode::CREATED, Json(CurrentUser::from(&user))))
}

/// `POST /auth/login`
///
/// # Errors
///
/// 401 "Invalid credentials" for any unknown email or wrong password.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<LoginRequest>,
) -> Result<Json<CurrentUser>> {
    let user = match AuthService::new(state.pool())
        .login(&body.email, &body.password)
        .await
    {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(error = %e, "Login failed");
            return Err(e.into());
        }
    };

    let current = CurrentUser::from(&user);
    set_current_user(&session, &current).await?;

    tracing::info!(user_id = %user.id, "User logged in");
    Ok(Json(current))
}

/// `POST /auth/logout`
///
/// # Errors
///
/// 500 if the session store fails.
pub async fn logout(session: Session) -> Result<StatusCode> {
    clear_current_user(&session).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /auth/profile`
///
/// Reloads the user so a deleted account stops working immediately.
///
/// # Errors
///
/// 401 if not logged in or the account no longer exists.
pub async fn profile(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<Json<CurrentUser>> {
    let user = AuthService::new(state.pool()).get_user(current.id).await?;
    Ok(Json(CurrentUser::from(&user)))
}

/// `GET /auth/google`
///
/// # Errors
///
/// 404 when Google sign-in is not configured.
pub async fn google_login(State(state): State<AppState>, session: Session) -> Result<Response> {
    let google = state
        .google()
        .ok_or_else(|| AppError::NotFound("Google sign-in is not enabled".to_string()))?;

    let oauth_state = generate_state();
    session
        .insert(session_keys::GOOGLE_OAUTH_STATE, &oauth_state)
        .await?;

    Ok(Redirect::to(&google.authorization_url(&oauth_state)).into_response())
}

/// `GET /auth/google/callback`
///
/// # Errors
///
/// 400 on a missing or mismatched `state`, 502 if Google rejects the code.
pub async fn google_callback(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<CallbackQuery>,
) -> Result<Response> {
    let google = state
        .google()
        .ok_or_else(|| AppError::NotFound("Google sign-in is not enabled".to_string()))?;

    if let Some(error) = query.error {
        tracing::warn!(error = %error, "Google sign-in denied");
        let url = format!("{}/login?error=google_denied", state.config().app_url);
        return Ok(Redirect::to(&url).into_response());
    }

    // One-time use, whatever the outcome.
    let stored: Option<String> = session
        .remove(session_keys::GOOGLE_OAUTH_STATE)
        .await
        .ok()
        .flatten();

    let (Some(code), Some(returned)) = (query.code, query.state) else {
        return Err(AuthError::InvalidOAuthState.into());
    };
    if stored.as_deref() != Some(returned.as_str()) {
        tracing::warn!("Google OAuth state mismatch");
        return Err(AuthError::InvalidOAuthState.into());
    }

    let profile = google.exchange_code(&code).await?;
    let user = AuthService::new(state.pool())
        .find_or_create_oauth_user(&profile.email, &profile.name)
        .await?;

    set_current_user(&session, &CurrentUser::from(&user)).await?;
    tracing::info!(user_id = %user.id, "User signed in with Google");

    Ok(Redirect::to(&state.config().app_url).into_response())
}
