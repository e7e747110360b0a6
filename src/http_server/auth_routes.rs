//! # Auth HTTP Routes
//!
//! Request/response DTOs, the bearer-session extractor, and handlers.
//! Each handler is a direct passthrough to the auth service; error
//! mapping happens in `AuthError::into_response`.

use axum::async_trait;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::errors::{AuthError, AuthResult};
use crate::auth::user::{User, UserProfile};

use super::AppState;

// ==================
// Session Extractor
// ==================

/// The authenticated user, resolved from the `Authorization: Bearer`
/// session token
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> AuthResult<Self> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| AuthError::unauthorized("you are not logged in"))?;

        let user = state.service.authenticate(token)?;
        Ok(AuthUser(user))
    }
}

// ==================
// Request DTOs
// ==================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpCodeRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub password: String,
}

// ==================
// Router
// ==================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/users/me", get(me))
        .route("/api/users/email", axum::routing::patch(update_email))
        .route("/api/auth/otp/generate", post(generate_otp))
        .route("/api/auth/otp/verify", post(verify_otp))
        .route("/api/auth/otp/validate", post(validate_otp))
        .route("/api/auth/otp/disable", post(disable_otp))
        .route("/api/auth/otp/recover", post(recover))
        .route("/api/auth/verifyemail", post(request_email_verification))
        .route(
            "/api/auth/verifyemail/:email/:token",
            get(validate_email_verification),
        )
        .route(
            "/api/auth/resetpassword",
            post(request_password_reset)
                .patch(reset_password)
                .delete(cancel_password_reset),
        )
        .route(
            "/api/auth/resetpassword/:email/:token",
            get(validate_password_reset),
        )
}

// ==================
// Handlers
// ==================

async fn health() -> Json<Value> {
    Json(json!({ "status": "success" }))
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AuthResult<(StatusCode, Json<Value>)> {
    let user = state
        .service
        .register(&body.name, &body.email, &body.password)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "success", "user": user })),
    ))
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AuthResult<Json<Value>> {
    let response = state.service.login(&body.email, &body.password)?;
    Ok(Json(json!({
        "status": "success",
        "token": response.token,
        "expires_in": response.expires_in,
        "otp_enabled": response.otp_enabled,
    })))
}

async fn me(AuthUser(user): AuthUser) -> Json<Value> {
    Json(json!({ "status": "success", "user": UserProfile::from(&user) }))
}

async fn update_email(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<EmailRequest>,
) -> AuthResult<Json<Value>> {
    state.service.update_email(user.id, &body.email).await?;
    Ok(Json(json!({
        "status": "success",
        "message": "a verification link was sent to the new address",
    })))
}

async fn generate_otp(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AuthResult<Json<Value>> {
    let setup = state.service.generate_otp(user.id)?;
    Ok(Json(json!({
        "status": "success",
        "otp_base32": setup.otp_base32,
        "otp_auth_url": setup.otp_auth_url,
    })))
}

async fn verify_otp(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<OtpCodeRequest>,
) -> AuthResult<Json<Value>> {
    let enrollment = state.service.verify_otp(user.id, &body.code).await?;
    Ok(Json(json!({
        "status": "success",
        "otp_verified": true,
        "recovery_codes": enrollment.recovery_codes,
        "user": enrollment.user,
    })))
}

async fn validate_otp(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<OtpCodeRequest>,
) -> AuthResult<Json<Value>> {
    state.service.validate_otp(user.id, &body.code)?;
    Ok(Json(json!({ "status": "success", "otp_valid": true })))
}

async fn disable_otp(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<OtpCodeRequest>,
) -> AuthResult<Json<Value>> {
    let profile = state.service.disable_otp(user.id, &body.code)?;
    Ok(Json(json!({
        "status": "success",
        "otp_disabled": true,
        "user": profile,
    })))
}

async fn recover(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<OtpCodeRequest>,
) -> AuthResult<Json<Value>> {
    state.service.validate_recovery_code(user.id, &body.code)?;
    Ok(Json(json!({ "status": "success", "valid": true })))
}

async fn request_email_verification(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AuthResult<Json<Value>> {
    state.service.request_email_verification(user.id).await?;
    Ok(Json(json!({
        "status": "success",
        "message": "verification email sent",
    })))
}

async fn validate_email_verification(
    State(state): State<AppState>,
    Path((email, token)): Path<(String, String)>,
) -> AuthResult<Json<Value>> {
    let user = state.service.validate_email_verification(&email, &token)?;
    Ok(Json(json!({ "status": "success", "user": user })))
}

async fn request_password_reset(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> AuthResult<Json<Value>> {
    state.service.request_password_reset(&body.email).await?;
    Ok(Json(json!({
        "status": "success",
        "message": "password reset email sent",
    })))
}

async fn validate_password_reset(
    State(state): State<AppState>,
    Path((email, token)): Path<(String, String)>,
) -> AuthResult<Json<Value>> {
    let password_token = state.service.validate_password_reset(&email, &token)?;
    Ok(Json(json!({
        "status": "success",
        "password_token": password_token,
    })))
}

async fn reset_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ResetPasswordRequest>,
) -> AuthResult<Json<Value>> {
    let token = password_token_header(&headers)?;
    let user = state
        .service
        .reset_password(&body.email, &token, &body.password)?;
    Ok(Json(json!({
        "status": "success",
        "message": "password updated",
        "user": user,
    })))
}

async fn cancel_password_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<EmailRequest>,
) -> AuthResult<Json<Value>> {
    let token = password_token_header(&headers)?;
    state.service.cancel_password_reset(&body.email, &token)?;
    Ok(Json(json!({
        "status": "success",
        "message": "password reset cancelled",
    })))
}

/// The short-lived basic credential returned by the reset validation
/// step, presented back on the reset/cancel calls
fn password_token_header(headers: &HeaderMap) -> AuthResult<String> {
    headers
        .get("x-password-token")
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .ok_or_else(|| AuthError::bad_request("missing password token"))
}
