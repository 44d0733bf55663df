// ============================
// crates/backend-lib/src/handlers/login.rs
// ============================
//! Login endpoint. Only checks that a display name was supplied; no session
//! is created.
use axum::{extract::rejection::JsonRejection, Json};
use roomchat_common::{LoginRequest, LoginResponse};

use crate::error::AppError;
use crate::validation;

pub async fn login(
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(login) = body?;
    let name = validation::validate_login(&login)?;
    tracing::debug!(name, "login");
    Ok(Json(LoginResponse::success()))
}
