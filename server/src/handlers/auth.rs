use axum::{extract::rejection::JsonRejection, extract::State, http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use tracing::info;

use super::body;
use crate::auth::{hash_password, verify_password, AuthError, Role};
use crate::models::{Credentials, NewUser};
use crate::utils::error::AppError;
use crate::utils::response::{created, json};
use crate::AppState;

#[derive(Serialize)]
struct TokenPayload {
    token: String,
}

/// Open registration. New accounts always get the `user` role.
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, AppError> {
    let credentials = body(payload)?;
    credentials.validate().map_err(AppError::ValidationError)?;

    let user = state
        .db
        .create_user(&NewUser {
            username: credentials.username.trim().to_string(),
            password_hash: hash_password(&credentials.password)?,
            role: Role::User,
        })
        .await?;

    info!(user_id = %user.id, username = %user.username, "User signed up");
    Ok(created(user, "User created successfully").into_response())
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, AppError> {
    let credentials = body(payload)?;

    let user = state
        .db
        .find_user_by_username(credentials.username.trim())
        .await?
        .ok_or(AuthError::InvalidCredentials)?;
    if !verify_password(&credentials.password, &user.password_hash)? {
        return Err(AuthError::InvalidCredentials.into());
    }

    let token = state.credentials.issue_token(&user.username, user.role)?;
    info!(username = %user.username, "User logged in");
    Ok(json(StatusCode::OK, TokenPayload { token }))
}
