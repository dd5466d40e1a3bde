use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::trace;

use super::{AuthError, Identity, Role};
use crate::utils::error::AppError;
use crate::AppState;

/// Gate for routes open to any signed-in account.
pub async fn require_user(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, AppError> {
    require_role(&state, Role::User, request, next).await
}

/// Gate for catalog, schedule and reporting administration.
pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, AppError> {
    require_role(&state, Role::Admin, request, next).await
}

async fn require_role(state: &AppState, required: Role, mut request: Request, next: Next) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())?;
    let identity = state.credentials.validate_and_extract(token)?;

    if !identity.role.authorizes(required) {
        return Err(AuthError::Forbidden { required }.into());
    }

    trace!(username = %identity.username, role = %identity.role, "Authenticated request");
    request.extensions_mut().insert::<Identity>(identity);
    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(AuthError::MissingToken),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token(&headers("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
        assert_eq!(bearer_token(&headers("bearer abc")).unwrap(), "abc");
    }

    #[test]
    fn test_bearer_token_rejects_other_shapes() {
        assert!(matches!(bearer_token(&HeaderMap::new()), Err(AuthError::MissingToken)));
        assert!(matches!(bearer_token(&headers("Basic dXNlcjpwYXNz")), Err(AuthError::MissingToken)));
        assert!(matches!(bearer_token(&headers("Bearer ")), Err(AuthError::MissingToken)));
        assert!(matches!(bearer_token(&headers("abc.def.ghi")), Err(AuthError::MissingToken)));
    }
}
