use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use crate::auth::AuthError;
use crate::state::{
    AppState, JsonResult, LoginRequest, LoginResponse, StatusResponse, UserResponse,
};
use crate::utils::{extract_token, json_error, json_error_response};

pub async fn auth_register(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> JsonResult<UserResponse> {
    let user = state
        .auth
        .register(&payload.username, &payload.password)
        .map_err(|err| {
            let status = match err {
                AuthError::UserExists => StatusCode::CONFLICT,
                AuthError::InvalidUsername | AuthError::InvalidPassword => StatusCode::BAD_REQUEST,
                AuthError::HashError(_) | AuthError::DbError(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            json_error(status, err.to_string())
        })?;
    info!(user_id = %user.id, "user registered");
    Ok(Json(UserResponse {
        id: user.id,
        username: user.username,
    }))
}

pub async fn auth_login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> JsonResult<LoginResponse> {
    let user = match state
        .auth
        .authenticate(&payload.username, &payload.password)
    {
        Ok(Some(user)) => user,
        Ok(None) => return Err(json_error(StatusCode::UNAUTHORIZED, "invalid credentials")),
        Err(err) => {
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("auth error: {}", err),
            ))
        }
    };

    let session = state.auth.create_session(&user.id).map_err(|err| {
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("auth error: {}", err),
        )
    })?;

    Ok(Json(LoginResponse {
        token: session.token,
        expires_at: session.expires_at,
        token_type: "Bearer",
    }))
}

pub async fn auth_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let token = match extract_token(&headers) {
        Some(token) => token,
        None => return json_error_response(StatusCode::BAD_REQUEST, "missing token"),
    };

    if let Err(err) = state.auth.revoke_session(&token) {
        return json_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("auth error: {}", err),
        );
    }

    Json(StatusResponse::ok()).into_response()
}
