use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;
use axum::Json;
use serde::Deserialize;

use super::ApiError;
use super::ApiSuccess;
use super::MessageData;
use crate::domain::credential::models::ChangePasswordCommand;
use crate::domain::credential::models::Password;
use crate::domain::credential::ports::CredentialServicePort;
use crate::inbound::http::middleware::AuthenticatedUser;
use crate::inbound::http::router::AppState;

pub async fn change_password(
    State(state): State<AppState>,
    Extension(authenticated): Extension<AuthenticatedUser>,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<ApiSuccess<MessageData>, ApiError> {
    let command = ChangePasswordCommand {
        current_password: body.current_password,
        new_password: Password::new(body.new_password)
            .map_err(|e| ApiError::UnprocessableEntity(e.to_string()))?,
    };

    state
        .credential_service
        .change_password(&authenticated.user.id, command)
        .await
        .map_err(ApiError::from)?;

    Ok(ApiSuccess::new(
        StatusCode::OK,
        MessageData::new("Password has been changed"),
    ))
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
}
