use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;

use super::login::AccessTokenData;
use super::ApiError;
use super::ApiSuccess;
use crate::domain::credential::ports::CredentialServicePort;
use crate::inbound::http::middleware::AuthenticatedUser;
use crate::inbound::http::router::AppState;

pub async fn refresh(
    State(state): State<AppState>,
    Extension(authenticated): Extension<AuthenticatedUser>,
) -> Result<ApiSuccess<AccessTokenData>, ApiError> {
    state
        .credential_service
        .reissue_access_token(&authenticated.user)
        .await
        .map_err(ApiError::from)
        .map(|ref token| ApiSuccess::new(StatusCode::OK, token.into()))
}
