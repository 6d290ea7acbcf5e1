use axum::http::StatusCode;
use axum::Extension;

use super::signup::UserData;
use super::ApiError;
use super::ApiSuccess;
use crate::inbound::http::middleware::AuthenticatedUser;

pub async fn me(
    Extension(authenticated): Extension<AuthenticatedUser>,
) -> Result<ApiSuccess<UserData>, ApiError> {
    Ok(ApiSuccess::new(
        StatusCode::OK,
        (&authenticated.user).into(),
    ))
}
