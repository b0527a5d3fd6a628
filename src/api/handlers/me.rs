//! Authenticated identity echo.

use axum::{
    extract::Extension,
    response::{IntoResponse, Json},
};

use super::{ErrorMessage, UserSummary};
use crate::api::middleware::CurrentUser;

#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "The authenticated user", body = UserSummary),
        (status = 401, description = "Not authenticated", body = ErrorMessage)
    ),
    tag = "users"
)]
pub async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> impl IntoResponse {
    Json(UserSummary::from(user.as_ref()))
}
