pub mod documents;
pub mod errors;
pub mod knowledge;
pub mod projects;
pub mod search;
pub mod snapshots;
pub mod state;
pub mod visualization;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::Json;
use serde::de::DeserializeOwned;
use tracing::error;

use crate::database::models::ProjectRow;
use crate::database::queries::projects as project_queries;
use self::errors::AppError;
use self::state::AppState;

/// JSON body extractor whose rejection is a 400 with the deserialisation
/// message, so unknown enum values and malformed bodies fail validation
/// rather than surfacing as a generic unprocessable-entity error.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = (StatusCode, AppError);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| {
                (
                    StatusCode::BAD_REQUEST,
                    AppError::validation(rejection.body_text()),
                )
            })?;
        Ok(ValidatedJson(value))
    }
}

/// Look up a project by slug, or fail the request with 404.
pub(crate) async fn fetch_project(
    state: &AppState,
    slug: &str,
) -> Result<ProjectRow, (StatusCode, AppError)> {
    match project_queries::get_project_by_slug(state.db.pool(), slug).await {
        Ok(Some(project)) => Ok(project),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            AppError::not_found(&format!("Project '{slug}'")),
        )),
        Err(e) => {
            error!(slug, error = %e, "Failed to load project");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                AppError::internal_error("Failed to load project"),
            ))
        }
    }
}
