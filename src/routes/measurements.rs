use axum::extract::{Multipart, Path, State};
use axum::response::Response;
use axum::routing::post;
use axum::{Form, Router};
use serde::Deserialize;

use crate::db::models::MeasurementId;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, Moderator};
use crate::measurements::{parse_weight, HistoryView, PhotoUpload, RecordError};
use crate::routes::dashboard::Flash;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/measurements", post(create))
        .route("/measurements/{id}/delete", post(delete))
        .route("/measurements/delete-at", post(delete_at))
}

/// POST /measurements: record a weigh-in for the logged-in user.
///
/// Multipart fields: `weight` (required) and `photo` (optional file).
pub async fn create(
    user: CurrentUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut weight: Option<String> = None;
    let mut photo: Option<PhotoUpload> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "weight" => weight = Some(field.text().await?),
            "photo" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                // Browsers send an empty part when no file was chosen.
                if !file_name.is_empty() && !bytes.is_empty() {
                    photo = Some(PhotoUpload {
                        file_name,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    let weight = match parse_weight(weight.as_deref().unwrap_or_default()) {
        Ok(weight) => weight,
        Err(_) => return Ok(Flash::InvalidWeight.redirect()),
    };

    match state.measurements.record(&user.username, weight, photo).await {
        Ok(_) => Ok(Flash::Saved.redirect()),
        Err(RecordError::InvalidWeight) => Ok(Flash::InvalidWeight.redirect()),
        Err(RecordError::UnsupportedPhoto) => Ok(Flash::UnsupportedPhoto.redirect()),
        Err(RecordError::Store(e)) => Err(e.into()),
        Err(RecordError::Photo(e)) => Err(e.into()),
    }
}

/// POST /measurements/{id}/delete: moderators only.
pub async fn delete(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let id = MeasurementId::new(id);
    if state.measurements.delete_by_id(&id).await? {
        tracing::info!("{} deleted measurement {}", user.username, id);
        Ok(Flash::Deleted.redirect())
    } else {
        Ok(Flash::NotFound.redirect())
    }
}

#[derive(Deserialize)]
pub struct DeleteAtForm {
    pub position: String,
    pub view: Option<String>,
}

/// POST /measurements/delete-at: delete by row number of a rendered table.
pub async fn delete_at(
    Moderator(user): Moderator,
    State(state): State<AppState>,
    Form(form): Form<DeleteAtForm>,
) -> AppResult<Response> {
    let view = match form.view.as_deref() {
        None | Some("") => HistoryView::default(),
        Some(raw) => raw.parse::<HistoryView>().map_err(AppError::BadRequest)?,
    };
    let Ok(position) = form.position.trim().parse::<usize>() else {
        return Ok(Flash::InvalidPosition.redirect());
    };

    #[allow(deprecated)]
    let deleted = state.measurements.delete_at(position, view).await?;
    if deleted {
        tracing::info!(
            "{} deleted row {} of the {} view",
            user.username,
            position,
            view.as_str()
        );
        Ok(Flash::Deleted.redirect())
    } else {
        Ok(Flash::InvalidPosition.redirect())
    }
}
