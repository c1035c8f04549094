use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::db;
use crate::error::{AppError, AppResult};
use crate::export::{build_workbook, CONTENT_TYPE, FILE_NAME};
use crate::extractors::CurrentUser;
use crate::ranking::compute_ranking;
use crate::state::AppState;

/// GET /export: download the log and leaderboard as a workbook.
pub async fn download(user: CurrentUser, State(state): State<AppState>) -> AppResult<Response> {
    let measurements = state.measurements.list_all().await?;
    let usernames = db::list_usernames(&state.db)?;

    let bytes = tokio::task::spawn_blocking(move || {
        let ranking = compute_ranking(&measurements, usernames.iter().map(String::as_str));
        build_workbook(&measurements, &ranking)
    })
    .await
    .map_err(|e| AppError::Internal(format!("export task failed: {}", e)))??;

    tracing::info!("{} exported {} bytes", user.username, bytes.len());
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", FILE_NAME),
            ),
        ],
        bytes,
    )
        .into_response())
}
