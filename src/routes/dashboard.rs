use askama::Template;
use axum::response::{IntoResponse, Redirect, Response};
use chrono::Local;

use crate::db;
use crate::db::models::Measurement;
use crate::error::AppResult;
use crate::export::TIMESTAMP_FORMAT;
use crate::extractors::CurrentUser;
use crate::measurements::{HistoryView, PhotoStore};
use crate::ranking::{compute_ranking, personal_progress, Ranking, GOAL_KG};
use crate::routes::home::Html;
use crate::state::AppState;

/// Rows shown in the leaderboard summary before the full table.
const TOP_ROWS: usize = 10;

/// One-shot status message carried as `?flash=` on a redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flash {
    Saved,
    InvalidWeight,
    UnsupportedPhoto,
    Deleted,
    NotFound,
    InvalidPosition,
}

impl Flash {
    pub fn code(&self) -> &'static str {
        match self {
            Flash::Saved => "saved",
            Flash::InvalidWeight => "invalid_weight",
            Flash::UnsupportedPhoto => "unsupported_photo",
            Flash::Deleted => "deleted",
            Flash::NotFound => "not_found",
            Flash::InvalidPosition => "invalid_position",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        [
            Flash::Saved,
            Flash::InvalidWeight,
            Flash::UnsupportedPhoto,
            Flash::Deleted,
            Flash::NotFound,
            Flash::InvalidPosition,
        ]
        .into_iter()
        .find(|flash| flash.code() == code)
    }

    pub fn message(&self) -> &'static str {
        match self {
            Flash::Saved => "Weigh-in saved.",
            Flash::InvalidWeight => "Enter a weight greater than 0.",
            Flash::UnsupportedPhoto => "Photos must be PNG or JPG images.",
            Flash::Deleted => "Record deleted.",
            Flash::NotFound => "That record no longer exists.",
            Flash::InvalidPosition => "Invalid row number.",
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, Flash::Saved | Flash::Deleted)
    }

    /// 303 back to the dashboard carrying this message.
    pub fn redirect(self) -> Response {
        Redirect::to(&format!("/?flash={}", self.code())).into_response()
    }
}

pub struct LeaderboardRow {
    pub username: String,
    pub is_leader: bool,
    pub first: String,
    pub last: String,
    pub kg_lost: String,
    pub pct: String,
}

pub struct HistoryRow {
    pub position: usize,
    pub id: String,
    pub username: String,
    pub recorded_at: String,
    pub weight: String,
    pub photo_url: Option<String>,
}

pub struct PersonalPanel {
    pub rows: Vec<HistoryRow>,
    pub kg_lost: String,
    pub pct: String,
}

#[derive(Template)]
#[template(path = "pages/dashboard.html")]
pub struct DashboardTemplate {
    pub username: String,
    pub role: String,
    pub is_moderator: bool,
    pub flash: Option<Flash>,
    pub goal_kg: String,
    pub has_records: bool,
    pub top: Vec<LeaderboardRow>,
    pub ranking: Vec<LeaderboardRow>,
    pub history: Vec<HistoryRow>,
    pub personal: Option<PersonalPanel>,
}

fn kg(value: Option<f64>) -> String {
    value.map_or_else(|| "—".to_string(), |v| format!("{:.2}", v))
}

fn pct(value: Option<f64>) -> String {
    value.map_or_else(|| "—".to_string(), |v| format!("{:.1}%", v))
}

fn leaderboard_rows(ranking: &Ranking) -> Vec<LeaderboardRow> {
    let leader = ranking.leader().map(|row| row.username.as_str());
    ranking
        .rows
        .iter()
        .map(|row| LeaderboardRow {
            username: row.username.clone(),
            is_leader: Some(row.username.as_str()) == leader,
            first: kg(row.first_weight),
            last: kg(row.last_weight),
            kg_lost: kg(row.kg_lost),
            pct: pct(row.pct_of_goal),
        })
        .collect()
}

async fn history_rows(photos: &PhotoStore, measurements: &[Measurement]) -> Vec<HistoryRow> {
    let mut rows = Vec::with_capacity(measurements.len());
    for (position, m) in measurements.iter().enumerate() {
        let photo_url = match m.photo_ref.as_deref() {
            Some(photo_ref) => photo_url(photos, photo_ref).await,
            None => None,
        };
        rows.push(HistoryRow {
            position,
            id: m.id.to_string(),
            username: m.username.clone(),
            recorded_at: m
                .recorded_at
                .with_timezone(&Local)
                .format(TIMESTAMP_FORMAT)
                .to_string(),
            weight: format!("{:.2}", m.weight_kg),
            photo_url,
        });
    }
    rows
}

/// Link for a photo that is still on disk.
async fn photo_url(photos: &PhotoStore, photo_ref: &str) -> Option<String> {
    let path = photos.resolve(photo_ref)?;
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return None;
    }
    PhotoStore::public_name(photo_ref).map(|name| format!("/photos/{}", name))
}

/// Render the dashboard for a logged-in user.
pub async fn render(state: &AppState, user: CurrentUser, flash: Option<Flash>) -> AppResult<Response> {
    let all = state.measurements.list_all().await?;
    let usernames = db::list_usernames(&state.db)?;
    let ranking = compute_ranking(&all, usernames.iter().map(String::as_str));
    let photos = state.measurements.photos();

    let mut recent = all.clone();
    HistoryView::Recent.sort(&mut recent);
    let history = history_rows(photos, &recent).await;

    let mut mine: Vec<Measurement> = all
        .iter()
        .filter(|m| m.username == user.username)
        .cloned()
        .collect();
    mine.sort_by_key(|m| m.recorded_at);
    let personal = match personal_progress(&all, &user.username) {
        Some(progress) => Some(PersonalPanel {
            rows: history_rows(photos, &mine).await,
            kg_lost: kg(progress.kg_lost),
            pct: pct(progress.pct_of_goal),
        }),
        None => None,
    };

    let ranking_rows = leaderboard_rows(&ranking);
    let top = leaderboard_rows(&Ranking {
        rows: ranking.rows.iter().take(TOP_ROWS).cloned().collect(),
    });

    Ok(Html(DashboardTemplate {
        is_moderator: user.is_moderator(),
        role: user.role.to_string(),
        username: user.username,
        flash,
        goal_kg: format!("{}", GOAL_KG),
        has_records: !all.is_empty(),
        top,
        ranking: ranking_rows,
        history,
        personal,
    })
    .into_response())
}
