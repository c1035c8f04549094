use askama::Template;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;

use crate::auth::{password, session};
use crate::error::{AppError, AppResult};
use crate::extractors::{get_cookie_value, MaybeUser};
use crate::routes::home::Html;
use crate::state::AppState;

// -- Templates --

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
    pub username: String,
}

// -- Request types --

#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", name)
}

// -- Handlers --

/// GET /auth/login: render login page
pub async fn login_page(maybe_user: MaybeUser) -> AppResult<Response> {
    if maybe_user.0.is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    Ok(Html(LoginTemplate {
        error: None,
        username: String::new(),
    })
    .into_response())
}

/// POST /auth/login: check credentials and start a session
pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> AppResult<Response> {
    let username = form.username.trim().to_string();

    // bcrypt verification blocks for a while; run it off the async workers.
    let pool = state.db.clone();
    let attempt = username.clone();
    let cost = state.config.auth.bcrypt_cost;
    let user = tokio::task::spawn_blocking(move || {
        password::authenticate(&pool, &attempt, &form.password, cost)
    })
    .await
    .map_err(|e| AppError::Internal(format!("login task failed: {}", e)))??;

    let Some(user) = user else {
        let page = Html(LoginTemplate {
            error: Some("Wrong username or password.".to_string()),
            username,
        });
        return Ok((StatusCode::UNAUTHORIZED, page).into_response());
    };

    let hours = state.config.auth.session_hours;
    let token = session::create_session(&state.db, &user.id, hours)?;
    tracing::info!("{} logged in ({})", user.username, user.role);

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, "/".to_string()),
            (
                header::SET_COOKIE,
                session_cookie(&state.config.auth.cookie_name, &token, hours),
            ),
        ],
    )
        .into_response())
}

/// POST /auth/logout: delete session and redirect
pub async fn logout(
    State(state): State<AppState>,
    request: axum::http::Request<axum::body::Body>,
) -> AppResult<Response> {
    let (parts, _body) = request.into_parts();
    let cookie_name = &state.config.auth.cookie_name;

    if let Some(token) = get_cookie_value(&parts, cookie_name) {
        if let Err(e) = session::delete_session(&state.db, token) {
            tracing::warn!("Could not delete session: {}", e);
        }
    }

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, "/auth/login".to_string()),
            (header::SET_COOKIE, clear_session_cookie(cookie_name)),
        ],
    )
        .into_response())
}
