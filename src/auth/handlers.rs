use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        cookies::{get_cookie, ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME},
        dto::{CredentialsRequest, PublicUser},
        extractors::BearerUser,
        session::AuthError,
    },
    error::AppError,
    state::AppState,
};

type CredentialsBody = Result<Json<CredentialsRequest>, JsonRejection>;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(current_user).put(update_credentials))
        .route("/api/users/create", post(register))
        .route("/api/users/login", post(login))
        .route("/api/users/refresh", post(refresh))
        .route("/api/users/logout", post(logout))
}

// Body parse failures go through AppError like everything else.
fn credentials(payload: CredentialsBody) -> Result<CredentialsRequest, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| AppError::bad_request(e.body_text()))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: CredentialsBody,
) -> Result<(StatusCode, Json<PublicUser>), AppError> {
    let user = state.sessions.register(credentials(payload)?).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: CredentialsBody,
) -> Result<impl IntoResponse, AppError> {
    let session = state.sessions.login(credentials(payload)?).await?;
    let cookies = AppendHeaders([
        (
            SET_COOKIE,
            state
                .cookies
                .refresh(&session.refresh_token.token, state.sessions.refresh_ttl_secs()),
        ),
        (SET_COOKIE, state.cookies.login_access(&session.access_token)),
    ]);
    Ok((cookies, Json(session.user)))
}

/// An inactive refresh token also gets its cookie cleared, so the client
/// stops presenting it.
#[instrument(skip_all)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    match state
        .sessions
        .refresh(get_cookie(&headers, REFRESH_COOKIE_NAME))
        .await
    {
        Ok(access_token) => {
            let max_age = state.sessions.keys().default_ttl().as_secs();
            let cookie = state.cookies.access(&access_token, max_age);
            Ok((AppendHeaders([(SET_COOKIE, cookie)]), StatusCode::OK).into_response())
        }
        Err(e @ AuthError::InactiveRefreshToken) => {
            let cookie = state.cookies.clear(REFRESH_COOKIE_NAME);
            Ok((AppendHeaders([(SET_COOKIE, cookie)]), AppError::from(e)).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    state
        .sessions
        .logout(get_cookie(&headers, REFRESH_COOKIE_NAME))
        .await?;
    Ok((
        StatusCode::NO_CONTENT,
        AppendHeaders([
            (SET_COOKIE, state.cookies.clear(ACCESS_COOKIE_NAME)),
            (SET_COOKIE, state.cookies.clear(REFRESH_COOKIE_NAME)),
        ]),
    ))
}

#[instrument(skip_all)]
pub async fn current_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Option<PublicUser>>, AppError> {
    let access = get_cookie(&headers, ACCESS_COOKIE_NAME);
    let has_refresh = get_cookie(&headers, REFRESH_COOKIE_NAME).is_some();
    let user = state.sessions.current_user(access, has_refresh).await?;
    Ok(Json(user))
}

/// Every refresh token of the user is revoked, so the caller's refresh
/// cookie is cleared along with the update.
#[instrument(skip(state, payload))]
pub async fn update_credentials(
    State(state): State<AppState>,
    BearerUser(user_id): BearerUser,
    payload: CredentialsBody,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .sessions
        .update_credentials(user_id, credentials(payload)?)
        .await?;
    Ok((
        AppendHeaders([(SET_COOKIE, state.cookies.clear(REFRESH_COOKIE_NAME))]),
        Json(user),
    ))
}
