use crate::auth::SignupForm;
use crate::error::{Error, ValidationError};
use crate::ledger;
use crate::models::{Upload, User};
use crate::shell::{AppState, DashboardView, Screen, SessionHandle, Transition};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::error;
use uuid::Uuid;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/dashboard", get(dashboard))
        .route("/dashboard/select", post(select_image))
        .route("/dashboard/upload", post(upload_image))
        .route("/dashboard/generate", post(generate))
        .route("/dashboard/text", put(edit_text))
        .route("/dashboard/save", post(save))
        .route("/dashboard/preview", get(preview))
        .route("/uploads", get(list_uploads))
        .route("/uploads/:upload_id", get(get_upload))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if !self.is_client_error() {
            error!("Request failed: {self}");
        }

        let status = match &self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::InvalidCredentials | Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::UsernameTaken => StatusCode::CONFLICT,
            Error::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, Error>;

#[derive(Deserialize)]
pub struct LoginUser {
    username: String,
    password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    token: String,
    screen: Screen,
    dashboard: DashboardView,
}

#[derive(Serialize)]
pub struct SignupResponse {
    screen: Screen,
    user: User,
}

#[derive(Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    confirm: bool,
}

#[derive(Serialize)]
pub struct ScreenResponse {
    screen: Screen,
}

#[derive(Deserialize)]
pub struct SelectImage {
    path: PathBuf,
}

#[derive(Deserialize)]
pub struct TextEdit {
    caption: Option<String>,
    description: Option<String>,
}

#[derive(Serialize)]
pub struct SaveResponse {
    id: Uuid,
    dashboard: DashboardView,
}

async fn current_session(state: &AppState, headers: &HeaderMap) -> ApiResult<SessionHandle> {
    let token = session_token(headers).ok_or(Error::Unauthorized)?;
    state.session(token).await
}

fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).trim())
        .filter(|token| !token.is_empty())
}

pub async fn signup(
    State(state): State<AppState>,
    Json(form): Json<SignupForm>,
) -> ApiResult<impl IntoResponse> {
    let (user, screen) = state.signup(&form).await?;
    Ok((StatusCode::CREATED, Json(SignupResponse { screen, user })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(login_data): Json<LoginUser>,
) -> ApiResult<Json<LoginResponse>> {
    let (token, session) = state.login(&login_data.username, &login_data.password).await?;
    let dashboard = session.lock().await.view();

    Ok(Json(LoginResponse {
        token,
        screen: Screen::Login.next(Transition::LoginSucceeded),
        dashboard,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LogoutRequest>,
) -> ApiResult<Json<ScreenResponse>> {
    let token = session_token(&headers).ok_or(Error::Unauthorized)?;
    let screen = state.logout(token, request.confirm).await?;
    Ok(Json(ScreenResponse { screen }))
}

pub async fn dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<DashboardView>> {
    let session = current_session(&state, &headers).await?;
    let view = session.lock().await.view();
    Ok(Json(view))
}

pub async fn select_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SelectImage>,
) -> ApiResult<Json<DashboardView>> {
    let session = current_session(&state, &headers).await?;
    let mut dashboard = session.lock().await;
    dashboard.select_image(&request.path, state.image_dir()).await?;
    Ok(Json(dashboard.view()))
}

pub async fn upload_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<Json<DashboardView>> {
    let session = current_session(&state, &headers).await?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ValidationError::InvalidUpload(e.body_text()))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| ValidationError::InvalidUpload(e.body_text()))?;

        let mut dashboard = session.lock().await;
        dashboard
            .accept_upload(&data, &file_name, state.image_dir())
            .await?;
        return Ok(Json(dashboard.view()));
    }

    Err(ValidationError::InvalidUpload("no file in request".into()).into())
}

pub async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<DashboardView>> {
    let session = current_session(&state, &headers).await?;
    let mut dashboard = session.lock().await;
    dashboard.generate(state.describer()).await?;
    Ok(Json(dashboard.view()))
}

pub async fn edit_text(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(edit): Json<TextEdit>,
) -> ApiResult<Json<DashboardView>> {
    let session = current_session(&state, &headers).await?;
    let mut dashboard = session.lock().await;
    dashboard.edit_text(edit.caption, edit.description);
    Ok(Json(dashboard.view()))
}

/// Saves the selected image. Text in the body, if any, replaces the shown text first.
pub async fn save(
    State(state): State<AppState>,
    headers: HeaderMap,
    edit: Option<Json<TextEdit>>,
) -> ApiResult<Json<SaveResponse>> {
    let session = current_session(&state, &headers).await?;
    let mut dashboard = session.lock().await;
    if let Some(Json(edit)) = edit {
        dashboard.edit_text(edit.caption, edit.description);
    }
    let id = dashboard.save(state.db()).await?;

    Ok(Json(SaveResponse {
        id,
        dashboard: dashboard.view(),
    }))
}

pub async fn preview(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let session = current_session(&state, &headers).await?;
    let path = session
        .lock()
        .await
        .selected()
        .map(|image| image.path().to_path_buf())
        .ok_or(Error::NotFound)?;

    let file = fs::File::open(&path).await?;
    let body = Body::from_stream(ReaderStream::new(file));
    let mime_type = mime_guess::from_path(&path).first_or_octet_stream();

    Ok((
        [
            (header::CONTENT_TYPE, mime_type.to_string()),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        body,
    )
        .into_response())
}

pub async fn list_uploads(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Upload>>> {
    let session = current_session(&state, &headers).await?;
    let user_id = session.lock().await.user().id;
    Ok(Json(ledger::list_uploads_for_user(state.db(), &user_id).await?))
}

pub async fn get_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(upload_id): Path<Uuid>,
) -> ApiResult<Json<Upload>> {
    let session = current_session(&state, &headers).await?;
    let (user_id, is_admin) = {
        let dashboard = session.lock().await;
        (dashboard.user().id, dashboard.user().is_admin)
    };

    let upload = ledger::get_upload(state.db(), &upload_id).await?;
    if upload.user_id != user_id && !is_admin {
        return Err(Error::NotFound);
    }
    Ok(Json(upload))
}
