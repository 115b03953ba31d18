use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use billing::OfflineCheckout;
use serde::Deserialize;
use server_api::{
    auth::{mint_session_token, verify_session_token},
    ApiContext, AuthConfig,
};
use shared::{
    domain::{Domain, EntryId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{
        CanUseResponse, CheckoutResponse, JournalEntryPayload, JournalExportResponse,
        JournalListResponse, QuotaExceededBody, SaveEntryRequest, UsageRecorded,
        UsageStatsResponse, UserProfile,
    },
};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};
use uuid::Uuid;

mod config;

use config::{load_settings, prepare_database_url};

const SESSION_COOKIE: &str = "session";
const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
struct AppState {
    api: ApiContext,
    data_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct LoginQuery {
    email: Option<String>,
    name: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let api = ApiContext {
        storage,
        checkout: Arc::new(OfflineCheckout),
        auth: AuthConfig {
            session_secret: settings.session_secret,
            session_ttl_seconds: settings.session_ttl_seconds,
        },
    };
    let state = AppState {
        api,
        data_dir: PathBuf::from(settings.data_dir),
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/login", get(login))
        .route("/api/logout", get(logout))
        .route("/api/auth/user", get(auth_user))
        .route("/api/usage/stats", get(http_usage_stats))
        .route("/api/:domain/can-use", get(http_can_use))
        .route("/api/:domain/use", post(http_record_use))
        .route("/api/get-or-create-subscription", post(http_subscription))
        .route(
            "/api/journal/entries",
            get(http_list_entries).post(http_create_entry),
        )
        .route(
            "/api/journal/entries/:id",
            get(http_get_entry)
                .put(http_update_entry)
                .delete(http_delete_entry),
        )
        .route("/api/journal/download", get(http_journal_download))
        .route("/datasets/:file", get(http_dataset))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::QuotaExceeded => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: ApiError) -> (StatusCode, Json<ApiError>) {
    (status_for(err.code), Json(err))
}

fn unauthorized() -> (StatusCode, Json<ApiError>) {
    error_response(ApiError::unauthorized("sign in required"))
}

/// Session token from `Authorization: Bearer` or the session cookie.
fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|cookie| {
        let (name, value) = cookie.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

fn authenticated_user(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<UserId, (StatusCode, Json<ApiError>)> {
    let token = session_token(headers).ok_or_else(unauthorized)?;
    verify_session_token(&state.api.auth, &token).ok_or_else(unauthorized)
}

fn parse_domain(slug: &str) -> Result<Domain, (StatusCode, Json<ApiError>)> {
    Domain::from_slug(slug)
        .ok_or_else(|| error_response(ApiError::not_found(format!("unknown tool '{slug}'"))))
}

fn parse_entry_id(raw: &str) -> Result<EntryId, (StatusCode, Json<ApiError>)> {
    Uuid::parse_str(raw)
        .map(EntryId)
        .map_err(|_| error_response(ApiError::not_found("journal entry not found")))
}

/// Development identity flow: a full-page navigation that signs the
/// caller in and bounces back to the app shell.
async fn login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
) -> Response {
    let Some(email) = query.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) else {
        return error_response(ApiError::validation("email query parameter is required"))
            .into_response();
    };

    let user_id = match state
        .api
        .storage
        .get_or_create_user(email, query.name.as_deref())
        .await
    {
        Ok(user_id) => user_id,
        Err(e) => return error_response(ApiError::internal(e.to_string())).into_response(),
    };

    let token = match mint_session_token(&state.api.auth, user_id) {
        Ok(token) => token,
        Err(e) => {
            return error_response(ApiError::internal(format!("token mint failed: {e}")))
                .into_response()
        }
    };

    let cookie = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax");
    ([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response()
}

async fn logout() -> impl IntoResponse {
    let cookie = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Max-Age=0");
    ([(header::SET_COOKIE, cookie)], Redirect::to("/"))
}

async fn auth_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<UserProfile>, (StatusCode, Json<ApiError>)> {
    let user_id = authenticated_user(&state, &headers)?;
    let profile = server_api::user_profile(&state.api, user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(profile))
}

async fn http_usage_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<UsageStatsResponse>, (StatusCode, Json<ApiError>)> {
    let user_id = authenticated_user(&state, &headers)?;
    let stats = server_api::usage_stats(&state.api, user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(stats))
}

async fn http_can_use(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
    headers: HeaderMap,
) -> Result<Json<CanUseResponse>, (StatusCode, Json<ApiError>)> {
    let domain = parse_domain(&domain)?;
    let user_id = authenticated_user(&state, &headers)?;
    let verdict = server_api::can_use(&state.api, user_id, domain)
        .await
        .map_err(error_response)?;
    Ok(Json(verdict))
}

async fn http_record_use(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<UsageRecorded>, Response> {
    let domain = parse_domain(&domain).map_err(|e| e.into_response())?;
    let user_id = authenticated_user(&state, &headers).map_err(|e| e.into_response())?;

    let label = body
        .get(domain.item_field())
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            error_response(ApiError::validation(format!(
                "body must carry '{}'",
                domain.item_field()
            )))
            .into_response()
        })?;

    match server_api::record_usage(&state.api, user_id, domain, label).await {
        Ok(recorded) => Ok(Json(recorded)),
        Err(err) if err.code == ErrorCode::QuotaExceeded => Err((
            StatusCode::FORBIDDEN,
            Json(QuotaExceededBody {
                needs_subscription: true,
            }),
        )
            .into_response()),
        Err(err) => Err(error_response(err).into_response()),
    }
}

async fn http_subscription(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CheckoutResponse>, (StatusCode, Json<ApiError>)> {
    let user_id = authenticated_user(&state, &headers)?;
    let checkout = server_api::get_or_create_subscription(&state.api, user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(checkout))
}

async fn http_list_entries(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<JournalListResponse>, (StatusCode, Json<ApiError>)> {
    let user_id = authenticated_user(&state, &headers)?;
    let entries = server_api::list_journal_entries(&state.api, user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(entries))
}

async fn http_create_entry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SaveEntryRequest>,
) -> Result<(StatusCode, Json<JournalEntryPayload>), (StatusCode, Json<ApiError>)> {
    let user_id = authenticated_user(&state, &headers)?;
    let entry = server_api::create_journal_entry(&state.api, user_id, request)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn http_get_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<JournalEntryPayload>, (StatusCode, Json<ApiError>)> {
    let entry_id = parse_entry_id(&id)?;
    let user_id = authenticated_user(&state, &headers)?;
    let entry = server_api::get_journal_entry(&state.api, user_id, entry_id)
        .await
        .map_err(error_response)?;
    Ok(Json(entry))
}

async fn http_update_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<SaveEntryRequest>,
) -> Result<Json<JournalEntryPayload>, (StatusCode, Json<ApiError>)> {
    let entry_id = parse_entry_id(&id)?;
    let user_id = authenticated_user(&state, &headers)?;
    let entry = server_api::update_journal_entry(&state.api, user_id, entry_id, request)
        .await
        .map_err(error_response)?;
    Ok(Json(entry))
}

async fn http_delete_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    let entry_id = parse_entry_id(&id)?;
    let user_id = authenticated_user(&state, &headers)?;
    server_api::delete_journal_entry(&state.api, user_id, entry_id)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_journal_download(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<JournalExportResponse>, (StatusCode, Json<ApiError>)> {
    let user_id = authenticated_user(&state, &headers)?;
    let export = server_api::journal_export(&state.api, user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(export))
}

/// Serves the decoder datasets. Only the three known files are
/// reachable; anything else 404s without touching the filesystem.
async fn http_dataset(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let known = Domain::ALL.iter().any(|d| d.dataset_file() == file);
    if !known {
        return Err(error_response(ApiError::not_found("unknown dataset")));
    }

    let text = tokio::fs::read_to_string(state.data_dir.join(&file))
        .await
        .map_err(|e| {
            error!(%file, %e, "dataset file unreadable");
            error_response(ApiError::not_found("dataset unavailable"))
        })?;
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], text))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
