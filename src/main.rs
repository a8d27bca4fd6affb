//! Skyron Dashboard - session-aware backend for the ERP admin dashboard.

mod config;
mod erp_client;
mod error;
mod export;
mod schema;
mod session;
mod tree;
mod views;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use config::{ConfigStore, RecordTypeConfig, Settings};
use erp_client::ErpClient;
use error::{DashboardError, Result};
use export::ExportTable;
use schema::{
    DashboardSummary, LoginRequest, RecordCount, RequestStatus, RowPage, Selection,
    SelectionScope, SessionInfo, StatusUpdate, TreeView, UserProfile, ViewSummary,
};
use serde_json::Value;
use session::{Session, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use views::{View, ViewKey, ViewStore};

const MAX_PAGE_SIZE: usize = 1000;
const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    configs: Arc<ConfigStore>,
    sessions: SessionStore,
    views: ViewStore,
    erp: Arc<ErpClient>,
    page_size: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "skyron_dashboard=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;

    let configs = ConfigStore::load(settings.record_types_dir.as_deref())?;
    info!("Loaded {} record types: {:?}", configs.list().len(), configs.list());

    let erp = ErpClient::from_settings(&settings)?;
    info!("ERP API client initialized for {}", settings.api_base_url);

    let state = AppState {
        configs: Arc::new(configs),
        sessions: SessionStore::new(settings.session_idle_timeout),
        views: ViewStore::new(),
        erp: Arc::new(erp),
        page_size: settings.page_size,
    };

    tokio::spawn(sweep_idle_sessions_every(state.clone(), SESSION_SWEEP_INTERVAL));

    let app = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!("Server listening on http://{}", settings.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/record-types", get(list_record_types))
        .route("/record-types/:kind", get(get_record_type))
        .route("/session/login", post(login))
        .route("/session", get(current_session).delete(logout))
        .route("/session/profile", put(update_profile))
        .route("/dashboard", get(dashboard))
        .route("/views/:kind", get(refresh_view))
        .route("/views/:kind/tree", get(view_tree))
        .route("/views/:kind/rows", get(view_rows))
        .route("/views/:kind/collect", post(collect_selection))
        .route("/records/:kind", post(create_record))
        .route(
            "/records/:kind/:id",
            get(get_record).put(update_record).delete(delete_record),
        )
        .route("/records/:kind/:id/status", put(set_record_status))
        .route("/exports/:kind/csv", get(export_csv))
        .route("/exports/:kind/pdf", get(export_pdf))
        .route("/exports/:kind/xlsx", get(export_xlsx))
        .with_state(state)
}

// ============================================================================
// Helpers
// ============================================================================

/// Drop sessions that have been idle past the timeout, with their views.
fn sweep_idle_sessions(state: &AppState) -> usize {
    let expired = state.sessions.expire_idle();
    for session_id in &expired {
        state.views.drop_session(session_id);
    }
    expired.len()
}

async fn sweep_idle_sessions_every(state: AppState, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        let expired = sweep_idle_sessions(&state);
        if expired > 0 {
            info!("Expired {} idle session(s)", expired);
        }
    }
}

/// Resolve the session named by `Authorization: Bearer <session id>`.
fn require_session(state: &AppState, headers: &HeaderMap) -> Result<Session> {
    let session_id = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(DashboardError::NoSession)?;

    state.sessions.get(session_id).ok_or(DashboardError::NoSession)
}

fn record_type(state: &AppState, kind: &str) -> Result<RecordTypeConfig> {
    state
        .configs
        .get(kind)
        .cloned()
        .ok_or_else(|| DashboardError::UnknownRecordType(kind.to_string()))
}

/// The ERP API rejected the session's token: tear the session down.
fn expire_on_auth_failure(
    state: &AppState,
    session: &Session,
    err: DashboardError,
) -> DashboardError {
    if err.is_auth_failure() {
        state.sessions.end(&session.id);
        state.views.drop_session(&session.id);
    }
    err
}

async fn load_view(
    state: &AppState,
    session: &Session,
    record_type: &RecordTypeConfig,
    refresh: bool,
) -> Result<Arc<View>> {
    let result = if refresh {
        state.views.refresh(state.erp.as_ref(), session, record_type).await
    } else {
        state.views.get_or_refresh(state.erp.as_ref(), session, record_type).await
    };
    result.map_err(|e| expire_on_auth_failure(state, session, e))
}

fn parse_ids(raw: Option<&str>) -> Vec<String> {
    raw.map(|ids| {
        ids.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

async fn list_record_types(State(state): State<AppState>) -> Json<Vec<RecordTypeConfig>> {
    Json(state.configs.all().cloned().collect())
}

async fn get_record_type(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<RecordTypeConfig>> {
    record_type(&state, &kind).map(Json)
}

/// Log in against the ERP API and open a dashboard session.
async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<SessionInfo>> {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(DashboardError::BadRequest(
            "email and password are required".to_string(),
        ));
    }

    let (token, user) = state.erp.login(request.email.trim(), &request.password).await?;
    let session = state.sessions.begin(token, user);
    info!("{} active session(s)", state.sessions.len());

    Ok(Json(SessionInfo {
        session_id: session.id,
        user: session.user,
        started_at: session.started_at,
    }))
}

/// Current user, refreshed from the ERP API.
async fn current_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserProfile>> {
    let session = require_session(&state, &headers)?;
    let user = state
        .erp
        .profile(&session)
        .await
        .map_err(|e| expire_on_auth_failure(&state, &session, e))?;
    state.sessions.update_user(&session.id, user.clone());
    Ok(Json(user))
}

async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(patch): Json<Value>,
) -> Result<Json<UserProfile>> {
    let session = require_session(&state, &headers)?;
    let refreshed = match state.erp.update_profile(&session, patch).await {
        Ok(_) => state.erp.profile(&session).await,
        Err(e) => Err(e),
    }
    .map_err(|e| expire_on_auth_failure(&state, &session, e))?;

    state.sessions.update_user(&session.id, refreshed.clone());
    Ok(Json(refreshed))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode> {
    let session = require_session(&state, &headers)?;
    state.views.drop_session(&session.id);
    state.sessions.end(&session.id);
    Ok(StatusCode::NO_CONTENT)
}

/// Record counts for the landing page.
async fn dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DashboardSummary>> {
    let session = require_session(&state, &headers)?;

    let mut counts = Vec::new();
    let mut pending_requests = 0;
    for record_type in state.configs.all() {
        let view = load_view(&state, &session, record_type, false).await?;
        if record_type.status_path.is_some() {
            pending_requests += view
                .rows
                .iter()
                .filter(|row| {
                    row.record.attr("status").and_then(Value::as_str) == Some("Pending")
                })
                .count();
        }
        counts.push(RecordCount {
            record_type: record_type.name.clone(),
            label: record_type.label.clone(),
            count: view.rows.len(),
        });
    }

    Ok(Json(DashboardSummary {
        counts,
        pending_requests,
    }))
}

/// Fetch the flat list again and rebuild the view.
async fn refresh_view(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ViewSummary>> {
    let session = require_session(&state, &headers)?;
    let record_type = record_type(&state, &kind)?;
    let view = load_view(&state, &session, &record_type, true).await?;
    Ok(Json(view.summary()))
}

async fn view_tree(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TreeView>> {
    let session = require_session(&state, &headers)?;
    let record_type = record_type(&state, &kind)?;
    let view = load_view(&state, &session, &record_type, false).await?;
    view.tree().map(Json)
}

#[derive(serde::Deserialize)]
struct RowsQuery {
    offset: Option<usize>,
    limit: Option<usize>,
}

/// Flattened rows with depth, paginated.
async fn view_rows(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<RowsQuery>,
    headers: HeaderMap,
) -> Result<Json<RowPage>> {
    let session = require_session(&state, &headers)?;
    let record_type = record_type(&state, &kind)?;
    let view = load_view(&state, &session, &record_type, false).await?;

    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(state.page_size).clamp(1, MAX_PAGE_SIZE);
    Ok(Json(view.page(offset, limit)))
}

/// Expand a selection to include every descendant.
async fn collect_selection(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    Json(selection): Json<Selection>,
) -> Result<Json<SelectionScope>> {
    let session = require_session(&state, &headers)?;
    let record_type = record_type(&state, &kind)?;
    let view = load_view(&state, &session, &record_type, false).await?;

    Ok(Json(SelectionScope {
        ids: tree::collect_with_descendants(&view.forest, &selection.ids),
    }))
}

async fn get_record(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let session = require_session(&state, &headers)?;
    let record_type = record_type(&state, &kind)?;
    state
        .erp
        .get(&session, &record_type, &id)
        .await
        .map(Json)
        .map_err(|e| expire_on_auth_failure(&state, &session, e))
}

async fn create_record(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>)> {
    let session = require_session(&state, &headers)?;
    let record_type = record_type(&state, &kind)?;
    let created = state
        .erp
        .create(&session, &record_type, body)
        .await
        .map_err(|e| expire_on_auth_failure(&state, &session, e))?;

    state.views.invalidate(&ViewKey::new(&session, &record_type));
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_record(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let session = require_session(&state, &headers)?;
    let record_type = record_type(&state, &kind)?;
    let updated = state
        .erp
        .update(&session, &record_type, &id, body)
        .await
        .map_err(|e| expire_on_auth_failure(&state, &session, e))?;

    state.views.invalidate(&ViewKey::new(&session, &record_type));
    Ok(Json(updated))
}

async fn delete_record(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let session = require_session(&state, &headers)?;
    let record_type = record_type(&state, &kind)?;
    state
        .erp
        .delete(&session, &record_type, &id)
        .await
        .map_err(|e| expire_on_auth_failure(&state, &session, e))?;

    state.views.invalidate(&ViewKey::new(&session, &record_type));
    Ok(StatusCode::NO_CONTENT)
}

async fn set_record_status(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<Value>> {
    let session = require_session(&state, &headers)?;
    let record_type = record_type(&state, &kind)?;
    let status: RequestStatus = update.status;
    let updated = state
        .erp
        .set_status(&session, &record_type, &id, status)
        .await
        .map_err(|e| expire_on_auth_failure(&state, &session, e))?;

    state.views.invalidate(&ViewKey::new(&session, &record_type));
    Ok(Json(updated))
}

#[derive(serde::Deserialize)]
struct ExportQuery {
    /// Comma-separated selection; descendants are included.
    ids: Option<String>,
    #[serde(default)]
    refresh: bool,
}

async fn export_table(
    state: &AppState,
    kind: &str,
    query: &ExportQuery,
    headers: &HeaderMap,
) -> Result<ExportTable> {
    let session = require_session(state, headers)?;
    let record_type = record_type(state, kind)?;
    let view = load_view(state, &session, &record_type, query.refresh).await?;

    let selected = parse_ids(query.ids.as_deref());
    let rows = tree::rows_for_selection(&view.forest, &selected);
    info!(
        "Exporting {} {} rows ({} selected)",
        rows.len(),
        record_type.name,
        selected.len()
    );
    Ok(ExportTable::from_rows(&record_type, &rows))
}

fn attachment(content_type: &str, filename: &str, body: Vec<u8>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
}

async fn export_csv(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<ExportQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let table = export_table(&state, &kind, &query, &headers).await?;
    let body = table.to_csv()?;
    Ok(attachment("text/csv; charset=utf-8", &table.csv_filename(), body))
}

async fn export_pdf(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<ExportQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let table = export_table(&state, &kind, &query, &headers).await?;
    let body = table.to_pdf(&schema::now_display())?;
    Ok(attachment("application/pdf", &table.pdf_filename(), body))
}

async fn export_xlsx(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<ExportQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let table = export_table(&state, &kind, &query, &headers).await?;
    let body = table.to_xlsx()?;
    Ok(attachment(XLSX_CONTENT_TYPE, &table.xlsx_filename(), body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn upstream() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "token": "jwt-1",
                "user": {"_id": "u1", "email": "user@example.com", "fullname": "John Doe"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bom/"))
            .and(header_matcher("Authorization", "Bearer jwt-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "bomData": [
                    {"_id": "A", "parent_part": "root", "title": "Assembly", "lock": true},
                    {"_id": "B", "parent_part": "A", "title": "Bracket"},
                    {"_id": "C", "parent_part": "B", "title": "Bolt"},
                    {"_id": "D", "parent_part": "root", "title": "Decal"}
                ]
            })))
            .mount(&server)
            .await;
        server
    }

    fn state_for(server: &MockServer) -> AppState {
        state_with_idle_timeout(server, Duration::from_secs(3600))
    }

    fn state_with_idle_timeout(server: &MockServer, idle: Duration) -> AppState {
        AppState {
            configs: Arc::new(ConfigStore::load(None).unwrap()),
            sessions: SessionStore::new(idle),
            views: ViewStore::new(),
            erp: Arc::new(ErpClient::new(server.uri(), Duration::from_secs(5)).unwrap()),
            page_size: 2,
        }
    }

    async fn logged_in(state: &AppState) -> HeaderMap {
        let Json(info) = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "user@example.com".to_string(),
                password: "pw".to_string(),
            }),
        )
        .await
        .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", info.session_id)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_parse_ids() {
        assert_eq!(parse_ids(Some("a, b,,c")), vec!["a", "b", "c"]);
        assert!(parse_ids(None).is_empty());
    }

    #[tokio::test]
    async fn test_requires_session() {
        let server = upstream().await;
        let state = state_for(&server);

        let err = view_tree(State(state.clone()), Path("ebom".to_string()), HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::NoSession));
    }

    #[tokio::test]
    async fn test_tree_rows_and_collect() {
        let server = upstream().await;
        let state = state_for(&server);
        let headers = logged_in(&state).await;

        let Json(tree) = view_tree(State(state.clone()), Path("ebom".to_string()), headers.clone())
            .await
            .unwrap();
        assert_eq!(tree.roots.roots.len(), 2);
        assert_eq!(tree.roots.len(), 4);

        let Json(page) = view_rows(
            State(state.clone()),
            Path("ebom".to_string()),
            Query(RowsQuery {
                offset: None,
                limit: None,
            }),
            headers.clone(),
        )
        .await
        .unwrap();
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.rows[1].level, 1);
        assert!(page.has_more);

        let Json(scope) = collect_selection(
            State(state.clone()),
            Path("ebom".to_string()),
            headers.clone(),
            Json(Selection {
                ids: vec!["A".to_string()],
            }),
        )
        .await
        .unwrap();
        assert_eq!(scope.ids, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_export_selection_csv() {
        let server = upstream().await;
        let state = state_for(&server);
        let headers = logged_in(&state).await;

        let query = ExportQuery {
            ids: Some("B".to_string()),
            refresh: false,
        };
        let table = export_table(&state, "ebom", &query, &headers).await.unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][0], "  Bracket");
        assert_eq!(table.rows[1][0], "    Bolt");

        let csv = String::from_utf8(table.to_csv().unwrap()).unwrap();
        assert!(csv.starts_with("Title,Position Matrix,Revision"));
    }

    #[tokio::test]
    async fn test_unknown_record_type() {
        let server = upstream().await;
        let state = state_for(&server);
        let headers = logged_in(&state).await;

        let err = refresh_view(State(state.clone()), Path("widgets".to_string()), headers)
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::UnknownRecordType(_)));
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let server = upstream().await;
        let state = state_for(&server);
        let headers = logged_in(&state).await;
        assert_eq!(state.sessions.len(), 1);

        let status = logout(State(state.clone()), headers.clone()).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(state.sessions.len(), 0);

        let err = view_tree(State(state.clone()), Path("ebom".to_string()), headers)
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::NoSession));
    }

    #[tokio::test]
    async fn test_rejected_token_ends_session() {
        let server = upstream().await;
        Mock::given(method("GET"))
            .and(path("/parts/"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        let state = state_for(&server);
        let headers = logged_in(&state).await;

        let err = refresh_view(State(state.clone()), Path("parts".to_string()), headers)
            .await
            .unwrap_err();
        assert!(err.is_auth_failure());
        assert_eq!(state.sessions.len(), 0);
    }

    #[tokio::test]
    async fn test_mutation_invalidates_view() {
        let server = upstream().await;
        Mock::given(method("DELETE"))
            .and(path("/bom/C"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .mount(&server)
            .await;
        let state = state_for(&server);
        let headers = logged_in(&state).await;
        let session = require_session(&state, &headers).unwrap();
        let ebom = record_type(&state, "ebom").unwrap();

        let Json(summary) =
            refresh_view(State(state.clone()), Path("ebom".to_string()), headers.clone())
                .await
                .unwrap();
        assert_eq!(summary.total_rows, 4);
        assert!(state.views.get(&ViewKey::new(&session, &ebom)).is_some());

        let status = delete_record(
            State(state.clone()),
            Path(("ebom".to_string(), "C".to_string())),
            headers,
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.views.get(&ViewKey::new(&session, &ebom)).is_none());
    }

    #[tokio::test]
    async fn test_export_xlsx_attachment() {
        let server = upstream().await;
        let state = state_for(&server);
        let headers = logged_in(&state).await;

        let response = export_xlsx(
            State(state.clone()),
            Path("ebom".to_string()),
            Query(ExportQuery {
                ids: None,
                refresh: false,
            }),
            headers,
        )
        .await
        .unwrap()
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            XLSX_CONTENT_TYPE
        );
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"EBOM_Export.xlsx\""
        );
    }

    #[tokio::test]
    async fn test_idle_session_is_swept_with_its_views() {
        let server = upstream().await;
        let state = state_with_idle_timeout(&server, Duration::from_millis(100));
        let headers = logged_in(&state).await;
        let session = require_session(&state, &headers).unwrap();
        let ebom = record_type(&state, "ebom").unwrap();

        let Json(summary) =
            refresh_view(State(state.clone()), Path("ebom".to_string()), headers.clone())
                .await
                .unwrap();
        assert_eq!(summary.root_count, 2);
        assert_eq!(sweep_idle_sessions(&state), 0);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(sweep_idle_sessions(&state), 1);
        assert_eq!(state.sessions.len(), 0);
        assert!(state.views.get(&ViewKey::new(&session, &ebom)).is_none());

        let err = view_tree(State(state.clone()), Path("ebom".to_string()), headers)
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::NoSession));
    }
}
