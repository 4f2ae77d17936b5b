// Fleet Earnings - Web Server
// REST API with Axum over the import service

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use fleet_earnings::parser::parse_in_background;
use fleet_earnings::{
    init_tracing, Config, ImportError, ImportService, InputError, Platform, RawImportFile,
    ReportQuery, RowValidationError, SqliteStore, StoreError, WeekStart, VERSION,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<ImportService<SqliteStore>>>,
    page_size: usize,
}

impl AppState {
    fn service(&self) -> Result<MutexGuard<'_, ImportService<SqliteStore>>, ApiError> {
        self.service.lock().map_err(|_| ApiError::Unavailable)
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    row_errors: Vec<RowValidationError>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            row_errors: Vec::new(),
        }
    }
}

impl ApiResponse<()> {
    fn failure(message: String, row_errors: Vec<RowValidationError>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            row_errors,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
enum ApiError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("service unavailable")]
    Unavailable,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Input(_) | ApiError::Import(ImportError::Input(_)) => StatusCode::BAD_REQUEST,
            ApiError::Import(ImportError::Format(_))
            | ApiError::Import(ImportError::EmptyImport { .. })
            | ApiError::Import(ImportError::AllRowsInvalid { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Import(ImportError::Submission(_)) | ApiError::Unavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let row_errors = match &self {
            ApiError::Import(err) => err.row_errors().to_vec(),
            _ => Vec::new(),
        };
        (status, Json(ApiResponse::failure(self.to_string(), row_errors))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn parse_week(raw: &str) -> Result<WeekStart, ApiError> {
    Ok(raw.parse::<WeekStart>()?)
}

// ============================================================================
// API Handlers
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok(HealthResponse {
        status: "OK",
        version: VERSION,
    }))
}

/// POST /api/imports/:platform/:week - Import a raw export (request body)
async fn import_file(
    State(state): State<AppState>,
    Path((platform, week)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<fleet_earnings::ImportOutcome> {
    let platform: Platform = platform.parse()?;
    let week = parse_week(&week)?;

    let file = RawImportFile::new(platform, week, body.to_vec());
    let digest = file.digest();

    // Parsing (PDF extraction in particular) runs off the async workers
    let rows = parse_in_background(platform, file.content)
        .await
        .map_err(ImportError::from)?;

    let outcome = state.service()?.import_rows(platform, week, &rows, Some(digest))?;
    Ok(Json(ApiResponse::ok(outcome)))
}

/// DELETE /api/imports/:platform/:week - Remove a platform's week
async fn delete_import(
    State(state): State<AppState>,
    Path((platform, week)): Path<(String, String)>,
) -> ApiResult<fleet_earnings::DeleteOutcome> {
    let platform: Platform = platform.parse()?;
    let week = parse_week(&week)?;

    let outcome = state.service()?.delete(platform, week)?;
    Ok(Json(ApiResponse::ok(outcome)))
}

/// GET /api/status/:week - Upload status per platform
async fn import_status(
    State(state): State<AppState>,
    Path(week): Path<String>,
) -> ApiResult<Vec<fleet_earnings::UploadStatusRecord>> {
    let week = parse_week(&week)?;
    let statuses = state.service()?.import_status(week)?;
    Ok(Json(ApiResponse::ok(statuses)))
}

#[derive(Debug, Deserialize)]
struct ReportParams {
    search: Option<String>,
    page: Option<usize>,
    per_page: Option<usize>,
}

/// GET /api/reports/:week?search=&page=&per_page=
async fn list_reports(
    State(state): State<AppState>,
    Path(week): Path<String>,
    Query(params): Query<ReportParams>,
) -> ApiResult<fleet_earnings::Page<fleet_earnings::PaymentReport>> {
    let week = parse_week(&week)?;
    let query = ReportQuery::new(
        params.search,
        params.page.unwrap_or(1),
        params.per_page.unwrap_or(state.page_size),
    );

    let page = state.service()?.reports(week, &query)?;
    Ok(Json(ApiResponse::ok(page)))
}

/// POST /api/reports/:week/rebuild - Recompute a week's reports
async fn rebuild_reports(
    State(state): State<AppState>,
    Path(week): Path<String>,
) -> ApiResult<Vec<fleet_earnings::PaymentReport>> {
    let week = parse_week(&week)?;
    let reports = state.service()?.rebuild_reports(week)?;
    Ok(Json(ApiResponse::ok(reports)))
}

/// POST /api/payments/:id - Mark a report as paid
async fn mark_paid(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<fleet_earnings::PaymentReport> {
    let report_id = Uuid::parse_str(&id).map_err(|_| ApiError::NotFound(format!("payment report {}", id)))?;

    match state.service()?.mark_paid(report_id)? {
        Some(report) => Ok(Json(ApiResponse::ok(report))),
        None => Err(ApiError::NotFound(format!("payment report {}", id))),
    }
}

/// GET /api/dashboard/:week - Totals, comparison, distribution, uploads
async fn dashboard(
    State(state): State<AppState>,
    Path(week): Path<String>,
) -> ApiResult<fleet_earnings::Dashboard> {
    let week = parse_week(&week)?;
    let dashboard = state.service()?.dashboard(week)?;
    Ok(Json(ApiResponse::ok(dashboard)))
}

#[derive(Debug, Deserialize)]
struct MonthlyParams {
    weeks: Option<u32>,
}

/// GET /api/revenue/monthly?weeks=12
async fn monthly_revenue(
    State(state): State<AppState>,
    Query(params): Query<MonthlyParams>,
) -> ApiResult<Vec<fleet_earnings::MonthlyRevenue>> {
    let to = WeekStart::current();
    let from = (1..params.weeks.unwrap_or(12).max(1)).fold(to, |w, _| w.previous());

    let months = state.service()?.monthly_revenue(from, to)?;
    Ok(Json(ApiResponse::ok(months)))
}

#[derive(Debug, Serialize, Deserialize)]
struct CommissionBody {
    amount: Decimal,
}

/// GET /api/commission
async fn get_commission(State(state): State<AppState>) -> ApiResult<CommissionBody> {
    let amount = state.service()?.commission()?;
    Ok(Json(ApiResponse::ok(CommissionBody { amount })))
}

/// PUT /api/commission - body: {"amount": "20.00"}
async fn put_commission(
    State(state): State<AppState>,
    Json(body): Json<CommissionBody>,
) -> ApiResult<CommissionBody> {
    state.service()?.set_commission(body.amount)?;
    Ok(Json(ApiResponse::ok(body)))
}

// ============================================================================
// Main Server
// ============================================================================

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/imports/:platform/:week", post(import_file).delete(delete_import))
        .route("/status/:week", get(import_status))
        .route("/reports/:week", get(list_reports))
        .route("/reports/:week/rebuild", post(rebuild_reports))
        .route("/payments/:id", post(mark_paid))
        .route("/dashboard/:week", get(dashboard))
        .route("/revenue/monthly", get(monthly_revenue))
        .route("/commission", get(get_commission).put(put_commission))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("fleet_earnings=info,tower_http=info");

    let config = Config::from_env()?;

    let store = SqliteStore::open(&config.db_path)?;
    info!(path = %config.db_path.display(), "✓ Database opened");

    // Create shared state
    let service = ImportService::new(store, &config.owner_id)
        .with_default_commission(config.default_commission);
    let state = AppState {
        service: Arc::new(Mutex::new(service)),
        page_size: config.page_size,
    };

    let app = router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;

    info!("🚀 Server running on http://{}", config.server_addr);
    info!("   API: http://{}/api/health", config.server_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    const BOLT_CSV: &str = "Driver,Driver's Phone,Email,Projected payout|€\n\
        Jean Paul Martin,0601020304,jp@x.com,\"123,45\"\n";

    fn test_app() -> Router {
        let service = ImportService::new(SqliteStore::open_in_memory().unwrap(), "owner-1");
        router(AppState {
            service: Arc::new(Mutex::new(service)),
            page_size: 25,
        })
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Body) -> (StatusCode, serde_json::Value) {
        let response = app
            .clone()
            .oneshot(Request::builder().method(method).uri(uri).body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let (status, body) = call(&app, Method::GET, "/api/health", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "OK");
    }

    #[tokio::test]
    async fn test_import_then_status_and_reports() {
        let app = test_app();

        let (status, body) = call(&app, Method::POST, "/api/imports/bolt/2025-01-13", Body::from(BOLT_CSV)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["accepted"], 1);
        assert!(body["data"]["reportsError"].is_null());

        let (_, body) = call(&app, Method::GET, "/api/status/2025-01-13", Body::empty()).await;
        assert_eq!(body["data"][0]["platform"], "bolt");
        assert_eq!(body["data"][0]["uploaded"], true);
        assert_eq!(body["data"][1]["uploaded"], false);

        let (_, body) = call(&app, Method::GET, "/api/reports/2025-01-13?search=martin", Body::empty()).await;
        assert_eq!(body["data"]["total"], 1);
        assert_eq!(body["data"]["items"][0]["totalEarnings"], "123.45");

        let (status, body) = call(&app, Method::DELETE, "/api/imports/bolt/2025-01-13", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["outcome"], "deleted");
    }

    #[tokio::test]
    async fn test_bad_input_status_codes() {
        let app = test_app();

        let (status, _) = call(&app, Method::POST, "/api/imports/lyft/2025-01-13", Body::from(BOLT_CSV)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // 2025-01-15 is a Wednesday
        let (status, body) = call(&app, Method::GET, "/api/status/2025-01-15", Body::empty()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, _) = call(&app, Method::POST, "/api/imports/uber/2025-01-13", Body::from("a,b\n1,2\n")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = call(&app, Method::POST, &format!("/api/payments/{}", Uuid::new_v4()), Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_commission_round_trip() {
        let app = test_app();

        let request = Request::builder()
            .method(Method::PUT)
            .uri("/api/commission")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"amount": "20.00"}"#))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (_, body) = call(&app, Method::GET, "/api/commission", Body::empty()).await;
        assert_eq!(body["data"]["amount"], "20.00");
    }
}
