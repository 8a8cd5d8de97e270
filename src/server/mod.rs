//! HTTP surface.
//!
//! Every POST route takes a `multipart/form-data` body with a `file` field
//! (an image, or a PDF with optional `page` and `dpi`) and answers with one
//! JSON object. Errors are `{"detail": "..."}`.

mod error;
mod form;

pub use error::ApiError;

use crate::core::OcrResult;
use crate::domain::schema::{LayoutResult, OcrResult as OcrPrediction, OrderResult, TextDetectionResult};
use crate::pdf::{DEFAULT_DPI, PageRenderer};
use crate::pipeline::{self, ModelRegistry};
use crate::utils::{is_pdf_bytes, load_image_from_bytes};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use form::UploadForm;
use image::RgbImage;
use serde::Serialize;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Models and renderers shared by every handler.
pub struct AppState {
    pub models: ModelRegistry,
    pub pdf: Arc<dyn PageRenderer>,
}

impl AppState {
    pub fn new(models: ModelRegistry, pdf: Arc<dyn PageRenderer>) -> Self {
        Self { models, pdf }
    }

    /// Decodes the upload, rendering the requested page when it is a PDF.
    fn load_image(&self, form: &UploadForm, bytes: &[u8]) -> OcrResult<RgbImage> {
        if is_pdf_bytes(bytes) {
            let page = form.page.unwrap_or(1);
            let dpi = form.dpi.unwrap_or(DEFAULT_DPI);
            self.pdf.get_page_image(bytes, page, dpi)
        } else {
            load_image_from_bytes(bytes)
        }
    }
}

/// Listener and request settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body, in megabytes.
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_mb: 50,
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct DetectionResponse {
    detected_text: TextDetectionResult,
}

#[derive(Serialize)]
struct OcrResponse {
    ocr_result: OcrPrediction,
}

#[derive(Serialize)]
struct LayoutResponse {
    layout_result: LayoutResult,
}

#[derive(Serialize)]
struct OrderResponse {
    order_result: OrderResult,
}

#[derive(Serialize)]
struct PageCountResponse {
    page_count: usize,
}

/// Builds the router with CORS, tracing and the upload size limit.
pub fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/text-detection/", post(text_detection_handler))
        .route("/ocr/", post(ocr_handler))
        .route("/layout-detection/", post(layout_detection_handler))
        .route("/order-detection/", post(order_detection_handler))
        .route("/page-count/", post(page_count_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves `state` until Ctrl+C or SIGTERM.
pub async fn run_server(
    state: Arc<AppState>,
    config: &ServerConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = build_router(state, config.max_upload_mb.saturating_mul(1024 * 1024));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    info!("Server listening on http://{}", addr);
    info!("Endpoints:");
    info!("  GET  /                   - Welcome message");
    info!("  GET  /health             - Health check");
    info!("  POST /text-detection/    - Text line detection");
    info!("  POST /ocr/               - Text recognition");
    info!("  POST /layout-detection/  - Layout analysis");
    info!("  POST /order-detection/   - Reading order");
    info!("  POST /page-count/        - PDF page count");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn root_handler() -> Json<Value> {
    Json(json!({ "message": "Welcome to OCR API's" }))
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Reads the form, then decodes the upload and runs `stage` on a blocking
/// thread.
async fn run_stage<T, F>(
    state: Arc<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
    name: &'static str,
    validate: impl FnOnce(&UploadForm) -> Result<(), ApiError>,
    stage: F,
) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AppState, &RgbImage, &UploadForm) -> OcrResult<T> + Send + 'static,
{
    let request_id = uuid::Uuid::new_v4().to_string();
    let mut form = UploadForm::read(multipart).await?;
    let bytes = form.take_file()?;
    validate(&form)?;
    info!(request_id = %request_id, stage = name, bytes = bytes.len(), "Processing request");

    let start = Instant::now();
    let result = tokio::task::spawn_blocking(move || {
        let image = state.load_image(&form, &bytes)?;
        stage(&state, &image, &form)
    })
    .await
    .map_err(|e| {
        error!(request_id = %request_id, error = %e, "Worker task failed");
        ApiError::internal(format!("worker task failed: {e}"))
    })?;

    match result {
        Ok(value) => {
            info!(
                request_id = %request_id,
                stage = name,
                total_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Request completed"
            );
            Ok(value)
        }
        Err(e) => {
            error!(request_id = %request_id, stage = name, error = %e, "Request failed");
            Err(e.into())
        }
    }
}

fn no_extra_fields(_: &UploadForm) -> Result<(), ApiError> {
    Ok(())
}

async fn text_detection_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectionResponse>, ApiError> {
    let detected_text = run_stage(state, multipart, "text_detection", no_extra_fields, |state, image, _| {
        pipeline::text_detection(image, state.models.det.as_ref()).map(|(_, result)| result)
    })
    .await?;
    Ok(Json(DetectionResponse { detected_text }))
}

async fn ocr_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<OcrResponse>, ApiError> {
    let validate = |form: &UploadForm| {
        if form.langs.is_empty() {
            return Err(ApiError::missing_field("langs"));
        }
        Ok(())
    };
    let ocr_result = run_stage(state, multipart, "ocr", validate, |state, image, form| {
        pipeline::ocr(
            image,
            &form.langs,
            state.models.det.as_ref(),
            state.models.rec.as_ref(),
        )
        .map(|(_, result)| result)
    })
    .await?;
    Ok(Json(OcrResponse { ocr_result }))
}

async fn layout_detection_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<LayoutResponse>, ApiError> {
    let layout_result = run_stage(state, multipart, "layout_detection", no_extra_fields, |state, image, _| {
        pipeline::layout_detection(image, state.models.det.as_ref(), state.models.layout.as_ref())
            .map(|(_, result)| result)
    })
    .await?;
    Ok(Json(LayoutResponse { layout_result }))
}

async fn order_detection_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_result = run_stage(state, multipart, "order_detection", no_extra_fields, |state, image, _| {
        pipeline::order_detection(
            image,
            state.models.det.as_ref(),
            state.models.layout.as_ref(),
            state.models.order.as_ref(),
        )
        .map(|(_, result)| result)
    })
    .await?;
    Ok(Json(OrderResponse { order_result }))
}

async fn page_count_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PageCountResponse>, ApiError> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let mut form = UploadForm::read(multipart).await?;
    let bytes = form.take_file()?;
    if !is_pdf_bytes(&bytes) {
        return Err(ApiError::bad_request("uploaded file is not a PDF"));
    }

    let page_count = tokio::task::spawn_blocking(move || state.pdf.page_count(&bytes))
        .await
        .map_err(|e| ApiError::internal(format!("worker task failed: {e}")))?
        .map_err(|e| {
            error!(request_id = %request_id, error = %e, "Page count failed");
            ApiError::from(e)
        })?;
    info!(request_id = %request_id, page_count, "Counted PDF pages");
    Ok(Json(PageCountResponse { page_count }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
