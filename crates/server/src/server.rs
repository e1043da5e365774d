use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use guestpass::{
    code_from_file_name, png_file_name, CodeState, PromoterStats, QrEncoder, RedemptionLedger,
    Store,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::{ApiError, Result};
use crate::extract::Payload;
use crate::session::{expired_session_cookie, session_cookie, OperatorContext, SessionStore};

pub struct AppState {
    pub config: ServerConfig,
    pub ledger: RedemptionLedger,
    pub sessions: SessionStore,
    pub qr: QrEncoder,
}

impl AppState {
    pub async fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let store = Store::open(&config.store).await?;
        tokio::fs::create_dir_all(&config.qr_output_dir).await?;
        info!("Writing QR images to {}", config.qr_output_dir.display());

        let sessions = SessionStore::new(config.operator_password.clone());
        Ok(Self {
            ledger: RedemptionLedger::new(store),
            sessions,
            qr: QrEncoder::default(),
            config,
        })
    }

    /// Render the image for `code` and store it under its download name.
    async fn write_qr(&self, code: &str) -> Result<Vec<u8>> {
        let encoder = self.qr.clone();
        let payload = code.to_string();
        let png = tokio::task::spawn_blocking(move || encoder.render_png(&payload))
            .await
            .map_err(|e| ApiError::Internal(format!("QR render task failed: {}", e)))??;

        let path = self.config.qr_output_dir.join(png_file_name(code));
        tokio::fs::write(&path, &png)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to write {}: {}", path.display(), e)))?;
        Ok(png)
    }
}

/// Routes and per-request layers. Rate limiting needs the peer address, so
/// it is added by [`run`].
pub fn router(state: Arc<AppState>) -> Router {
    let max_body_bytes = state.config.max_body_bytes;

    Router::new()
        .route("/health", get(health))
        // Operator session
        .route("/login", post(login))
        .route("/logout", post(logout))
        // Issue a code and its QR image
        .route("/generate/:promoter_id", get(generate).post(generate))
        // Issued QR images
        .route("/download/:filename", get(download))
        // Scan / redeem
        .route("/verify", post(verify))
        .route("/codes/:code", get(code_status))
        .route("/stats", get(stats))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(state: Arc<AppState>) -> anyhow::Result<()> {
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(state.config.rate_limit_per_second)
        .burst_size(state.config.rate_limit_burst)
        .key_extractor(tower_governor::key_extractor::SmartIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("Invalid rate limit configuration"))?;

    let app = router(state.clone()).layer(GovernorLayer {
        config: Arc::new(governor_conf),
    });

    let addr = state.config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        "Guestpass listening on {} (rate limited: {} req/s per IP)",
        addr, state.config.rate_limit_per_second
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
struct LoginRequest {
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    status: &'static str,
    token: String,
}

#[derive(Serialize)]
struct MessageResponse {
    status: &'static str,
    message: String,
}

#[derive(Serialize)]
struct IssueResponse {
    status: &'static str,
    code: String,
    promoter_id: String,
    created_at: DateTime<Utc>,
    qr_filename: String,
    download_url: String,
}

#[derive(Deserialize)]
struct VerifyRequest {
    code: String,
}

#[derive(Serialize)]
struct VerifyResponse {
    status: &'static str,
    message: String,
    promoter_id: String,
    redeemed_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct CodeStatusResponse {
    code: String,
    #[serde(flatten)]
    state: CodeState,
}

#[derive(Serialize)]
struct StatsResponse {
    stats: Vec<PromoterStats>,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn login(
    State(state): State<Arc<AppState>>,
    Payload(req): Payload<LoginRequest>,
) -> Result<impl IntoResponse> {
    let token = state.sessions.login(&req.password).await?;
    Ok((
        [(header::SET_COOKIE, session_cookie(&token))],
        Json(LoginResponse {
            status: "success",
            token,
        }),
    ))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    operator: OperatorContext,
) -> impl IntoResponse {
    if let Some(token) = &operator.token {
        state.sessions.logout(token).await;
    }
    (
        [(header::SET_COOKIE, expired_session_cookie())],
        Json(MessageResponse {
            status: "success",
            message: "Logged out".to_string(),
        }),
    )
}

async fn generate(
    State(state): State<Arc<AppState>>,
    operator: OperatorContext,
    Path(promoter_id): Path<String>,
) -> Result<Json<IssueResponse>> {
    operator.require()?;

    let code = state.ledger.registry().issue(&promoter_id).await?;
    if let Err(e) = state.write_qr(&code.code).await {
        // The code stays registered; /download renders it again on demand
        error!(
            "Issued code {} for promoter {} but its image was not written",
            code.code, code.promoter_id
        );
        return Err(e);
    }

    let qr_filename = png_file_name(&code.code);
    Ok(Json(IssueResponse {
        status: "success",
        download_url: format!("/download/{}", qr_filename),
        qr_filename,
        code: code.code,
        promoter_id: code.promoter_id,
        created_at: code.created_at,
    }))
}

async fn download(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response> {
    let code = code_from_file_name(&filename)
        .ok_or_else(|| ApiError::InvalidRequest("Invalid file name".into()))?;

    let path = state.config.qr_output_dir.join(&filename);
    let png = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // Image lost but the code is registered: render it again
            if state.ledger.registry().get(code).await?.is_none() {
                return Err(ApiError::NotFound);
            }
            warn!("Re-rendering missing image {}", filename);
            state.write_qr(code).await?
        }
        Err(e) => {
            return Err(ApiError::Internal(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        png,
    )
        .into_response())
}

async fn verify(
    State(state): State<Arc<AppState>>,
    operator: OperatorContext,
    body: std::result::Result<Payload<VerifyRequest>, ApiError>,
) -> Result<Json<VerifyResponse>> {
    operator.require()?;
    let Payload(req) = body?;

    // Scanners commonly append a line break
    let code = req.code.trim();
    if code.is_empty() {
        return Err(ApiError::InvalidRequest("Code is required".into()));
    }

    let receipt = state.ledger.redeem(code).await?;
    Ok(Json(VerifyResponse {
        status: "success",
        message: format!(
            "QR code redeemed. Promoter: {}",
            receipt.promoter_id
        ),
        promoter_id: receipt.promoter_id,
        redeemed_at: receipt.redeemed_at,
    }))
}

async fn code_status(
    State(state): State<Arc<AppState>>,
    operator: OperatorContext,
    Path(code): Path<String>,
) -> Result<Json<CodeStatusResponse>> {
    operator.require()?;
    let code_state = state.ledger.status(&code).await?;
    Ok(Json(CodeStatusResponse {
        code,
        state: code_state,
    }))
}

async fn stats(
    State(state): State<Arc<AppState>>,
    operator: OperatorContext,
) -> Result<Json<StatsResponse>> {
    operator.require()?;
    let stats = state.ledger.stats().await?;
    Ok(Json(StatsResponse { stats }))
}
