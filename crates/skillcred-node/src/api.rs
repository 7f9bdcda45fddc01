//! HTTP API server for the Skillcred node.
//!
//! Provides REST endpoints for submission intake, issuance, verification,
//! revocation, manual sweeps, and artifact upload.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

use skillcred_core::{
    ApprovedSubmission, CredentialId, CredentialRecord, IssuanceView, MirrorStatus, SubmissionId,
    TxRef,
};
use skillcred_credentials::{IssueError, IssueOutcome, Resolution, ResolveError, RevokeError, SweepReport};
use skillcred_ledger::{ArtifactError, ArtifactStore};

use crate::state::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

// --- Request / response types ---

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub issuer: String,
    pub ledger_backend: String,
    pub uptime_secs: u64,
    pub mirrors: BTreeMap<String, usize>,
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct SubmitRequest {
    #[serde(flatten)]
    pub submission: ApprovedSubmission,
    /// Inline artifact bytes, base64 encoded.
    #[serde(default)]
    pub artifact_base64: Option<String>,
}

#[derive(Deserialize)]
pub struct IssueRequestBody {
    pub submission_id: String,
}

#[derive(Serialize, Deserialize, Default)]
pub struct IssueResponse {
    pub status: String,
    pub submission_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<CredentialId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<CredentialRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror_status: Option<MirrorStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<TxRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct RevokeResponse {
    pub credential_id: CredentialId,
    pub status: String,
}

#[derive(Serialize)]
pub struct ArtifactResponse {
    pub hash: String,
    pub size: usize,
}

fn error(status: StatusCode, message: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
            reason: None,
        }),
    )
}

// --- Handlers ---

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
    })
}

async fn handle_status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, ApiError> {
    let counts = state
        .store
        .status_counts()
        .map_err(|e| error(StatusCode::SERVICE_UNAVAILABLE, e))?;
    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        issuer: state.orchestrator.issuer().to_string(),
        ledger_backend: state.orchestrator.ledger_backend().to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        mirrors: counts
            .into_iter()
            .map(|(status, n)| (status.to_string(), n))
            .collect(),
    }))
}

async fn handle_submit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<IssuanceView>), ApiError> {
    let artifact_bytes = req
        .artifact_base64
        .map(|encoded| base64::engine::general_purpose::STANDARD.decode(encoded))
        .transpose()
        .map_err(|e| error(StatusCode::BAD_REQUEST, format!("invalid artifact_base64: {e}")))?;

    let submission = state
        .orchestrator
        .record_approval(req.submission, artifact_bytes)
        .await
        .map_err(|e| match e {
            IssueError::InvalidSubmission(_) => error(StatusCode::BAD_REQUEST, e),
            IssueError::SubmissionLocked(_) => error(StatusCode::CONFLICT, e),
            _ => error(StatusCode::SERVICE_UNAVAILABLE, e),
        })?;

    let view = state
        .orchestrator
        .issuance_view(&submission.id)
        .map_err(|e| error(StatusCode::SERVICE_UNAVAILABLE, e))?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn handle_submission(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<IssuanceView>, ApiError> {
    let id = SubmissionId::parse(&id).map_err(|e| error(StatusCode::BAD_REQUEST, e))?;
    state.orchestrator.issuance_view(&id).map(Json).map_err(|e| match e {
        IssueError::SubmissionNotFound(_) => error(StatusCode::NOT_FOUND, e),
        _ => error(StatusCode::SERVICE_UNAVAILABLE, e),
    })
}

async fn handle_issue(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IssueRequestBody>,
) -> Result<(StatusCode, Json<IssueResponse>), ApiError> {
    let id = SubmissionId::parse(&req.submission_id).map_err(|e| error(StatusCode::BAD_REQUEST, e))?;
    let submission_id = id.to_string();

    let (code, response) = match state.orchestrator.issue(&id).await {
        Ok(IssueOutcome::Issued {
            record,
            mirror_status,
            tx_ref,
        }) => (
            StatusCode::OK,
            IssueResponse {
                status: "issued".into(),
                submission_id,
                credential_id: Some(record.id.clone()),
                record: Some(record),
                mirror_status: Some(mirror_status),
                tx_ref,
                reason: None,
            },
        ),
        Ok(IssueOutcome::AlreadyIssued { record }) => (
            StatusCode::CONFLICT,
            IssueResponse {
                status: "already_issued".into(),
                submission_id,
                credential_id: Some(record.id.clone()),
                record: Some(record),
                ..Default::default()
            },
        ),
        Err(e) => {
            let (code, status) = match &e {
                IssueError::IndeterminateLedgerResponse { .. } => (StatusCode::ACCEPTED, "indeterminate"),
                IssueError::InFlight(_) => (StatusCode::ACCEPTED, "in_flight"),
                IssueError::LedgerRejected { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "rejected"),
                IssueError::NotApproved { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "not_approved"),
                IssueError::SubmissionNotFound(_) => return Err(error(StatusCode::NOT_FOUND, &e)),
                IssueError::InvalidSubmission(_) => return Err(error(StatusCode::BAD_REQUEST, &e)),
                IssueError::SubmissionLocked(_) => return Err(error(StatusCode::CONFLICT, &e)),
                IssueError::LedgerUnavailable(_) | IssueError::Store(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
                }
            };
            (
                code,
                IssueResponse {
                    status: status.into(),
                    submission_id,
                    reason: Some(e.to_string()),
                    ..Default::default()
                },
            )
        }
    };
    Ok((code, Json(response)))
}

async fn handle_verify(
    State(state): State<Arc<AppState>>,
    Path(identifier): Path<String>,
) -> Result<Json<Resolution>, ApiError> {
    state.resolver.resolve(&identifier).await.map(Json).map_err(|e| match e {
        ResolveError::NotFound(_) => error(StatusCode::NOT_FOUND, e),
        ResolveError::InvalidIdentifier(_) => error(StatusCode::BAD_REQUEST, e),
        ResolveError::VerificationUnavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: e.to_string(),
                reason: Some("ledger_unavailable".into()),
            }),
        ),
    })
}

async fn handle_revoke(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RevokeResponse>, ApiError> {
    let id = CredentialId::parse(&id).map_err(|e| error(StatusCode::BAD_REQUEST, e))?;
    state.orchestrator.revoke(&id).await.map_err(|e| match e {
        RevokeError::NotFound(_) => error(StatusCode::NOT_FOUND, e),
        RevokeError::Rejected(_) => error(StatusCode::UNPROCESSABLE_ENTITY, e),
        RevokeError::LedgerUnavailable(_) => error(StatusCode::SERVICE_UNAVAILABLE, e),
    })?;
    Ok(Json(RevokeResponse {
        credential_id: id,
        status: "revoked".into(),
    }))
}

async fn handle_sweep(State(state): State<Arc<AppState>>) -> Json<SweepReport> {
    Json(state.sweeper.sweep_once().await)
}

async fn handle_artifact(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<ArtifactResponse>), ApiError> {
    let size = body.len();
    let hash = state.artifacts.put(body.to_vec()).await.map_err(|e| match e {
        ArtifactError::TooLarge { .. } => error(StatusCode::PAYLOAD_TOO_LARGE, e),
        ArtifactError::Unavailable(_) => error(StatusCode::SERVICE_UNAVAILABLE, e),
    })?;
    Ok((StatusCode::CREATED, Json(ArtifactResponse { hash, size })))
}

// --- Server ---

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(handle_health))
        .route("/api/v1/status", get(handle_status))
        .route("/api/v1/submissions", post(handle_submit))
        .route("/api/v1/submissions/{id}", get(handle_submission))
        .route("/api/v1/issue", post(handle_issue))
        .route("/api/v1/verify/{identifier}", get(handle_verify))
        .route("/api/v1/credentials/{id}/revoke", post(handle_revoke))
        .route("/api/v1/sweep", post(handle_sweep))
        .route("/api/v1/artifacts", post(handle_artifact))
        .with_state(state)
}

pub async fn start_api_server(
    listen_addr: SocketAddr,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(%listen_addr, "HTTP API server started");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    tracing::info!("HTTP API server stopped");
    Ok(())
}
