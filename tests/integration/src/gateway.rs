//! A ledger gateway served over HTTP, backed by any `LedgerClient`.
//!
//! Lets tests drive `HttpLedgerClient` end to end.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use skillcred_core::{CredentialId, HolderId, IdempotencyKey, IssuerId};
use skillcred_ledger::{IssueRequest, LedgerClient, LedgerError};

type Ledger = Arc<dyn LedgerClient>;
type GatewayResult<T> = Result<Json<T>, (StatusCode, Json<GatewayError>)>;

#[derive(Serialize)]
struct GatewayError {
    error: String,
}

#[derive(Serialize)]
struct IssuerResponse {
    authorized: bool,
}

#[derive(Deserialize)]
struct KeyQuery {
    idempotency_key: IdempotencyKey,
}

#[derive(Deserialize)]
struct RevokeBody {
    issuer: IssuerId,
}

fn failure(err: LedgerError) -> (StatusCode, Json<GatewayError>) {
    let status = match &err {
        LedgerError::Unauthorized(_) => StatusCode::FORBIDDEN,
        LedgerError::Duplicate(_) => StatusCode::CONFLICT,
        LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::Network(_) | LedgerError::Timeout(_) => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(GatewayError {
            error: err.to_string(),
        }),
    )
}

fn not_found() -> (StatusCode, Json<GatewayError>) {
    (
        StatusCode::NOT_FOUND,
        Json(GatewayError {
            error: "not found".into(),
        }),
    )
}

async fn issue(
    State(ledger): State<Ledger>,
    Json(request): Json<IssueRequest>,
) -> Result<(StatusCode, Json<skillcred_ledger::IssueReceipt>), (StatusCode, Json<GatewayError>)> {
    let receipt = ledger.issue(request).await.map_err(failure)?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn get_credential(
    State(ledger): State<Ledger>,
    Path(id): Path<String>,
) -> GatewayResult<skillcred_core::CredentialRecord> {
    ledger
        .get_credential(&CredentialId::new(id))
        .await
        .map_err(failure)?
        .map(Json)
        .ok_or_else(not_found)
}

async fn find_by_key(
    State(ledger): State<Ledger>,
    Query(query): Query<KeyQuery>,
) -> GatewayResult<skillcred_core::CredentialRecord> {
    ledger
        .find_by_idempotency_key(&query.idempotency_key)
        .await
        .map_err(failure)?
        .map(Json)
        .ok_or_else(not_found)
}

async fn holder_credentials(
    State(ledger): State<Ledger>,
    Path(holder): Path<String>,
) -> GatewayResult<Vec<skillcred_core::CredentialRecord>> {
    ledger
        .credentials_for_holder(&HolderId::new(holder))
        .await
        .map(Json)
        .map_err(failure)
}

async fn issuer(State(ledger): State<Ledger>, Path(addr): Path<String>) -> GatewayResult<IssuerResponse> {
    let authorized = ledger
        .is_authorized_issuer(&IssuerId::new(addr))
        .await
        .map_err(failure)?;
    Ok(Json(IssuerResponse { authorized }))
}

async fn revoke(
    State(ledger): State<Ledger>,
    Path(id): Path<String>,
    Json(body): Json<RevokeBody>,
) -> Result<StatusCode, (StatusCode, Json<GatewayError>)> {
    ledger
        .revoke(&CredentialId::new(id), &body.issuer)
        .await
        .map_err(failure)?;
    Ok(StatusCode::OK)
}

pub fn router(ledger: Ledger) -> Router {
    Router::new()
        .route("/credentials", post(issue).get(find_by_key))
        .route("/credentials/{id}", get(get_credential))
        .route("/credentials/{id}/revoke", post(revoke))
        .route("/holders/{holder}/credentials", get(holder_credentials))
        .route("/issuers/{addr}", get(issuer))
        .with_state(ledger)
}

/// Serve the gateway on an ephemeral local port and return its base URL.
pub async fn spawn(ledger: Ledger) -> std::io::Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(ledger)).await {
            tracing::error!(error = %e, "test gateway stopped");
        }
    });
    Ok(format!("http://{}", addr))
}
