//! Ledger adapter for a JSON HTTP gateway in front of the credential contract.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use skillcred_core::{CredentialId, CredentialRecord, HolderId, IdempotencyKey, IssuerId};

use crate::error::LedgerError;
use crate::traits::LedgerClient;
use crate::types::{IssueReceipt, IssueRequest};

#[derive(Deserialize)]
struct GatewayError {
    error: String,
}

#[derive(Deserialize)]
struct IssuerResponse {
    authorized: bool,
}

#[derive(Serialize)]
struct RevokeRequest<'a> {
    issuer: &'a IssuerId,
}

/// Talks to a ledger gateway over HTTP.
///
/// Every request is bounded by the configured timeout; a timed-out or
/// dropped connection is reported as indeterminate, never as a rejection.
pub struct HttpLedgerClient {
    base_url: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpLedgerClient {
    /// Create a client for the gateway at `endpoint`.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, LedgerError> {
        let base_url = Url::parse(endpoint)
            .map_err(|e| LedgerError::Rejected(format!("invalid ledger endpoint: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(LedgerError::Rejected(format!(
                "ledger endpoint cannot be a base URL: {}",
                endpoint
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Network(e.to_string()))?;
        Ok(Self {
            base_url,
            client,
            timeout,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn transport_error(&self, err: reqwest::Error) -> LedgerError {
        if err.is_timeout() {
            LedgerError::Timeout(self.timeout)
        } else {
            LedgerError::Network(err.to_string())
        }
    }

    async fn error_message(resp: reqwest::Response) -> String {
        let status = resp.status();
        match resp.json::<GatewayError>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        }
    }

    async fn get_optional<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
    ) -> Result<Option<T>, LedgerError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = Self::error_message(resp).await;
            return Err(classify_read_status(status, message));
        }
        let body = resp.json::<T>().await.map_err(|e| self.transport_error(e))?;
        Ok(Some(body))
    }
}

/// Map a non-success status of a write to a ledger error.
///
/// Server errors are indeterminate: the gateway may have relayed the
/// transaction before failing.
pub fn classify_write_status(status: StatusCode, message: String) -> LedgerError {
    match status {
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => LedgerError::Unauthorized(message),
        StatusCode::CONFLICT => LedgerError::Duplicate(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            LedgerError::Network(format!("gateway timeout: {}", message))
        }
        s if s.is_server_error() => LedgerError::Network(format!("HTTP {}: {}", s, message)),
        _ => LedgerError::Rejected(message),
    }
}

/// Map a non-success, non-404 status of a read to a ledger error.
pub fn classify_read_status(status: StatusCode, message: String) -> LedgerError {
    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        LedgerError::Network(format!("HTTP {}: {}", status, message))
    } else if status == StatusCode::FORBIDDEN || status == StatusCode::UNAUTHORIZED {
        LedgerError::Unauthorized(message)
    } else {
        LedgerError::Rejected(message)
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn issue(&self, request: IssueRequest) -> Result<IssueReceipt, LedgerError> {
        let resp = self
            .client
            .post(self.url(&["credentials"]))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = resp.status();
        if !status.is_success() {
            let message = Self::error_message(resp).await;
            return Err(classify_write_status(status, message));
        }
        // A success status with an unreadable body still means the write landed.
        resp.json::<IssueReceipt>()
            .await
            .map_err(|e| LedgerError::Network(format!("unreadable issue receipt: {}", e)))
    }

    async fn get_credential(
        &self,
        id: &CredentialId,
    ) -> Result<Option<CredentialRecord>, LedgerError> {
        self.get_optional(self.url(&["credentials", id.as_str()]))
            .await
    }

    async fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<CredentialRecord>, LedgerError> {
        let mut url = self.url(&["credentials"]);
        url.query_pairs_mut()
            .append_pair("idempotency_key", key.as_str());
        self.get_optional(url).await
    }

    async fn credentials_for_holder(
        &self,
        holder: &HolderId,
    ) -> Result<Vec<CredentialRecord>, LedgerError> {
        let records = self
            .get_optional::<Vec<CredentialRecord>>(
                self.url(&["holders", holder.as_str(), "credentials"]),
            )
            .await?;
        Ok(records.unwrap_or_default())
    }

    async fn is_authorized_issuer(&self, issuer: &IssuerId) -> Result<bool, LedgerError> {
        let resp = self
            .get_optional::<IssuerResponse>(self.url(&["issuers", issuer.as_str()]))
            .await?;
        Ok(resp.is_some_and(|r| r.authorized))
    }

    async fn revoke(&self, id: &CredentialId, issuer: &IssuerId) -> Result<(), LedgerError> {
        let resp = self
            .client
            .post(self.url(&["credentials", id.as_str(), "revoke"]))
            .json(&RevokeRequest { issuer })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(LedgerError::NotFound(id.clone()));
        }
        if !status.is_success() {
            let message = Self::error_message(resp).await;
            return Err(classify_write_status(status, message));
        }
        Ok(())
    }

    fn backend_id(&self) -> &str {
        "ledger-http"
    }
}
