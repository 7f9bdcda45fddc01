use std::future::Future;
use std::time::Duration;

use skillcred_ledger::LedgerError;

/// Bound a ledger call. Running out of time is indeterminate, like a
/// dropped connection.
pub(crate) async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, LedgerError>>,
) -> Result<T, LedgerError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::Timeout(limit)),
    }
}
