//! Concrete rail adapters.

pub mod cardano;
pub mod evm;
pub mod stripe;

use crate::error::SettlementError;

/// Build an HTTP client with the adapter's request timeout.
pub(crate) fn http_client(rail: &str, timeout_secs: u64) -> Result<reqwest::Client, SettlementError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| SettlementError::http(rail, "client", e))
}

/// Read a response body as JSON, mapping 404 to `NotFound` and any other
/// non-success status to `ExternalService` carrying the body.
pub(crate) async fn read_json(
    rail: &str,
    reference: &str,
    response: reqwest::Response,
) -> Result<serde_json::Value, SettlementError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| SettlementError::http(rail, reference, e))?;

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(SettlementError::not_found(rail, reference));
    }
    if !status.is_success() {
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.pointer("/error/message")
                    .or_else(|| v.get("message"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or(body);
        return Err(SettlementError::external(
            rail,
            reference,
            format!("HTTP {}: {}", status.as_u16(), message),
        ));
    }

    serde_json::from_str(&body).map_err(|e| SettlementError::decode(rail, reference, e))
}
