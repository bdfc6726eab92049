use log::*;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;

use crate::GatewayError;

/// Send a prepared request and decode a JSON response. Network faults and non-2xx responses become
/// [`GatewayError::Upstream`]; a 2xx body that does not decode becomes [`GatewayError::MalformedResponse`].
pub(crate) async fn send_json<T: DeserializeOwned>(gateway: &str, req: RequestBuilder) -> Result<T, GatewayError> {
    let response = req.send().await.map_err(|e| {
        warn!("💳️ [{gateway}] Request failed before a response was received. {e}");
        GatewayError::Upstream(e.to_string())
    })?;
    let status = response.status();
    if status.is_success() {
        trace!("💳️ [{gateway}] Request successful. {status}");
        response.json::<T>().await.map_err(|e| GatewayError::MalformedResponse(e.to_string()))
    } else {
        let message = response.text().await.unwrap_or_default();
        let message: String = message.chars().take(200).collect();
        warn!("💳️ [{gateway}] Request failed with status {status}. {message}");
        Err(GatewayError::Upstream(format!("HTTP {}: {message}", status.as_u16())))
    }
}
