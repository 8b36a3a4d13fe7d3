use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::models::Credentials;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl ConnectionResult {
    fn failed(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self {
            success: false,
            message: message.into(),
            status_code,
        }
    }
}

/// Judges a login response: only a 200 whose body mentions neither "error" nor
/// "invalid" counts as accepted.
pub fn classify_response(status: StatusCode, body: &str) -> ConnectionResult {
    if status != StatusCode::OK {
        return ConnectionResult::failed(format!("Connection failed: HTTP {}", status.as_u16()), Some(status.as_u16()));
    }

    let body = body.to_lowercase();
    if body.contains("error") || body.contains("invalid") {
        return ConnectionResult::failed("Invalid credentials", Some(status.as_u16()));
    }

    ConnectionResult {
        success: true,
        message: "Connected to the target site".to_string(),
        status_code: Some(status.as_u16()),
    }
}

/// Quick credential check without a browser: posts the login form to the site URL.
/// Never fails; transport problems are reported in the result.
pub async fn test_connection(
    credentials: &Credentials,
    timeout: Duration,
    accept_invalid_certs: bool,
) -> ConnectionResult {
    let client = match reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .user_agent(USER_AGENT)
        .build()
    {
        Ok(client) => client,
        Err(e) => return ConnectionResult::failed(format!("Connection error: {e}"), None),
    };

    let form = [
        ("username", credentials.login.as_str()),
        ("password", credentials.password.as_str()),
    ];

    let response = match client.post(&credentials.site_url).form(&form).send().await {
        Ok(response) => response,
        Err(e) if e.is_timeout() => {
            warn!(site = %credentials.site_url, "connection test timed out");
            return ConnectionResult::failed("Timeout: the site did not respond", None);
        }
        Err(e) => {
            warn!(site = %credentials.site_url, error = %e, "connection test failed");
            return ConnectionResult::failed(format!("Connection error: {e}"), None);
        }
    };

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let result = classify_response(status, &body);

    info!(
        site = %credentials.site_url,
        status = status.as_u16(),
        success = result.success,
        "🔌 Connection test finished"
    );
    result
}
