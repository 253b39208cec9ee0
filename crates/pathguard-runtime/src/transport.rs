//! Shared helpers for the HTTP adapters.

use reqwest::StatusCode;
use serde::Deserialize;

/// Longest response excerpt carried in an error message.
pub(crate) const MAX_ERROR_BODY: usize = 512;

/// Truncates `s` to at most `max` bytes on a char boundary.
pub(crate) fn truncate_for_error(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Gateway statuses mean the server is up but its upstream is not; they
/// are treated like a transport failure.
pub(crate) fn is_gateway_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Whether a failed answer means the server could not reach its upstream.
///
/// Besides the gateway statuses, the admin server reports a failed forward
/// to the agent as `500` with an error mentioning the network.
pub(crate) fn is_upstream_failure(status: StatusCode, envelope: &Envelope) -> bool {
    is_gateway_status(status)
        || (status == StatusCode::INTERNAL_SERVER_ERROR && envelope.mentions_network())
}

/// `{ "success": false, "error": "..." }` envelope used by the admin server
/// and the agent.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Envelope {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Envelope {
    /// Parses `body` leniently; anything that is not an envelope yields the
    /// default (no verdict).
    pub(crate) fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    /// Returns `true` only for an explicit `"success": false`.
    pub(crate) fn is_failure(&self) -> bool {
        self.success == Some(false)
    }

    fn mentions_network(&self) -> bool {
        self.error
            .as_deref()
            .is_some_and(|e| e.to_ascii_lowercase().contains("network"))
    }

    /// Best human-readable reason, falling back to a body excerpt.
    pub(crate) fn reason(&self, body: &str) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| truncate_for_error(body, MAX_ERROR_BODY).to_string())
    }
}
