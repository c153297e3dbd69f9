use serde::{Deserialize, Serialize};

/// Error body returned by the AI backend on non-success statuses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub detail: Option<String>,
}

impl ApiError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
        }
    }

    /// Best-effort extraction of `detail` from a raw response body.
    pub fn detail_from_body(body: &str) -> Option<String> {
        serde_json::from_str::<ApiError>(body)
            .ok()
            .and_then(|err| err.detail)
            .map(|detail| detail.trim().to_string())
            .filter(|detail| !detail.is_empty())
    }
}
