use serde::{Deserialize, Serialize};

pub const CHAT_PATH: &str = "/chat";
pub const ANALYZE_PATH: &str = "/analyze";
pub const TRANSCRIBE_PATH: &str = "/transcribe";
pub const HEALTH_PATH: &str = "/health";

pub const ANALYZE_FILE_FIELD: &str = "file";
pub const TRANSCRIBE_AUDIO_FIELD: &str = "audio";
pub const TRANSCRIBE_AUDIO_FILENAME: &str = "recording.webm";

pub const HEALTHY_STATUS: &str = "healthy";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    #[serde(default)]
    pub transcription: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
}

impl TranscriptionResponse {
    /// The backend returns both the recognized text and an LLM answer to it;
    /// the recognized text wins when present.
    pub fn into_text(self) -> Option<String> {
        self.transcription
            .filter(|text| !text.trim().is_empty())
            .or(self.response)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.status == HEALTHY_STATUS
    }
}
