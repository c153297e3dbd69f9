use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, Response,
};
use serde::de::DeserializeOwned;
use shared::{
    error::ApiError,
    protocol::{
        ChatRequest, CompletionResponse, HealthResponse, TranscriptionResponse, ANALYZE_FILE_FIELD,
        ANALYZE_PATH, CHAT_PATH, HEALTH_PATH, TRANSCRIBE_AUDIO_FIELD, TRANSCRIBE_AUDIO_FILENAME,
        TRANSCRIBE_PATH,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::error::GatewayError;

const DEFAULT_AUDIO_MIME: &str = "audio/webm";
const FALLBACK_FILE_MIME: &str = "application/octet-stream";

/// Remote AI backend consumed by the thread controller.
#[async_trait]
pub trait AiGateway: Send + Sync {
    async fn health(&self) -> bool;
    async fn complete(&self, text: &str) -> Result<String, GatewayError>;
    async fn analyze_file(&self, file: &FileUpload) -> Result<String, GatewayError>;
    async fn transcribe(&self, audio: &AudioClip) -> Result<String, GatewayError>;
}

#[derive(Debug, Clone)]
pub struct FileUpload {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AudioClip {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl AudioClip {
    pub fn webm(bytes: Vec<u8>) -> Self {
        Self {
            mime_type: DEFAULT_AUDIO_MIME.to_string(),
            bytes,
        }
    }
}

/// Uploads accepted for analysis: any image, or a PDF.
pub fn is_supported_upload(mime_type: &str) -> bool {
    let mime_type = mime_type.trim().to_ascii_lowercase();
    mime_type.starts_with("image/") || mime_type == "application/pdf"
}

/// Parses a gateway base URL, accepting only http(s) and dropping trailing
/// slashes so endpoint paths can be appended verbatim.
pub fn parse_base_url(raw: &str) -> Result<Url, GatewayError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let invalid = |reason: String| GatewayError::InvalidBaseUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(trimmed).map_err(|err| invalid(err.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

pub struct HttpGateway {
    http: Client,
    base_url: Url,
}

impl HttpGateway {
    pub fn new(base_url: &str) -> Result<Self, GatewayError> {
        Ok(Self::with_client(Client::new(), parse_base_url(base_url)?))
    }

    pub fn with_client(http: Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.as_str().trim_end_matches('/'))
    }
}

fn transport(err: reqwest::Error) -> GatewayError {
    GatewayError::Transport(err.to_string())
}

async fn read_json<T: DeserializeOwned>(res: Response) -> Result<T, GatewayError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        let detail = ApiError::detail_from_body(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
        return Err(GatewayError::Status {
            status: status.as_u16(),
            detail,
        });
    }
    res.json::<T>()
        .await
        .map_err(|err| GatewayError::Decode(err.to_string()))
}

#[async_trait]
impl AiGateway for HttpGateway {
    async fn health(&self) -> bool {
        let res = match self.http.get(self.endpoint(HEALTH_PATH)).send().await {
            Ok(res) => res,
            Err(err) => {
                warn!(error = %err, "gateway: health probe failed");
                return false;
            }
        };
        match read_json::<HealthResponse>(res).await {
            Ok(body) => body.is_healthy(),
            Err(err) => {
                warn!(error = %err, "gateway: health probe returned an unexpected body");
                false
            }
        }
    }

    async fn complete(&self, text: &str) -> Result<String, GatewayError> {
        debug!(chars = text.chars().count(), "gateway: requesting completion");
        let res = self
            .http
            .post(self.endpoint(CHAT_PATH))
            .json(&ChatRequest {
                message: text.to_string(),
            })
            .send()
            .await
            .map_err(transport)?;
        let body: CompletionResponse = read_json(res).await?;
        Ok(body.response)
    }

    async fn analyze_file(&self, file: &FileUpload) -> Result<String, GatewayError> {
        debug!(filename = %file.filename, size_bytes = file.bytes.len(), "gateway: uploading file for analysis");
        let mime = file.mime_type.as_deref().unwrap_or(FALLBACK_FILE_MIME);
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.filename.clone())
            .mime_str(mime)
            .map_err(transport)?;
        let res = self
            .http
            .post(self.endpoint(ANALYZE_PATH))
            .multipart(Form::new().part(ANALYZE_FILE_FIELD, part))
            .send()
            .await
            .map_err(transport)?;
        let body: CompletionResponse = read_json(res).await?;
        Ok(body.response)
    }

    async fn transcribe(&self, audio: &AudioClip) -> Result<String, GatewayError> {
        debug!(size_bytes = audio.bytes.len(), "gateway: uploading audio for transcription");
        let part = Part::bytes(audio.bytes.clone())
            .file_name(TRANSCRIBE_AUDIO_FILENAME)
            .mime_str(&audio.mime_type)
            .map_err(transport)?;
        let res = self
            .http
            .post(self.endpoint(TRANSCRIBE_PATH))
            .multipart(Form::new().part(TRANSCRIBE_AUDIO_FIELD, part))
            .send()
            .await
            .map_err(transport)?;
        let body: TranscriptionResponse = read_json(res).await?;
        body.into_text()
            .ok_or_else(|| GatewayError::Decode("transcription response carried no text".into()))
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
