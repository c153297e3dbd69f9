//! Error taxonomy for gateway calls and thread operations, plus the
//! user-facing notices derived from them.

use std::time::Duration;

use shared::domain::MessageId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("gateway returned status {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("gateway transport failure: {0}")]
    Transport(String),
    #[error("gateway call timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid gateway response: {0}")]
    Decode(String),
    #[error("invalid gateway url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl GatewayError {
    /// Transport failures and timeouts mean the backend could not be reached
    /// at all, as opposed to answering with an error.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, GatewayError::Transport(_) | GatewayError::Timeout(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThreadError {
    #[error("unauthorized: sign up before using the thread")]
    Unauthorized,
    #[error("message {0} not found")]
    NotFound(MessageId),
    #[error("message {0} is not a user message and cannot be edited")]
    NotEditable(MessageId),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    SendText,
    Edit,
    Audio,
    File,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::SendText => "send_text",
            OperationKind::Edit => "edit",
            OperationKind::Audio => "audio",
            OperationKind::File => "file",
        }
    }
}

/// Non-blocking report of a failed operation, meant to be shown once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub operation: OperationKind,
    pub text: String,
    pub error: ThreadError,
}

impl Notice {
    pub fn for_error(operation: OperationKind, error: &ThreadError) -> Self {
        let text = match error {
            ThreadError::Unauthorized => match operation {
                OperationKind::SendText => "Please sign up to send messages",
                OperationKind::Edit => "Please sign up to edit messages",
                OperationKind::Audio => "Please sign up to send voice messages",
                OperationKind::File => "Please sign up to upload files",
            }
            .to_string(),
            ThreadError::NotFound(_) => "That message is no longer part of the chat.".to_string(),
            ThreadError::NotEditable(_) => "Only your own messages can be edited.".to_string(),
            ThreadError::Gateway(gateway) => {
                let base = match operation {
                    OperationKind::SendText => "Failed to get AI response. Please try again.",
                    OperationKind::Edit => "Failed to regenerate AI response. Please try again.",
                    OperationKind::Audio => "Failed to process voice message. Please try again.",
                    OperationKind::File => "Failed to analyze file. Please try again.",
                };
                if gateway.is_unreachable() {
                    format!("{base} (AI service unreachable)")
                } else {
                    base.to_string()
                }
            }
        };

        Self {
            operation,
            text,
            error: error.clone(),
        }
    }
}
