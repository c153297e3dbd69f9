//! Client core for the student companion: the chat thread controller, the
//! AI gateway it talks to, and the signup gate in front of both.

pub mod error;
pub mod gateway;
pub mod identity;
pub mod prompts;
pub mod thread;

pub use error::{GatewayError, Notice, OperationKind, ThreadError};
pub use gateway::{is_supported_upload, AiGateway, AudioClip, FileUpload, HttpGateway};
pub use identity::{Session, SignupError, SignupPolicy};
pub use thread::{
    IdGenerator, OrphanReplyPolicy, Resolution, SequentialIds, ThreadController, ThreadEvent,
    ThreadOptions, ThreadSnapshot,
};
