//! Message-thread state model.
//!
//! Every mutating operation runs in two phases: a synchronous local append
//! (or in-place edit) followed by a gateway call whose result is applied to
//! the thread once it settles. Operations are serialized through an
//! operation lane so resolves land in invocation order. Each generation of
//! the thread gets a fresh lane, so work discarded by `reset` never holds up
//! later operations. `reset` and `snapshot` never wait on a lane.

use std::{
    future::Future,
    str::FromStr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};
use shared::domain::{Author, Identity, Message, MessageId};
use tokio::sync::{broadcast, Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::{
    error::{GatewayError, Notice, OperationKind, ThreadError},
    gateway::{AiGateway, AudioClip, FileUpload},
};

pub const WELCOME_MESSAGE: &str =
    "Hello! I'm your ALU Student Companion. How can I help you today?";
pub const VOICE_PLACEHOLDER: &str = "🎤 Voice message sent";
pub const TRANSCRIPTION_PREFIX: &str = "Transcription: ";
pub const FILE_PREFIX: &str = "📎 Analyzing: ";
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(60);

const EVENT_CAPACITY: usize = 256;

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> MessageId;
}

/// Hands out strictly increasing ids starting at 1.
#[derive(Debug)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> MessageId {
        MessageId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// What to do with a regenerated reply when the edited message has no
/// Assistant message directly after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanReplyPolicy {
    #[default]
    Discard,
    Insert,
}

impl FromStr for OrphanReplyPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "discard" => Ok(Self::Discard),
            "insert" => Ok(Self::Insert),
            other => Err(format!(
                "unknown orphan reply policy '{other}' (expected 'discard' or 'insert')"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThreadOptions {
    pub gateway_timeout: Duration,
    pub orphan_reply_policy: OrphanReplyPolicy,
}

impl Default for ThreadOptions {
    fn default() -> Self {
        Self {
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
            orphan_reply_policy: OrphanReplyPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadSnapshot {
    pub messages: Vec<Message>,
    pub awaiting_response: bool,
    pub generation: u64,
}

/// How a settled operation changed the thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Messages appended at the tail, in order.
    Appended(Vec<MessageId>),
    /// The Assistant message after an edited message was swapped in place.
    Replaced {
        previous: MessageId,
        replacement: MessageId,
    },
    /// A regenerated reply was inserted directly after the edited message.
    Inserted(MessageId),
    /// A regenerated reply had nothing to replace and was dropped.
    ReplyDropped,
    /// The thread was reset before the operation could apply its result.
    Discarded,
}

#[derive(Debug, Clone)]
pub enum ThreadEvent {
    Updated(ThreadSnapshot),
    Notice(Notice),
}

struct ThreadState {
    messages: Vec<Message>,
    awaiting_response: bool,
    generation: u64,
    /// Operations of this generation invoked but not yet settled.
    in_flight: usize,
    lane: Arc<AsyncMutex<()>>,
}

impl ThreadState {
    fn snapshot(&self) -> ThreadSnapshot {
        ThreadSnapshot {
            messages: self.messages.clone(),
            awaiting_response: self.awaiting_response,
            generation: self.generation,
        }
    }

    fn position(&self, id: MessageId) -> Option<usize> {
        self.messages.iter().position(|message| message.id == id)
    }
}

pub struct ThreadController {
    gateway: Arc<dyn AiGateway>,
    ids: Arc<dyn IdGenerator>,
    options: ThreadOptions,
    state: Mutex<ThreadState>,
    events: broadcast::Sender<ThreadEvent>,
}

/// Counts an operation as in flight from invocation until it is dropped,
/// including when the operation future is dropped mid-flight.
struct Ticket<'a> {
    controller: &'a ThreadController,
    generation: u64,
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        self.controller.settle(self.generation);
    }
}

/// An operation that holds its generation's lane.
struct Pending<'a> {
    ticket: Ticket<'a>,
    _permit: OwnedMutexGuard<()>,
}

impl ThreadController {
    pub fn new(gateway: Arc<dyn AiGateway>) -> Self {
        Self::new_with_dependencies(
            gateway,
            Arc::new(SequentialIds::default()),
            ThreadOptions::default(),
        )
    }

    pub fn new_with_dependencies(
        gateway: Arc<dyn AiGateway>,
        ids: Arc<dyn IdGenerator>,
        options: ThreadOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let welcome = Message::new(ids.next_id(), Author::Assistant, WELCOME_MESSAGE);
        Self {
            gateway,
            ids,
            options,
            state: Mutex::new(ThreadState {
                messages: vec![welcome],
                awaiting_response: false,
                generation: 0,
                in_flight: 0,
                lane: Arc::new(AsyncMutex::new(())),
            }),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ThreadEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> ThreadSnapshot {
        self.lock_state().snapshot()
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.lock_state().awaiting_response
    }

    /// Clears history down to a fresh welcome message. Resolves still in
    /// flight from before the reset are ignored when they settle, and new
    /// operations start on a fresh lane without waiting for them.
    pub fn reset(&self) {
        let snapshot = {
            let mut state = self.lock_state();
            state.generation += 1;
            state.awaiting_response = false;
            state.in_flight = 0;
            state.lane = Arc::new(AsyncMutex::new(()));
            state.messages = vec![self.new_message(Author::Assistant, WELCOME_MESSAGE)];
            state.snapshot()
        };
        info!(generation = snapshot.generation, "thread: reset");
        self.publish(snapshot);
    }

    pub async fn submit_text(
        &self,
        text: &str,
        identity: Option<&Identity>,
    ) -> Result<Resolution, ThreadError> {
        let kind = OperationKind::SendText;
        self.authorize(kind, identity)?;

        let Some((pending, user_id)) = self
            .begin(kind, |state| {
                Ok(self.append(state, Author::User, text))
            })
            .await?
        else {
            return Ok(Resolution::Discarded);
        };
        info!(message_id = %user_id, "thread: text submitted");

        let reply = self
            .call(self.gateway.complete(text))
            .await
            .map_err(|err| self.fail(kind, err.into()))?;

        Ok(self
            .resolve(&pending, |state| {
                Resolution::Appended(vec![self.append(state, Author::Assistant, reply)])
            })
            .unwrap_or(Resolution::Discarded))
    }

    pub async fn edit_and_regenerate(
        &self,
        id: MessageId,
        new_text: &str,
        identity: Option<&Identity>,
    ) -> Result<Resolution, ThreadError> {
        let kind = OperationKind::Edit;
        self.authorize(kind, identity)?;

        let Some((pending, ())) = self
            .begin(kind, |state| {
                let message = state
                    .messages
                    .iter_mut()
                    .find(|message| message.id == id)
                    .ok_or(ThreadError::NotFound(id))?;
                if !message.author.is_user() {
                    return Err(ThreadError::NotEditable(id));
                }
                message.content = new_text.to_string();
                Ok(())
            })
            .await?
        else {
            return Ok(Resolution::Discarded);
        };
        info!(message_id = %id, "thread: message edited, regenerating reply");

        let reply = self
            .call(self.gateway.complete(new_text))
            .await
            .map_err(|err| self.fail(kind, err.into()))?;

        let policy = self.options.orphan_reply_policy;
        let resolution = self
            .resolve(&pending, |state| {
                let Some(index) = state.position(id) else {
                    return Resolution::ReplyDropped;
                };
                let next = index + 1;
                let followed_by_reply = state
                    .messages
                    .get(next)
                    .is_some_and(|following| following.author == Author::Assistant);
                if followed_by_reply {
                    let replacement = self.new_message(Author::Assistant, reply);
                    let replacement_id = replacement.id;
                    let previous = std::mem::replace(&mut state.messages[next], replacement);
                    return Resolution::Replaced {
                        previous: previous.id,
                        replacement: replacement_id,
                    };
                }
                match policy {
                    OrphanReplyPolicy::Discard => Resolution::ReplyDropped,
                    OrphanReplyPolicy::Insert => {
                        let inserted = self.new_message(Author::Assistant, reply);
                        let inserted_id = inserted.id;
                        state.messages.insert(next, inserted);
                        Resolution::Inserted(inserted_id)
                    }
                }
            })
            .unwrap_or(Resolution::Discarded);

        if resolution == Resolution::ReplyDropped {
            debug!(message_id = %id, "thread: regenerated reply had no assistant message to replace");
        }
        Ok(resolution)
    }

    pub async fn submit_audio(
        &self,
        audio: &AudioClip,
        identity: Option<&Identity>,
    ) -> Result<Resolution, ThreadError> {
        let kind = OperationKind::Audio;
        self.authorize(kind, identity)?;

        let Some((pending, placeholder_id)) = self
            .begin(kind, |state| {
                Ok(self.append(state, Author::User, VOICE_PLACEHOLDER))
            })
            .await?
        else {
            return Ok(Resolution::Discarded);
        };
        info!(message_id = %placeholder_id, size_bytes = audio.bytes.len(), "thread: voice message submitted");

        let transcription = self
            .call(self.gateway.transcribe(audio))
            .await
            .map_err(|err| self.fail(kind, err.into()))?;

        let Some(transcript_id) = self.resolve(&pending, |state| {
            self.append(
                state,
                Author::User,
                format!("{TRANSCRIPTION_PREFIX}{transcription}"),
            )
        }) else {
            return Ok(Resolution::Discarded);
        };

        let reply = self
            .call(self.gateway.complete(&transcription))
            .await
            .map_err(|err| self.fail(kind, err.into()))?;

        Ok(self
            .resolve(&pending, |state| {
                let reply_id = self.append(state, Author::Assistant, reply);
                Resolution::Appended(vec![transcript_id, reply_id])
            })
            .unwrap_or(Resolution::Discarded))
    }

    /// The image/PDF allow-list is the caller's job; see
    /// [`crate::gateway::is_supported_upload`].
    pub async fn submit_file(
        &self,
        file: &FileUpload,
        identity: Option<&Identity>,
    ) -> Result<Resolution, ThreadError> {
        let kind = OperationKind::File;
        self.authorize(kind, identity)?;

        let Some((pending, user_id)) = self
            .begin(kind, |state| {
                Ok(self.append(
                    state,
                    Author::User,
                    format!("{FILE_PREFIX}{}", file.filename),
                ))
            })
            .await?
        else {
            return Ok(Resolution::Discarded);
        };
        info!(message_id = %user_id, filename = %file.filename, "thread: file submitted");

        let analysis = self
            .call(self.gateway.analyze_file(file))
            .await
            .map_err(|err| self.fail(kind, err.into()))?;

        Ok(self
            .resolve(&pending, |state| {
                Resolution::Appended(vec![self.append(state, Author::Assistant, analysis)])
            })
            .unwrap_or(Resolution::Discarded))
    }

    fn authorize(
        &self,
        kind: OperationKind,
        identity: Option<&Identity>,
    ) -> Result<(), ThreadError> {
        if identity.is_some() {
            return Ok(());
        }
        Err(self.fail(kind, ThreadError::Unauthorized))
    }

    /// Registers the operation, waits for its generation's lane, then applies
    /// the local mutation and raises the busy flag in one critical section.
    /// Returns `None` when the thread was reset after the operation was
    /// invoked.
    async fn begin<T>(
        &self,
        kind: OperationKind,
        local: impl FnOnce(&mut ThreadState) -> Result<T, ThreadError>,
    ) -> Result<Option<(Pending<'_>, T)>, ThreadError> {
        let (ticket, lane) = self.enter();
        let permit = lane.lock_owned().await;
        let (value, snapshot) = {
            let mut state = self.lock_state();
            if state.generation != ticket.generation {
                debug!(
                    operation = kind.as_str(),
                    invoked_at = ticket.generation,
                    current = state.generation,
                    "thread: operation invoked before reset, skipping"
                );
                return Ok(None);
            }
            let value = local(&mut *state).map_err(|err| self.fail(kind, err))?;
            state.awaiting_response = true;
            (value, state.snapshot())
        };
        self.publish(snapshot);
        Ok(Some((
            Pending {
                ticket,
                _permit: permit,
            },
            value,
        )))
    }

    fn enter(&self) -> (Ticket<'_>, Arc<AsyncMutex<()>>) {
        let mut state = self.lock_state();
        state.in_flight += 1;
        let ticket = Ticket {
            controller: self,
            generation: state.generation,
        };
        (ticket, Arc::clone(&state.lane))
    }

    /// Applies a gateway result unless the thread was reset in the meantime.
    fn resolve<T>(
        &self,
        pending: &Pending<'_>,
        apply: impl FnOnce(&mut ThreadState) -> T,
    ) -> Option<T> {
        let (value, snapshot) = {
            let mut state = self.lock_state();
            if state.generation != pending.ticket.generation {
                debug!(
                    generation = pending.ticket.generation,
                    current = state.generation,
                    "thread: dropping resolve for a reset thread"
                );
                return None;
            }
            let value = apply(&mut *state);
            (value, state.snapshot())
        };
        self.publish(snapshot);
        Some(value)
    }

    fn settle(&self, generation: u64) {
        let snapshot = {
            let mut state = self.lock_state();
            if state.generation != generation {
                return;
            }
            state.in_flight = state.in_flight.saturating_sub(1);
            if state.in_flight > 0 || !state.awaiting_response {
                return;
            }
            state.awaiting_response = false;
            state.snapshot()
        };
        self.publish(snapshot);
    }

    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        let limit = self.options.gateway_timeout;
        match tokio::time::timeout(limit, request).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(limit)),
        }
    }

    fn fail(&self, kind: OperationKind, err: ThreadError) -> ThreadError {
        warn!(operation = kind.as_str(), error = %err, "thread: operation failed");
        let _ = self
            .events
            .send(ThreadEvent::Notice(Notice::for_error(kind, &err)));
        err
    }

    fn append(
        &self,
        state: &mut ThreadState,
        author: Author,
        content: impl Into<String>,
    ) -> MessageId {
        let message = self.new_message(author, content);
        let id = message.id;
        state.messages.push(message);
        id
    }

    fn new_message(&self, author: Author, content: impl Into<String>) -> Message {
        Message::new(self.ids.next_id(), author, content)
    }

    fn lock_state(&self) -> MutexGuard<'_, ThreadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, snapshot: ThreadSnapshot) {
        let _ = self.events.send(ThreadEvent::Updated(snapshot));
    }
}

#[cfg(test)]
#[path = "tests/thread_tests.rs"]
mod tests;
