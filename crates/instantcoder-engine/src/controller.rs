//! Generation controller
//!
//! Owns the lifecycle of one conversation: validates submissions, drives a
//! model call through the stream consumer, publishes partial artifacts and
//! commits the result to the conversation store.
//!
//! Submission is two-phase. [`GenerationController::begin`] validates and
//! transitions synchronously; [`PendingCycle::run`] performs the model call.
//! Dropping a pending cycle before it finishes reverts the controller as if
//! the transport had failed.

use std::sync::Arc;

use instantcoder_inference::ModelBackend;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::conversation::{Conversation, ConversationStore, Turn};
use crate::error::{GenerationError, Result, StreamFailure};
use crate::events::{EventSink, GenerationEvent, NullEventSink};
use crate::prompt::MessageFormatter;
use crate::sanitize::Sanitizer;
use crate::session::{GenerationRequest, GenerationSession, Mode, Status, Submission};
use crate::stream::StreamConsumer;

struct ControllerState {
    session: GenerationSession,
    /// Model of the last committed create; reused by every modify
    model_id: Option<String>,
}

/// Drives generation cycles for a single conversation
pub struct GenerationController {
    backend: Arc<dyn ModelBackend>,
    formatter: MessageFormatter,
    consumer: StreamConsumer,
    conversation: ConversationStore,
    events: Arc<dyn EventSink>,
    default_model: String,
    state: Mutex<ControllerState>,
}

impl GenerationController {
    /// Create a controller that sends creates without a model to `default_model`
    pub fn new(backend: Arc<dyn ModelBackend>, default_model: impl Into<String>) -> Self {
        Self {
            backend,
            formatter: MessageFormatter::default(),
            consumer: StreamConsumer::default(),
            conversation: ConversationStore::new(),
            events: Arc::new(NullEventSink),
            default_model: default_model.into(),
            state: Mutex::new(ControllerState {
                session: GenerationSession::idle(),
                model_id: None,
            }),
        }
    }

    pub fn with_formatter(mut self, formatter: MessageFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: Arc<dyn Sanitizer>) -> Self {
        self.consumer = StreamConsumer::new(sanitizer);
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Validate `submission` and start a cycle.
    ///
    /// Rejections leave every piece of state untouched and make no model
    /// call. On success the controller is busy until the returned cycle is
    /// run to completion or dropped.
    pub fn begin(self: &Arc<Self>, submission: Submission) -> Result<PendingCycle> {
        let intent = submission.intent.trim();
        if intent.is_empty() {
            return Err(match submission.mode {
                Mode::Create => GenerationError::EmptyIntent,
                Mode::Modify => GenerationError::EmptyModification,
            });
        }

        let (session_id, revert_to, request) = {
            let mut state = self.state.lock();
            let status = state.session.status;

            if status.is_busy() {
                return Err(GenerationError::Busy(status));
            }
            if submission.mode == Mode::Modify && !status.has_artifact() {
                return Err(GenerationError::NothingToModify);
            }

            let target_model_id = match submission.mode {
                Mode::Create => submission
                    .model_id
                    .filter(|model| !model.trim().is_empty())
                    .unwrap_or_else(|| self.default_model.clone()),
                Mode::Modify => state
                    .model_id
                    .clone()
                    .unwrap_or_else(|| self.default_model.clone()),
            };

            let committed = state.session.committed_artifact.clone();
            state.session = GenerationSession::begin(submission.mode, committed);

            let request = GenerationRequest {
                target_model_id,
                history: self.conversation.snapshot(),
                raw_intent: intent.to_string(),
                mode: submission.mode,
            };
            (state.session.id, status, request)
        };

        log::info!(
            "[controller] Cycle {} started: {:?} with model '{}' over {} turns",
            session_id,
            request.mode,
            request.target_model_id,
            request.history.len()
        );
        self.emit(GenerationEvent::CycleStarted {
            session_id,
            mode: request.mode,
            model_id: request.target_model_id.clone(),
        });

        Ok(PendingCycle {
            controller: Arc::clone(self),
            request,
            session_id,
            revert_to,
            finished: false,
        })
    }

    /// Validate, run and await one cycle
    pub async fn submit(self: &Arc<Self>, submission: Submission) -> Result<String> {
        self.begin(submission)?.run().await
    }

    pub fn status(&self) -> Status {
        self.state.lock().session.status
    }

    /// Copy of the current session
    pub fn session(&self) -> GenerationSession {
        self.state.lock().session.clone()
    }

    /// Snapshot of the committed conversation
    pub fn conversation(&self) -> Conversation {
        self.conversation.snapshot()
    }

    /// Model used by the last committed create
    pub fn model_id(&self) -> Option<String> {
        self.state.lock().model_id.clone()
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn backend(&self) -> &Arc<dyn ModelBackend> {
        &self.backend
    }

    fn publish_partial(&self, session_id: Uuid, artifact: &str) {
        {
            let mut state = self.state.lock();
            if state.session.id != session_id {
                return;
            }
            state.session.partial_artifact.clear();
            state.session.partial_artifact.push_str(artifact);
        }
        self.emit(GenerationEvent::Partial {
            session_id,
            artifact: artifact.to_string(),
        });
    }

    fn emit(&self, event: GenerationEvent) {
        if let Err(e) = self.events.send(event) {
            log::debug!("[controller] Dropped event: {}", e);
        }
    }
}

/// A validated cycle waiting to call the model
#[must_use = "a pending cycle does nothing until run; dropping it reverts the controller"]
pub struct PendingCycle {
    controller: Arc<GenerationController>,
    request: GenerationRequest,
    session_id: Uuid,
    revert_to: Status,
    finished: bool,
}

impl PendingCycle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }

    /// Call the model, stream the response and commit it.
    ///
    /// Returns the committed artifact. Any failure reverts the controller
    /// to the stable state it was in before [`GenerationController::begin`].
    pub async fn run(mut self) -> Result<String> {
        let controller = Arc::clone(&self.controller);
        let session_id = self.session_id;
        let messages = controller.formatter.compose(
            &self.request.history,
            &self.request.raw_intent,
            self.request.mode,
        );

        let stream = match controller
            .backend
            .stream_chat(&self.request.target_model_id, messages)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                let err = GenerationError::Invoke(e);
                self.fail(&err);
                return Err(err);
            }
        };

        let result = controller
            .consumer
            .consume(stream, |partial| controller.publish_partial(session_id, partial))
            .await;

        match result {
            Ok(artifact) => {
                self.commit(&artifact);
                Ok(artifact)
            }
            Err(failure) => {
                let err = GenerationError::Stream(failure);
                self.fail(&err);
                Err(err)
            }
        }
    }

    fn commit(&mut self, artifact: &str) {
        self.finished = true;
        let controller = &self.controller;
        let mode = self.request.mode;
        let turns = [
            Turn::user(self.request.raw_intent.clone()),
            Turn::assistant(artifact),
        ];

        let status = {
            let mut state = controller.state.lock();
            match mode {
                Mode::Create => {
                    controller.conversation.replace_all(turns.into());
                    state.model_id = Some(self.request.target_model_id.clone());
                }
                Mode::Modify => controller.conversation.extend(turns),
            }

            let session = &mut state.session;
            session.status = mode.done_status();
            session.partial_artifact.clear();
            session.committed_artifact = Some(artifact.to_string());
            session.status
        };

        log::info!(
            "[controller] Cycle {} completed ({} bytes), status {}",
            self.session_id,
            artifact.len(),
            status
        );
        controller.emit(GenerationEvent::Completed {
            session_id: self.session_id,
            status,
            artifact: artifact.to_string(),
        });
    }

    fn fail(&mut self, err: &GenerationError) {
        self.finished = true;
        let controller = &self.controller;

        {
            let mut state = controller.state.lock();
            if state.session.id == self.session_id {
                let session = &mut state.session;
                session.status = self.revert_to;
                session.partial_artifact.clear();
                session.error = Some(err.to_string());
            }
        }

        log::warn!(
            "[controller] Cycle {} failed, reverted to {}: {}",
            self.session_id,
            self.revert_to,
            err
        );
        controller.emit(GenerationEvent::Failed {
            session_id: self.session_id,
            status: self.revert_to,
            kind: err.kind(),
            error: err.to_string(),
        });
    }
}

impl Drop for PendingCycle {
    fn drop(&mut self) {
        if !self.finished {
            let err = GenerationError::Stream(StreamFailure::Transport {
                message: "generation cancelled".to_string(),
                partial: String::new(),
            });
            self.fail(&err);
        }
    }
}
