//! Session manager for tracking generation sessions
//!
//! Each session owns its own controller, conversation and event channel.
//! This module handles:
//! - Creating sessions and looking them up by id
//! - Starting generation cycles in background tasks
//! - Cleaning up sessions that have been idle too long

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use instantcoder_engine::{
    EventError, EventSink, GenerationController, GenerationEvent, GenerationSession,
    MessageFormatter, Submission,
};
use instantcoder_inference::ModelBackend;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Events buffered per subscriber before it starts lagging
const EVENT_CAPACITY: usize = 256;

/// Event sink publishing to every SSE subscriber of a session
pub struct BroadcastEventSink {
    tx: broadcast::Sender<GenerationEvent>,
}

impl BroadcastEventSink {
    pub fn new(tx: broadcast::Sender<GenerationEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for BroadcastEventSink {
    fn send(&self, event: GenerationEvent) -> Result<(), EventError> {
        self.tx
            .send(event)
            .map(|_| ())
            .map_err(|_| EventError::channel_closed())
    }
}

/// State for a single session
pub struct SessionState {
    pub controller: Arc<GenerationController>,
    events: broadcast::Sender<GenerationEvent>,
    /// Background task running the current cycle
    task: Option<JoinHandle<()>>,
    pub last_accessed: Instant,
}

impl SessionState {
    fn new(controller: Arc<GenerationController>, events: broadcast::Sender<GenerationEvent>) -> Self {
        Self {
            controller,
            events,
            task: None,
            last_accessed: Instant::now(),
        }
    }

    /// Update the last accessed time
    pub fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }

    /// Check if this session is stale. A session with a cycle in flight
    /// never is.
    pub fn is_stale(&self, timeout: Duration) -> bool {
        !self.controller.status().is_busy() && self.last_accessed.elapsed() > timeout
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Manager for all generation sessions
pub struct SessionManager {
    sessions: RwLock<HashMap<Uuid, SessionState>>,
    backend: Arc<dyn ModelBackend>,
    formatter: MessageFormatter,
    default_model: String,
    stale_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        default_model: impl Into<String>,
        stale_timeout: Duration,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            backend,
            formatter: MessageFormatter::default(),
            default_model: default_model.into(),
            stale_timeout,
        }
    }

    /// Use `formatter` for every session created from now on
    pub fn with_formatter(mut self, formatter: MessageFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn backend(&self) -> &Arc<dyn ModelBackend> {
        &self.backend
    }

    /// Create a new session and return its id
    pub async fn create_session(&self) -> Uuid {
        let id = Uuid::new_v4();
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        let controller = GenerationController::new(Arc::clone(&self.backend), self.default_model.clone())
            .with_formatter(self.formatter.clone())
            .with_event_sink(Arc::new(BroadcastEventSink::new(tx.clone())));

        self.sessions
            .write()
            .await
            .insert(id, SessionState::new(Arc::new(controller), tx));

        log::info!("[sessions] Created session {}", id);
        id
    }

    /// Get a session's controller, updating its last accessed time
    pub async fn controller(&self, id: Uuid) -> Option<Arc<GenerationController>> {
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(&id).map(|state| {
            state.touch();
            Arc::clone(&state.controller)
        })
    }

    /// Subscribe to a session's events
    pub async fn subscribe(&self, id: Uuid) -> Option<broadcast::Receiver<GenerationEvent>> {
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(&id).map(|state| {
            state.touch();
            state.events.subscribe()
        })
    }

    /// Validate `submission` and run the cycle in the background.
    ///
    /// Returns the freshly started session; validation failures are
    /// returned synchronously and change nothing.
    pub async fn start_generation(&self, id: Uuid, submission: Submission) -> ApiResult<GenerationSession> {
        let mut sessions = self.sessions.write().await;
        let state = sessions
            .get_mut(&id)
            .ok_or_else(|| ApiError::session_not_found(id))?;
        state.touch();

        let pending = state.controller.begin(submission)?;
        let session = state.controller.session();
        let cycle_id = pending.session_id();
        state.task = Some(tokio::spawn(async move {
            match pending.run().await {
                Ok(artifact) => {
                    log::debug!("[sessions] Cycle {} produced {} bytes", cycle_id, artifact.len());
                }
                Err(e) => {
                    log::debug!("[sessions] Cycle {} ended with error: {}", cycle_id, e);
                }
            }
        }));

        Ok(session)
    }

    /// Remove a session, cancelling any cycle in flight
    pub async fn remove_session(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id);
        if removed.is_some() {
            log::info!("[sessions] Removed session {}", id);
        }
        removed.is_some()
    }

    /// Clean up stale sessions
    pub async fn cleanup_stale(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let stale_ids: Vec<Uuid> = sessions
            .iter()
            .filter(|(_, state)| state.is_stale(self.stale_timeout))
            .map(|(id, _)| *id)
            .collect();

        let count = stale_ids.len();
        for id in stale_ids {
            sessions.remove(&id);
            log::debug!("[sessions] Cleaned up stale session: {}", id);
        }

        count
    }

    /// Get the number of active sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub fn stale_timeout(&self) -> Duration {
        self.stale_timeout
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures_util::stream;
    use instantcoder_engine::Status;
    use instantcoder_inference::{BackendError, ByteStream, ChatMessage};

    /// Backend answering every call with the same text
    pub(crate) struct EchoBackend {
        pub reply: String,
    }

    #[async_trait]
    impl ModelBackend for EchoBackend {
        fn name(&self) -> &'static str {
            "Echo"
        }

        fn base_url(&self) -> &str {
            "memory://"
        }

        async fn health_check(&self) -> bool {
            true
        }

        async fn stream_chat(
            &self,
            _model_id: &str,
            _messages: Vec<ChatMessage>,
        ) -> Result<ByteStream, BackendError> {
            let chunks = vec![Ok(self.reply.clone().into_bytes())];
            Ok(Box::pin(stream::iter(chunks)))
        }
    }

    pub(crate) fn manager(timeout: Duration) -> SessionManager {
        let backend = Arc::new(EchoBackend {
            reply: "```tsx\nexport default function App() {}\n```".to_string(),
        });
        SessionManager::new(backend, "gemini-2.0-flash-exp", timeout)
    }

    async fn wait_for_terminal(rx: &mut broadcast::Receiver<GenerationEvent>) -> GenerationEvent {
        loop {
            let event = rx.recv().await.unwrap();
            if event.is_terminal() {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_create_and_remove() {
        let manager = manager(Duration::from_secs(60));
        let id = manager.create_session().await;
        assert_eq!(manager.session_count().await, 1);
        assert!(manager.controller(id).await.is_some());

        assert!(manager.remove_session(id).await);
        assert!(!manager.remove_session(id).await);
        assert!(manager.controller(id).await.is_none());
    }

    #[tokio::test]
    async fn test_generation_runs_in_background() {
        let manager = manager(Duration::from_secs(60));
        let id = manager.create_session().await;
        let mut rx = manager.subscribe(id).await.unwrap();

        let session = manager
            .start_generation(id, Submission::create("Build me a calculator app"))
            .await
            .unwrap();
        assert_eq!(session.status, Status::Creating);

        match wait_for_terminal(&mut rx).await {
            GenerationEvent::Completed { artifact, status, .. } => {
                assert_eq!(status, Status::Created);
                assert_eq!(artifact, "export default function App() {}");
            }
            other => panic!("expected completion, got {:?}", other),
        }

        let controller = manager.controller(id).await.unwrap();
        assert_eq!(controller.conversation().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_accepted_status_is_taken_before_cycle_runs() {
        let manager = manager(Duration::from_secs(60));
        for _ in 0..200 {
            let id = manager.create_session().await;
            let session = manager
                .start_generation(id, Submission::create("Build me a calculator app"))
                .await
                .unwrap();
            assert_eq!(session.status, Status::Creating);
        }
    }

    #[test]
    fn test_broadcast_sink_without_subscribers() {
        let (tx, rx) = broadcast::channel(4);
        let sink = BroadcastEventSink::new(tx);
        let event = GenerationEvent::Partial {
            session_id: Uuid::nil(),
            artifact: "export".to_string(),
        };

        drop(rx);
        let err = sink.send(event).unwrap_err();
        assert_eq!(err.message, "Channel closed");
    }

    #[tokio::test]
    async fn test_validation_error_is_synchronous() {
        let manager = manager(Duration::from_secs(60));
        let id = manager.create_session().await;

        let err = manager
            .start_generation(id, Submission::modify("add a toggle"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = manager
            .start_generation(Uuid::new_v4(), Submission::create("a clock"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cleanup_stale() {
        let manager = manager(Duration::from_millis(50));
        manager.create_session().await;
        manager.create_session().await;
        assert_eq!(manager.cleanup_stale().await, 0);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(manager.cleanup_stale().await, 2);
        assert_eq!(manager.session_count().await, 0);
    }
}
