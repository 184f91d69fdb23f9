use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    services::{
        providers::{ExternalQuestionGenerator, FreeTextInterpreter},
        EngineConfig, FeedbackStore, Session, ShareStore, Snapshot,
    },
};

const DEFAULT_FREE_TEXT_MAX_CHARS: usize = 250;

/// A live session and when a request last reached it
pub struct SessionEntry {
    pub session: Arc<Mutex<Session>>,
    pub last_seen: Instant,
}

/// Shared application state
///
/// The snapshot is read-only and shared by every session. Each session sits
/// behind its own mutex so calls on one session are serialised.
#[derive(Clone)]
pub struct AppState {
    pub snapshot: Arc<Snapshot>,
    pub engine: EngineConfig,
    pub free_text_max_chars: usize,
    pub sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
    pub interpreter: Option<Arc<dyn FreeTextInterpreter>>,
    pub generator: Option<Arc<dyn ExternalQuestionGenerator>>,
    pub shares: Option<ShareStore>,
    pub feedback: Option<FeedbackStore>,
}

impl AppState {
    /// State with no collaborators, no sharing and no feedback storage
    pub fn new(snapshot: Arc<Snapshot>, engine: EngineConfig) -> Self {
        Self {
            snapshot,
            engine,
            free_text_max_chars: DEFAULT_FREE_TEXT_MAX_CHARS,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            interpreter: None,
            generator: None,
            shares: None,
            feedback: None,
        }
    }

    pub fn with_interpreter(mut self, interpreter: Arc<dyn FreeTextInterpreter>) -> Self {
        self.interpreter = Some(interpreter);
        self
    }

    /// Enables external questions for sessions created from now on
    pub fn with_generator(mut self, generator: Arc<dyn ExternalQuestionGenerator>) -> Self {
        self.generator = Some(generator);
        self.engine.external_questions = true;
        self
    }

    pub fn with_shares(mut self, shares: ShareStore) -> Self {
        self.shares = Some(shares);
        self
    }

    pub fn with_feedback(mut self, feedback: FeedbackStore) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn with_free_text_max_chars(mut self, max_chars: usize) -> Self {
        self.free_text_max_chars = max_chars;
        self
    }

    pub fn new_session(&self, seed: Option<u64>) -> Session {
        let snapshot = Arc::clone(&self.snapshot);
        match seed {
            Some(seed) => Session::with_seed(snapshot, self.engine.clone(), seed),
            None => Session::new(snapshot, self.engine.clone()),
        }
    }

    pub async fn insert(&self, session: Session) -> Uuid {
        let id = session.id();
        let entry = SessionEntry {
            session: Arc::new(Mutex::new(session)),
            last_seen: Instant::now(),
        };
        self.sessions.write().await.insert(id, entry);
        id
    }

    /// Looks up a session and marks it as recently used
    pub async fn session(&self, id: Uuid) -> AppResult<Arc<Mutex<Session>>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id)))?;
        entry.last_seen = Instant::now();
        Ok(Arc::clone(&entry.session))
    }

    pub async fn remove(&self, id: Uuid) -> AppResult<Arc<Mutex<Session>>> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|entry| entry.session)
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id)))
    }

    /// Drops sessions no request has reached for at least `idle`
    ///
    /// A request already holding an evicted session finishes normally; the
    /// session is freed once that request lets go of it.
    pub async fn evict_idle(&self, idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_seen.elapsed() < idle);
        let evicted = before - sessions.len();

        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "Idle sessions evicted");
        }

        evicted
    }

    /// Spawns a task that evicts idle sessions every `every`
    pub fn spawn_session_sweeper(&self, every: Duration, idle: Duration) -> JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                state.evict_idle(idle).await;
            }
        })
    }
}
