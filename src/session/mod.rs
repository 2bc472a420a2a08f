//! Session controller: owns the running games.

use actix_rt::task::JoinHandle;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::game::engine::PositionEngine;
use crate::game::machine::{Control, SessionView, SharedView, TurnMachine};
use crate::gateway::GatewayFactory;
use crate::models::{GameRecord, SessionConfig, SessionId};

pub mod events;

pub use events::{Broadcaster, Event, EventEmitter, SessionEvent};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(SessionId),

    #[error("session {0} is already finished")]
    Finished(SessionId),
}

/// Finished sessions kept for reporting unless configured otherwise.
pub const DEFAULT_FINISHED_RETENTION: usize = 100;

struct SessionHandle {
    /// Start order, used to evict the oldest finished sessions first.
    started: u64,
    control: UnboundedSender<Control>,
    view: SharedView,
    task: Option<JoinHandle<GameRecord>>,
}

impl SessionHandle {
    fn view(&self) -> SessionView {
        self.view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

pub struct SessionController {
    engine: Arc<dyn PositionEngine>,
    gateways: Arc<dyn GatewayFactory>,
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
    events: Broadcaster,
    started: AtomicU64,
    finished_retention: usize,
}

impl SessionController {
    pub fn new(engine: Arc<dyn PositionEngine>, gateways: Arc<dyn GatewayFactory>) -> Self {
        Self {
            engine,
            gateways,
            sessions: Mutex::new(HashMap::new()),
            events: Broadcaster::new(),
            started: AtomicU64::new(0),
            finished_retention: DEFAULT_FINISHED_RETENTION,
        }
    }

    /// Keep at most `count` finished sessions; older ones are dropped when
    /// a new session starts. `reset` frees a session immediately.
    pub fn with_finished_retention(mut self, count: usize) -> Self {
        self.finished_retention = count;
        self
    }

    fn evict_finished(&self, sessions: &mut HashMap<SessionId, SessionHandle>) {
        let mut finished: Vec<(u64, SessionId)> = sessions
            .iter()
            .filter(|(_, handle)| handle.view().record.is_finished())
            .map(|(id, handle)| (handle.started, *id))
            .collect();
        if finished.len() <= self.finished_retention {
            return;
        }
        finished.sort_unstable();
        let excess = finished.len() - self.finished_retention;
        for (_, id) in finished.into_iter().take(excess) {
            sessions.remove(&id);
            debug!("Evicted finished session {}", id);
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn a new game on the current arbiter.
    pub fn start(&self, config: SessionConfig) -> SessionId {
        let id = Uuid::new_v4();
        let gateways = self.gateways.seat_gateways(&config.seats);
        let (control, control_rx) = mpsc::unbounded();
        let machine = TurnMachine::new(
            id,
            config,
            Arc::clone(&self.engine),
            gateways,
            control_rx,
            self.events.clone(),
        );
        let view = machine.shared_view();
        let task = actix_rt::spawn(machine.run());

        let mut sessions = self.sessions();
        self.evict_finished(&mut sessions);
        sessions.insert(
            id,
            SessionHandle {
                started: self.started.fetch_add(1, Ordering::Relaxed),
                control,
                view,
                task: Some(task),
            },
        );
        info!("Created session {}", id);
        id
    }

    fn send(&self, id: SessionId, control: Control) -> Result<(), SessionError> {
        let sessions = self.sessions();
        let handle = sessions.get(&id).ok_or(SessionError::NotFound(id))?;
        if handle.view().record.is_finished() {
            return Err(SessionError::Finished(id));
        }
        handle
            .control
            .unbounded_send(control)
            .map_err(|_| SessionError::Finished(id))
    }

    /// Request a pause. It takes effect at the next ply boundary.
    pub fn pause(&self, id: SessionId) -> Result<(), SessionError> {
        self.send(id, Control::Pause)
    }

    pub fn resume(&self, id: SessionId) -> Result<(), SessionError> {
        self.send(id, Control::Resume)
    }

    /// Stop the game. The record stays available until evicted or reset.
    pub fn cancel(&self, id: SessionId) -> Result<(), SessionError> {
        self.send(id, Control::Cancel)
    }

    /// Cancel the game, wait for it to end and forget it.
    pub async fn reset(&self, id: SessionId) -> Result<(), SessionError> {
        let handle = self.sessions().remove(&id).ok_or(SessionError::NotFound(id))?;
        // Finished machines have dropped their receiver
        let _ = handle.control.unbounded_send(Control::Cancel);
        if let Some(task) = handle.task {
            if let Err(err) = task.await {
                warn!("Session {} task failed: {}", id, err);
            }
        }
        info!("Reset session {}", id);
        Ok(())
    }

    pub fn snapshot(&self, id: SessionId) -> Result<SessionView, SessionError> {
        self.sessions()
            .get(&id)
            .map(SessionHandle::view)
            .ok_or(SessionError::NotFound(id))
    }

    pub fn list(&self) -> Vec<SessionView> {
        let mut views: Vec<SessionView> =
            self.sessions().values().map(SessionHandle::view).collect();
        views.sort_by_key(|view| view.record.id);
        views
    }

    /// Wait for a game to end and return its final record.
    pub async fn wait(&self, id: SessionId) -> Result<GameRecord, SessionError> {
        let task = {
            let mut sessions = self.sessions();
            let handle = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
            handle.task.take()
        };
        match task {
            Some(task) => match task.await {
                Ok(record) => Ok(record),
                Err(err) => {
                    warn!("Session {} task failed: {}", id, err);
                    self.snapshot(id).map(|view| view.record)
                }
            },
            None => self.snapshot(id).map(|view| view.record),
        }
    }

    /// Ordered stream of events from every session.
    pub fn subscribe(&self) -> UnboundedReceiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Cancel every session and wait for all of them.
    pub async fn shutdown(&self) {
        let handles: Vec<(SessionId, SessionHandle)> = self.sessions().drain().collect();
        info!("Shutting down {} session(s)", handles.len());
        for (id, handle) in handles {
            let _ = handle.control.unbounded_send(Control::Cancel);
            if let Some(task) = handle.task {
                if let Err(err) = task.await {
                    warn!("Session {} task failed: {}", id, err);
                }
            }
        }
    }
}
