//! Session-bound connection lifecycle controller.
//!
//! The controller keeps the live connection in lock-step with the
//! current session: a session appearing triggers an acquire, a session
//! disappearing (logout) or controller teardown triggers a release, and
//! a token change interrupts any reconnect loop still retrying the old
//! token. Session transitions are processed strictly sequentially by a
//! single task, so two transitions can never race on the registry's
//! single-handle slot.
//!
//! Consumers read a [`ConnectionView`] published on a watch channel; the
//! view is replaced wholesale, so `connected == true` with no handle is
//! unrepresentable at any observable instant.

use std::sync::Arc;

use praxis_core::Session;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::handle::{ConnectionHandle, TransportPhase};
use crate::registry::ConnectionRegistry;

/// Lifecycle state as exposed to consumers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    /// No session, no connection.
    Idle,
    /// Acquire in flight for the current session.
    Connecting,
    /// Connection established and healthy.
    Open,
    /// Connection dropped; the bounded retry loop is re-handshaking.
    Reconnecting,
    /// Terminal for this connection instance: the handshake was rejected
    /// or the retry budget is exhausted. Cleared by the next session
    /// transition.
    Closed,
}

/// Consistent snapshot of the connection surface.
#[derive(Clone, Debug)]
pub struct ConnectionView {
    /// Current connection handle, if any.
    pub connection: Option<Arc<ConnectionHandle>>,
    /// True iff the connection's transport phase is open.
    pub connected: bool,
    /// Derived lifecycle state.
    pub state: LinkState,
}

impl ConnectionView {
    fn idle() -> Self {
        Self {
            connection: None,
            connected: false,
            state: LinkState::Idle,
        }
    }

    fn detached(state: LinkState) -> Self {
        Self {
            connection: None,
            connected: false,
            state,
        }
    }

    fn of_handle(handle: &Arc<ConnectionHandle>) -> Self {
        let state = match handle.phase() {
            TransportPhase::Connecting => LinkState::Connecting,
            TransportPhase::Open => LinkState::Open,
            TransportPhase::Reconnecting => LinkState::Reconnecting,
            TransportPhase::Closed => LinkState::Closed,
        };
        Self {
            connection: Some(handle.clone()),
            connected: state == LinkState::Open,
            state,
        }
    }
}

/// Owns the connection's lifetime relative to auth state.
pub struct LifecycleController {
    view_rx: watch::Receiver<ConnectionView>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl LifecycleController {
    /// Start the controller over `registry`, driven by session
    /// transitions from `sessions`.
    ///
    /// The session present at spawn time is processed as the first
    /// transition.
    #[must_use]
    pub fn spawn(
        registry: Arc<ConnectionRegistry>,
        sessions: watch::Receiver<Option<Session>>,
    ) -> Self {
        let (view_tx, view_rx) = watch::channel(ConnectionView::idle());
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run(registry, sessions, view_tx, shutdown.clone()));
        Self {
            view_rx,
            shutdown,
            task,
        }
    }

    /// Subscribe to the connection view.
    #[must_use]
    pub fn view(&self) -> watch::Receiver<ConnectionView> {
        self.view_rx.clone()
    }

    /// Current connected flag snapshot.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.view_rx.borrow().connected
    }

    /// Tear the controller down: release the connection (even one still
    /// connecting) and stop the task. Same observable effect as logout.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.task.await;
    }
}

struct LoopState {
    registry: Arc<ConnectionRegistry>,
    sessions: watch::Receiver<Option<Session>>,
    view_tx: watch::Sender<ConnectionView>,
    shutdown: CancellationToken,
    /// Incremented per transition; an acquire resolving under a newer
    /// generation is released, never adopted.
    generation: u64,
    handle: Option<Arc<ConnectionHandle>>,
    phase_rx: Option<watch::Receiver<TransportPhase>>,
}

async fn run(
    registry: Arc<ConnectionRegistry>,
    sessions: watch::Receiver<Option<Session>>,
    view_tx: watch::Sender<ConnectionView>,
    shutdown: CancellationToken,
) {
    let mut state = LoopState {
        registry,
        sessions,
        view_tx,
        shutdown,
        generation: 0,
        handle: None,
        phase_rx: None,
    };

    // The session present at spawn time counts as the first transition.
    let initial = state.sessions.borrow_and_update().clone();
    state.apply_transition(initial).await;

    while !state.shutdown.is_cancelled() {
        tokio::select! {
            () = state.shutdown.cancelled() => break,
            changed = state.sessions.changed() => {
                if changed.is_err() {
                    // Session source dropped; nothing can transition again.
                    break;
                }
                let session = state.sessions.borrow_and_update().clone();
                state.apply_transition(session).await;
            }
            phase = watch_phase(&mut state.phase_rx) => {
                match phase {
                    Ok(()) => state.publish_from_handle(),
                    Err(_) => state.phase_rx = None,
                }
            }
        }
    }

    // Teardown: never leak a connection past the controller's lifetime.
    state.registry.release();
    let _ = state.view_tx.send_replace(ConnectionView::idle());
    debug!("lifecycle controller stopped");
}

/// Await the next phase change, pending forever when no handle is held.
async fn watch_phase(
    phase_rx: &mut Option<watch::Receiver<TransportPhase>>,
) -> Result<(), watch::error::RecvError> {
    match phase_rx {
        Some(rx) => rx.changed().await,
        None => std::future::pending().await,
    }
}

impl LoopState {
    /// Process one session transition. Runs to completion before the
    /// next transition is looked at.
    async fn apply_transition(&mut self, session: Option<Session>) {
        self.generation += 1;
        let generation = self.generation;

        let Some(session) = session else {
            if self.handle.is_some() || self.registry.current().is_some() {
                info!("session gone, releasing connection");
            }
            self.registry.release();
            self.handle = None;
            self.phase_rx = None;
            let _ = self.view_tx.send_replace(ConnectionView::idle());
            return;
        };

        let token = session.access_token;
        if let Some(current) = &self.handle {
            if current.phase() != TransportPhase::Closed && current.token() == token {
                // Already connecting/open for this token.
                return;
            }
            // Token changed or the handle is terminal: the retry loop must
            // not keep presenting a stale token.
            debug!(connection = %current.id(), "superseding connection");
            self.registry.release();
            self.handle = None;
            self.phase_rx = None;
        }

        let _ = self
            .view_tx
            .send_replace(ConnectionView::detached(LinkState::Connecting));

        match self.registry.acquire(&token).await {
            Ok(handle) => {
                // The world may have moved on while the handshake was in
                // flight: teardown, logout, or a newer token.
                let current_token = self
                    .sessions
                    .borrow()
                    .as_ref()
                    .map(|s| s.access_token.clone());
                let stale = self.shutdown.is_cancelled()
                    || self.generation != generation
                    || current_token.as_deref() != Some(handle.token());
                if stale {
                    debug!(connection = %handle.id(), "discarding stale connect result");
                    handle.close();
                    self.registry.release();
                    self.handle = None;
                    self.phase_rx = None;
                    let _ = self.view_tx.send_replace(ConnectionView::idle());
                    return;
                }

                self.phase_rx = Some(handle.watch_phase());
                self.handle = Some(handle);
                self.publish_from_handle();
            }
            Err(e) => {
                warn!(error = %e, "connection acquisition failed");
                let _ = self
                    .view_tx
                    .send_replace(ConnectionView::detached(LinkState::Closed));
            }
        }
    }

    fn publish_from_handle(&mut self) {
        let view = match &self.handle {
            Some(handle) => ConnectionView::of_handle(handle),
            None => ConnectionView::idle(),
        };
        let _ = self.view_tx.send_replace(view);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
