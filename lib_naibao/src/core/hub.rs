//! # Session Hub
//!
//! The `Hub` is the single owner of all live realtime sessions. It runs as one
//! task and processes register, unregister and broadcast commands strictly in
//! the order they were sent, so every broadcast sees a consistent session set
//! and messages for one baby reach each session in submission order.
//!
//! ## Queue ownership
//!
//! Each session's outbound queue is a bounded `mpsc` channel whose only sender
//! lives inside the hub. Removing a session drops that sender, which closes
//! the queue. A session can therefore be closed at most once, and a second
//! unregister finds nothing to remove.
//!
//! ## Backpressure
//!
//! Fan-out uses `try_send`. A recipient whose queue is full is removed on the
//! spot instead of blocking the broadcast or buffering without bound.

use crate::models::{BabyId, UserId};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Identifier of one live session.
pub type SessionId = u64;

/// Which sessions a broadcast reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastTarget {
    /// Sessions subscribed to this baby.
    Baby(BabyId),
    /// Every session. Administrative use only.
    All,
}

impl BroadcastTarget {
    fn matches(&self, baby_id: BabyId) -> bool {
        match self {
            BroadcastTarget::Baby(target) => *target == baby_id,
            BroadcastTarget::All => true,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("hub is not running")]
    Closed,
}

#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Pending commands before senders wait.
    pub command_capacity: usize,
    /// Outbound queue length per session.
    pub session_queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_capacity: 1024,
            session_queue_capacity: 256,
        }
    }
}

/// The hub's side of a session.
struct SessionEntry {
    user_id: UserId,
    baby_id: BabyId,
    outbound: mpsc::Sender<Bytes>,
}

/// The session's side of a registration.
#[derive(Debug)]
pub struct SessionRegistration {
    pub id: SessionId,
    pub user_id: UserId,
    pub baby_id: BabyId,
    /// Closed by the hub when the session is removed.
    pub outbound: mpsc::Receiver<Bytes>,
}

enum HubCommand {
    Register {
        id: SessionId,
        entry: SessionEntry,
        ack: oneshot::Sender<()>,
    },
    Unregister {
        id: SessionId,
        ack: oneshot::Sender<bool>,
    },
    Broadcast {
        target: BroadcastTarget,
        payload: Bytes,
    },
    Count {
        target: BroadcastTarget,
        responder: oneshot::Sender<usize>,
    },
}

/// Cloneable handle to the hub task.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::Sender<HubCommand>,
    next_id: Arc<AtomicU64>,
    session_queue_capacity: usize,
}

impl Hub {
    /// Starts the coordination task. It runs until `shutdown` is cancelled or
    /// every handle is dropped; stopping drops all sessions, closing their
    /// queues.
    pub fn spawn(config: HubConfig, shutdown: CancellationToken) -> (Hub, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.command_capacity.max(1));
        let hub = Hub {
            commands: tx,
            next_id: Arc::new(AtomicU64::new(1)),
            session_queue_capacity: config.session_queue_capacity.max(1),
        };
        let task = tokio::spawn(run(rx, shutdown));
        (hub, task)
    }

    async fn send(&self, command: HubCommand) -> Result<(), HubError> {
        self.commands.send(command).await.map_err(|_| HubError::Closed)
    }

    /// Adds a new session subscribed to `baby_id` and returns its queue.
    ///
    /// Authorization must already have happened; the hub never rejects.
    pub async fn register(&self, user_id: UserId, baby_id: BabyId) -> Result<SessionRegistration, HubError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (outbound_tx, outbound_rx) = mpsc::channel(self.session_queue_capacity);
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(HubCommand::Register {
            id,
            entry: SessionEntry {
                user_id,
                baby_id,
                outbound: outbound_tx,
            },
            ack: ack_tx,
        })
        .await?;
        ack_rx.await.map_err(|_| HubError::Closed)?;
        Ok(SessionRegistration {
            id,
            user_id,
            baby_id,
            outbound: outbound_rx,
        })
    }

    /// Removes a session and closes its queue. Returns false when it was
    /// already gone, which is not an error.
    pub async fn unregister(&self, id: SessionId) -> Result<bool, HubError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(HubCommand::Unregister { id, ack: ack_tx }).await?;
        ack_rx.await.map_err(|_| HubError::Closed)
    }

    /// Queues `payload` for fan-out. Returns once the hub has accepted it;
    /// delivery to each session is best effort.
    pub async fn broadcast(&self, target: BroadcastTarget, payload: impl Into<Bytes>) -> Result<(), HubError> {
        self.send(HubCommand::Broadcast {
            target,
            payload: payload.into(),
        })
        .await
    }

    pub async fn broadcast_to_baby(&self, baby_id: BabyId, payload: impl Into<Bytes>) -> Result<(), HubError> {
        self.broadcast(BroadcastTarget::Baby(baby_id), payload).await
    }

    /// Live sessions matching `target`, as seen after every earlier command.
    pub async fn session_count(&self, target: BroadcastTarget) -> Result<usize, HubError> {
        let (tx, rx) = oneshot::channel();
        self.send(HubCommand::Count { target, responder: tx }).await?;
        rx.await.map_err(|_| HubError::Closed)
    }
}

async fn run(mut commands: mpsc::Receiver<HubCommand>, shutdown: CancellationToken) {
    let mut sessions: HashMap<SessionId, SessionEntry> = HashMap::new();
    info!("realtime hub started");

    loop {
        let command = tokio::select! {
            _ = shutdown.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        match command {
            HubCommand::Register { id, entry, ack } => {
                debug!(session = id, user = entry.user_id, baby = entry.baby_id, "session registered");
                sessions.insert(id, entry);
                info!(total = sessions.len(), "client connected");
                let _ = ack.send(());
            }
            HubCommand::Unregister { id, ack } => {
                let removed = sessions.remove(&id).is_some();
                if removed {
                    info!(session = id, total = sessions.len(), "client disconnected");
                }
                let _ = ack.send(removed);
            }
            HubCommand::Broadcast { target, payload } => {
                fan_out(&mut sessions, target, payload);
            }
            HubCommand::Count { target, responder } => {
                let count = sessions.values().filter(|s| target.matches(s.baby_id)).count();
                let _ = responder.send(count);
            }
        }
    }

    info!(open = sessions.len(), "realtime hub stopped");
}

fn fan_out(sessions: &mut HashMap<SessionId, SessionEntry>, target: BroadcastTarget, payload: Bytes) {
    let mut delivered = 0usize;
    let mut dead = Vec::new();

    for (id, session) in sessions.iter() {
        if !target.matches(session.baby_id) {
            continue;
        }
        match session.outbound.try_send(payload.clone()) {
            Ok(()) => delivered += 1,
            Err(TrySendError::Full(_)) => {
                warn!(session = *id, user = session.user_id, "outbound queue full, dropping slow session");
                dead.push(*id);
            }
            Err(TrySendError::Closed(_)) => {
                debug!(session = *id, "outbound queue already closed");
                dead.push(*id);
            }
        }
    }

    for id in &dead {
        sessions.remove(id);
    }
    debug!(?target, delivered, dropped = dead.len(), "broadcast fanned out");
}
