//! Fixtures shared by the cross-module tests under `tests/`.
//!
//! A [`Stack`] is the whole backend over an in-memory store, wired the way the
//! server binary wires it. A [`Client`] is a session pumped over in-process
//! channels instead of a socket.

use chrono::Duration as Days;
use futures_channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use futures_util::StreamExt;
use lib_naibao::connections::MemoryStore;
use lib_naibao::core::{
    EventEnvelope, EventPublisher, Frame, Hub, HubConfig, Session, SessionConfig, SessionId, SessionTasks,
};
use lib_naibao::models::{BabyId, NewBaby, UserId};
use lib_naibao::services::{ServiceContext, Services};
use lib_naibao::utils::CivilClock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct Stack {
    pub store: Arc<MemoryStore>,
    pub hub: Hub,
    pub services: Services,
    pub clock: CivilClock,
    pub shutdown: CancellationToken,
}

/// A running backend. `operators` may administer reference standards.
pub fn stack(operators: &[UserId]) -> Stack {
    let store = Arc::new(MemoryStore::new());
    let clock = CivilClock::default();
    let shutdown = CancellationToken::new();
    let (hub, _task) = Hub::spawn(HubConfig::default(), shutdown.clone());
    let ctx = ServiceContext::new(store.clone(), clock, EventPublisher::new(hub.clone()));
    let services = Services::new(ctx, operators.iter().copied().collect::<HashSet<_>>());
    Stack {
        store,
        hub,
        services,
        clock,
        shutdown,
    }
}

pub fn newborn(name: &str, days_old: i64) -> NewBaby {
    NewBaby {
        name: name.to_string(),
        gender: None,
        birth_date: CivilClock::default().now().date_naive() - Days::days(days_old),
        birth_time: None,
    }
}

pub struct Client {
    pub id: SessionId,
    pub inbound: UnboundedSender<Result<Frame, String>>,
    pub outbound: UnboundedReceiver<Frame>,
    pub tasks: SessionTasks,
}

/// Registers `user` on `baby` and starts the session duties.
pub async fn connect(hub: &Hub, user: UserId, baby: BabyId) -> Client {
    let registration = hub.register(user, baby).await.expect("hub is running");
    let (in_tx, in_rx) = unbounded::<Result<Frame, String>>();
    let (out_tx, out_rx) = unbounded::<Frame>();
    let session = Session::new(hub.clone(), registration, SessionConfig::default());
    let id = session.id();
    let tasks = session.start(out_tx, in_rx);
    Client {
        id,
        inbound: in_tx,
        outbound: out_rx,
        tasks,
    }
}

impl Client {
    /// Events from the next data frame, or none if nothing arrives within `wait`.
    /// A frame may carry several newline-separated envelopes.
    pub async fn events_within(&mut self, wait: Duration) -> Vec<EventEnvelope> {
        loop {
            match tokio::time::timeout(wait, self.outbound.next()).await {
                Ok(Some(Frame::Text(text))) => {
                    return text
                        .lines()
                        .filter_map(|line| serde_json::from_str(line).ok())
                        .collect();
                }
                Ok(Some(Frame::Ping)) => continue,
                _ => return Vec::new(),
            }
        }
    }

    /// Waits for an event on `entity`, skipping others.
    pub async fn expect_event(&mut self, entity: &str) -> EventEnvelope {
        for _ in 0..16 {
            let events = self.events_within(Duration::from_secs(2)).await;
            if events.is_empty() {
                break;
            }
            if let Some(found) = events.into_iter().find(|e| e.entity == entity) {
                return found;
            }
        }
        panic!("no {} event arrived", entity);
    }

    /// Sends a close frame and waits for both duties to finish.
    pub async fn close(self) {
        let _ = self.inbound.unbounded_send(Ok(Frame::Close));
        self.tasks.join().await;
    }
}
