//! # Realtime Session
//!
//! One live connection, split into two independently scheduled duties:
//!
//! - **Inbound** reads frames until the transport errors, the peer closes, the
//!   read deadline lapses or the outbound duty gives up. Only pongs refresh the
//!   deadline. It always asks the hub to unregister the session on exit.
//! - **Outbound** drains the session queue, coalescing already-queued messages
//!   into one newline-separated frame, and sends a ping every `ping_period`.
//!   Every write is bounded by `write_wait`. When the hub closes the queue it
//!   sends a close frame and stops.
//!
//! Each duty owns one half of the transport and releases it when it returns,
//! so neither half is closed twice and neither duty waits on the other.

use super::frame::Frame;
use super::hub::{Hub, SessionId, SessionRegistration};
use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Timing and size limits for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Upper bound for a single write.
    pub write_wait: Duration,
    /// Read deadline, refreshed by each pong.
    pub pong_wait: Duration,
    /// Interval between pings. Must be shorter than `pong_wait`.
    pub ping_period: Duration,
    /// Largest accepted inbound payload in bytes.
    pub max_message_size: usize,
    /// Most queued messages merged into one outbound frame.
    pub max_coalesce: usize,
}

impl SessionConfig {
    /// Derives `ping_period` as nine tenths of `pong_wait`.
    pub fn new(write_wait: Duration, pong_wait: Duration, max_message_size: usize) -> Self {
        Self {
            write_wait,
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            max_message_size,
            max_coalesce: 256,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(60), 512)
    }
}

/// Handles to the two running duties.
pub struct SessionTasks {
    pub inbound: JoinHandle<()>,
    pub outbound: JoinHandle<()>,
}

impl SessionTasks {
    /// Waits for both duties to finish.
    pub async fn join(self) {
        let (inbound, outbound) = tokio::join!(self.inbound, self.outbound);
        if let Err(e) = inbound {
            warn!(error = %e, "inbound duty panicked");
        }
        if let Err(e) = outbound {
            warn!(error = %e, "outbound duty panicked");
        }
    }
}

/// A registered connection ready to be pumped.
pub struct Session {
    hub: Hub,
    registration: SessionRegistration,
    config: SessionConfig,
}

impl Session {
    pub fn new(hub: Hub, registration: SessionRegistration, config: SessionConfig) -> Self {
        Self {
            hub,
            registration,
            config,
        }
    }

    pub fn id(&self) -> SessionId {
        self.registration.id
    }

    /// Spawns the inbound duty over `stream` and the outbound duty over `sink`.
    pub fn start<W, R, E>(self, sink: W, stream: R) -> SessionTasks
    where
        W: Sink<Frame> + Unpin + Send + 'static,
        W::Error: Display,
        R: Stream<Item = Result<Frame, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
    {
        let Session {
            hub,
            registration,
            config,
        } = self;
        let SessionRegistration {
            id,
            user_id,
            baby_id,
            outbound,
        } = registration;
        info!(session = id, user = user_id, baby = baby_id, "session started");

        let stop = CancellationToken::new();
        let inbound = tokio::spawn(inbound_duty(stream, hub, id, config, stop.clone()));
        let outbound = tokio::spawn(outbound_duty(sink, outbound, id, config, stop));
        SessionTasks { inbound, outbound }
    }
}

/// Accepts a client application message. No client-initiated commands are
/// defined yet, so parsed messages are only traced.
fn dispatch_inbound(id: SessionId, message: serde_json::Value) {
    debug!(session = id, %message, "inbound message ignored");
}

async fn inbound_duty<R, E>(
    mut stream: R,
    hub: Hub,
    id: SessionId,
    config: SessionConfig,
    stop: CancellationToken,
) where
    R: Stream<Item = Result<Frame, E>> + Unpin,
    E: Display,
{
    let mut deadline = Instant::now() + config.pong_wait;

    loop {
        let next = tokio::select! {
            _ = stop.cancelled() => break,
            next = time::timeout_at(deadline, stream.next()) => next,
        };

        let frame = match next {
            Err(_) => {
                debug!(session = id, "read deadline exceeded");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!(session = id, error = %e, "transport read failed");
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Frame::Pong => deadline = Instant::now() + config.pong_wait,
            Frame::Ping => {}
            Frame::Close => break,
            Frame::Text(_) | Frame::Binary(_) => {
                let payload = frame.payload().unwrap_or_default();
                if payload.len() > config.max_message_size {
                    warn!(session = id, size = payload.len(), "inbound message over size limit");
                    break;
                }
                match serde_json::from_slice::<serde_json::Value>(payload) {
                    Ok(message) => dispatch_inbound(id, message),
                    Err(e) => warn!(session = id, error = %e, "invalid message format"),
                }
            }
        }
    }

    stop.cancel();
    drop(stream);
    if let Err(e) = hub.unregister(id).await {
        debug!(session = id, error = %e, "unregister skipped");
    }
}

async fn write_frame<W>(sink: &mut W, frame: Frame, wait: Duration) -> Result<(), String>
where
    W: Sink<Frame> + Unpin,
    W::Error: Display,
{
    match time::timeout(wait, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("write deadline exceeded".to_string()),
    }
}

/// Joins the message just received with whatever is already queued.
fn coalesce(first: Bytes, queue: &mut mpsc::Receiver<Bytes>, limit: usize) -> Vec<u8> {
    let mut buf = first.to_vec();
    for _ in 1..limit.max(1) {
        match queue.try_recv() {
            Ok(more) => {
                buf.push(b'\n');
                buf.extend_from_slice(&more);
            }
            Err(_) => break,
        }
    }
    buf
}

async fn outbound_duty<W>(
    mut sink: W,
    mut queue: mpsc::Receiver<Bytes>,
    id: SessionId,
    config: SessionConfig,
    stop: CancellationToken,
) where
    W: Sink<Frame> + Unpin,
    W::Error: Display,
{
    let mut ticker = time::interval_at(Instant::now() + config.ping_period, config.ping_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            message = queue.recv() => match message {
                Some(first) => {
                    let frame = Frame::from_payload(coalesce(first, &mut queue, config.max_coalesce));
                    if let Err(e) = write_frame(&mut sink, frame, config.write_wait).await {
                        debug!(session = id, error = %e, "write failed");
                        break;
                    }
                }
                None => {
                    let _ = write_frame(&mut sink, Frame::Close, config.write_wait).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                if let Err(e) = write_frame(&mut sink, Frame::Ping, config.write_wait).await {
                    debug!(session = id, error = %e, "ping failed");
                    break;
                }
            }
        }
    }

    stop.cancel();
    let _ = time::timeout(config.write_wait, sink.close()).await;
    debug!(session = id, "outbound duty finished");
}
