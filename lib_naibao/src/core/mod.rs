//! # Realtime Core
//!
//! Live per-baby event delivery to connected clients.
//!
//! ## Core Components:
//!
//! - **`hub`**: A single task that owns every live session and fans broadcasts
//!   out to the sessions subscribed to a baby. All mutation arrives as
//!   messages, so the session set needs no lock.
//!
//! - **`session`**: The per-connection duplex pump. An inbound duty watches
//!   liveness and reads client frames; an outbound duty drains the session's
//!   bounded queue and sends heartbeats.
//!
//! - **`frame`**: A transport-neutral frame type so the session can run over
//!   any `Stream`/`Sink` pair.
//!
//! - **`event`**: The JSON event envelope and a publisher that hands it to the
//!   hub.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Transport-neutral websocket frames.
pub mod frame;
/// The session registry and per-baby fan-out coordinator.
pub mod hub;
/// Per-connection inbound and outbound duties.
pub mod session;
/// Realtime event envelope and publisher.
pub mod event;

// --- Public API Re-exports ---
pub use event::{EventAction, EventEnvelope, EventPublisher};
pub use frame::Frame;
pub use hub::{BroadcastTarget, Hub, HubConfig, HubError, SessionId, SessionRegistration};
pub use session::{Session, SessionConfig, SessionTasks};
