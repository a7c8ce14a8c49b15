//! Brainlink - Brain-to-Body control-plane bridge.
//!
//! This crate links a decision-making process (the "Brain") to a
//! presentation process (the "Body") across a process boundary, carrying
//! short textual control events: emotion tags, audio cues, chat lines.
//! Delivery is best-effort live-control traffic — no ordering across
//! restarts, no durability — but the link itself stays continuously
//! available through a reconnecting background listener.
//!
//! # Architecture
//!
//! ```text
//! Brain ──▶ Transport ──▶ Listener ──▶ Queue ──▶ Dispatcher ──▶ handlers
//!            (tcp/udp)   (background    (SPSC)    (host tick)   (animation,
//!                         reconnect)                             audio, chat)
//! ```
//!
//! The host owns the tick: once per frame of its own loop it calls
//! [`Bridge::tick`], which drains the queue, decodes each frame, and fans
//! events out to the handlers registered per [`EventKind`]. Everything
//! network-facing lives on the bridge's background task and never blocks
//! the host.
//!
//! # Modules
//!
//! - [`bridge`] - Host-facing facade: runtime, tick, send, shutdown
//! - [`listener`] - Connect/receive/reconnect state machine
//! - [`protocol`] - Wire protocol types and the frame decoder
//! - [`dispatcher`] - Handler registry and event fan-out
//! - [`transport`] - TCP stream / UDP datagram channel abstraction
//! - [`sink`] - Narrow collaborator interfaces for the presentation side
//! - [`config`] - Configuration loading/saving

// Library modules
pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod listener;
pub mod protocol;
pub mod sink;
pub mod transport;

// Re-export commonly used types
pub use bridge::{Bridge, ChatSender};
pub use config::BridgeConfig;
pub use dispatcher::{Dispatcher, Handler};
pub use listener::{ConnectionState, SharedConnectionState};
pub use protocol::{decode_line, EmotionTag, Event, EventKind, RawFrame};
pub use transport::{Transport, TransportError, TransportKind};
