//! # Physalia
//!
//! Owner-authoritative room relay over WebSockets. Peers join a named,
//! secret-gated room; the first peer to join owns it and is the only one
//! allowed to push state snapshots (`sync`, `hydrate`) to the others. Chat-like
//! `message` events go to everyone but the sender.
//!
//! ## Quick Start
//!
//! ```no_run
//! use physalia::Server;
//!
//! #[tokio::main]
//! async fn main() {
//!     Server::new()
//!         .serve("0.0.0.0:8080")
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! Peers connect to `/ws/{room}/{secret}` and exchange JSON frames of the
//! form `{"eventName": "...", "eventPayload": ...}`.
//!
//! ## Tuning
//!
//! ```no_run
//! use physalia::{Config, OverflowPolicy, Server};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::default()
//!         .with_keepalive(Duration::from_secs(30))
//!         .with_max_message_size(64 * 1024)
//!         .with_overflow_policy(OverflowPolicy::DropNewest);
//!     config.validate().unwrap();
//!     Server::with_config(config).serve("0.0.0.0:8080").await.unwrap();
//! }
//! ```
//!
//! ## With a Lifecycle Hook
//!
//! ```no_run
//! use physalia::{Config, Server, Hook, HookResult, OnPeerJoinedPayload};
//! use async_trait::async_trait;
//!
//! struct Audit;
//!
//! #[async_trait]
//! impl Hook for Audit {
//!     async fn on_peer_joined(&self, p: OnPeerJoinedPayload<'_>) -> HookResult {
//!         println!("{} joined {} ({} peers)", p.client_id, p.room_id, p.peer_count);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     Server::with_hooks(Config::default(), vec![Box::new(Audit)])
//!         .serve("0.0.0.0:8080")
//!         .await
//!         .unwrap();
//! }
//! ```

mod actor;
mod config;
pub mod connection;
mod envelope;
mod hooks;
mod hub;
mod server;

// Public API
pub use actor::{Outbound, RoomInfo, RoomRef};
pub use config::{Config, ConfigError, OverflowPolicy};
pub use envelope::{ClientId, DecodeError, Envelope, Event};
pub use hooks::{Hook, HookResult, OnPeerJoinedPayload, OnPeerLeftPayload, OnRoomCreatedPayload};
pub use hub::{AdmissionError, Hub};
pub use server::Server;

pub use axum;
pub use async_trait::async_trait;
