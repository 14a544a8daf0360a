//! A two-player hidden-position guessing game coordinated entirely
//! through a shared realtime key/value store.
//!
//! There is no game server: two symmetric clients write to and observe one
//! shared session record, and each independently recomputes its screen from
//! the latest snapshot. The store is external and reached through the
//! [`Store`] trait; this crate ships an in-memory implementation and a TCP
//! relay so the game runs end to end out of the box.
//!
//! # Architecture
//!
//! - **Store**: the subscribe/read/write/remove adapter ([`store`])
//! - **Repository**: session records by join code ([`repository`])
//! - **Machine**: guarded, idempotent phase transitions ([`machine`])
//! - **Engine**: guess validation and win condition ([`engine`])
//! - **Projector**: pure snapshot → screen derivation ([`projector`])
//! - **Client**: subscription glue per player process ([`client`])

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cli;
pub mod client;
pub mod engine;
pub mod machine;
pub mod projector;
pub mod relay;
pub mod repository;
pub mod session;
pub mod store;
pub mod tui;

pub use client::{ActiveSession, GameClient};
pub use engine::GuessEngine;
pub use machine::SessionMachine;
pub use projector::{CellState, GridView, LobbyMember, LocalState, ScreenView, project};
pub use relay::Relay;
pub use repository::{RepositoryError, SessionRepository};
pub use session::{
    Cell, GridConfig, Guess, Participant, Phase, PhaseView, PlayerId, SessionId, SessionRecord,
};
pub use store::{MemoryStore, RemoteStore, Store, StoreError, Subscription};
