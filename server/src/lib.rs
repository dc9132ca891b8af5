//! # Host Library
//!
//! The host is the authoritative peer of a two-player match. It accepts a
//! single client, owns the canonical roster, hands the map over at start and
//! decides every damage, kill, mine and item outcome.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! `HostWorld` holds the match rules that run only on the host:
//! - Shoot cooldowns and bullet spawning in front of the shooter
//! - Per-player mine limit and mine detonation
//! - Hit points, kill credit, respawn timers and the win condition
//! - Periodic item drops on random empty tiles
//!
//! ### Session Module (`session`)
//! `HostSession` drives one tick of the host: it drains the network, acts on
//! the peer's and the local player's inputs through `HostWorld`, and lets the
//! shared `Session` emit input echoes and periodic snapshots.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::session::HostSession;
//! use shared::sync::LocalInput;
//! use shared::{MapPayload, NetConfig, Vec2};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NetConfig::default();
//!     let mut host = HostSession::bind("Host", None, &config)?;
//!
//!     loop {
//!         let input = LocalInput::idle(Vec2::new(36.0, 36.0), 0);
//!         for event in host.tick(&input) {
//!             println!("{:?}", event);
//!         }
//!         if host.can_start() {
//!             host.start(MapPayload::bordered(32, 32))?;
//!         }
//!         std::thread::sleep(config.tick_duration());
//!     }
//! }
//! ```

pub mod game;
pub mod session;

pub use game::HostWorld;
pub use session::HostSession;
