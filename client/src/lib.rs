//! # Client Library
//!
//! The client is the non-authoritative peer. It connects to the host,
//! announces its display name, mirrors the roster and waits for the map.
//! Once the match runs it reports its own input every tick (and its position
//! periodically while idle), applies the host's events and snapshots to
//! local mirrors, and smooths remote players toward their reported positions.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::ClientSession;
//! use shared::sync::LocalInput;
//! use shared::NetConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NetConfig::default();
//!     let mut client = ClientSession::connect("Bob", "127.0.0.1:9999", &config)?;
//!
//!     loop {
//!         let input = LocalInput::default();
//!         for event in client.tick(&input) {
//!             println!("{:?}", event);
//!         }
//!         std::thread::sleep(config.tick_duration());
//!     }
//! }
//! ```

pub mod session;

pub use session::ClientSession;
