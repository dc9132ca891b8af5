//! # tanknet
//!
//! Network synchronization for a two-player, host-authoritative battle game.
//!
//! The workspace is split the same way the game is:
//! - [`shared`]: wire protocol, framing, the background TCP transport, lobby
//!   handshake, state synchronizer and interpolator. Both peers use it.
//! - [`server`]: the host peer and its authoritative match rules.
//! - [`client`]: the client peer, which only mirrors what the host reports.
//!
//! A tick loop owns one session and talks to it through [`NetSession`]:
//! `send`, `poll_inbound`, `connection_state`, `roster` and `close`. None of
//! them block; I/O runs on the transport's own workers.

pub use client;
pub use server;
pub use shared;

pub use client::ClientSession;
pub use server::{HostSession, HostWorld};
pub use shared::lobby::{Lobby, LobbyEvent, LobbyState, RosterEntry};
pub use shared::sync::{LocalInput, MessageSink, SyncEvent, Synchronizer};
pub use shared::{
    ConnectionState, InterpolationConfig, MapPayload, Message, NetConfig, NetSession, Role,
    Session, SessionEvent, Transport,
};
