//! One peer's end of a networked match
//!
//! `Session` is what a tick loop drives. Each tick it drains the transport,
//! routes lobby messages to the `Lobby` and game messages to the
//! `Synchronizer`, then reports local input, advances the snapshot clock and
//! steps interpolation. Nothing here blocks.

use crate::config::{InterpolationConfig, NetConfig};
use crate::error::{LobbyError, TransportError};
use crate::interpolation::Interpolator;
use crate::lobby::{Lobby, LobbyEvent, RosterEntry};
use crate::protocol::{MapPayload, Message};
use crate::spawn_position;
use crate::sync::{InputReporter, LocalInput, Synchronizer, SyncEvent};
use crate::transport::{ConnectionState, Role, Transport};
use log::{debug, info};
use std::net::SocketAddr;

/// Surface the excluded UI and simulation code talks to
pub trait NetSession {
    fn send(&mut self, message: Message);
    fn poll_inbound(&mut self) -> Vec<Message>;
    fn connection_state(&self) -> ConnectionState;
    fn roster(&self) -> Vec<RosterEntry>;
    fn close(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    Disconnected(ConnectionState),
    Lobby(LobbyEvent),
    Sync(SyncEvent),
}

pub struct Session {
    config: NetConfig,
    transport: Transport,
    lobby: Lobby,
    sync: Synchronizer,
    interpolator: Interpolator,
    reporter: InputReporter,
    seen_connected: bool,
    seen_terminal: bool,
    events: Vec<SessionEvent>,
}

impl Session {
    /// Listens for a single peer; `bind` defaults to every interface on the configured port
    pub fn host(
        name: impl Into<String>,
        bind: Option<SocketAddr>,
        config: &NetConfig,
    ) -> Result<Self, TransportError> {
        let transport = Transport::open(Role::Host, bind, config)?;
        Ok(Self::with_transport(transport, Lobby::host(name), config))
    }

    pub fn client(
        name: impl Into<String>,
        server: &str,
        config: &NetConfig,
    ) -> Result<Self, TransportError> {
        let transport = Transport::connect(server, config)?;
        Ok(Self::with_transport(transport, Lobby::client(name), config))
    }

    fn with_transport(transport: Transport, lobby: Lobby, config: &NetConfig) -> Self {
        let role = transport.role();
        let local_id = lobby.local_id();
        Self {
            config: config.clone(),
            transport,
            sync: Synchronizer::new(role, local_id, config),
            reporter: InputReporter::new(role, local_id, config),
            interpolator: Interpolator::default(),
            lobby,
            seen_connected: false,
            seen_terminal: false,
            events: Vec::new(),
        }
    }

    pub fn with_interpolation(mut self, config: InterpolationConfig) -> Self {
        self.interpolator = Interpolator::new(config);
        self
    }

    pub fn role(&self) -> Role {
        self.transport.role()
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn lobby(&self) -> &Lobby {
        &self.lobby
    }

    pub fn sync(&self) -> &Synchronizer {
        &self.sync
    }

    /// Synchronizer plus the sink its host-side emitters write to
    pub fn parts_mut(&mut self) -> (&mut Synchronizer, &mut Transport) {
        (&mut self.sync, &mut self.transport)
    }

    pub fn is_started(&self) -> bool {
        self.lobby.is_started()
    }

    /// Forgets a bullet the simulation has finished with
    pub fn retire_bullet(&mut self, bullet_id: u64) -> bool {
        self.sync.retire_bullet(bullet_id)
    }

    /// Host-only: hands `map` to the peer and starts the match
    pub fn start_game(&mut self, map: MapPayload) -> Result<(), LobbyError> {
        let event = self.lobby.request_start(&mut self.transport, map)?;
        self.on_lobby_event(event);
        Ok(())
    }

    /// Drains inbound messages, routes them and returns them in arrival order
    ///
    /// Records queued before the connection ended are routed before the
    /// disconnect clears the remote mirrors.
    pub fn poll_inbound(&mut self) -> Vec<Message> {
        self.observe_connected();

        let messages = self.transport.poll_inbound();
        for message in &messages {
            self.route(message.clone());
        }

        self.observe_terminal();
        messages
    }

    /// Per-tick outbound work once the match is running
    pub fn update(&mut self, input: &LocalInput) -> Vec<SessionEvent> {
        if self.lobby.is_started() {
            if !self.seen_terminal && self.local_alive() {
                self.reporter.report(&mut self.transport, input);
            }
            self.sync.update_local(input.position, input.direction);
            self.sync.tick(&mut self.transport);
            self.sync.interpolate(&self.interpolator);
        }
        self.take_events()
    }

    /// Whole tick: inbound then outbound
    pub fn tick(&mut self, input: &LocalInput) -> Vec<SessionEvent> {
        self.poll_inbound();
        self.update(input)
    }

    /// Events accumulated since the last call
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Dead players stay silent until the host respawns them
    fn local_alive(&self) -> bool {
        self.sync
            .player(self.sync.local_id())
            .map_or(true, |record| record.alive)
    }

    fn observe_connected(&mut self) {
        if self.transport.state() == ConnectionState::Connected && !self.seen_connected {
            self.seen_connected = true;
            self.lobby.on_connected(&mut self.transport);
            self.events.push(SessionEvent::Connected);
        }
    }

    fn observe_terminal(&mut self) {
        let state = self.transport.state();
        if state.is_terminal() && !self.seen_terminal {
            self.seen_terminal = true;
            info!("Session ended ({:?})", state);
            if let Some(event) = self.lobby.on_disconnected() {
                self.events.push(SessionEvent::Lobby(event));
            }
            self.sync.clear_remote();
            self.events.push(SessionEvent::Disconnected(state));
        }
    }

    fn route(&mut self, message: Message) {
        if self.seen_terminal {
            debug!("Dropping {} received after the session ended", message.kind());
        } else if message.is_lobby() {
            if let Some(event) = self.lobby.handle(&mut self.transport, message) {
                self.on_lobby_event(event);
            }
        } else if self.lobby.is_started() {
            if let Some(event) = self.sync.apply(message) {
                self.events.push(SessionEvent::Sync(event));
            }
        } else {
            debug!("Dropping {} received before the game started", message.kind());
        }
    }

    fn on_lobby_event(&mut self, event: LobbyEvent) {
        if let LobbyEvent::Started(map) = &event {
            self.begin_match(map);
        }
        self.events.push(SessionEvent::Lobby(event));
    }

    /// Fresh synchronizer with every roster member at their spawn point
    fn begin_match(&mut self, map: &MapPayload) {
        let role = self.transport.role();
        let local_id = self.lobby.local_id();

        self.sync = Synchronizer::new(role, local_id, &self.config);
        for entry in self.lobby.roster() {
            self.sync
                .add_player(entry.id, spawn_position(entry.id, map.width, map.height));
        }
        self.reporter = InputReporter::new(role, local_id, &self.config);
        info!(
            "Match started as player {} with {} players",
            local_id,
            self.lobby.roster().len()
        );
    }
}

impl NetSession for Session {
    fn send(&mut self, message: Message) {
        self.transport.send(message);
    }

    fn poll_inbound(&mut self) -> Vec<Message> {
        Session::poll_inbound(self)
    }

    fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    fn roster(&self) -> Vec<RosterEntry> {
        self.lobby.roster()
    }

    fn close(&mut self) {
        self.transport.close();
    }
}
