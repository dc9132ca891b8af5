//! Pre-game handshake
//!
//! The host owns the canonical roster and is the only side that may start the
//! game. The client announces itself once the connection is up, mirrors the
//! roster it is sent and starts when the `start_game` message arrives.

use crate::error::LobbyError;
use crate::protocol::{MapPayload, Message, PlayerId};
use crate::sync::MessageSink;
use crate::transport::Role;
use crate::{CLIENT_ID, HOST_ID};
use log::{debug, info, warn};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyState {
    AwaitingPeer,
    ExchangingIdentity,
    RosterReady,
    StartRequested,
    Started,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub id: PlayerId,
    pub name: String,
    pub connected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyEvent {
    RosterChanged(Vec<RosterEntry>),
    Started(MapPayload),
}

pub struct Lobby {
    role: Role,
    state: LobbyState,
    local_name: String,
    local_id: PlayerId,
    roster: BTreeMap<PlayerId, RosterEntry>,
    next_id: PlayerId,
    map: Option<MapPayload>,
}

impl Lobby {
    /// Host lobby; the host is always player 0
    pub fn host(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut roster = BTreeMap::new();
        roster.insert(
            HOST_ID,
            RosterEntry {
                id: HOST_ID,
                name: name.clone(),
                connected: true,
            },
        );
        Self {
            role: Role::Host,
            state: LobbyState::AwaitingPeer,
            local_name: name,
            local_id: HOST_ID,
            roster,
            next_id: HOST_ID + 1,
            map: None,
        }
    }

    /// Client lobby; the id is provisional until the host's roster arrives
    pub fn client(name: impl Into<String>) -> Self {
        Self {
            role: Role::Client,
            state: LobbyState::AwaitingPeer,
            local_name: name.into(),
            local_id: CLIENT_ID,
            roster: BTreeMap::new(),
            next_id: CLIENT_ID,
            map: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> LobbyState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        self.state == LobbyState::Started
    }

    pub fn local_id(&self) -> PlayerId {
        self.local_id
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Map handed over at start, once started
    pub fn map(&self) -> Option<&MapPayload> {
        self.map.as_ref()
    }

    pub fn roster(&self) -> Vec<RosterEntry> {
        self.roster.values().cloned().collect()
    }

    /// Connection established; the client announces itself
    pub fn on_connected(&mut self, sink: &mut dyn MessageSink) {
        match self.role {
            Role::Host => {
                if self.state == LobbyState::AwaitingPeer {
                    self.state = LobbyState::ExchangingIdentity;
                    info!("Peer connected, waiting for join");
                }
            }
            Role::Client => {
                info!("Joining as '{}'", self.local_name);
                sink.send(Message::PlayerJoin {
                    player_id: self.local_id,
                    name: self.local_name.clone(),
                });
            }
        }
    }

    /// Connection lost; the peer stays on the roster but is marked gone
    pub fn on_disconnected(&mut self) -> Option<LobbyEvent> {
        let local_id = self.local_id;
        let mut changed = false;
        for entry in self.roster.values_mut() {
            if entry.id != local_id && entry.connected {
                entry.connected = false;
                changed = true;
            }
        }
        if changed {
            info!("Peer marked disconnected");
            Some(LobbyEvent::RosterChanged(self.roster()))
        } else {
            None
        }
    }

    /// Handles a lobby message from the peer
    pub fn handle(&mut self, sink: &mut dyn MessageSink, message: Message) -> Option<LobbyEvent> {
        match (self.role, message) {
            (Role::Host, Message::PlayerJoin { player_id, name }) => {
                self.admit(sink, player_id, name)
            }
            (Role::Client, Message::PlayerList { players }) => self.mirror_roster(players),
            (
                Role::Client,
                Message::StartGame {
                    map,
                    map_width,
                    map_height,
                },
            ) => self.start_from_host(map, map_width, map_height),
            (role, other) => {
                warn!("{:?} lobby ignoring unexpected {}", role, other.kind());
                None
            }
        }
    }

    /// Host-only: hands the map to the peer and starts
    pub fn request_start(
        &mut self,
        sink: &mut dyn MessageSink,
        map: MapPayload,
    ) -> Result<LobbyEvent, LobbyError> {
        if self.role != Role::Host {
            return Err(LobbyError::NotHost);
        }
        if self.state != LobbyState::RosterReady {
            return Err(LobbyError::NotReady(format!("{:?}", self.state)));
        }

        self.state = LobbyState::StartRequested;
        info!("Starting game on a {}x{} map", map.width, map.height);
        sink.send(map.to_message());

        self.state = LobbyState::Started;
        self.map = Some(map.clone());
        Ok(LobbyEvent::Started(map))
    }

    fn admit(
        &mut self,
        sink: &mut dyn MessageSink,
        requested_id: PlayerId,
        name: String,
    ) -> Option<LobbyEvent> {
        if matches!(self.state, LobbyState::StartRequested | LobbyState::Started) {
            warn!("Ignoring join from '{}' after the game started", name);
            return None;
        }
        self.state = LobbyState::ExchangingIdentity;

        // Single-peer sessions: a repeated join renames the existing peer
        let existing = self
            .roster
            .keys()
            .copied()
            .find(|id| *id != self.local_id);
        let id = existing.unwrap_or_else(|| {
            let id = self.next_id;
            self.next_id += 1;
            id
        });
        if id != requested_id {
            debug!("Peer asked for id {}, assigned {}", requested_id, id);
        }

        info!("Player '{}' joined as {}", name, id);
        self.roster.insert(
            id,
            RosterEntry {
                id,
                name,
                connected: true,
            },
        );

        sink.send(Message::PlayerList {
            players: self
                .roster
                .values()
                .map(|entry| (entry.id, entry.name.clone()))
                .collect(),
        });
        self.state = LobbyState::RosterReady;
        Some(LobbyEvent::RosterChanged(self.roster()))
    }

    fn mirror_roster(&mut self, players: BTreeMap<PlayerId, String>) -> Option<LobbyEvent> {
        if self.is_started() {
            warn!("Ignoring roster update after the game started");
            return None;
        }

        self.roster = players
            .into_iter()
            .map(|(id, name)| {
                (
                    id,
                    RosterEntry {
                        id,
                        name,
                        connected: true,
                    },
                )
            })
            .collect();

        // The host assigns ids; find ours by the name we announced
        let requested = self.local_id;
        let matches_name = |entry: &&RosterEntry| entry.name == self.local_name;
        let assigned = match self.roster.get(&requested) {
            Some(entry) if entry.name == self.local_name => Some(requested),
            _ => self
                .roster
                .values()
                .filter(matches_name)
                .map(|entry| entry.id)
                .filter(|id| *id != HOST_ID)
                .max(),
        };
        match assigned {
            Some(id) => self.local_id = id,
            None => warn!("Roster does not list '{}'", self.local_name),
        }

        info!("Roster ready: {} players, local id {}", self.roster.len(), self.local_id);
        self.state = LobbyState::RosterReady;
        Some(LobbyEvent::RosterChanged(self.roster()))
    }

    fn start_from_host(&mut self, tiles: Vec<u8>, width: u32, height: u32) -> Option<LobbyEvent> {
        if self.is_started() {
            debug!("Ignoring duplicate start_game");
            return None;
        }
        if self.state != LobbyState::RosterReady {
            warn!("start_game arrived before the roster");
        }

        let map = match MapPayload::new(tiles, width, height) {
            Ok(map) => map,
            Err(e) => {
                warn!("Discarding start_game: {}", e);
                return None;
            }
        };

        info!("Host started the game on a {}x{} map", width, height);
        self.state = LobbyState::Started;
        self.map = Some(map.clone());
        Some(LobbyEvent::Started(map))
    }
}
