use crate::game::HostWorld;
use log::{debug, info};
use shared::lobby::{LobbyEvent, RosterEntry};
use shared::sync::{LocalInput, SyncEvent};
use shared::{
    ConnectionState, LobbyError, MapPayload, Message, NetConfig, NetSession, PlayerId, Session,
    SessionEvent, TransportError, Vec2,
};
use std::net::SocketAddr;

/// Host end of a match: the network session plus the authoritative rules
pub struct HostSession {
    session: Session,
    world: HostWorld,
}

impl HostSession {
    pub fn bind(
        name: impl Into<String>,
        bind: Option<SocketAddr>,
        config: &NetConfig,
    ) -> Result<Self, TransportError> {
        let session = Session::host(name, bind, config)?;
        let placeholder = MapPayload::bordered(shared::MAP_WIDTH, shared::MAP_HEIGHT);
        Ok(Self {
            session,
            world: HostWorld::new(placeholder),
        })
    }

    /// Replaces the world so item placement is reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.world = HostWorld::with_seed(self.world.map().clone(), seed);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn world(&self) -> &HostWorld {
        &self.world
    }

    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.session.transport().listen_addr()
    }

    pub fn is_started(&self) -> bool {
        self.session.is_started()
    }

    /// True once a peer has joined and the match can begin
    pub fn can_start(&self) -> bool {
        !self.session.is_started()
            && self.session.connection_state() == ConnectionState::Connected
            && self.session.roster().len() >= 2
    }

    pub fn start(&mut self, map: MapPayload) -> Result<(), LobbyError> {
        self.session.start_game(map.clone())?;
        let players: Vec<PlayerId> = self.session.roster().iter().map(|e| e.id).collect();
        self.world.begin(map, players);
        Ok(())
    }

    /// Runs one host tick: inbound, peer and local actions, rules, outbound
    pub fn tick(&mut self, input: &LocalInput) -> Vec<SessionEvent> {
        self.session.poll_inbound();
        let mut events = self.session.take_events();

        if self.session.is_started() {
            for event in &events {
                if let SessionEvent::Sync(SyncEvent::RemoteInput {
                    player_id,
                    shoot,
                    place_mine,
                    ..
                }) = event
                {
                    self.act(*player_id, *shoot, *place_mine);
                }
            }

            let local_id = self.session.sync().local_id();
            self.record_local(input);
            self.act(local_id, input.shoot, input.place_mine);

            let (sync, transport) = self.session.parts_mut();
            self.world.tick(sync, transport);
        }

        events.extend(self.session.update(input));
        events
    }

    /// Reports a bullet or collision hit found by the simulation
    pub fn hit(&mut self, target: PlayerId, attacker: PlayerId) -> bool {
        let (sync, transport) = self.session.parts_mut();
        self.world.apply_hit(sync, transport, target, attacker)
    }

    pub fn detonate_mine(&mut self, position: Vec2, victim: Option<PlayerId>) -> bool {
        let (sync, transport) = self.session.parts_mut();
        self.world.detonate_mine(sync, transport, position, victim)
    }

    pub fn pickup(&mut self, player_id: PlayerId, position: Vec2) -> Option<u8> {
        let (sync, transport) = self.session.parts_mut();
        self.world.pickup(sync, transport, player_id, position)
    }

    /// Drops a bullet once the simulation sees its bounces run out
    pub fn retire_bullet(&mut self, bullet_id: u64) -> bool {
        self.session.retire_bullet(bullet_id)
    }

    /// Keeps the host's own record current before its flags are acted on
    fn record_local(&mut self, input: &LocalInput) {
        let (sync, _) = self.session.parts_mut();
        sync.update_local(input.position, input.direction);
    }

    fn act(&mut self, player_id: PlayerId, shoot: bool, place_mine: bool) {
        if !shoot && !place_mine {
            return;
        }
        debug!(
            "Player {} actions: shoot={} mine={}",
            player_id, shoot, place_mine
        );
        let (sync, transport) = self.session.parts_mut();
        self.world
            .handle_input(sync, transport, player_id, shoot, place_mine);
    }
}

impl NetSession for HostSession {
    fn send(&mut self, message: Message) {
        self.session.send(message);
    }

    fn poll_inbound(&mut self) -> Vec<Message> {
        self.session.poll_inbound()
    }

    fn connection_state(&self) -> ConnectionState {
        self.session.connection_state()
    }

    fn roster(&self) -> Vec<RosterEntry> {
        self.session.roster()
    }

    fn close(&mut self) {
        info!("Host closing session");
        self.session.close();
    }
}

/// Logs the lobby progress a headless host cares about
pub fn describe(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::Connected => Some("peer connected".to_string()),
        SessionEvent::Disconnected(state) => Some(format!("peer gone ({:?})", state)),
        SessionEvent::Lobby(LobbyEvent::RosterChanged(roster)) => Some(format!(
            "roster: {}",
            roster
                .iter()
                .map(|entry| format!("{}={}", entry.id, entry.name))
                .collect::<Vec<_>>()
                .join(", ")
        )),
        SessionEvent::Lobby(LobbyEvent::Started(map)) => {
            Some(format!("match started on {}x{}", map.width, map.height))
        }
        SessionEvent::Sync(SyncEvent::GameOver) => Some("match over".to_string()),
        SessionEvent::Sync(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::lobby::LobbyState;
    use std::time::{Duration, Instant};

    #[test]
    fn test_cannot_start_without_peer() {
        let config = NetConfig::default();
        let mut host =
            HostSession::bind("Host", Some("127.0.0.1:0".parse().unwrap()), &config).unwrap();
        assert!(!host.can_start());
        assert!(host.start(MapPayload::bordered(32, 32)).is_err());
        assert!(host.listen_addr().is_some());
    }

    #[test]
    fn test_remote_shoot_spawns_bullet() {
        let config = NetConfig::default();
        let mut host =
            HostSession::bind("Host", Some("127.0.0.1:0".parse().unwrap()), &config).unwrap();
        let addr = host.listen_addr().unwrap();
        let mut client = Session::client("Bob", &addr.to_string(), &config).unwrap();

        let idle = LocalInput::idle(Vec2::new(36.0, 36.0), 0);
        let deadline = Instant::now() + Duration::from_secs(5);
        while !host.can_start() && Instant::now() < deadline {
            host.tick(&idle);
            client.poll_inbound();
            std::thread::sleep(Duration::from_millis(5));
        }
        host.start(MapPayload::bordered(32, 32)).unwrap();

        while !client.is_started() && Instant::now() < deadline {
            client.poll_inbound();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(client.lobby().state(), LobbyState::Started);

        let shoot = LocalInput {
            shoot: true,
            position: Vec2::new(220.0, 36.0),
            direction: shared::FACING_LEFT,
            ..LocalInput::default()
        };
        client.update(&shoot);

        let mut spawned = false;
        while !spawned && Instant::now() < deadline {
            spawned = host.tick(&idle).iter().any(|e| {
                matches!(
                    e,
                    SessionEvent::Sync(SyncEvent::RemoteInput { shoot: true, .. })
                )
            });
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(spawned);
        let bullet = &host.session().sync().bullets()[0];
        assert_eq!(bullet.owner_id, 1);
        assert_eq!(bullet.position, Vec2::new(214.0, 36.0));
    }
}
