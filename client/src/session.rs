use log::info;
use shared::lobby::RosterEntry;
use shared::sync::{LocalInput, PlayerRecord};
use shared::{
    ConnectionState, InterpolationConfig, Message, NetConfig, NetSession, Session, SessionEvent,
    TransportError, Vec2,
};

/// Client end of a match
///
/// The client mirrors whatever the host reports and contributes only its own
/// input and position.
pub struct ClientSession {
    session: Session,
}

impl ClientSession {
    pub fn connect(
        name: impl Into<String>,
        server: &str,
        config: &NetConfig,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            session: Session::client(name, server, config)?,
        })
    }

    pub fn with_interpolation(self, config: InterpolationConfig) -> Self {
        Self {
            session: self.session.with_interpolation(config),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_started(&self) -> bool {
        self.session.is_started()
    }

    pub fn game_over(&self) -> bool {
        self.session.sync().game_over()
    }

    /// Runs one client tick
    pub fn tick(&mut self, input: &LocalInput) -> Vec<SessionEvent> {
        self.session.tick(input)
    }

    /// Drops a bullet once the simulation sees its bounces run out
    pub fn retire_bullet(&mut self, bullet_id: u64) -> bool {
        self.session.retire_bullet(bullet_id)
    }

    pub fn local_player(&self) -> Option<&PlayerRecord> {
        let sync = self.session.sync();
        sync.player(sync.local_id())
    }

    /// Where each remote player should be drawn this tick
    pub fn remote_positions(&self) -> Vec<(u32, Vec2)> {
        let sync = self.session.sync();
        sync.players()
            .filter(|record| record.id != sync.local_id() && record.alive)
            .map(|record| (record.id, record.displayed()))
            .collect()
    }
}

impl NetSession for ClientSession {
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
        info!("Client closing session");
        self.session.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_refused_connect_surfaces_as_failed() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = NetConfig {
            connect_timeout: Duration::from_secs(2),
            ..NetConfig::default()
        };
        let mut client =
            ClientSession::connect("Bob", &format!("127.0.0.1:{}", port), &config).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while Instant::now() < deadline {
            events.extend(client.tick(&LocalInput::default()));
            if client.connection_state() == ConnectionState::Failed {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        events.extend(client.tick(&LocalInput::default()));

        assert_eq!(client.connection_state(), ConnectionState::Failed);
        assert!(events.contains(&SessionEvent::Disconnected(ConnectionState::Failed)));
        assert!(!client.is_started());
        assert!(client.remote_positions().is_empty());
    }

    #[test]
    fn test_invalid_server_address() {
        let result = ClientSession::connect("Bob", "nowhere", &NetConfig::default());
        assert!(matches!(result, Err(TransportError::InvalidAddress(_))));
    }
}
