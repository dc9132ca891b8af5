use clap::Parser;
use client::ClientSession;
use log::info;
use shared::lobby::LobbyEvent;
use shared::sync::{LocalInput, SyncEvent};
use shared::{NetConfig, SessionEvent, DEFAULT_PORT};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host address to connect to (port defaults to --port)
    #[arg(short = 's', long, default_value = "127.0.0.1")]
    server: String,

    /// Host port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Display name announced to the host
    #[arg(short, long, default_value = "Player")]
    name: String,

    /// Simulation ticks per second
    #[arg(short, long, default_value = "30")]
    tick_rate: u32,

    /// Give up connecting after this many milliseconds
    #[arg(long, default_value = "5000")]
    connect_timeout_ms: u64,
}

impl Args {
    fn server_address(&self) -> String {
        if self.server.contains(':') {
            self.server.clone()
        } else {
            format!("{}:{}", self.server, self.port)
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = NetConfig {
        port: args.port,
        connect_timeout: Duration::from_millis(args.connect_timeout_ms),
        ..NetConfig::default()
    }
    .with_tick_rate(args.tick_rate.max(1));

    let address = args.server_address();
    info!("Starting client '{}'", args.name);
    info!("Connecting to: {}", address);

    let mut client = ClientSession::connect(args.name.clone(), &address, &config)?;
    let tick = config.tick_duration();

    loop {
        let tick_start = Instant::now();

        // Headless: stand still wherever the host last put us
        let input = client
            .local_player()
            .map(|player| LocalInput::idle(player.position, player.direction))
            .unwrap_or_default();

        let mut ended = false;
        for event in client.tick(&input) {
            match event {
                SessionEvent::Connected => info!("Connected, waiting for the roster"),
                SessionEvent::Disconnected(state) => {
                    info!("Session ended: {:?}", state);
                    ended = true;
                }
                SessionEvent::Lobby(LobbyEvent::RosterChanged(roster)) => {
                    for entry in roster {
                        info!("  {} {} connected={}", entry.id, entry.name, entry.connected);
                    }
                }
                SessionEvent::Lobby(LobbyEvent::Started(map)) => {
                    info!("Match started on a {}x{} map", map.width, map.height)
                }
                SessionEvent::Sync(SyncEvent::GameOver) => {
                    info!("Match over");
                    ended = true;
                }
                SessionEvent::Sync(event) => log::debug!("{:?}", event),
            }
        }
        if ended {
            break;
        }

        std::thread::sleep(tick.saturating_sub(tick_start.elapsed()));
    }

    Ok(())
}
