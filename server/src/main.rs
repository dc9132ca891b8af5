use clap::Parser;
use log::{info, warn};
use server::session::{describe, HostSession};
use shared::sync::LocalInput;
use shared::{spawn_position, MapPayload, NetConfig, SessionEvent, DEFAULT_PORT, HOST_ID};
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Interface to listen on
    #[arg(short = 'b', long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Display name of the host player
    #[arg(short, long, default_value = "Host")]
    name: String,

    /// Simulation ticks per second
    #[arg(short, long, default_value = "30")]
    tick_rate: u32,

    /// Map width in tiles
    #[arg(long, default_value = "32")]
    map_width: u32,

    /// Map height in tiles
    #[arg(long, default_value = "32")]
    map_height: u32,

    /// Seed for item placement
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = NetConfig {
        port: args.port,
        ..NetConfig::default()
    }
    .with_tick_rate(args.tick_rate.max(1));
    let map = MapPayload::bordered(args.map_width, args.map_height);

    let mut host = HostSession::bind(
        args.name.clone(),
        Some(SocketAddr::new(args.bind, args.port)),
        &config,
    )?;
    if let Some(seed) = args.seed {
        host = host.with_seed(seed);
    }

    info!("Starting host '{}' at {} ticks/s", args.name, config.tick_rate);
    if let Some(addr) = host.listen_addr() {
        info!("Listening on {}", addr);
    }

    let tick = config.tick_duration();
    let input = LocalInput::idle(
        spawn_position(HOST_ID, map.width, map.height),
        shared::FACING_DOWN,
    );

    loop {
        let tick_start = Instant::now();

        let mut ended = false;
        for event in host.tick(&input) {
            if let Some(text) = describe(&event) {
                info!("{}", text);
            }
            ended |= matches!(event, SessionEvent::Disconnected(_));
        }
        if ended {
            break;
        }

        if host.can_start() {
            if let Err(e) = host.start(map.clone()) {
                warn!("Could not start: {}", e);
            }
        }

        let elapsed = tick_start.elapsed();
        std::thread::sleep(tick.saturating_sub(elapsed));
    }

    info!("Host finished");
    Ok(())
}
