//! Performance benchmarks for the synchronization hot paths

use shared::framing::{encode_batch, FrameDecoder};
use shared::interpolation::{Interpolator, Motion};
use shared::sync::Synchronizer;
use shared::{ItemSnapshot, Message, NetConfig, PlayerSnapshot, Role, Vec2};
use std::time::Instant;

fn snapshot(players: u32) -> Message {
    Message::GameState {
        players: (0..players)
            .map(|id| PlayerSnapshot {
                id,
                x: 36.0 + id as f32,
                y: 36.0,
                direction: (id % 4) as u8,
                hp: 3,
                kills: id,
                alive: true,
            })
            .collect(),
        items: vec![
            ItemSnapshot {
                x: 100.0,
                y: 60.0,
                item_type: 1,
            };
            3
        ],
        game_over: false,
    }
}

/// Benchmarks encoding of input-sized messages
#[test]
fn benchmark_message_encoding() {
    let messages: Vec<Message> = (0..1000)
        .map(|i| Message::PlayerInput {
            player_id: 1,
            dx: (i % 3) as i8 - 1,
            dy: 0,
            shoot: i % 10 == 0,
            place_mine: false,
            x: i as f32 * 0.25,
            y: 100.0,
            direction: 1,
        })
        .collect();

    let iterations = 100;
    let start = Instant::now();
    let mut total_bytes = 0;
    for _ in 0..iterations {
        total_bytes += encode_batch(&messages).len();
    }

    let duration = start.elapsed();
    println!(
        "Encoding: {} messages in {:?} ({} bytes)",
        iterations * messages.len(),
        duration,
        total_bytes
    );

    assert!(total_bytes > 0);
    // 100k small records should encode well under 2 seconds even in debug builds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks unframing of a stream delivered in small reads
#[test]
fn benchmark_fragmented_decoding() {
    let messages: Vec<Message> = (0..2000).map(|_| snapshot(2)).collect();
    let bytes = encode_batch(&messages);

    let start = Instant::now();
    let mut decoder = FrameDecoder::new();
    let mut decoded = 0;
    for chunk in bytes.chunks(97) {
        decoded += decoder.feed(chunk).len();
    }

    let duration = start.elapsed();
    println!(
        "Decoding: {} snapshots from {} bytes in {:?}",
        decoded,
        bytes.len(),
        duration
    );

    assert_eq!(decoded, messages.len());
    assert_eq!(decoder.discarded(), 0);
    assert!(duration.as_millis() < 3000);
}

/// Benchmarks interpolation stepping for many mirrors
#[test]
fn benchmark_interpolation_steps() {
    let interpolator = Interpolator::default();
    let mut motions: Vec<Motion> = (0..1000)
        .map(|i| {
            let mut motion = Motion::at(Vec2::ZERO);
            motion.retarget(Vec2::new((i % 50) as f32, 10.0));
            motion
        })
        .collect();

    let iterations = 1000;
    let start = Instant::now();
    for _ in 0..iterations {
        interpolator.step_all(motions.iter_mut());
    }

    let duration = start.elapsed();
    println!(
        "Interpolation: {} steps in {:?}",
        iterations * motions.len(),
        duration
    );

    assert!(motions.iter().all(|m| m.remaining() == 0.0));
    assert!(duration.as_millis() < 2000);
}

/// Stress test applying a long run of snapshots on the client side
#[test]
fn stress_test_snapshot_application() {
    let mut client = Synchronizer::new(Role::Client, 1, &NetConfig::default());
    let interpolator = Interpolator::default();

    let start = Instant::now();
    for tick in 0..10_000u32 {
        let message = match snapshot(2) {
            Message::GameState {
                mut players,
                items,
                game_over,
            } => {
                players[0].x = 36.0 + (tick % 100) as f32;
                Message::GameState {
                    players,
                    items,
                    game_over,
                }
            }
            other => other,
        };
        client.apply(message);
        client.interpolate(&interpolator);
    }

    let duration = start.elapsed();
    println!("Applied 10000 snapshots in {:?}", duration);

    assert_eq!(client.players().count(), 2);
    assert_eq!(client.items().len(), 3);
    assert!(duration.as_millis() < 3000);
}
