pub mod config;
pub mod error;
pub mod framing;
pub mod interpolation;
pub mod lobby;
pub mod protocol;
pub mod session;
pub mod sync;
pub mod transport;

pub use config::{InterpolationConfig, NetConfig, DEFAULT_PORT};
pub use error::{DecodeError, LobbyError, TransportError};
pub use protocol::{ItemSnapshot, MapPayload, Message, PlayerId, PlayerSnapshot};
pub use session::{NetSession, Session, SessionEvent};
pub use transport::{ConnectionState, Role, Transport, TransportStats};

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

pub const HOST_ID: PlayerId = 0;
pub const CLIENT_ID: PlayerId = 1;

pub const TILE_SIZE: f32 = 8.0;
pub const MAP_WIDTH: u32 = 32;
pub const MAP_HEIGHT: u32 = 32;

pub const TILE_EMPTY: u8 = 0;
pub const TILE_WALL: u8 = 1;
pub const TILE_MIRROR_H: u8 = 2;
pub const TILE_MIRROR_V: u8 = 3;
pub const TILE_MIRROR_DIAG_1: u8 = 4;
pub const TILE_MIRROR_DIAG_2: u8 = 5;

pub const ITEM_TRIPLE_SHOT: u8 = 1;
pub const ITEM_SHIELD: u8 = 2;
pub const ITEM_MINE: u8 = 3;
pub const ITEM_SPEED: u8 = 4;
pub const ITEM_VISION: u8 = 5;

pub const PLAYER_SIZE: f32 = 6.0;
pub const PLAYER_MAX_HP: i32 = 3;
pub const PLAYER_RESPAWN_TICKS: u32 = 60;
pub const SHOOT_COOLDOWN_TICKS: u32 = 20;
pub const BULLET_SPEED: f32 = 2.5;
pub const BULLET_LIFETIME_TICKS: u32 = 180;
pub const WIN_KILLS: u32 = 5;
pub const MINE_LIMIT: u32 = 5;
pub const ITEM_SPAWN_INTERVAL: u32 = 300;
pub const MAX_LIVE_ITEMS: usize = 3;

pub const FACING_UP: u8 = 0;
pub const FACING_RIGHT: u8 = 1;
pub const FACING_DOWN: u8 = 2;
pub const FACING_LEFT: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(self, other: Vec2) -> f32 {
        (other - self).length()
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// Unit vector for a facing code (0=up, 1=right, 2=down, 3=left)
pub fn facing_vector(direction: u8) -> Vec2 {
    match direction % 4 {
        FACING_UP => Vec2::new(0.0, -1.0),
        FACING_RIGHT => Vec2::new(1.0, 0.0),
        FACING_DOWN => Vec2::new(0.0, 1.0),
        _ => Vec2::new(-1.0, 0.0),
    }
}

/// Centre of a tile in world units
pub fn tile_center(tile_x: u32, tile_y: u32) -> Vec2 {
    Vec2::new(
        tile_x as f32 * TILE_SIZE + TILE_SIZE / 2.0,
        tile_y as f32 * TILE_SIZE + TILE_SIZE / 2.0,
    )
}

/// Corner spawn point for a player, four tiles in from the map edge
pub fn spawn_position(player_id: PlayerId, map_width: u32, map_height: u32) -> Vec2 {
    let far_x = map_width.saturating_sub(5);
    let far_y = map_height.saturating_sub(5);
    match player_id % 4 {
        0 => tile_center(4, 4),
        1 => tile_center(far_x, 4),
        2 => tile_center(4, far_y),
        _ => tile_center(far_x, far_y),
    }
}
