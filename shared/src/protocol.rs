//! Wire message definitions
//!
//! Every record on the wire is a JSON object with a mandatory `type`
//! discriminator. Each variant carries exactly the fields the peer needs for
//! that message, so a decoded `Message` can never be missing a field.

use crate::error::LobbyError;
use crate::{Vec2, TILE_EMPTY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable small integer identifying a player; the host is always 0
pub type PlayerId = u32;

/// All messages exchanged between host and client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    // Lobby
    PlayerJoin {
        player_id: PlayerId,
        name: String,
    },
    PlayerList {
        players: BTreeMap<PlayerId, String>,
    },
    StartGame {
        map: Vec<u8>,
        map_width: u32,
        map_height: u32,
    },

    // Host events
    BulletSpawn {
        x: f32,
        y: f32,
        vx: f32,
        vy: f32,
        owner_id: PlayerId,
    },
    ItemSpawn {
        x: f32,
        y: f32,
        item_type: u8,
    },
    ItemPickup {
        x: f32,
        y: f32,
        player_id: PlayerId,
    },
    PlayerDamage {
        player_id: PlayerId,
        hp: i32,
        died: bool,
        attacker_id: PlayerId,
    },
    Explosion {
        x: f32,
        y: f32,
    },
    MineSpawn {
        x: f32,
        y: f32,
        owner_id: PlayerId,
    },
    GameState {
        players: Vec<PlayerSnapshot>,
        items: Vec<ItemSnapshot>,
        game_over: bool,
    },

    // Motion sync
    PlayerInput {
        player_id: PlayerId,
        dx: i8,
        dy: i8,
        shoot: bool,
        place_mine: bool,
        x: f32,
        y: f32,
        direction: u8,
    },
    PositionSync {
        player_id: PlayerId,
        x: f32,
        y: f32,
        direction: u8,
    },
}

impl Message {
    /// The `type` discriminator as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Message::PlayerJoin { .. } => "player_join",
            Message::PlayerList { .. } => "player_list",
            Message::StartGame { .. } => "start_game",
            Message::BulletSpawn { .. } => "bullet_spawn",
            Message::ItemSpawn { .. } => "item_spawn",
            Message::ItemPickup { .. } => "item_pickup",
            Message::PlayerDamage { .. } => "player_damage",
            Message::Explosion { .. } => "explosion",
            Message::MineSpawn { .. } => "mine_spawn",
            Message::GameState { .. } => "game_state",
            Message::PlayerInput { .. } => "player_input",
            Message::PositionSync { .. } => "position_sync",
        }
    }

    /// True for lobby-phase messages (join, roster, start)
    pub fn is_lobby(&self) -> bool {
        matches!(
            self,
            Message::PlayerJoin { .. } | Message::PlayerList { .. } | Message::StartGame { .. }
        )
    }

    /// True for messages only the host may originate
    pub fn is_host_originated(&self) -> bool {
        matches!(
            self,
            Message::PlayerList { .. }
                | Message::StartGame { .. }
                | Message::BulletSpawn { .. }
                | Message::ItemSpawn { .. }
                | Message::ItemPickup { .. }
                | Message::PlayerDamage { .. }
                | Message::Explosion { .. }
                | Message::MineSpawn { .. }
                | Message::GameState { .. }
        )
    }
}

/// Per-player entry of a `game_state` snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub direction: u8,
    pub hp: i32,
    pub kills: u32,
    pub alive: bool,
}

impl PlayerSnapshot {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Live item entry of a `game_state` snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub x: f32,
    pub y: f32,
    pub item_type: u8,
}

/// Tile grid handed from host to client with `start_game`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapPayload {
    pub tiles: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl MapPayload {
    /// Builds a payload, rejecting grids whose tile count disagrees with the dimensions
    pub fn new(tiles: Vec<u8>, width: u32, height: u32) -> Result<Self, LobbyError> {
        let expected = width as usize * height as usize;
        if tiles.len() != expected || expected == 0 {
            return Err(LobbyError::InvalidMap {
                width,
                height,
                tiles: tiles.len(),
            });
        }
        Ok(Self {
            tiles,
            width,
            height,
        })
    }

    /// Flattens a row-major grid (`grid[y][x]`)
    pub fn from_rows(rows: &[Vec<u8>]) -> Result<Self, LobbyError> {
        let height = rows.len() as u32;
        let width = rows.first().map_or(0, |row| row.len()) as u32;
        let tiles: Vec<u8> = rows.iter().flatten().copied().collect();
        Self::new(tiles, width, height)
    }

    /// Empty arena enclosed by a single ring of walls
    pub fn bordered(width: u32, height: u32) -> Self {
        let mut tiles = vec![TILE_EMPTY; width as usize * height as usize];
        for y in 0..height {
            for x in 0..width {
                if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
                    tiles[(y * width + x) as usize] = crate::TILE_WALL;
                }
            }
        }
        Self {
            tiles,
            width,
            height,
        }
    }

    pub fn tile(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.tiles.get((y * self.width + x) as usize).copied()
    }

    pub fn rows(&self) -> Vec<Vec<u8>> {
        self.tiles
            .chunks(self.width.max(1) as usize)
            .map(|row| row.to_vec())
            .collect()
    }

    pub fn to_message(&self) -> Message {
        Message::StartGame {
            map: self.tiles.clone(),
            map_width: self.width,
            map_height: self.height,
        }
    }
}
