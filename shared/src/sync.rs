//! Host-authoritative state synchronization
//!
//! A single `Synchronizer` type serves both peers; its `authority` decides
//! which messages it may emit and which it accepts:
//!
//! - **Host**: owns the canonical hp/kills/items/mines. Every event (bullet,
//!   item, damage, mine, explosion) is emitted the moment it happens, and a
//!   full `game_state` snapshot goes out on a fixed tick interval so that any
//!   lost event is eventually corrected. Client inputs only ever move the
//!   host's mirror of that client.
//! - **Client**: owns nothing authoritative about remote entities and only
//!   mirrors what the host reports. Applying the same snapshot twice leaves
//!   the mirror unchanged.

use crate::config::NetConfig;
use crate::interpolation::{Interpolator, Motion};
use crate::protocol::{ItemSnapshot, Message, PlayerId, PlayerSnapshot};
use crate::transport::{Role, Transport};
use crate::{Vec2, BULLET_LIFETIME_TICKS, PLAYER_MAX_HP, TILE_SIZE};
use log::{debug, info, warn};
use std::collections::BTreeMap;

/// Items and mines are identified by position; reports within this distance match
const POSITION_MATCH_RADIUS: f32 = 1.0;

/// A respawned player's reports are ignored until one lands this close to the spawn point
const RESPAWN_CONFIRM_RADIUS: f32 = TILE_SIZE * 2.0;

/// Outbound seam used by the lobby and synchronizer
pub trait MessageSink {
    fn send(&mut self, message: Message);
}

impl MessageSink for Transport {
    fn send(&mut self, message: Message) {
        Transport::send(self, message);
    }
}

impl MessageSink for Vec<Message> {
    fn send(&mut self, message: Message) {
        self.push(message);
    }
}

/// Synchronized view of one player
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub id: PlayerId,
    /// Last authoritative (or self-reported) position
    pub position: Vec2,
    /// Display mirror; `None` while the player is dead or not yet seen
    pub motion: Option<Motion>,
    pub direction: u8,
    pub hp: i32,
    pub kills: u32,
    pub alive: bool,
}

impl PlayerRecord {
    pub fn new(id: PlayerId, position: Vec2) -> Self {
        Self {
            id,
            position,
            motion: Some(Motion::at(position)),
            direction: 0,
            hp: PLAYER_MAX_HP,
            kills: 0,
            alive: true,
        }
    }

    /// Position to draw this tick
    pub fn displayed(&self) -> Vec2 {
        self.motion.map_or(self.position, |motion| motion.position)
    }

    fn report_position(&mut self, position: Vec2, direction: u8) {
        self.position = position;
        self.direction = direction;
        match self.motion.as_mut() {
            Some(motion) => motion.retarget(position),
            None => self.motion = Some(Motion::at(position)),
        }
    }

    fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id,
            x: self.position.x,
            y: self.position.y,
            direction: self.direction,
            hp: self.hp,
            kills: self.kills,
            alive: self.alive,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MineRecord {
    pub position: Vec2,
    pub owner_id: PlayerId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulletRecord {
    /// Local handle, not shared with the peer
    pub id: u64,
    pub position: Vec2,
    pub velocity: Vec2,
    pub owner_id: PlayerId,
    /// Ticks until the mirror expires on its own
    pub ticks_left: u32,
}

/// Notable changes surfaced to the simulation collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    RemoteInput {
        player_id: PlayerId,
        dx: i8,
        dy: i8,
        shoot: bool,
        place_mine: bool,
    },
    BulletSpawned {
        bullet_id: u64,
        owner_id: PlayerId,
    },
    ItemSpawned(ItemSnapshot),
    ItemPickedUp {
        item_type: Option<u8>,
        player_id: PlayerId,
    },
    PlayerDamaged {
        player_id: PlayerId,
        hp: i32,
        died: bool,
        attacker_id: PlayerId,
    },
    MinePlaced(MineRecord),
    Explosion(Vec2),
    SnapshotApplied,
    LocalRespawn(Vec2),
    GameOver,
}

pub struct Synchronizer {
    authority: Role,
    local_id: PlayerId,
    players: BTreeMap<PlayerId, PlayerRecord>,
    items: Vec<ItemSnapshot>,
    mines: Vec<MineRecord>,
    bullets: Vec<BulletRecord>,
    next_bullet_id: u64,
    /// Host: spawn points not yet acknowledged by the respawned player's reports
    pending_respawns: BTreeMap<PlayerId, Vec2>,
    game_over: bool,
    snapshot_interval: u32,
    ticks_since_snapshot: u32,
}

impl Synchronizer {
    pub fn new(authority: Role, local_id: PlayerId, config: &NetConfig) -> Self {
        Self {
            authority,
            local_id,
            players: BTreeMap::new(),
            items: Vec::new(),
            mines: Vec::new(),
            bullets: Vec::new(),
            next_bullet_id: 1,
            pending_respawns: BTreeMap::new(),
            game_over: false,
            snapshot_interval: config.snapshot_interval_ticks.max(1),
            ticks_since_snapshot: 0,
        }
    }

    pub fn authority(&self) -> Role {
        self.authority
    }

    pub fn is_host(&self) -> bool {
        self.authority == Role::Host
    }

    pub fn local_id(&self) -> PlayerId {
        self.local_id
    }

    pub fn set_local_id(&mut self, local_id: PlayerId) {
        if self.local_id != local_id {
            info!("Local player id is now {}", local_id);
            self.local_id = local_id;
        }
    }

    /// Registers (or resets) a player at a spawn position with full health
    pub fn add_player(&mut self, id: PlayerId, position: Vec2) {
        self.players.insert(id, PlayerRecord::new(id, position));
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerRecord> {
        self.players.get(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.players.values()
    }

    pub fn items(&self) -> &[ItemSnapshot] {
        &self.items
    }

    pub fn mines(&self) -> &[MineRecord] {
        &self.mines
    }

    pub fn bullets(&self) -> &[BulletRecord] {
        &self.bullets
    }

    /// Drops a bullet whose bounces ran out; `tick` expires the rest
    pub fn retire_bullet(&mut self, bullet_id: u64) -> bool {
        let before = self.bullets.len();
        self.bullets.retain(|bullet| bullet.id != bullet_id);
        self.bullets.len() != before
    }

    pub fn game_over(&self) -> bool {
        self.game_over
    }

    /// Records the local player's own position and facing
    pub fn update_local(&mut self, position: Vec2, direction: u8) {
        let local_id = self.local_id;
        let record = self
            .players
            .entry(local_id)
            .or_insert_with(|| PlayerRecord::new(local_id, position));
        record.position = position;
        record.direction = direction;
        record.motion = Some(Motion::at(position));
    }

    /// Host-only: marks a player alive again at `position` with full health
    pub fn respawn(&mut self, player_id: PlayerId, position: Vec2) {
        if !self.require_host("respawn") {
            return;
        }
        if let Some(record) = self.players.get_mut(&player_id) {
            record.alive = true;
            record.hp = PLAYER_MAX_HP;
            record.position = position;
            record.motion = Some(Motion::at(position));
            debug!("Player {} respawned at ({}, {})", player_id, position.x, position.y);
        }
        if player_id != self.local_id {
            self.pending_respawns.insert(player_id, position);
        }
        // Next tick broadcasts a snapshot carrying the respawn
        self.ticks_since_snapshot = self.snapshot_interval.saturating_sub(1);
    }

    pub fn spawn_bullet(
        &mut self,
        sink: &mut dyn MessageSink,
        position: Vec2,
        velocity: Vec2,
        owner_id: PlayerId,
    ) -> Option<u64> {
        if !self.require_host("bullet_spawn") {
            return None;
        }
        let bullet_id = self.track_bullet(position, velocity, owner_id);
        sink.send(Message::BulletSpawn {
            x: position.x,
            y: position.y,
            vx: velocity.x,
            vy: velocity.y,
            owner_id,
        });
        Some(bullet_id)
    }

    pub fn spawn_item(&mut self, sink: &mut dyn MessageSink, position: Vec2, item_type: u8) {
        if !self.require_host("item_spawn") {
            return;
        }
        self.items.push(ItemSnapshot {
            x: position.x,
            y: position.y,
            item_type,
        });
        sink.send(Message::ItemSpawn {
            x: position.x,
            y: position.y,
            item_type,
        });
    }

    /// Removes the item at `position`; only emits when one was actually there
    pub fn pickup_item(
        &mut self,
        sink: &mut dyn MessageSink,
        position: Vec2,
        player_id: PlayerId,
    ) -> Option<u8> {
        if !self.require_host("item_pickup") {
            return None;
        }
        let item_type = self.take_item(position)?;
        sink.send(Message::ItemPickup {
            x: position.x,
            y: position.y,
            player_id,
        });
        Some(item_type)
    }

    pub fn report_damage(
        &mut self,
        sink: &mut dyn MessageSink,
        player_id: PlayerId,
        hp: i32,
        died: bool,
        attacker_id: PlayerId,
    ) {
        if !self.require_host("player_damage") {
            return;
        }
        self.record_damage(player_id, hp, died, attacker_id);
        sink.send(Message::PlayerDamage {
            player_id,
            hp,
            died,
            attacker_id,
        });
    }

    pub fn place_mine(&mut self, sink: &mut dyn MessageSink, position: Vec2, owner_id: PlayerId) {
        if !self.require_host("mine_spawn") {
            return;
        }
        self.mines.push(MineRecord { position, owner_id });
        sink.send(Message::MineSpawn {
            x: position.x,
            y: position.y,
            owner_id,
        });
    }

    /// Emits an explosion and clears any mine sitting at that spot
    pub fn explode(&mut self, sink: &mut dyn MessageSink, position: Vec2) {
        if !self.require_host("explosion") {
            return;
        }
        self.clear_mines_at(position);
        sink.send(Message::Explosion {
            x: position.x,
            y: position.y,
        });
    }

    /// Host-only: flags the match as finished; carried by the next snapshot
    pub fn set_game_over(&mut self, game_over: bool) {
        if self.require_host("game_over") {
            self.game_over = game_over;
        }
    }

    pub fn snapshot(&self) -> Message {
        Message::GameState {
            players: self.players.values().map(PlayerRecord::snapshot).collect(),
            items: self.items.clone(),
            game_over: self.game_over,
        }
    }

    /// Ages bullet mirrors and advances the reconciliation clock; the host
    /// emits a snapshot when due
    pub fn tick(&mut self, sink: &mut dyn MessageSink) -> bool {
        self.age_bullets();
        if !self.is_host() {
            return false;
        }
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot < self.snapshot_interval {
            return false;
        }
        self.ticks_since_snapshot = 0;
        debug!(
            "Broadcasting snapshot: {} players, {} items",
            self.players.len(),
            self.items.len()
        );
        sink.send(self.snapshot());
        true
    }

    /// Moves every remote display mirror one step toward its target
    pub fn interpolate(&mut self, interpolator: &Interpolator) {
        let local_id = self.local_id;
        interpolator.step_all(
            self.players
                .values_mut()
                .filter(|record| record.id != local_id)
                .filter_map(|record| record.motion.as_mut()),
        );
    }

    /// Drops every mirror of remote entities after the session ended
    pub fn clear_remote(&mut self) {
        let local_id = self.local_id;
        self.players.retain(|id, _| *id == local_id);
        self.pending_respawns.clear();
        if !self.is_host() {
            self.items.clear();
            self.mines.clear();
            self.bullets.clear();
        }
        info!("Cleared remote mirrors");
    }

    /// Applies a game-phase message from the peer
    pub fn apply(&mut self, message: Message) -> Option<SyncEvent> {
        if message.is_host_originated() && self.is_host() {
            warn!("Ignoring host-only {} message from client", message.kind());
            return None;
        }

        match message {
            Message::PlayerInput {
                player_id,
                dx,
                dy,
                shoot,
                place_mine,
                x,
                y,
                direction,
            } => {
                if !self.accept_motion_report(player_id) {
                    return None;
                }
                self.mirror_position(player_id, Vec2::new(x, y), direction);
                Some(SyncEvent::RemoteInput {
                    player_id,
                    dx,
                    dy,
                    shoot,
                    place_mine,
                })
            }
            Message::PositionSync {
                player_id,
                x,
                y,
                direction,
            } => {
                if !self.is_host() {
                    warn!("Ignoring position_sync sent to a client");
                    return None;
                }
                if !self.accept_motion_report(player_id) {
                    return None;
                }
                self.mirror_position(player_id, Vec2::new(x, y), direction);
                None
            }
            Message::GameState {
                players,
                items,
                game_over,
            } => Some(self.apply_snapshot(players, items, game_over)),
            Message::BulletSpawn {
                x,
                y,
                vx,
                vy,
                owner_id,
            } => {
                let bullet_id = self.track_bullet(Vec2::new(x, y), Vec2::new(vx, vy), owner_id);
                Some(SyncEvent::BulletSpawned {
                    bullet_id,
                    owner_id,
                })
            }
            Message::ItemSpawn { x, y, item_type } => {
                let item = ItemSnapshot { x, y, item_type };
                if !self.items.contains(&item) {
                    self.items.push(item.clone());
                }
                Some(SyncEvent::ItemSpawned(item))
            }
            Message::ItemPickup { x, y, player_id } => {
                let item_type = self.take_item(Vec2::new(x, y));
                Some(SyncEvent::ItemPickedUp {
                    item_type,
                    player_id,
                })
            }
            Message::PlayerDamage {
                player_id,
                hp,
                died,
                attacker_id,
            } => {
                self.record_damage(player_id, hp, died, attacker_id);
                Some(SyncEvent::PlayerDamaged {
                    player_id,
                    hp,
                    died,
                    attacker_id,
                })
            }
            Message::MineSpawn { x, y, owner_id } => {
                let mine = MineRecord {
                    position: Vec2::new(x, y),
                    owner_id,
                };
                self.mines.push(mine.clone());
                Some(SyncEvent::MinePlaced(mine))
            }
            Message::Explosion { x, y } => {
                let position = Vec2::new(x, y);
                self.clear_mines_at(position);
                Some(SyncEvent::Explosion(position))
            }
            other => {
                warn!("Synchronizer ignoring lobby message {}", other.kind());
                None
            }
        }
    }

    fn apply_snapshot(
        &mut self,
        players: Vec<PlayerSnapshot>,
        items: Vec<ItemSnapshot>,
        game_over: bool,
    ) -> SyncEvent {
        let local_id = self.local_id;
        let mut respawned_at = None;

        for snapshot in &players {
            let record = self
                .players
                .entry(snapshot.id)
                .or_insert_with(|| PlayerRecord::new(snapshot.id, snapshot.position()));

            record.hp = snapshot.hp;
            record.kills = snapshot.kills;

            if snapshot.id == local_id {
                // Own position is ours to report; only adopt it on respawn
                if snapshot.alive && !record.alive {
                    record.position = snapshot.position();
                    record.direction = snapshot.direction;
                    record.motion = Some(Motion::at(snapshot.position()));
                    respawned_at = Some(snapshot.position());
                }
                record.alive = snapshot.alive;
                continue;
            }

            record.alive = snapshot.alive;
            if snapshot.alive {
                record.report_position(snapshot.position(), snapshot.direction);
            } else {
                record.position = snapshot.position();
                record.direction = snapshot.direction;
                record.motion = None;
            }
        }

        self.players
            .retain(|id, _| *id == local_id || players.iter().any(|p| p.id == *id));
        self.items = items;

        if game_over && !self.game_over {
            info!("Host reports the match is over");
            self.game_over = true;
            return SyncEvent::GameOver;
        }
        self.game_over = game_over;

        match respawned_at {
            Some(position) => SyncEvent::LocalRespawn(position),
            None => SyncEvent::SnapshotApplied,
        }
    }

    fn accept_motion_report(&self, player_id: PlayerId) -> bool {
        if player_id == self.local_id {
            warn!("Ignoring motion report claiming the local player {}", player_id);
            return false;
        }
        if self.is_host() && !self.players.contains_key(&player_id) {
            warn!("Ignoring motion report for unknown player {}", player_id);
            return false;
        }
        true
    }

    fn mirror_position(&mut self, player_id: PlayerId, position: Vec2, direction: u8) {
        let record = self
            .players
            .entry(player_id)
            .or_insert_with(|| PlayerRecord::new(player_id, position));
        if !record.alive {
            return;
        }

        if let Some(spawn) = self.pending_respawns.get(&player_id).copied() {
            if position.distance(spawn) > RESPAWN_CONFIRM_RADIUS {
                debug!(
                    "Ignoring stale report from player {} awaiting respawn at ({}, {})",
                    player_id, spawn.x, spawn.y
                );
                return;
            }
            self.pending_respawns.remove(&player_id);
        }
        record.report_position(position, direction);
    }

    fn record_damage(&mut self, player_id: PlayerId, hp: i32, died: bool, attacker_id: PlayerId) {
        let local_id = self.local_id;
        if let Some(record) = self.players.get_mut(&player_id) {
            record.hp = hp;
            if died {
                record.alive = false;
                if player_id != local_id {
                    record.motion = None;
                }
            }
        }

        if died && attacker_id != player_id {
            if let Some(attacker) = self.players.get_mut(&attacker_id) {
                attacker.kills += 1;
            }
        }
    }

    fn track_bullet(&mut self, position: Vec2, velocity: Vec2, owner_id: PlayerId) -> u64 {
        let id = self.next_bullet_id;
        self.next_bullet_id += 1;
        self.bullets.push(BulletRecord {
            id,
            position,
            velocity,
            owner_id,
            ticks_left: BULLET_LIFETIME_TICKS,
        });
        id
    }

    fn age_bullets(&mut self) {
        for bullet in &mut self.bullets {
            bullet.ticks_left = bullet.ticks_left.saturating_sub(1);
        }
        self.bullets.retain(|bullet| bullet.ticks_left > 0);
    }

    fn take_item(&mut self, position: Vec2) -> Option<u8> {
        let index = self.items.iter().position(|item| {
            Vec2::new(item.x, item.y).distance(position) <= POSITION_MATCH_RADIUS
        })?;
        Some(self.items.remove(index).item_type)
    }

    fn clear_mines_at(&mut self, position: Vec2) {
        self.mines
            .retain(|mine| mine.position.distance(position) > POSITION_MATCH_RADIUS);
    }

    fn require_host(&self, what: &str) -> bool {
        if !self.is_host() {
            warn!("Client tried to emit authoritative {}", what);
        }
        self.is_host()
    }
}

/// What the local player did this tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LocalInput {
    pub dx: i8,
    pub dy: i8,
    pub shoot: bool,
    pub place_mine: bool,
    pub position: Vec2,
    pub direction: u8,
}

impl LocalInput {
    /// Stationary at `position`, no actions
    pub fn idle(position: Vec2, direction: u8) -> Self {
        Self {
            position,
            direction,
            ..Self::default()
        }
    }

    pub fn has_actions(&self) -> bool {
        self.dx != 0 || self.dy != 0 || self.shoot || self.place_mine
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    Input,
    IdleResend,
    Skipped,
}

/// Decides when the local player's input goes on the wire
///
/// Any action or movement is sent on the tick it happens. While fully idle
/// the position is still resent every `idle_resend_ticks` so the peer's
/// mirror never goes stale. `position_sync` only flows client to host, so
/// the host resends as an empty `player_input` echo.
#[derive(Debug)]
pub struct InputReporter {
    role: Role,
    player_id: PlayerId,
    idle_resend_ticks: u32,
    idle_ticks: u32,
    last_sent: Option<(Vec2, u8)>,
}

impl InputReporter {
    pub fn new(role: Role, player_id: PlayerId, config: &NetConfig) -> Self {
        Self {
            role,
            player_id,
            idle_resend_ticks: config.idle_resend_ticks.max(1),
            idle_ticks: 0,
            last_sent: None,
        }
    }

    pub fn set_player_id(&mut self, player_id: PlayerId) {
        self.player_id = player_id;
    }

    pub fn report(&mut self, sink: &mut dyn MessageSink, input: &LocalInput) -> Report {
        let moved = self.last_sent != Some((input.position, input.direction));

        if input.has_actions() || moved {
            sink.send(self.input_message(input));
            self.sent(input);
            return Report::Input;
        }

        self.idle_ticks += 1;
        if self.idle_ticks < self.idle_resend_ticks {
            return Report::Skipped;
        }

        let message = match self.role {
            Role::Client => Message::PositionSync {
                player_id: self.player_id,
                x: input.position.x,
                y: input.position.y,
                direction: input.direction,
            },
            Role::Host => self.input_message(input),
        };
        sink.send(message);
        self.sent(input);
        Report::IdleResend
    }

    fn input_message(&self, input: &LocalInput) -> Message {
        Message::PlayerInput {
            player_id: self.player_id,
            dx: input.dx,
            dy: input.dy,
            shoot: input.shoot,
            place_mine: input.place_mine,
            x: input.position.x,
            y: input.position.y,
            direction: input.direction,
        }
    }

    fn sent(&mut self, input: &LocalInput) {
        self.idle_ticks = 0;
        self.last_sent = Some((input.position, input.direction));
    }
}
