use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::sync::{MessageSink, Synchronizer};
use shared::{
    facing_vector, spawn_position, tile_center, MapPayload, PlayerId, Vec2, BULLET_SPEED,
    ITEM_SHIELD, ITEM_SPAWN_INTERVAL, ITEM_SPEED, ITEM_TRIPLE_SHOT, ITEM_VISION, MAX_LIVE_ITEMS,
    MINE_LIMIT, PLAYER_RESPAWN_TICKS, PLAYER_SIZE, SHOOT_COOLDOWN_TICKS, TILE_EMPTY, WIN_KILLS,
};
use std::collections::BTreeMap;

/// Item kinds the spawner may drop; mines are only ever placed by players
const SPAWNABLE_ITEMS: [u8; 4] = [ITEM_TRIPLE_SHOT, ITEM_SHIELD, ITEM_SPEED, ITEM_VISION];

/// Tiles this close to the edge never receive items
const ITEM_EDGE_MARGIN: u32 = 2;

const ITEM_PLACEMENT_ATTEMPTS: usize = 64;

#[derive(Debug, Clone, Default)]
struct Combatant {
    shoot_cooldown: u32,
    respawn_in: Option<u32>,
}

/// Host-side game rules: damage, kills, respawns, mines and item drops
///
/// Every state change goes through the `Synchronizer`, which records it and
/// emits the matching event message to the peer.
pub struct HostWorld {
    map: MapPayload,
    rng: StdRng,
    combatants: BTreeMap<PlayerId, Combatant>,
    ticks_since_item: u32,
    winner: Option<PlayerId>,
}

impl HostWorld {
    pub fn new(map: MapPayload) -> Self {
        Self::with_rng(map, StdRng::from_entropy())
    }

    /// Deterministic item placement
    pub fn with_seed(map: MapPayload, seed: u64) -> Self {
        Self::with_rng(map, StdRng::seed_from_u64(seed))
    }

    fn with_rng(map: MapPayload, rng: StdRng) -> Self {
        Self {
            map,
            rng,
            combatants: BTreeMap::new(),
            ticks_since_item: 0,
            winner: None,
        }
    }

    pub fn map(&self) -> &MapPayload {
        &self.map
    }

    pub fn winner(&self) -> Option<PlayerId> {
        self.winner
    }

    /// Resets the rules state for a new match with the given players
    pub fn begin(&mut self, map: MapPayload, players: impl IntoIterator<Item = PlayerId>) {
        self.map = map;
        self.combatants = players
            .into_iter()
            .map(|id| (id, Combatant::default()))
            .collect();
        self.ticks_since_item = 0;
        self.winner = None;
        info!("World ready with {} players", self.combatants.len());
    }

    /// Acts on one player's shoot/mine flags at their last known position
    pub fn handle_input(
        &mut self,
        sync: &mut Synchronizer,
        sink: &mut dyn MessageSink,
        player_id: PlayerId,
        shoot: bool,
        place_mine: bool,
    ) {
        if self.winner.is_some() {
            return;
        }
        let (position, direction) = match sync.player(player_id) {
            Some(record) if record.alive => (record.position, record.direction),
            _ => return,
        };
        let Some(combatant) = self.combatants.get_mut(&player_id) else {
            return;
        };

        if shoot && combatant.shoot_cooldown == 0 {
            let facing = facing_vector(direction);
            sync.spawn_bullet(
                sink,
                position + facing * PLAYER_SIZE,
                facing * BULLET_SPEED,
                player_id,
            );
            combatant.shoot_cooldown = SHOOT_COOLDOWN_TICKS;
        }

        if place_mine {
            let placed = sync
                .mines()
                .iter()
                .filter(|mine| mine.owner_id == player_id)
                .count() as u32;
            if placed < MINE_LIMIT {
                sync.place_mine(sink, position, player_id);
            } else {
                debug!("Player {} is at the mine limit", player_id);
            }
        }
    }

    /// Applies one point of damage to `target`
    ///
    /// A kill credits `attacker` (unless self-inflicted), schedules the
    /// respawn and ends the match once the attacker reaches the win count.
    pub fn apply_hit(
        &mut self,
        sync: &mut Synchronizer,
        sink: &mut dyn MessageSink,
        target: PlayerId,
        attacker: PlayerId,
    ) -> bool {
        if self.winner.is_some() {
            return false;
        }
        let hp = match sync.player(target) {
            Some(record) if record.alive => record.hp - 1,
            _ => return false,
        };
        let died = hp <= 0;
        sync.report_damage(sink, target, hp.max(0), died, attacker);

        if died {
            info!("Player {} was killed by {}", target, attacker);
            if let Some(combatant) = self.combatants.get_mut(&target) {
                combatant.respawn_in = Some(PLAYER_RESPAWN_TICKS);
            }
            let kills = sync.player(attacker).map_or(0, |record| record.kills);
            if attacker != target && kills >= WIN_KILLS {
                info!("Player {} wins with {} kills", attacker, kills);
                self.winner = Some(attacker);
                sync.set_game_over(true);
            }
        }
        died
    }

    /// Sets off the mine at `position`, damaging `victim` if one stepped on it
    pub fn detonate_mine(
        &mut self,
        sync: &mut Synchronizer,
        sink: &mut dyn MessageSink,
        position: Vec2,
        victim: Option<PlayerId>,
    ) -> bool {
        let Some(owner) = sync
            .mines()
            .iter()
            .find(|mine| mine.position.distance(position) <= 1.0)
            .map(|mine| mine.owner_id)
        else {
            return false;
        };

        sync.explode(sink, position);
        if let Some(victim) = victim {
            self.apply_hit(sync, sink, victim, owner);
        }
        true
    }

    pub fn pickup(
        &mut self,
        sync: &mut Synchronizer,
        sink: &mut dyn MessageSink,
        player_id: PlayerId,
        position: Vec2,
    ) -> Option<u8> {
        let item_type = sync.pickup_item(sink, position, player_id)?;
        debug!("Player {} picked up item {}", player_id, item_type);
        Some(item_type)
    }

    /// Advances cooldowns, respawn timers and the item spawner by one tick
    pub fn tick(&mut self, sync: &mut Synchronizer, sink: &mut dyn MessageSink) {
        let mut respawns = Vec::new();
        for (id, combatant) in self.combatants.iter_mut() {
            combatant.shoot_cooldown = combatant.shoot_cooldown.saturating_sub(1);
            if let Some(remaining) = combatant.respawn_in {
                if remaining <= 1 {
                    combatant.respawn_in = None;
                    respawns.push(*id);
                } else {
                    combatant.respawn_in = Some(remaining - 1);
                }
            }
        }
        for id in respawns {
            sync.respawn(id, spawn_position(id, self.map.width, self.map.height));
        }

        if self.winner.is_some() {
            return;
        }
        self.ticks_since_item += 1;
        if self.ticks_since_item < ITEM_SPAWN_INTERVAL {
            return;
        }
        self.ticks_since_item = 0;

        if sync.items().len() >= MAX_LIVE_ITEMS {
            return;
        }
        if let Some(position) = self.random_item_position(sync) {
            let item_type = SPAWNABLE_ITEMS[self.rng.gen_range(0..SPAWNABLE_ITEMS.len())];
            debug!("Spawning item {} at ({}, {})", item_type, position.x, position.y);
            sync.spawn_item(sink, position, item_type);
        }
    }

    fn random_item_position(&mut self, sync: &Synchronizer) -> Option<Vec2> {
        let (width, height) = (self.map.width, self.map.height);
        if width <= ITEM_EDGE_MARGIN * 2 || height <= ITEM_EDGE_MARGIN * 2 {
            return None;
        }

        for _ in 0..ITEM_PLACEMENT_ATTEMPTS {
            let x = self.rng.gen_range(ITEM_EDGE_MARGIN..width - ITEM_EDGE_MARGIN);
            let y = self.rng.gen_range(ITEM_EDGE_MARGIN..height - ITEM_EDGE_MARGIN);
            if self.map.tile(x, y) != Some(TILE_EMPTY) {
                continue;
            }
            let position = tile_center(x, y);
            let occupied = sync
                .items()
                .iter()
                .any(|item| item.x == position.x && item.y == position.y);
            if !occupied {
                return Some(position);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::transport::Role;
    use shared::{Message, NetConfig, PLAYER_MAX_HP};

    fn setup() -> (HostWorld, Synchronizer) {
        let map = MapPayload::bordered(32, 32);
        let mut sync = Synchronizer::new(Role::Host, 0, &NetConfig::default());
        sync.add_player(0, spawn_position(0, 32, 32));
        sync.add_player(1, spawn_position(1, 32, 32));
        let mut world = HostWorld::with_seed(map.clone(), 7);
        world.begin(map, [0, 1]);
        (world, sync)
    }

    #[test]
    fn test_shoot_spawns_bullet_in_front() {
        let (mut world, mut sync) = setup();
        let mut sent: Vec<Message> = Vec::new();
        sync.update_local(Vec2::new(36.0, 36.0), 1);

        world.handle_input(&mut sync, &mut sent, 0, true, false);

        match &sent[..] {
            [Message::BulletSpawn {
                x,
                y,
                vx,
                vy,
                owner_id,
            }] => {
                assert_approx_eq!(*x, 42.0);
                assert_approx_eq!(*y, 36.0);
                assert_approx_eq!(*vx, BULLET_SPEED);
                assert_approx_eq!(*vy, 0.0);
                assert_eq!(*owner_id, 0);
            }
            other => panic!("Unexpected messages {:?}", other),
        }
    }

    #[test]
    fn test_shoot_cooldown() {
        let (mut world, mut sync) = setup();
        let mut sent: Vec<Message> = Vec::new();

        world.handle_input(&mut sync, &mut sent, 1, true, false);
        world.handle_input(&mut sync, &mut sent, 1, true, false);
        assert_eq!(sent.len(), 1);

        for _ in 0..SHOOT_COOLDOWN_TICKS {
            world.tick(&mut sync, &mut sent);
        }
        world.handle_input(&mut sync, &mut sent, 1, true, false);
        assert_eq!(sync.bullets().len(), 2);
    }

    #[test]
    fn test_mine_limit() {
        let (mut world, mut sync) = setup();
        let mut sent: Vec<Message> = Vec::new();

        for _ in 0..MINE_LIMIT + 2 {
            world.handle_input(&mut sync, &mut sent, 0, false, true);
        }
        assert_eq!(sync.mines().len(), MINE_LIMIT as usize);
    }

    #[test]
    fn test_hits_kill_and_respawn() {
        let (mut world, mut sync) = setup();
        let mut sent: Vec<Message> = Vec::new();

        for _ in 0..PLAYER_MAX_HP - 1 {
            assert!(!world.apply_hit(&mut sync, &mut sent, 1, 0));
        }
        assert!(world.apply_hit(&mut sync, &mut sent, 1, 0));
        assert!(matches!(
            sent.last(),
            Some(Message::PlayerDamage {
                player_id: 1,
                hp: 0,
                died: true,
                attacker_id: 0
            })
        ));
        assert_eq!(sync.player(0).map(|p| p.kills), Some(1));

        // Dead players take no further damage
        assert!(!world.apply_hit(&mut sync, &mut sent, 1, 0));

        for _ in 0..PLAYER_RESPAWN_TICKS {
            world.tick(&mut sync, &mut sent);
        }
        let respawned = sync.player(1).unwrap();
        assert!(respawned.alive);
        assert_eq!(respawned.hp, PLAYER_MAX_HP);
        assert_eq!(respawned.position, spawn_position(1, 32, 32));
    }

    #[test]
    fn test_win_ends_match() {
        let (mut world, mut sync) = setup();
        let mut sent: Vec<Message> = Vec::new();

        for _ in 0..WIN_KILLS {
            while !world.apply_hit(&mut sync, &mut sent, 1, 0) {}
            for _ in 0..PLAYER_RESPAWN_TICKS {
                world.tick(&mut sync, &mut sent);
            }
        }

        assert_eq!(world.winner(), Some(0));
        assert!(sync.game_over());
        assert!(matches!(
            sync.snapshot(),
            Message::GameState {
                game_over: true,
                ..
            }
        ));
    }

    #[test]
    fn test_mine_detonation_credits_owner() {
        let (mut world, mut sync) = setup();
        let mut sent: Vec<Message> = Vec::new();
        let spot = spawn_position(0, 32, 32);

        world.handle_input(&mut sync, &mut sent, 0, false, true);
        assert!(world.detonate_mine(&mut sync, &mut sent, spot, Some(1)));
        assert!(sync.mines().is_empty());
        assert_eq!(sync.player(1).map(|p| p.hp), Some(PLAYER_MAX_HP - 1));
        assert!(sent.iter().any(|m| matches!(m, Message::Explosion { .. })));

        // Nothing left to detonate
        assert!(!world.detonate_mine(&mut sync, &mut sent, spot, Some(1)));
    }

    #[test]
    fn test_item_spawner() {
        let (mut world, mut sync) = setup();
        let mut sent: Vec<Message> = Vec::new();

        for _ in 0..ITEM_SPAWN_INTERVAL * (MAX_LIVE_ITEMS as u32 + 2) {
            world.tick(&mut sync, &mut sent);
        }

        assert_eq!(sync.items().len(), MAX_LIVE_ITEMS);
        for item in sync.items() {
            assert!(SPAWNABLE_ITEMS.contains(&item.item_type));
            let tile_x = (item.x / shared::TILE_SIZE) as u32;
            let tile_y = (item.y / shared::TILE_SIZE) as u32;
            assert!((2..30).contains(&tile_x));
            assert!((2..30).contains(&tile_y));
        }

        let first = sync.items()[0].clone();
        let picked = world.pickup(&mut sync, &mut sent, 1, Vec2::new(first.x, first.y));
        assert_eq!(picked, Some(first.item_type));
        assert_eq!(sync.items().len(), MAX_LIVE_ITEMS - 1);
    }
}
