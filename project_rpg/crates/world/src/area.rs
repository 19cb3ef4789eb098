use std::collections::{BTreeMap, BTreeSet};

use engine_core::SimClock;
use identity::NetworkId;
use net::ServerMessage;
use session::SessionId;
use space::{GridPos, Navigator, TileGrid};

use crate::catalog::{ItemDef, ItemSlot};
use crate::entity::{Entity, Roam, Visibility};
use crate::error::WorldError;
use crate::map::{LinkDef, LinkRef, MapData, SpawnPointDef};
use crate::outbox::Outbox;
use crate::world::Services;

/// Everything a tick may touch outside the area itself.
pub struct TickContext<'a> {
    pub clock: SimClock,
    pub services: &'a mut Services,
    pub outbox: &'a mut Outbox,
}

impl TickContext<'_> {
    pub fn now(&self) -> f64 {
        self.clock.now
    }
}

/// A map spawn point and the entity it currently backs.
#[derive(Debug, Clone)]
pub struct SpawnPoint {
    pub def: SpawnPointDef,
    pub current: Option<NetworkId>,
    /// When to produce a replacement; `None` while `current` is alive.
    pub respawn_at: Option<f64>,
}

/// One map partition: tiles, navigator, entities and the connections watching it.
#[derive(Debug)]
pub struct Area {
    pub(crate) name: String,
    pub(crate) grid: TileGrid,
    pub(crate) navigator: Navigator,
    pub(crate) entities: BTreeMap<NetworkId, Entity>,
    /// Update order: insertion order.
    pub(crate) order: Vec<NetworkId>,
    pub(crate) spawned: BTreeSet<NetworkId>,
    pub(crate) links: Vec<LinkDef>,
    pub(crate) entry: GridPos,
    pub(crate) connections: BTreeSet<SessionId>,
    pub(crate) spawn_points: Vec<SpawnPoint>,
    /// AreaLink effects queued this tick, executed by the area manager.
    pub(crate) pending_transfers: Vec<(NetworkId, LinkRef)>,
}

impl Area {
    /// An empty area with no links; the entry point is the origin.
    pub fn new(name: impl Into<String>, grid: TileGrid, navigator: Navigator) -> Self {
        Self {
            name: name.into(),
            grid,
            navigator,
            entities: BTreeMap::new(),
            order: Vec::new(),
            spawned: BTreeSet::new(),
            links: Vec::new(),
            entry: GridPos::new(0, 0),
            connections: BTreeSet::new(),
            spawn_points: Vec::new(),
            pending_transfers: Vec::new(),
        }
    }

    pub fn from_map(
        map: &MapData,
        services: &mut Services,
        max_expansions: usize,
    ) -> Result<Self, WorldError> {
        let grid = map.to_grid()?;
        let navigator =
            Navigator::from_tiles(&grid, &map.walkable_tiles).with_max_expansions(max_expansions);
        let mut area = Self::new(map.name.clone(), grid, navigator);
        area.links = map.links.clone();
        if let Some(entry) = map.entry_link() {
            area.entry = entry.pos();
        }

        for link in &map.links {
            if let Some(dest) = &link.destination {
                area.add_entity(Entity::area_link(dest.clone(), link.pos()), services);
            }
        }
        for def in &map.spawn_points {
            area.spawn_points.push(SpawnPoint {
                def: def.clone(),
                current: None,
                respawn_at: None,
            });
            let index = area.spawn_points.len() - 1;
            area.instantiate_spawn_point(index, services, 0.0)?;
        }

        tracing::info!(
            area = %area.name,
            width = map.width,
            height = map.height,
            entities = area.entities.len(),
            "area loaded"
        );
        Ok(area)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn entry_pos(&self) -> GridPos {
        self.entry
    }

    pub fn link(&self, name: &str) -> Option<&LinkDef> {
        self.links.iter().find(|l| l.name == name)
    }

    pub fn entity(&self, id: NetworkId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: NetworkId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn entity_ids(&self) -> &[NetworkId] {
        &self.order
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn is_spawned(&self, id: NetworkId) -> bool {
        self.spawned.contains(&id)
    }

    pub fn spawned_ids(&self) -> impl Iterator<Item = NetworkId> + '_ {
        self.spawned.iter().copied()
    }

    pub fn connections(&self) -> &BTreeSet<SessionId> {
        &self.connections
    }

    pub fn add_connection(&mut self, session: SessionId) {
        self.connections.insert(session);
    }

    pub fn remove_connection(&mut self, session: SessionId) {
        self.connections.remove(&session);
    }

    pub fn spawn_points(&self) -> &[SpawnPoint] {
        &self.spawn_points
    }

    /// Assign a fresh networkId and take ownership. The entity spawns on
    /// its first update at or after `spawn_at`.
    pub fn add_entity(&mut self, mut entity: Entity, services: &mut Services) -> NetworkId {
        entity.id = services.ids.allocate();
        self.insert_entity(entity)
    }

    fn insert_entity(&mut self, mut entity: Entity) -> NetworkId {
        let id = entity.id;
        if !self.grid.in_bounds(entity.grid_pos) {
            tracing::warn!(network_id = %id, area = %self.name, pos = ?entity.grid_pos, "entity placed out of bounds, moved to entry");
            entity.grid_pos = self.entry;
            entity.position = self.entry.to_vec2();
        }
        if entity.kind.blocks_tile() {
            if let Err(e) = self.navigator.set_walkable_at(entity.grid_pos, false) {
                tracing::warn!(network_id = %id, error = %e, "could not block tile");
            }
        }
        self.entities.insert(id, entity);
        self.order.push(id);
        id
    }

    /// Take an entity that already has an id (area transfer) and spawn it.
    pub fn admit_entity(&mut self, entity: Entity, outbox: &mut Outbox) -> NetworkId {
        let id = self.insert_entity(entity);
        self.spawn(id, outbox);
        id
    }

    pub fn spawn(&mut self, id: NetworkId, outbox: &mut Outbox) {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        if entity.spawned || entity.destroyed {
            return;
        }
        entity.spawned = true;
        self.spawned.insert(id);
        let msg = ServerMessage::Add {
            entity: entity.to_wire(),
        };
        let visibility = entity.visibility;
        tracing::debug!(network_id = %id, area = %self.name, "spawned");
        self.broadcast(outbox, visibility, msg);
    }

    pub fn despawn(&mut self, id: NetworkId, outbox: &mut Outbox) {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        if !entity.spawned {
            return;
        }
        entity.spawned = false;
        self.spawned.remove(&id);
        let visibility = entity.visibility;
        tracing::debug!(network_id = %id, area = %self.name, "despawned");
        self.broadcast(
            outbox,
            visibility,
            ServerMessage::Remove {
                network_id: id.to_u64(),
            },
        );
    }

    pub(crate) fn broadcast(&self, outbox: &mut Outbox, visibility: Visibility, msg: ServerMessage) {
        for session in self.connections.iter().filter(|s| visibility.includes(**s)) {
            outbox.send(*session, msg.clone());
        }
    }

    /// Broadcast on behalf of a spawned entity, honouring its visibility.
    pub(crate) fn broadcast_about(&self, id: NetworkId, outbox: &mut Outbox, msg: ServerMessage) {
        if let Some(entity) = self.entities.get(&id) {
            if entity.spawned {
                self.broadcast(outbox, entity.visibility, msg);
            }
        }
    }

    /// Send to the connection that owns a player entity.
    pub(crate) fn send_to_owner(&self, id: NetworkId, outbox: &mut Outbox, msg: ServerMessage) {
        if let Some(session) = self.entities.get(&id).and_then(|e| e.kind.session()) {
            outbox.send(session, msg);
        }
    }

    /// Full state for one connection.
    pub fn snapshot(&self, session: SessionId) -> ServerMessage {
        let config = self.grid.config();
        ServerMessage::Snapshot {
            area: self.name.clone(),
            width: config.width,
            height: config.height,
            floor: self.grid.floor().to_vec(),
            walls: self.grid.walls().to_vec(),
            walkable: self.navigator.walkability_matrix(),
            entities: self
                .order
                .iter()
                .filter_map(|id| self.entities.get(id))
                .filter(|e| e.spawned && e.visibility.includes(session))
                .map(Entity::to_wire)
                .collect(),
        }
    }

    /// Advance every entity once, then sweep the destroyed ones.
    /// Returns how many entities were swept.
    pub fn update(&mut self, ctx: &mut TickContext<'_>) -> usize {
        self.refill_spawn_points(ctx);

        let ids = self.order.clone();
        for id in ids {
            if let Err(e) = self.update_entity(id, ctx) {
                if e.is_invariant_violation() {
                    tracing::error!(network_id = %id, area = %self.name, error = %e, "entity update failed");
                } else {
                    tracing::warn!(network_id = %id, area = %self.name, error = %e, "entity update failed");
                }
            }
        }

        self.sweep(ctx)
    }

    fn update_entity(&mut self, id: NetworkId, ctx: &mut TickContext<'_>) -> Result<(), WorldError> {
        let Some(entity) = self.entities.get(&id) else {
            return Ok(());
        };
        if entity.destroyed {
            return Ok(());
        }
        if !entity.spawned {
            if ctx.now() >= entity.spawn_at {
                self.respawn(id, ctx);
            }
            return Ok(());
        }
        if entity.character.is_none() {
            return Ok(());
        }

        self.advance_movement(id, ctx);
        self.evaluate_action(id, ctx)
    }

    /// Spawn, restoring dead characters at the entry link first.
    fn respawn(&mut self, id: NetworkId, ctx: &mut TickContext<'_>) {
        let entry = self.entry;
        let now = ctx.now();
        if let Some(entity) = self.entities.get_mut(&id) {
            if let Some(ch) = entity.character.as_mut() {
                if let Some(combat) = ch.combat.as_mut().filter(|c| c.is_dead()) {
                    combat.restore();
                    ch.clear_paths();
                    entity.grid_pos = entry;
                    entity.position = entry.to_vec2();
                    tracing::info!(network_id = %id, area = %self.name, "character respawned");
                }
                if let Some(roam) = ch.roam.as_mut() {
                    roam.next_at = roam.next_at.max(now);
                }
            }
        }
        self.spawn(id, ctx.outbox);
    }

    fn refill_spawn_points(&mut self, ctx: &mut TickContext<'_>) {
        let now = ctx.now();
        for index in 0..self.spawn_points.len() {
            let due = {
                let sp = &self.spawn_points[index];
                sp.current.is_none() && sp.respawn_at.is_some_and(|t| now >= t)
            };
            if due {
                if let Err(e) = self.instantiate_spawn_point(index, ctx.services, now) {
                    tracing::warn!(area = %self.name, index, error = %e, "spawn point failed");
                    self.spawn_points[index].respawn_at = None;
                }
            }
        }
    }

    fn instantiate_spawn_point(
        &mut self,
        index: usize,
        services: &mut Services,
        now: f64,
    ) -> Result<NetworkId, WorldError> {
        let def = self.spawn_points[index].def.clone();
        let type_def = services.catalog.get(&def.type_id)?;
        let mut entity = Entity::from_def(type_def, def.pos())?;
        let roam_interval = type_def.roam.unwrap_or_default();
        entity.spawn_at = now;
        entity.spawn_point = Some(index);
        if let (Some(ch), Some(region)) = (entity.character.as_mut(), def.patrol) {
            ch.roam = Some(Roam {
                region,
                interval: roam_interval,
                next_at: now,
            });
        }
        let id = self.add_entity(entity, services);
        let sp = &mut self.spawn_points[index];
        sp.current = Some(id);
        sp.respawn_at = None;
        Ok(id)
    }

    /// Remove entities destroyed during this tick.
    fn sweep(&mut self, ctx: &mut TickContext<'_>) -> usize {
        let dead: Vec<NetworkId> = self
            .order
            .iter()
            .copied()
            .filter(|id| self.entities.get(id).is_some_and(|e| e.destroyed))
            .collect();
        if dead.is_empty() {
            return 0;
        }

        let now = ctx.now();
        for id in &dead {
            self.despawn(*id, ctx.outbox);
            let Some(entity) = self.entities.remove(id) else {
                continue;
            };
            if entity.kind.blocks_tile() {
                let _ = self.navigator.set_walkable_at(entity.grid_pos, true);
            }
            if let Some(index) = entity.spawn_point {
                let delay = ctx
                    .services
                    .catalog
                    .get(&entity.type_id)
                    .map(|d| d.respawn_delay_secs)
                    .unwrap_or(0.0);
                if let Some(sp) = self.spawn_points.get_mut(index) {
                    sp.current = None;
                    sp.respawn_at = Some(now + delay);
                }
            }
            tracing::debug!(network_id = %id, area = %self.name, "entity swept");
        }
        let dead_set: BTreeSet<NetworkId> = dead.iter().copied().collect();
        self.order.retain(|id| !dead_set.contains(id));
        dead.len()
    }

    /// Detach an entity for transfer: actions released, removal broadcast,
    /// owning connection unregistered.
    pub fn take_entity(
        &mut self,
        id: NetworkId,
        ctx: &mut TickContext<'_>,
    ) -> Result<Entity, WorldError> {
        if !self.entities.contains_key(&id) {
            return Err(WorldError::EntityNotFound(id));
        }
        self.release_references(id, ctx)?;
        self.despawn(id, ctx.outbox);
        let entity = self
            .entities
            .remove(&id)
            .ok_or(WorldError::EntityNotFound(id))?;
        self.order.retain(|other| *other != id);
        if entity.kind.blocks_tile() {
            let _ = self.navigator.set_walkable_at(entity.grid_pos, true);
        }
        if let Some(session) = entity.kind.session() {
            self.connections.remove(&session);
        }
        Ok(entity)
    }

    /// Tear down a departing player's character. Swept at the end of the tick.
    pub fn remove_character(
        &mut self,
        id: NetworkId,
        ctx: &mut TickContext<'_>,
    ) -> Result<(), WorldError> {
        if !self.entities.contains_key(&id) {
            return Err(WorldError::EntityNotFound(id));
        }
        self.release_references(id, ctx)?;
        self.despawn(id, ctx.outbox);
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.destroyed = true;
            if let Some(session) = entity.kind.session() {
                self.connections.remove(&session);
            }
        }
        Ok(())
    }

    pub fn take_pending_transfers(&mut self) -> Vec<(NetworkId, LinkRef)> {
        std::mem::take(&mut self.pending_transfers)
    }

    /// Equip immediately; does not touch the current action.
    pub fn equip(
        &mut self,
        id: NetworkId,
        item: &ItemDef,
        ctx: &mut TickContext<'_>,
    ) -> Result<(), WorldError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(WorldError::EntityNotFound(id))?;
        let ch = entity
            .character
            .as_mut()
            .ok_or(WorldError::NotACharacter(id))?;
        let armor_type = match item.slot {
            ItemSlot::Weapon => {
                ch.equipment.weapon = Some(item.id.clone());
                if let Some(combat) = ch.combat.as_mut() {
                    combat.bonus_damage = item.damage_bonus;
                }
                None
            }
            ItemSlot::Armor => {
                ch.equipment.armor = Some(item.id.clone());
                item.armor_type.clone()
            }
        };
        if let Some(speed) = item.speed {
            ch.speed = speed;
        }
        let equipment = ch.equipment.to_wire();
        tracing::debug!(network_id = %id, item = %item.id, "equipped");

        self.broadcast_about(
            id,
            ctx.outbox,
            ServerMessage::Update {
                network_id: id.to_u64(),
                armor_type,
                speed: item.speed,
            },
        );
        self.send_to_owner(id, ctx.outbox, ServerMessage::Equipment { equipment });
        Ok(())
    }
}
