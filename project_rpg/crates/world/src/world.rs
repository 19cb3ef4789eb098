//! The simulation facade driven by the tick loop.

use engine_core::{LastWriterWins, SimClock, Simulation};
use identity::{NetworkId, NetworkIdAllocator};
use net::{ActionRequest, ClientRequest, ProtocolError, ServerMessage};
use rand::rngs::StdRng;
use rand::SeedableRng;
use session::{SessionId, SessionManager, SessionOutput, SessionState};
use space::GridPos;

use crate::action::{Action, InteractKind, INTERACT_RANGE};
use crate::area::TickContext;
use crate::area_manager::AreaManager;
use crate::catalog::{EntityCatalog, ItemCatalog, PLAYER_TYPE};
use crate::combat::CombatConfig;
use crate::entity::Entity;
use crate::error::WorldError;
use crate::map::{LinkRef, MapSource};
use crate::outbox::Outbox;

pub const SHUTDOWN_NOTICE: &str = "Server is shutting down.";

#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Area new players appear in.
    pub start_area: String,
    /// Seeds the roam RNG; same seed, same world.
    pub seed: u64,
    pub combat: CombatConfig,
    /// A* node budget per search; 0 means the area's cell count.
    pub max_expansions: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            start_area: "town".to_string(),
            seed: 0x5eed,
            combat: CombatConfig::default(),
            max_expansions: 0,
        }
    }
}

/// Shared state that used to be global: id counter, catalogs and randomness.
#[derive(Debug)]
pub struct Services {
    pub ids: NetworkIdAllocator,
    pub catalog: EntityCatalog,
    pub items: ItemCatalog,
    pub rng: StdRng,
    pub combat: CombatConfig,
}

impl Services {
    pub fn new(catalog: EntityCatalog, items: ItemCatalog, config: &WorldConfig) -> Self {
        Self {
            ids: NetworkIdAllocator::new(),
            catalog,
            items,
            rng: StdRng::seed_from_u64(config.seed),
            combat: config.combat,
        }
    }
}

/// Inbound work for one tick, already decoded by the network layer.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldCommand {
    Connect { session: SessionId },
    Request { session: SessionId, request: ClientRequest },
    Disconnect { session: SessionId },
}

impl LastWriterWins for WorldCommand {
    type Key = SessionId;

    /// Only gameplay actions collapse; `ready` and lifecycle events all run.
    fn lww_key(&self) -> Option<SessionId> {
        match self {
            WorldCommand::Request {
                session,
                request: ClientRequest::Action(_),
            } => Some(*session),
            _ => None,
        }
    }
}

pub struct World {
    areas: AreaManager,
    sessions: SessionManager,
    services: Services,
    outbox: Outbox,
    config: WorldConfig,
}

impl World {
    pub fn new(
        config: WorldConfig,
        catalog: EntityCatalog,
        items: ItemCatalog,
        maps: &dyn MapSource,
    ) -> Result<Self, WorldError> {
        let mut services = Services::new(catalog, items, &config);
        let areas = AreaManager::load(maps, &mut services, config.max_expansions)?;
        if areas.get(&config.start_area).is_none() {
            return Err(WorldError::AreaNotFound(config.start_area.clone()));
        }
        services.catalog.get(PLAYER_TYPE)?;
        Ok(Self {
            areas,
            sessions: SessionManager::new(),
            services,
            outbox: Outbox::new(),
            config,
        })
    }

    pub fn areas(&self) -> &AreaManager {
        &self.areas
    }

    pub fn areas_mut(&mut self) -> &mut AreaManager {
        &mut self.areas
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// The character bound to a session and the area it lives in.
    pub fn character_of(&self, session: SessionId) -> Option<(NetworkId, &str)> {
        let s = self.sessions.get_session(session)?;
        Some((s.character?, s.area.as_deref()?))
    }

    pub fn character_entity(&self, session: SessionId) -> Option<&Entity> {
        let (id, area) = self.character_of(session)?;
        self.areas.get(area)?.entity(id)
    }

    pub fn handle(&mut self, cmd: WorldCommand, clock: &SimClock) {
        match cmd {
            WorldCommand::Connect { session } => {
                tracing::info!(session = %session, "session connected");
                self.sessions.create_session_with_id(session);
            }
            WorldCommand::Request { session, request } => {
                let result = match request {
                    ClientRequest::Ready { name } => self.on_ready(session, name),
                    ClientRequest::Action(action) => self.on_action(session, action, clock),
                };
                if let Err(e) = result {
                    tracing::warn!(session = %session, error = %e, "request failed");
                }
            }
            WorldCommand::Disconnect { session } => self.on_disconnect(session, clock),
        }
    }

    fn on_ready(&mut self, session: SessionId, name: Option<String>) -> Result<(), WorldError> {
        let Some(state) = self.sessions.get_session(session).map(|s| s.state.clone()) else {
            tracing::debug!(session = %session, "ready from unknown session");
            return Ok(());
        };

        if state == SessionState::AwaitingReady {
            let start = self.config.start_area.clone();
            let def = self.services.catalog.get(PLAYER_TYPE)?;
            let area = self
                .areas
                .get_mut(&start)
                .ok_or_else(|| WorldError::AreaNotFound(start.clone()))?;
            let mut player = Entity::player(def, session, name.clone(), area.entry_pos());
            player.id = self.services.ids.allocate();
            let id = area.admit_entity(player, &mut self.outbox);
            area.add_connection(session);
            self.sessions.bind_character(session, id, &start);
            if let Some(s) = self.sessions.get_session_mut(session) {
                s.player_name = name;
            }
            tracing::info!(session = %session, network_id = %id, area = %start, "player entered world");
        }

        let (id, area_name) = self
            .character_of(session)
            .map(|(id, a)| (id, a.to_string()))
            .ok_or_else(|| WorldError::InvariantViolation(format!("{session} ready without character")))?;
        let area = self
            .areas
            .get(&area_name)
            .ok_or_else(|| WorldError::AreaNotFound(area_name.clone()))?;
        let character = area
            .entity(id)
            .map(Entity::to_wire)
            .ok_or(WorldError::EntityNotFound(id))?;
        self.outbox.send(session, area.snapshot(session));
        self.outbox.send(session, ServerMessage::Character { entity: character });
        Ok(())
    }

    fn on_action(
        &mut self,
        session: SessionId,
        request: ActionRequest,
        clock: &SimClock,
    ) -> Result<(), WorldError> {
        let playing = self
            .sessions
            .get_session(session)
            .is_some_and(|s| s.state == SessionState::Playing);
        if !playing {
            let err = ProtocolError::NotReady;
            tracing::warn!(session = %session, error = %err, "protocol violation");
            self.outbox.send_final(session, ServerMessage::error(err.to_string()));
            self.on_disconnect(session, clock);
            return Ok(());
        }
        let (id, area_name) = self
            .character_of(session)
            .map(|(id, a)| (id, a.to_string()))
            .ok_or_else(|| WorldError::InvariantViolation(format!("{session} playing without character")))?;

        let mut ctx = TickContext {
            clock: *clock,
            services: &mut self.services,
            outbox: &mut self.outbox,
        };
        let area = self
            .areas
            .get_mut(&area_name)
            .ok_or_else(|| WorldError::AreaNotFound(area_name.clone()))?;
        if !area.is_spawned(id) {
            tracing::debug!(session = %session, network_id = %id, "action while not spawned ignored");
            return Ok(());
        }

        match request {
            ActionRequest::Move { x, y } => {
                let target = GridPos::new(x, y);
                if !area.grid().in_bounds(target) {
                    tracing::debug!(session = %session, ?target, "move outside area ignored");
                    return Ok(());
                }
                area.start_action(id, Action::Move { target }, &mut ctx)
            }
            ActionRequest::Interact { kind, target } => {
                let kind = InteractKind::from(kind);
                let target = NetworkId::from_u64(target);
                let offered = target != id
                    && area.is_spawned(target)
                    && area.entity(target).is_some_and(|t| t.offers(kind));
                if !offered {
                    tracing::debug!(session = %session, target = %target, kind = kind.tag(), "interaction not offered");
                    return Ok(());
                }
                let range = match kind {
                    InteractKind::Attack => area
                        .entity(id)
                        .and_then(|e| e.character.as_ref())
                        .and_then(|c| c.combat.as_ref())
                        .map(|c| c.attack_range)
                        .unwrap_or(INTERACT_RANGE),
                    _ => INTERACT_RANGE,
                };
                area.start_action(id, Action::interact(target, kind, range), &mut ctx)
            }
            ActionRequest::Equip { item_type } => {
                let item = ctx.services.items.get(&item_type)?.clone();
                area.equip(id, &item, &mut ctx)
            }
        }
    }

    fn on_disconnect(&mut self, session: SessionId, clock: &SimClock) {
        let Some(removed) = self.sessions.remove_session(session) else {
            return;
        };
        tracing::info!(session = %session, name = ?removed.player_name, "session disconnected");
        let (Some(id), Some(area_name)) = (removed.character, removed.area) else {
            return;
        };
        let mut ctx = TickContext {
            clock: *clock,
            services: &mut self.services,
            outbox: &mut self.outbox,
        };
        if let Some(area) = self.areas.get_mut(&area_name) {
            if let Err(e) = area.remove_character(id, &mut ctx) {
                tracing::warn!(session = %session, network_id = %id, error = %e, "character teardown failed");
            }
            area.remove_connection(session);
        }
    }

    /// Send an entity to the entry link of `dest`.
    pub fn change_entity_area(
        &mut self,
        id: NetworkId,
        from: &str,
        dest: &str,
        clock: &SimClock,
    ) -> Result<(), WorldError> {
        let mut ctx = TickContext {
            clock: *clock,
            services: &mut self.services,
            outbox: &mut self.outbox,
        };
        self.areas
            .change_entity_area(id, from, dest, &mut ctx, &mut self.sessions)
    }

    /// Send an entity to a specific link.
    pub fn change_entity_area_via_link(
        &mut self,
        id: NetworkId,
        from: &str,
        link: &LinkRef,
        clock: &SimClock,
    ) -> Result<(), WorldError> {
        let mut ctx = TickContext {
            clock: *clock,
            services: &mut self.services,
            outbox: &mut self.outbox,
        };
        self.areas
            .change_entity_area_via_link(id, from, link, &mut ctx, &mut self.sessions)
    }

    /// Final frame to every playing session before the process stops.
    pub fn shutdown_notice(&mut self) {
        let playing: Vec<SessionId> = self
            .sessions
            .playing_sessions()
            .iter()
            .map(|s| s.session_id)
            .collect();
        for session in playing {
            self.outbox
                .send_final(session, ServerMessage::error(SHUTDOWN_NOTICE));
        }
    }

    /// Encoded frames produced since the last drain.
    pub fn drain_outgoing(&mut self) -> Vec<SessionOutput> {
        self.outbox.drain_outputs()
    }

    /// Queued messages for one session, for inspection in tests.
    pub fn take_messages(&mut self, session: SessionId) -> Vec<ServerMessage> {
        self.outbox.take(session)
    }
}

impl Simulation for World {
    type Command = WorldCommand;

    fn apply(&mut self, cmd: WorldCommand, clock: &SimClock) {
        self.handle(cmd, clock);
    }

    fn advance(&mut self, clock: &SimClock) {
        let mut ctx = TickContext {
            clock: *clock,
            services: &mut self.services,
            outbox: &mut self.outbox,
        };
        self.areas.update(&mut ctx, &mut self.sessions);
    }

    fn entity_count(&self) -> usize {
        self.areas.entity_count()
    }

    fn area_count(&self) -> usize {
        self.areas.area_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{InMemoryMaps, MapData};

    fn town() -> MapData {
        serde_json::from_str(
            r#"{"name":"town","width":4,"height":4,"walkable_tiles":[1],
                "floor":[[1,1,1,1],[1,1,1,1],[1,1,1,1],[1,1,1,1]],
                "walls":[[0,0,0,0],[0,0,0,0],[0,0,0,0],[0,0,0,0]],
                "links":[{"name":"enter","x":1,"y":1}],
                "spawn_points":[]}"#,
        )
        .unwrap()
    }

    fn world() -> World {
        World::new(
            WorldConfig::default(),
            EntityCatalog::builtin(),
            ItemCatalog::default(),
            &InMemoryMaps::new(vec![town()]),
        )
        .unwrap()
    }

    fn clock() -> SimClock {
        SimClock::new(0.1)
    }

    #[test]
    fn missing_start_area_is_rejected() {
        let config = WorldConfig {
            start_area: "castle".into(),
            ..WorldConfig::default()
        };
        let err = World::new(
            config,
            EntityCatalog::builtin(),
            ItemCatalog::default(),
            &InMemoryMaps::new(vec![town()]),
        )
        .err()
        .unwrap();
        assert!(matches!(err, WorldError::AreaNotFound(name) if name == "castle"));
    }

    #[test]
    fn only_actions_are_keyed() {
        let s = SessionId(3);
        let ready = WorldCommand::Request {
            session: s,
            request: ClientRequest::Ready { name: None },
        };
        let step = WorldCommand::Request {
            session: s,
            request: ClientRequest::Action(ActionRequest::Move { x: 1, y: 1 }),
        };
        assert_eq!(ready.lww_key(), None);
        assert_eq!(WorldCommand::Connect { session: s }.lww_key(), None);
        assert_eq!(step.lww_key(), Some(s));
    }

    #[test]
    fn ready_sends_snapshot_then_character() {
        let mut world = world();
        let s = SessionId(1);
        world.handle(WorldCommand::Connect { session: s }, &clock());
        world.handle(
            WorldCommand::Request {
                session: s,
                request: ClientRequest::Ready { name: Some("ana".into()) },
            },
            &clock(),
        );

        let msgs = world.take_messages(s);
        // Spawned before joining the roster, so no separate add frame.
        assert_eq!(msgs.len(), 2);
        assert!(matches!(&msgs[0], ServerMessage::Snapshot { area, entities, .. }
            if area == "town" && entities.len() == 1));
        assert!(matches!(&msgs[1], ServerMessage::Character { entity } if entity.kind == "player"));

        let player = world.character_entity(s).unwrap();
        assert_eq!(player.grid_pos, GridPos::new(1, 1));
        assert_eq!(player.name, "ana");
    }

    #[test]
    fn second_ready_does_not_create_another_player() {
        let mut world = world();
        let s = SessionId(1);
        world.handle(WorldCommand::Connect { session: s }, &clock());
        for _ in 0..2 {
            world.handle(
                WorldCommand::Request {
                    session: s,
                    request: ClientRequest::Ready { name: None },
                },
                &clock(),
            );
        }
        assert_eq!(world.entity_count(), 1);
        assert_eq!(world.take_messages(s).len(), 4);
    }

    #[test]
    fn action_before_ready_disconnects() {
        let mut world = world();
        let s = SessionId(7);
        world.handle(WorldCommand::Connect { session: s }, &clock());
        world.handle(
            WorldCommand::Request {
                session: s,
                request: ClientRequest::Action(ActionRequest::Move { x: 0, y: 0 }),
            },
            &clock(),
        );
        let out = world.drain_outgoing();
        assert_eq!(out.len(), 1);
        assert!(out[0].disconnect);
        assert!(out[0].text.contains("error"));
        assert!(world.sessions().get_session(s).is_none());
    }

    #[test]
    fn shutdown_notice_goes_to_playing_sessions() {
        let mut world = world();
        let (a, b) = (SessionId(1), SessionId(2));
        world.handle(WorldCommand::Connect { session: a }, &clock());
        world.handle(WorldCommand::Connect { session: b }, &clock());
        world.handle(
            WorldCommand::Request {
                session: a,
                request: ClientRequest::Ready { name: None },
            },
            &clock(),
        );
        world.drain_outgoing();

        world.shutdown_notice();
        let out = world.drain_outgoing();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].session_id, a);
        assert!(out[0].disconnect);
        assert!(out[0].text.contains(SHUTDOWN_NOTICE));
    }
}
