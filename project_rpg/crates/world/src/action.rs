//! Per-character intent and the state machine that drives it.
//!
//! A character holds at most one [`Action`]. Replacing it always goes through
//! [`Area::finish_action`], which releases the back-reference on the old
//! target before anything new is assigned.

use identity::NetworkId;
use net::{InteractAction, ServerMessage};
use rand::Rng;
use space::GridPos;

use crate::area::{Area, TickContext};
use crate::entity::{tile_wire, Entity, EntityKind};
use crate::error::WorldError;

/// Tile range for non-combat interactions.
pub const INTERACT_RANGE: i32 = 1;

/// Tries per roam before giving up until the next interval.
const ROAM_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InteractKind {
    Talk,
    Attack,
    AreaLink,
    Configure,
}

impl InteractKind {
    pub fn tag(self) -> &'static str {
        InteractAction::from(self).tag()
    }

    /// Kinds whose effect opens a UI; repeating them closes it.
    pub fn opens_ui(self) -> bool {
        matches!(self, InteractKind::Talk | InteractKind::Configure)
    }
}

impl From<InteractAction> for InteractKind {
    fn from(a: InteractAction) -> Self {
        match a {
            InteractAction::Talk => InteractKind::Talk,
            InteractAction::Attack => InteractKind::Attack,
            InteractAction::AreaLink => InteractKind::AreaLink,
            InteractAction::Configure => InteractKind::Configure,
        }
    }
}

impl From<InteractKind> for InteractAction {
    fn from(k: InteractKind) -> Self {
        match k {
            InteractKind::Talk => InteractAction::Talk,
            InteractKind::Attack => InteractAction::Attack,
            InteractKind::AreaLink => InteractAction::AreaLink,
            InteractKind::Configure => InteractAction::Configure,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    pub target: NetworkId,
    pub kind: InteractKind,
    /// Chebyshev distance in tiles.
    pub range: i32,
    /// Dialog sent, UI opened, or first hit landed. Reset only by replacing the action.
    pub done_once: bool,
    /// Target tile the current path was planned against.
    pub planned_for: Option<GridPos>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Move { target: GridPos },
    Interact(Interaction),
}

impl Action {
    pub fn interact(target: NetworkId, kind: InteractKind, range: i32) -> Self {
        Action::Interact(Interaction {
            target,
            kind,
            range,
            done_once: false,
            planned_for: None,
        })
    }

    pub fn target_entity(&self) -> Option<NetworkId> {
        match self {
            Action::Interact(ix) => Some(ix.target),
            Action::Move { .. } => None,
        }
    }
}

enum Repeat {
    Ignore,
    Close,
    Replace,
}

fn move_message(entity: &Entity) -> Option<ServerMessage> {
    let ch = entity.character.as_ref()?;
    let path = ch
        .path
        .iter()
        .chain(ch.next_path.iter().flatten())
        .copied()
        .map(tile_wire)
        .collect();
    Some(ServerMessage::Move {
        network_id: entity.id.to_u64(),
        pos: net::protocol::PosWire {
            x: entity.position.x,
            y: entity.position.y,
        },
        path,
        speed: ch.speed,
    })
}

impl Area {
    /// Assign a new action, obeying the repeat/replace rules.
    pub fn start_action(
        &mut self,
        id: NetworkId,
        action: Action,
        ctx: &mut TickContext<'_>,
    ) -> Result<(), WorldError> {
        let entity = self.entities.get(&id).ok_or(WorldError::EntityNotFound(id))?;
        let ch = entity
            .character
            .as_ref()
            .ok_or(WorldError::NotACharacter(id))?;

        let repeat = match (&ch.action, &action) {
            (Some(Action::Move { target: current }), Action::Move { target }) if current == target => {
                Repeat::Ignore
            }
            (Some(Action::Interact(current)), Action::Interact(new))
                if current.kind == new.kind && current.target == new.target =>
            {
                if current.done_once && current.kind.opens_ui() {
                    Repeat::Close
                } else {
                    Repeat::Ignore
                }
            }
            _ => Repeat::Replace,
        };
        match repeat {
            Repeat::Ignore => return Ok(()),
            Repeat::Close => return self.finish_action(id, ctx),
            Repeat::Replace => {}
        }

        if let Action::Interact(ix) = &action {
            if ix.kind == InteractKind::AreaLink {
                let same_area = matches!(
                    self.entities.get(&ix.target).map(|t| &t.kind),
                    Some(EntityKind::AreaLink { destination }) if destination.area == self.name
                );
                if same_area {
                    tracing::debug!(network_id = %id, area = %self.name, "already in destination area");
                    return Ok(());
                }
            }
        }

        self.finish_action(id, ctx)?;
        match action {
            Action::Move { target } => self.begin_move(id, target, ctx),
            Action::Interact(ix) => self.begin_interaction(id, ix, ctx),
        }
    }

    fn begin_move(
        &mut self,
        id: NetworkId,
        target: GridPos,
        ctx: &mut TickContext<'_>,
    ) -> Result<(), WorldError> {
        let anchor = self.anchor(id)?;
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(WorldError::EntityNotFound(id))?;
        let ch = entity
            .character
            .as_mut()
            .ok_or(WorldError::NotACharacter(id))?;

        if anchor == target {
            if ch.path.is_empty() {
                // Already standing there: finished on arrival.
                ch.next_path = None;
                return Ok(());
            }
            ch.action = Some(Action::Move { target });
            self.halt(id, ctx);
            return Ok(());
        }

        ch.action = Some(Action::Move { target });
        match self.navigator.find_path(anchor, target) {
            Some(route) => self.apply_path(id, route, ctx),
            None => {
                tracing::trace!(network_id = %id, ?target, "no route, move pending");
                Ok(())
            }
        }
    }

    fn begin_interaction(
        &mut self,
        id: NetworkId,
        ix: Interaction,
        ctx: &mut TickContext<'_>,
    ) -> Result<(), WorldError> {
        let target = ix.target;
        let is_attack = ix.kind == InteractKind::Attack;

        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(WorldError::EntityNotFound(id))?;
        let ch = entity
            .character
            .as_mut()
            .ok_or(WorldError::NotACharacter(id))?;
        if is_attack && ch.combat.is_none() {
            tracing::debug!(network_id = %id, "non-combatant cannot attack");
            return Ok(());
        }
        ch.action = Some(Action::Interact(ix));
        let status = match ch.combat.as_mut() {
            Some(combat) if is_attack => {
                combat.in_combat = true;
                Some(ServerMessage::Status {
                    network_id: id.to_u64(),
                    in_combat: true,
                    hp: combat.hp,
                })
            }
            _ => None,
        };

        if let Some(tch) = self
            .entities
            .get_mut(&target)
            .and_then(|t| t.character.as_mut())
        {
            if !tch.targeted_by.contains(&id) {
                tch.targeted_by.push(id);
            }
        }
        if let Some(status) = status {
            self.broadcast_about(id, ctx.outbox, status);
        }
        Ok(())
    }

    /// End the current action, releasing the target's back-reference.
    pub fn finish_action(&mut self, id: NetworkId, ctx: &mut TickContext<'_>) -> Result<(), WorldError> {
        let Some(ch) = self
            .entities
            .get_mut(&id)
            .and_then(|e| e.character.as_mut())
        else {
            return Ok(());
        };
        let Some(action) = ch.action.take() else {
            return Ok(());
        };

        if let Action::Interact(ix) = action {
            let status = match ch.combat.as_mut() {
                Some(combat) if ix.kind == InteractKind::Attack => {
                    combat.in_combat = false;
                    // The dead already sent their final hp=0 status.
                    (!combat.is_dead()).then(|| ServerMessage::Status {
                        network_id: id.to_u64(),
                        in_combat: false,
                        hp: combat.hp,
                    })
                }
                _ => None,
            };
            if let Some(tch) = self
                .entities
                .get_mut(&ix.target)
                .and_then(|t| t.character.as_mut())
            {
                tch.targeted_by.retain(|a| *a != id);
            }
            if let Some(status) = status {
                self.broadcast_about(id, ctx.outbox, status);
            }
        }
        Ok(())
    }

    /// Cancel everything that points at `id`, finish its own action and
    /// forget its aggro. Used on death, transfer and logout.
    pub(crate) fn release_references(
        &mut self,
        id: NetworkId,
        ctx: &mut TickContext<'_>,
    ) -> Result<(), WorldError> {
        let interactors = self
            .entities
            .get_mut(&id)
            .and_then(|e| e.character.as_mut())
            .map(|c| std::mem::take(&mut c.targeted_by))
            .unwrap_or_default();
        for other in interactors {
            let targets_us = self
                .entities
                .get(&other)
                .and_then(|e| e.character.as_ref())
                .and_then(|c| c.action.as_ref())
                .and_then(Action::target_entity)
                == Some(id);
            if targets_us {
                self.halt(other, ctx);
                self.finish_action(other, ctx)?;
            }
        }
        self.finish_action(id, ctx)?;
        self.purge_aggro(id);
        Ok(())
    }

    /// Where the next path must start: the waypoint in flight, else the
    /// last grid-aligned position.
    pub(crate) fn anchor(&self, id: NetworkId) -> Result<GridPos, WorldError> {
        let entity = self.entities.get(&id).ok_or(WorldError::EntityNotFound(id))?;
        let ch = entity
            .character
            .as_ref()
            .ok_or(WorldError::NotACharacter(id))?;
        Ok(ch.path.front().copied().unwrap_or(entity.grid_pos))
    }

    /// Install a route computed from [`Area::anchor`]. A step already in
    /// flight is kept; the route takes over at the next waypoint.
    pub(crate) fn apply_path(
        &mut self,
        id: NetworkId,
        route: Vec<GridPos>,
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
        if ch.path.is_empty() {
            ch.path = route.into();
            ch.next_path = None;
        } else {
            ch.path.truncate(1);
            ch.next_path = if route.is_empty() { None } else { Some(route) };
        }
        if let Some(msg) = move_message(entity) {
            self.broadcast_about(id, ctx.outbox, msg);
        }
        Ok(())
    }

    /// Stop after the step in flight.
    pub(crate) fn halt(&mut self, id: NetworkId, ctx: &mut TickContext<'_>) {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        let Some(ch) = entity.character.as_mut() else {
            return;
        };
        if ch.path.len() <= 1 && ch.next_path.is_none() {
            return;
        }
        ch.path.truncate(1);
        ch.next_path = None;
        if let Some(msg) = move_message(entity) {
            self.broadcast_about(id, ctx.outbox, msg);
        }
    }

    /// Spend `speed * delta` along the path, carrying leftover budget past
    /// each waypoint.
    pub(crate) fn advance_movement(&mut self, id: NetworkId, ctx: &mut TickContext<'_>) {
        let delta = ctx.clock.delta as f32;
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        let Some(ch) = entity.character.as_mut() else {
            return;
        };
        if ch.path.is_empty() && ch.next_path.is_none() {
            return;
        }

        let mut budget = ch.speed * delta;
        let mut switched = false;
        while budget > 0.0 {
            if ch.path.is_empty() {
                match ch.next_path.take() {
                    Some(next) => {
                        ch.path = next.into();
                        switched = true;
                    }
                    None => break,
                }
            }
            let Some(&waypoint) = ch.path.front() else {
                break;
            };
            let target = waypoint.to_vec2();
            let dist = entity.position.distance(target);
            if dist <= budget {
                entity.position = target;
                entity.grid_pos = waypoint;
                ch.path.pop_front();
                budget -= dist;
            } else {
                entity.position = entity.position.step_toward(target, budget);
                budget = 0.0;
            }
        }
        if ch.path.is_empty() {
            if let Some(next) = ch.next_path.take() {
                ch.path = next.into();
                switched = true;
            }
        }

        if switched {
            if let Some(msg) = move_message(entity) {
                self.broadcast_about(id, ctx.outbox, msg);
            }
        }
    }

    /// Run the current action's per-tick logic, or the idle behaviour.
    pub(crate) fn evaluate_action(
        &mut self,
        id: NetworkId,
        ctx: &mut TickContext<'_>,
    ) -> Result<(), WorldError> {
        let action = self
            .entities
            .get(&id)
            .and_then(|e| e.character.as_ref())
            .and_then(|c| c.action.clone());
        match action {
            None => self.idle(id, ctx),
            Some(Action::Move { target }) => self.evaluate_move(id, target, ctx),
            Some(Action::Interact(ix)) => self.evaluate_interaction(id, ix, ctx),
        }
    }

    fn evaluate_move(
        &mut self,
        id: NetworkId,
        target: GridPos,
        ctx: &mut TickContext<'_>,
    ) -> Result<(), WorldError> {
        let entity = self.entities.get(&id).ok_or(WorldError::EntityNotFound(id))?;
        let ch = entity
            .character
            .as_ref()
            .ok_or(WorldError::NotACharacter(id))?;
        if !ch.path.is_empty() || ch.next_path.is_some() {
            return Ok(());
        }
        if entity.grid_pos == target && !entity.in_flight() {
            return self.finish_action(id, ctx);
        }
        // Path planning failed earlier; retry.
        let from = entity.grid_pos;
        match self.navigator.find_path(from, target) {
            Some(route) => self.apply_path(id, route, ctx),
            None => Ok(()),
        }
    }

    fn evaluate_interaction(
        &mut self,
        id: NetworkId,
        ix: Interaction,
        ctx: &mut TickContext<'_>,
    ) -> Result<(), WorldError> {
        let target_pos = match self.entities.get(&ix.target) {
            Some(t) if t.is_live() => t.grid_pos,
            _ => {
                tracing::debug!(network_id = %id, target = %ix.target, "interaction target gone");
                self.halt(id, ctx);
                return self.finish_action(id, ctx);
            }
        };
        let entity = self.entities.get(&id).ok_or(WorldError::EntityNotFound(id))?;
        let ch = entity
            .character
            .as_ref()
            .ok_or(WorldError::NotACharacter(id))?;

        if entity.grid_pos.chebyshev(target_pos) <= ix.range {
            self.halt(id, ctx);
            return self.perform_effect(id, &ix, ctx);
        }

        let no_path = ch.path.is_empty() && ch.next_path.is_none();
        if ix.planned_for == Some(target_pos) && !no_path {
            return Ok(());
        }
        let anchor = self.anchor(id)?;
        let candidates = self.navigator.get_neighbors(target_pos);
        match self.navigator.find_shortest_path(anchor, &candidates) {
            Some(route) => {
                self.apply_path(id, route, ctx)?;
                if let Some(Action::Interact(current)) = self
                    .entities
                    .get_mut(&id)
                    .and_then(|e| e.character.as_mut())
                    .and_then(|c| c.action.as_mut())
                {
                    current.planned_for = Some(target_pos);
                }
            }
            None => {
                tracing::trace!(network_id = %id, target = %ix.target, "target unreachable, pending");
            }
        }
        Ok(())
    }

    fn perform_effect(
        &mut self,
        id: NetworkId,
        ix: &Interaction,
        ctx: &mut TickContext<'_>,
    ) -> Result<(), WorldError> {
        match ix.kind {
            InteractKind::Attack => self.resolve_attack(id, ix.target, ctx),
            InteractKind::AreaLink => {
                if let Some(EntityKind::AreaLink { destination }) =
                    self.entities.get(&ix.target).map(|t| &t.kind)
                {
                    self.pending_transfers.push((id, destination.clone()));
                }
                self.finish_action(id, ctx)
            }
            InteractKind::Talk | InteractKind::Configure if ix.done_once => Ok(()),
            InteractKind::Talk | InteractKind::Configure => {
                let target = self
                    .entities
                    .get(&ix.target)
                    .ok_or(WorldError::EntityNotFound(ix.target))?;
                let payload = match &target.kind {
                    EntityKind::Npc { dialog } => Some(match dialog {
                        Some(d) => ServerMessage::Dialog {
                            title: d.title.clone(),
                            text: d.text.clone(),
                        },
                        None => ServerMessage::Dialog {
                            title: target.name.clone(),
                            text: String::new(),
                        },
                    }),
                    EntityKind::Container { items } => Some(ServerMessage::Container {
                        network_id: target.id.to_u64(),
                        items: items.clone(),
                    }),
                    EntityKind::Reconstructor { options } => Some(ServerMessage::Reconstructor {
                        network_id: target.id.to_u64(),
                        options: options.clone(),
                    }),
                    _ => None,
                };
                if let Some(msg) = payload {
                    self.send_to_owner(id, ctx.outbox, msg);
                }
                self.mark_done_once(id);
                Ok(())
            }
        }
    }

    pub(crate) fn mark_done_once(&mut self, id: NetworkId) {
        if let Some(Action::Interact(ix)) = self
            .entities
            .get_mut(&id)
            .and_then(|e| e.character.as_mut())
            .and_then(|c| c.action.as_mut())
        {
            ix.done_once = true;
        }
    }

    fn idle(&mut self, id: NetworkId, ctx: &mut TickContext<'_>) -> Result<(), WorldError> {
        let now = ctx.now();
        let prune = ctx.services.combat.aggro_prune_secs;
        let Some(entity) = self.entities.get_mut(&id) else {
            return Ok(());
        };
        if let EntityKind::Enemy = entity.kind {
            let mut top = None;
            let mut range = 1;
            if let Some(combat) = entity.character.as_mut().and_then(|c| c.combat.as_mut()) {
                range = combat.attack_range;
                for attacker in combat.ledger.ranked(now, prune) {
                    let live = self
                        .entities
                        .get(&attacker.attacker)
                        .is_some_and(Entity::is_live);
                    if live {
                        top = Some(attacker.attacker);
                        break;
                    }
                }
            }
            if let Some(target) = top {
                return self.start_action(id, Action::interact(target, InteractKind::Attack, range), ctx);
            }
        }
        self.roam(id, ctx)
    }

    fn roam(&mut self, id: NetworkId, ctx: &mut TickContext<'_>) -> Result<(), WorldError> {
        let now = ctx.now();
        let Some(roam) = self
            .entities
            .get(&id)
            .and_then(|e| e.character.as_ref())
            .and_then(|c| c.roam.clone())
        else {
            return Ok(());
        };
        if now < roam.next_at || roam.region.width == 0 || roam.region.height == 0 {
            return Ok(());
        }

        let rng = &mut ctx.services.rng;
        let (lo, hi) = (roam.interval.interval_min_secs, roam.interval.interval_max_secs);
        let wait = if hi > lo { rng.gen_range(lo..=hi) } else { lo };
        let mut destination = None;
        for _ in 0..ROAM_ATTEMPTS {
            let pos = GridPos::new(
                rng.gen_range(roam.region.x..roam.region.x + roam.region.width as i32),
                rng.gen_range(roam.region.y..roam.region.y + roam.region.height as i32),
            );
            if self.navigator.is_walkable(pos) {
                destination = Some(pos);
                break;
            }
        }
        if let Some(r) = self
            .entities
            .get_mut(&id)
            .and_then(|e| e.character.as_mut())
            .and_then(|c| c.roam.as_mut())
        {
            r.next_at = now + wait;
        }
        match destination {
            Some(target) => self.start_action(id, Action::Move { target }, ctx),
            None => Ok(()),
        }
    }
}
