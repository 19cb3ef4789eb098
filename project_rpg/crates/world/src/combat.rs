//! Hit points, attack cadence and per-defender aggro.

use identity::NetworkId;
use net::ServerMessage;

use crate::action::{Action, InteractKind};
use crate::area::{Area, TickContext};
use crate::catalog::EntityTypeDef;
use crate::entity::EntityKind;
use crate::error::WorldError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombatConfig {
    /// Seconds between two hits from the same attacker.
    pub attack_interval_secs: f64,
    /// Aggro entries older than this are forgotten.
    pub aggro_prune_secs: f64,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            attack_interval_secs: 1.0,
            aggro_prune_secs: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggroEntry {
    pub attacker: NetworkId,
    /// Total damage dealt by this attacker.
    pub damage: i64,
    pub last_hit: f64,
}

/// Who has hurt this entity, and how much. Ties keep first-hit order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggroLedger {
    entries: Vec<AggroEntry>,
}

impl AggroLedger {
    pub fn record(&mut self, attacker: NetworkId, damage: i32, now: f64) {
        match self.entries.iter_mut().find(|e| e.attacker == attacker) {
            Some(entry) => {
                entry.damage += i64::from(damage);
                entry.last_hit = now;
            }
            None => self.entries.push(AggroEntry {
                attacker,
                damage: i64::from(damage),
                last_hit: now,
            }),
        }
    }

    pub fn remove(&mut self, attacker: NetworkId) {
        self.entries.retain(|e| e.attacker != attacker);
    }

    pub fn prune(&mut self, now: f64, threshold: f64) {
        self.entries.retain(|e| now - e.last_hit <= threshold);
    }

    /// Prune, then order by total damage, highest first.
    pub fn ranked(&mut self, now: f64, threshold: f64) -> Vec<AggroEntry> {
        self.prune(now, threshold);
        let mut ranked = self.entries.clone();
        ranked.sort_by(|a, b| b.damage.cmp(&a.damage));
        ranked
    }

    pub fn top(&mut self, now: f64, threshold: f64) -> Option<NetworkId> {
        self.ranked(now, threshold).first().map(|e| e.attacker)
    }

    pub fn get(&self, attacker: NetworkId) -> Option<&AggroEntry> {
        self.entries.iter().find(|e| e.attacker == attacker)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Combatant {
    pub hp: i32,
    pub max_hp: i32,
    pub damage: i32,
    /// Added by the equipped weapon.
    pub bonus_damage: i32,
    pub attack_range: i32,
    pub next_attack_at: f64,
    pub in_combat: bool,
    pub ledger: AggroLedger,
}

impl Combatant {
    pub fn from_def(def: &EntityTypeDef) -> Self {
        Self {
            hp: def.hp,
            max_hp: def.hp,
            damage: def.damage,
            bonus_damage: 0,
            attack_range: def.attack_range,
            next_attack_at: 0.0,
            in_combat: false,
            ledger: AggroLedger::default(),
        }
    }

    pub fn attack_damage(&self) -> i32 {
        self.damage + self.bonus_damage
    }

    pub fn is_dead(&self) -> bool {
        self.hp <= 0
    }

    /// Back to full health with a clean slate.
    pub fn restore(&mut self) {
        self.hp = self.max_hp;
        self.in_combat = false;
        self.next_attack_at = 0.0;
        self.ledger.clear();
    }
}

impl Area {
    /// One attack attempt by `attacker` on `target`, already in range.
    pub(crate) fn resolve_attack(
        &mut self,
        attacker: NetworkId,
        target: NetworkId,
        ctx: &mut TickContext<'_>,
    ) -> Result<(), WorldError> {
        let now = ctx.now();
        let (ready, first_hit) = {
            let ch = self
                .entities
                .get(&attacker)
                .and_then(|e| e.character.as_ref())
                .ok_or(WorldError::NotACharacter(attacker))?;
            let Some(combat) = ch.combat.as_ref() else {
                return self.finish_action(attacker, ctx);
            };
            let first = matches!(&ch.action, Some(Action::Interact(ix)) if !ix.done_once);
            (now >= combat.next_attack_at, first)
        };
        if !ready {
            return Ok(());
        }

        if first_hit {
            self.mark_done_once(attacker);
            self.register_reciprocal(target, attacker, ctx)?;
        }

        let target_live = self.entities.get(&target).is_some_and(|t| t.is_live());
        let still_attacking = self
            .entities
            .get(&attacker)
            .and_then(|e| e.character.as_ref())
            .and_then(|c| c.action.as_ref())
            .is_some_and(|a| {
                matches!(a, Action::Interact(ix) if ix.kind == InteractKind::Attack && ix.target == target)
            });
        if !target_live {
            return self.finish_action(attacker, ctx);
        }
        if !still_attacking {
            return Ok(());
        }

        let amount = self
            .entities
            .get(&attacker)
            .and_then(|e| e.character.as_ref())
            .and_then(|c| c.combat.as_ref())
            .map(Combatant::attack_damage)
            .unwrap_or(0);
        self.do_damage(target, attacker, amount, ctx)?;

        let interval = ctx.services.combat.attack_interval_secs;
        if let Some(combat) = self
            .entities
            .get_mut(&attacker)
            .and_then(|e| e.character.as_mut())
            .and_then(|c| c.combat.as_mut())
        {
            combat.next_attack_at = now + interval;
        }
        Ok(())
    }

    /// Make an idle defender fight back. A busy player keeps doing what they chose.
    fn register_reciprocal(
        &mut self,
        defender: NetworkId,
        attacker: NetworkId,
        ctx: &mut TickContext<'_>,
    ) -> Result<(), WorldError> {
        let Some(entity) = self.entities.get(&defender) else {
            return Ok(());
        };
        let Some(ch) = entity.character.as_ref() else {
            return Ok(());
        };
        let Some(combat) = ch.combat.as_ref() else {
            return Ok(());
        };
        let is_player = matches!(entity.kind, EntityKind::Player { .. });
        if ch.is_attacking() || (is_player && !ch.is_idle()) {
            return Ok(());
        }
        let range = combat.attack_range;
        tracing::debug!(network_id = %defender, attacker = %attacker, "retaliating");
        self.start_action(
            defender,
            Action::interact(attacker, InteractKind::Attack, range),
            ctx,
        )
    }

    /// Apply damage and broadcast the new hit points, killing at zero.
    pub fn do_damage(
        &mut self,
        target: NetworkId,
        attacker: NetworkId,
        amount: i32,
        ctx: &mut TickContext<'_>,
    ) -> Result<(), WorldError> {
        let now = ctx.now();
        let entity = self
            .entities
            .get_mut(&target)
            .ok_or(WorldError::EntityNotFound(target))?;
        if entity.destroyed || !entity.spawned {
            return Err(WorldError::InvariantViolation(format!(
                "damage applied to {target} which is not live"
            )));
        }
        let combat = entity
            .character
            .as_mut()
            .and_then(|c| c.combat.as_mut())
            .ok_or(WorldError::NotACharacter(target))?;
        if combat.is_dead() {
            return Err(WorldError::InvariantViolation(format!(
                "damage applied to {target} which is already dead"
            )));
        }
        combat.hp = (combat.hp - amount).max(0);
        combat.ledger.record(attacker, amount, now);
        let hp = combat.hp;
        let in_combat = combat.in_combat;
        tracing::trace!(target = %target, attacker = %attacker, amount, hp, "damage");

        self.broadcast_about(
            target,
            ctx.outbox,
            ServerMessage::Status {
                network_id: target.to_u64(),
                in_combat,
                hp,
            },
        );
        if hp == 0 {
            self.kill(target, attacker, ctx)?;
        }
        Ok(())
    }

    fn kill(
        &mut self,
        id: NetworkId,
        killer: NetworkId,
        ctx: &mut TickContext<'_>,
    ) -> Result<(), WorldError> {
        tracing::info!(network_id = %id, killer = %killer, area = %self.name, "entity killed");
        self.release_references(id, ctx)?;

        let now = ctx.now();
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(WorldError::EntityNotFound(id))?;
        if let EntityKind::Player { .. } = entity.kind {
            let delay = ctx
                .services
                .catalog
                .get(&entity.type_id)
                .map(|d| d.respawn_delay_secs)
                .unwrap_or(0.0);
            entity.spawn_at = now + delay;
            if let Some(ch) = entity.character.as_mut() {
                ch.clear_paths();
            }
            // Snap to the last tile so the corpse does not hang between two.
            entity.position = entity.grid_pos.to_vec2();
        } else {
            entity.destroyed = true;
        }
        self.despawn(id, ctx.outbox);
        Ok(())
    }

    /// Forget `id` in every ledger of this area.
    pub(crate) fn purge_aggro(&mut self, id: NetworkId) {
        for entity in self.entities.values_mut() {
            if let Some(combat) = entity.character.as_mut().and_then(|c| c.combat.as_mut()) {
                combat.ledger.remove(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> NetworkId {
        NetworkId::from_u64(n)
    }

    #[test]
    fn ledger_accumulates_per_attacker() {
        let mut ledger = AggroLedger::default();
        ledger.record(id(1), 3, 1.0);
        ledger.record(id(2), 5, 1.5);
        ledger.record(id(1), 4, 2.0);
        assert_eq!(ledger.len(), 2);
        let first = ledger.get(id(1)).unwrap();
        assert_eq!(first.damage, 7);
        assert_eq!(first.last_hit, 2.0);
        assert_eq!(ledger.top(2.0, 5.0), Some(id(1)));
    }

    #[test]
    fn ledger_ties_keep_first_hit_order() {
        let mut ledger = AggroLedger::default();
        ledger.record(id(9), 4, 0.0);
        ledger.record(id(3), 4, 0.0);
        let ranked: Vec<_> = ledger.ranked(0.0, 5.0).iter().map(|e| e.attacker).collect();
        assert_eq!(ranked, vec![id(9), id(3)]);
    }

    #[test]
    fn stale_entries_are_pruned() {
        let mut ledger = AggroLedger::default();
        ledger.record(id(1), 100, 0.0);
        ledger.record(id(2), 1, 4.0);
        // 5s after the first hit the entry is still exactly on the threshold.
        assert_eq!(ledger.top(5.0, 5.0), Some(id(1)));
        assert_eq!(ledger.top(5.5, 5.0), Some(id(2)));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.top(10.0, 5.0), None);
        assert!(ledger.is_empty());
    }

    #[test]
    fn restore_resets_combat_state() {
        let def: EntityTypeDef = serde_json::from_str(
            r#"{"id":"goblin","kind":"enemy","base_kind":"goblin","name":"Goblin","hp":10,"damage":3}"#,
        )
        .unwrap();
        let mut combat = Combatant::from_def(&def);
        combat.bonus_damage = 2;
        assert_eq!(combat.attack_damage(), 5);
        combat.hp = 0;
        combat.in_combat = true;
        combat.ledger.record(id(1), 10, 0.0);
        assert!(combat.is_dead());

        combat.restore();
        assert_eq!(combat.hp, 10);
        assert!(!combat.in_combat);
        assert!(combat.ledger.is_empty());
    }
}
