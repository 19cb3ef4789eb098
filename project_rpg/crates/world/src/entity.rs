use std::collections::VecDeque;

use identity::NetworkId;
use net::protocol::{EntityWire, EquipmentWire, PosWire, TileWire};
use session::SessionId;
use space::{GridPos, Vec2};

use crate::action::{Action, InteractKind};
use crate::catalog::{DialogDef, EntityKindTag, EntityTypeDef, RoamDef};
use crate::combat::Combatant;
use crate::error::WorldError;
use crate::map::{LinkRef, PatrolRect};

/// Which connections learn about an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Owner(SessionId),
}

impl Visibility {
    pub fn includes(&self, session: SessionId) -> bool {
        match self {
            Visibility::Public => true,
            Visibility::Owner(owner) => *owner == session,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    Player { session: SessionId },
    Npc { dialog: Option<DialogDef> },
    Enemy,
    Container { items: Vec<String> },
    AreaLink { destination: LinkRef },
    Reconstructor { options: Vec<String> },
}

impl EntityKind {
    pub fn tag(&self) -> &'static str {
        match self {
            EntityKind::Player { .. } => "player",
            EntityKind::Npc { .. } => "npc",
            EntityKind::Enemy => "enemy",
            EntityKind::Container { .. } => "container",
            EntityKind::AreaLink { .. } => "areaLink",
            EntityKind::Reconstructor { .. } => "reconstructor",
        }
    }

    /// Interactions other entities may start against this one.
    pub fn available_actions(&self) -> &'static [InteractKind] {
        match self {
            EntityKind::Player { .. } => &[],
            EntityKind::Npc { .. } => &[InteractKind::Talk],
            EntityKind::Enemy => &[InteractKind::Attack],
            EntityKind::Container { .. } | EntityKind::Reconstructor { .. } => {
                &[InteractKind::Configure]
            }
            EntityKind::AreaLink { .. } => &[InteractKind::AreaLink],
        }
    }

    /// Kinds that occupy their tile.
    pub fn blocks_tile(&self) -> bool {
        matches!(
            self,
            EntityKind::Container { .. } | EntityKind::Reconstructor { .. }
        )
    }

    pub fn session(&self) -> Option<SessionId> {
        match self {
            EntityKind::Player { session } => Some(*session),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Equipment {
    pub weapon: Option<String>,
    pub armor: Option<String>,
}

impl Equipment {
    pub fn to_wire(&self) -> EquipmentWire {
        EquipmentWire {
            weapon: self.weapon.clone(),
            armor: self.armor.clone(),
        }
    }
}

/// Idle roaming inside a patrol rectangle.
#[derive(Debug, Clone, PartialEq)]
pub struct Roam {
    pub region: PatrolRect,
    pub interval: RoamDef,
    pub next_at: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Character {
    pub action: Option<Action>,
    /// Entities whose current interaction targets this one.
    pub targeted_by: Vec<NetworkId>,
    pub speed: f32,
    pub equipment: Equipment,
    /// Remaining waypoints; the front is the step in flight.
    pub path: VecDeque<GridPos>,
    /// Route to switch to at the next waypoint boundary.
    pub next_path: Option<Vec<GridPos>>,
    pub combat: Option<Combatant>,
    pub roam: Option<Roam>,
}

impl Character {
    pub fn new(speed: f32, combat: Option<Combatant>) -> Self {
        Self {
            action: None,
            targeted_by: Vec::new(),
            speed,
            equipment: Equipment::default(),
            path: VecDeque::new(),
            next_path: None,
            combat,
            roam: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.action.is_none()
    }

    pub fn is_attacking(&self) -> bool {
        matches!(
            &self.action,
            Some(Action::Interact(ix)) if ix.kind == InteractKind::Attack
        )
    }

    pub fn clear_paths(&mut self) {
        self.path.clear();
        self.next_path = None;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Assigned by `Area::add_entity`.
    pub id: NetworkId,
    pub type_id: String,
    pub base_kind: String,
    pub name: String,
    pub kind: EntityKind,
    pub position: Vec2,
    /// Last waypoint reached; only changes at waypoint boundaries.
    pub grid_pos: GridPos,
    pub spawned: bool,
    pub destroyed: bool,
    pub visibility: Visibility,
    /// Earliest simulated time this entity may (re)spawn.
    pub spawn_at: f64,
    pub character: Option<Character>,
    /// Index of the area spawn point that produced this entity.
    pub spawn_point: Option<usize>,
}

impl Entity {
    fn base(def: &EntityTypeDef, kind: EntityKind, pos: GridPos) -> Self {
        Self {
            id: NetworkId(0),
            type_id: def.id.clone(),
            base_kind: def.base_kind.clone(),
            name: def.name.clone(),
            kind,
            position: pos.to_vec2(),
            grid_pos: pos,
            spawned: false,
            destroyed: false,
            visibility: Visibility::Public,
            spawn_at: 0.0,
            character: None,
            spawn_point: None,
        }
    }

    /// Build a catalog entity at `pos`. Players need [`Entity::player`].
    pub fn from_def(def: &EntityTypeDef, pos: GridPos) -> Result<Self, WorldError> {
        let kind = match def.kind {
            EntityKindTag::Player => {
                return Err(WorldError::Catalog(format!(
                    "type '{}' is a player type and needs a session",
                    def.id
                )))
            }
            EntityKindTag::Enemy => EntityKind::Enemy,
            EntityKindTag::Npc => EntityKind::Npc {
                dialog: def.dialog.clone(),
            },
            EntityKindTag::Container => EntityKind::Container {
                items: def.items.clone(),
            },
            EntityKindTag::Reconstructor => EntityKind::Reconstructor {
                options: def.options.clone(),
            },
        };
        let mut entity = Self::base(def, kind, pos);
        entity.character = match def.kind {
            EntityKindTag::Enemy => Some(Character::new(def.speed, Some(Combatant::from_def(def)))),
            EntityKindTag::Npc => Some(Character::new(def.speed, None)),
            _ => None,
        };
        Ok(entity)
    }

    pub fn player(def: &EntityTypeDef, session: SessionId, name: Option<String>, pos: GridPos) -> Self {
        let mut entity = Self::base(def, EntityKind::Player { session }, pos);
        if let Some(name) = name {
            entity.name = name;
        }
        entity.character = Some(Character::new(def.speed, Some(Combatant::from_def(def))));
        entity
    }

    pub fn area_link(destination: LinkRef, pos: GridPos) -> Self {
        Self {
            id: NetworkId(0),
            type_id: "area_link".to_string(),
            base_kind: "portal".to_string(),
            name: destination.area.clone(),
            kind: EntityKind::AreaLink { destination },
            position: pos.to_vec2(),
            grid_pos: pos,
            spawned: false,
            destroyed: false,
            visibility: Visibility::Public,
            spawn_at: 0.0,
            character: None,
            spawn_point: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.spawned && !self.destroyed
    }

    pub fn offers(&self, kind: InteractKind) -> bool {
        self.kind.available_actions().contains(&kind)
    }

    /// True while the entity sits between two tiles.
    pub fn in_flight(&self) -> bool {
        !self.position.is_at(self.grid_pos)
    }

    pub fn to_wire(&self) -> EntityWire {
        let combat = self.character.as_ref().and_then(|c| c.combat.as_ref());
        EntityWire {
            network_id: self.id.to_u64(),
            kind: self.kind.tag().to_string(),
            base_kind: self.base_kind.clone(),
            name: self.name.clone(),
            pos: PosWire {
                x: self.position.x,
                y: self.position.y,
            },
            actions: self
                .kind
                .available_actions()
                .iter()
                .map(|k| k.tag().to_string())
                .collect(),
            equipment: match self.kind {
                EntityKind::Player { .. } => {
                    self.character.as_ref().map(|c| c.equipment.to_wire())
                }
                _ => None,
            },
            hp: combat.map(|c| c.hp),
            max_hp: combat.map(|c| c.max_hp),
        }
    }
}

pub fn tile_wire(pos: GridPos) -> TileWire {
    TileWire { x: pos.x, y: pos.y }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EntityCatalog;

    fn def(json: &str) -> EntityTypeDef {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn kinds_expose_their_actions() {
        let goblin = Entity::from_def(
            &def(r#"{"id":"g","kind":"enemy","base_kind":"goblin","name":"G","hp":5}"#),
            GridPos::new(1, 1),
        )
        .unwrap();
        assert_eq!(goblin.kind.tag(), "enemy");
        assert!(goblin.offers(InteractKind::Attack));
        assert!(!goblin.offers(InteractKind::Talk));
        assert!(goblin.character.as_ref().unwrap().combat.is_some());

        let chest = Entity::from_def(
            &def(r#"{"id":"c","kind":"container","base_kind":"chest","name":"Chest","items":["gold"]}"#),
            GridPos::new(0, 0),
        )
        .unwrap();
        assert!(chest.kind.blocks_tile());
        assert!(chest.character.is_none());
        assert!(chest.offers(InteractKind::Configure));
    }

    #[test]
    fn player_type_needs_session() {
        let catalog = EntityCatalog::builtin();
        let err = Entity::from_def(catalog.get("player").unwrap(), GridPos::new(0, 0)).unwrap_err();
        assert!(matches!(err, WorldError::Catalog(_)));
    }

    #[test]
    fn player_wire_contract() {
        let catalog = EntityCatalog::builtin();
        let mut player = Entity::player(
            catalog.get("player").unwrap(),
            SessionId(4),
            Some("Ayla".into()),
            GridPos::new(2, 3),
        );
        player.id = NetworkId(9);
        let wire = player.to_wire();
        assert_eq!(wire.network_id, 9);
        assert_eq!(wire.kind, "player");
        assert_eq!(wire.name, "Ayla");
        assert_eq!(wire.pos, PosWire { x: 2.0, y: 3.0 });
        assert!(wire.actions.is_empty());
        assert!(wire.equipment.is_some());
        assert_eq!(wire.hp, wire.max_hp);
    }

    #[test]
    fn owner_visibility() {
        assert!(Visibility::Public.includes(SessionId(1)));
        assert!(Visibility::Owner(SessionId(1)).includes(SessionId(1)));
        assert!(!Visibility::Owner(SessionId(1)).includes(SessionId(2)));
    }
}
