//! Static entity-type and item data, loaded once and handed to the world as
//! a service.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::WorldError;

pub const PLAYER_TYPE: &str = "player";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKindTag {
    Player,
    Npc,
    Enemy,
    Container,
    Reconstructor,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DialogDef {
    pub title: String,
    pub text: String,
}

/// Seconds between idle roams, drawn uniformly from the range.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RoamDef {
    pub interval_min_secs: f64,
    pub interval_max_secs: f64,
}

impl Default for RoamDef {
    fn default() -> Self {
        Self {
            interval_min_secs: 3.0,
            interval_max_secs: 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EntityTypeDef {
    pub id: String,
    pub kind: EntityKindTag,
    pub base_kind: String,
    pub name: String,
    /// Tiles per simulated second.
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default)]
    pub respawn_delay_secs: f64,
    #[serde(default)]
    pub hp: i32,
    #[serde(default)]
    pub damage: i32,
    #[serde(default = "default_attack_range")]
    pub attack_range: i32,
    #[serde(default)]
    pub dialog: Option<DialogDef>,
    #[serde(default)]
    pub roam: Option<RoamDef>,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

fn default_speed() -> f32 {
    2.0
}

fn default_attack_range() -> i32 {
    1
}

impl EntityTypeDef {
    fn builtin_player() -> Self {
        Self {
            id: PLAYER_TYPE.to_string(),
            kind: EntityKindTag::Player,
            base_kind: "human".to_string(),
            name: "Adventurer".to_string(),
            speed: 4.0,
            respawn_delay_secs: 5.0,
            hp: 50,
            damage: 5,
            attack_range: 1,
            dialog: None,
            roam: None,
            items: Vec::new(),
            options: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
    types: BTreeMap<String, EntityTypeDef>,
}

impl EntityCatalog {
    /// Only the built-in `player` type.
    pub fn builtin() -> Self {
        let mut types = BTreeMap::new();
        let player = EntityTypeDef::builtin_player();
        types.insert(player.id.clone(), player);
        Self { types }
    }

    /// Builtins plus `defs`. A def may override `player` once; any other
    /// duplicate id is rejected.
    pub fn from_defs(defs: Vec<EntityTypeDef>) -> Result<Self, WorldError> {
        let mut catalog = Self::builtin();
        let mut seen = std::collections::BTreeSet::new();
        for def in defs {
            if !seen.insert(def.id.clone()) {
                return Err(WorldError::Catalog(format!("duplicate entity type '{}'", def.id)));
            }
            catalog.types.insert(def.id.clone(), def);
        }
        Ok(catalog)
    }

    pub fn from_json(json: &str) -> Result<Self, WorldError> {
        Self::from_defs(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, WorldError> {
        let json = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&json)?;
        tracing::info!(path = %path.display(), types = catalog.len(), "entity catalog loaded");
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Result<&EntityTypeDef, WorldError> {
        self.types
            .get(id)
            .ok_or_else(|| WorldError::UnknownEntityType(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSlot {
    Weapon,
    Armor,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ItemDef {
    pub id: String,
    pub slot: ItemSlot,
    #[serde(default)]
    pub damage_bonus: i32,
    #[serde(default)]
    pub armor_type: Option<String>,
    /// Replaces the wearer's movement speed.
    #[serde(default)]
    pub speed: Option<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct ItemCatalog {
    items: BTreeMap<String, ItemDef>,
}

impl ItemCatalog {
    pub fn from_defs(defs: Vec<ItemDef>) -> Result<Self, WorldError> {
        let mut items = BTreeMap::new();
        for def in defs {
            if items.contains_key(&def.id) {
                return Err(WorldError::Catalog(format!("duplicate item '{}'", def.id)));
            }
            items.insert(def.id.clone(), def);
        }
        Ok(Self { items })
    }

    pub fn from_json(json: &str) -> Result<Self, WorldError> {
        Self::from_defs(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, WorldError> {
        let json = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&json)?;
        tracing::info!(path = %path.display(), items = catalog.items.len(), "item catalog loaded");
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Result<&ItemDef, WorldError> {
        self.items
            .get(id)
            .ok_or_else(|| WorldError::UnknownItem(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_player() {
        let catalog = EntityCatalog::builtin();
        let player = catalog.get(PLAYER_TYPE).unwrap();
        assert_eq!(player.kind, EntityKindTag::Player);
        assert!(player.hp > 0);
    }

    #[test]
    fn parse_entity_defs_with_defaults() {
        let json = r#"[
            {"id":"goblin","kind":"enemy","base_kind":"goblin","name":"Goblin","hp":10,"damage":3},
            {"id":"elder","kind":"npc","base_kind":"villager","name":"Elder",
             "dialog":{"title":"Elder","text":"Welcome."},
             "roam":{"interval_min_secs":1.0,"interval_max_secs":2.0}}
        ]"#;
        let catalog = EntityCatalog::from_json(json).unwrap();
        let goblin = catalog.get("goblin").unwrap();
        assert_eq!(goblin.attack_range, 1);
        assert_eq!(goblin.speed, 2.0);
        let elder = catalog.get("elder").unwrap();
        assert_eq!(elder.dialog.as_ref().unwrap().text, "Welcome.");
        assert!(catalog.get(PLAYER_TYPE).is_ok());
    }

    #[test]
    fn duplicate_entity_ids_rejected() {
        let json = r#"[
            {"id":"a","kind":"npc","base_kind":"x","name":"A"},
            {"id":"a","kind":"npc","base_kind":"x","name":"A"}
        ]"#;
        assert!(matches!(EntityCatalog::from_json(json), Err(WorldError::Catalog(_))));
    }

    #[test]
    fn unknown_type_is_error() {
        assert!(matches!(
            EntityCatalog::builtin().get("dragon"),
            Err(WorldError::UnknownEntityType(_))
        ));
    }

    #[test]
    fn items_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");
        std::fs::write(
            &path,
            r#"[{"id":"sword","slot":"weapon","damage_bonus":2},
                {"id":"boots","slot":"armor","armor_type":"leather","speed":5.0}]"#,
        )
        .unwrap();
        let items = ItemCatalog::load(&path).unwrap();
        assert_eq!(items.get("sword").unwrap().damage_bonus, 2);
        assert_eq!(items.get("boots").unwrap().speed, Some(5.0));
        assert!(matches!(items.get("axe"), Err(WorldError::UnknownItem(_))));
    }
}
