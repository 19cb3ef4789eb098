pub mod action;
pub mod area;
pub mod area_manager;
pub mod catalog;
pub mod combat;
pub mod entity;
pub mod error;
pub mod map;
pub mod outbox;
pub mod world;

pub use action::{Action, InteractKind, Interaction};
pub use area::{Area, TickContext};
pub use area_manager::AreaManager;
pub use catalog::{EntityCatalog, EntityTypeDef, ItemCatalog, ItemDef};
pub use combat::{AggroLedger, CombatConfig, Combatant};
pub use entity::{Character, Entity, EntityKind, Visibility};
pub use error::WorldError;
pub use map::{InMemoryMaps, JsonMapDir, LinkRef, MapData, MapSource};
pub use outbox::{Outbox, Outgoing};
pub use world::{Services, World, WorldCommand, WorldConfig};
