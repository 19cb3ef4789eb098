use std::collections::BTreeMap;

use identity::NetworkId;
use net::ServerMessage;
use session::SessionManager;

use crate::area::{Area, TickContext};
use crate::error::WorldError;
use crate::map::{LinkRef, MapSource, ENTRY_LINK};
use crate::world::Services;

/// Registry of every area, updated in load order.
#[derive(Debug, Default)]
pub struct AreaManager {
    areas: BTreeMap<String, Area>,
    order: Vec<String>,
}

impl AreaManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every area the source yields. Each name may appear once.
    pub fn load(
        source: &dyn MapSource,
        services: &mut Services,
        max_expansions: usize,
    ) -> Result<Self, WorldError> {
        let mut manager = Self::new();
        for map in source.load_maps()? {
            if manager.areas.contains_key(&map.name) {
                return Err(WorldError::MapData {
                    area: map.name.clone(),
                    reason: "duplicate area name".to_string(),
                });
            }
            let area = Area::from_map(&map, services, max_expansions)?;
            manager.insert(area);
        }
        tracing::info!(areas = manager.order.len(), "areas loaded");
        Ok(manager)
    }

    pub fn insert(&mut self, area: Area) {
        let name = area.name().to_string();
        if self.areas.insert(name.clone(), area).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Area> {
        self.areas.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Area> {
        self.areas.get_mut(name)
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn area_count(&self) -> usize {
        self.areas.len()
    }

    pub fn entity_count(&self) -> usize {
        self.areas.values().map(Area::entity_count).sum()
    }

    /// Update every area, then run the transfers their AreaLink effects queued.
    pub fn update(&mut self, ctx: &mut TickContext<'_>, sessions: &mut SessionManager) {
        let mut transfers = Vec::new();
        for name in &self.order {
            let Some(area) = self.areas.get_mut(name) else {
                continue;
            };
            area.update(ctx);
            for (id, link) in area.take_pending_transfers() {
                transfers.push((id, name.clone(), link));
            }
        }
        for (id, from, link) in transfers {
            if let Err(e) = self.change_entity_area_via_link(id, &from, &link, ctx, sessions) {
                tracing::warn!(network_id = %id, from = %from, to = %link.area, error = %e, "area transfer failed");
            }
        }
    }

    /// Move an entity to the `enter` link (or first link) of `dest`.
    pub fn change_entity_area(
        &mut self,
        id: NetworkId,
        from: &str,
        dest: &str,
        ctx: &mut TickContext<'_>,
        sessions: &mut SessionManager,
    ) -> Result<(), WorldError> {
        let area = self
            .areas
            .get(dest)
            .ok_or_else(|| WorldError::AreaNotFound(dest.to_string()))?;
        let link = area
            .link(ENTRY_LINK)
            .or_else(|| area.links.first())
            .map(|l| l.name.clone())
            .ok_or_else(|| WorldError::LinkNotFound {
                area: dest.to_string(),
                link: ENTRY_LINK.to_string(),
            })?;
        let link = LinkRef {
            area: dest.to_string(),
            link,
        };
        self.change_entity_area_via_link(id, from, &link, ctx, sessions)
    }

    /// Move an entity onto a specific link of another area.
    pub fn change_entity_area_via_link(
        &mut self,
        id: NetworkId,
        from: &str,
        link: &LinkRef,
        ctx: &mut TickContext<'_>,
        sessions: &mut SessionManager,
    ) -> Result<(), WorldError> {
        let landing = self
            .areas
            .get(&link.area)
            .ok_or_else(|| WorldError::AreaNotFound(link.area.clone()))?
            .link(&link.link)
            .map(|l| l.pos())
            .ok_or_else(|| WorldError::LinkNotFound {
                area: link.area.clone(),
                link: link.link.clone(),
            })?;
        if from == link.area {
            return Err(WorldError::InvariantViolation(format!(
                "transfer of {id} within area '{from}'"
            )));
        }

        let origin = self
            .areas
            .get_mut(from)
            .ok_or_else(|| WorldError::AreaNotFound(from.to_string()))?;
        let mut entity = origin.take_entity(id, ctx)?;
        entity.position = landing.to_vec2();
        entity.grid_pos = landing;
        if let Some(ch) = entity.character.as_mut() {
            ch.clear_paths();
        }
        let session = entity.kind.session();

        let dest = self
            .areas
            .get_mut(&link.area)
            .ok_or_else(|| WorldError::AreaNotFound(link.area.clone()))?;
        dest.admit_entity(entity, ctx.outbox);
        // The client answers changeArea with a fresh `ready` to get its snapshot.
        if let Some(session) = session {
            dest.add_connection(session);
            sessions.rehome(session, &link.area);
            ctx.outbox.send(session, ServerMessage::ChangeArea {});
        }
        tracing::info!(network_id = %id, from = %from, to = %link.area, link = %link.link, "entity changed area");
        Ok(())
    }
}
