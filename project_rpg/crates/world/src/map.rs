//! Map data handed to the simulation by an external loader.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use space::{GridConfig, GridPos, TileGrid};

use crate::error::WorldError;

pub const ENTRY_LINK: &str = "enter";

/// Points at a named link inside an area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRef {
    pub area: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LinkDef {
    pub name: String,
    pub x: i32,
    pub y: i32,
    /// Links with a destination get an AreaLink entity on their tile.
    #[serde(default)]
    pub destination: Option<LinkRef>,
}

impl LinkDef {
    pub fn pos(&self) -> GridPos {
        GridPos::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PatrolRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl PatrolRect {
    /// True when the whole rectangle lies on the grid.
    pub fn fits(&self, config: &GridConfig) -> bool {
        let right = i64::from(self.x) + i64::from(self.width);
        let bottom = i64::from(self.y) + i64::from(self.height);
        self.x >= 0
            && self.y >= 0
            && right <= i64::from(config.width)
            && bottom <= i64::from(config.height)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpawnPointDef {
    pub type_id: String,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub patrol: Option<PatrolRect>,
}

impl SpawnPointDef {
    pub fn pos(&self) -> GridPos {
        GridPos::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MapData {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub walkable_tiles: BTreeSet<u32>,
    pub floor: Vec<Vec<u32>>,
    pub walls: Vec<Vec<u32>>,
    #[serde(default)]
    pub links: Vec<LinkDef>,
    #[serde(default)]
    pub spawn_points: Vec<SpawnPointDef>,
}

impl MapData {
    /// Check dimensions and coordinates, producing the tile grid.
    pub fn to_grid(&self) -> Result<TileGrid, WorldError> {
        let config = GridConfig::new(self.width, self.height);
        let grid = TileGrid::new(config, self.floor.clone(), self.walls.clone()).map_err(|e| {
            WorldError::MapData {
                area: self.name.clone(),
                reason: e.to_string(),
            }
        })?;

        for link in &self.links {
            if !config.in_bounds(link.pos()) {
                return Err(self.bad(format!("link '{}' out of bounds", link.name)));
            }
        }
        for sp in &self.spawn_points {
            if !config.in_bounds(sp.pos()) {
                return Err(self.bad(format!("spawn point '{}' out of bounds", sp.type_id)));
            }
            if sp.patrol.is_some_and(|p| !p.fits(&config)) {
                return Err(self.bad(format!("patrol region of '{}' leaves the map", sp.type_id)));
            }
        }
        Ok(grid)
    }

    fn bad(&self, reason: String) -> WorldError {
        WorldError::MapData {
            area: self.name.clone(),
            reason,
        }
    }

    /// The link named `enter`, otherwise the first link.
    pub fn entry_link(&self) -> Option<&LinkDef> {
        self.links
            .iter()
            .find(|l| l.name == ENTRY_LINK)
            .or_else(|| self.links.first())
    }
}

/// Supplies parsed maps to the area manager.
pub trait MapSource {
    fn load_maps(&self) -> Result<Vec<MapData>, WorldError>;
}

/// `*.json` files in a directory, loaded in path order.
#[derive(Debug, Clone)]
pub struct JsonMapDir {
    dir: PathBuf,
}

impl JsonMapDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl MapSource for JsonMapDir {
    fn load_maps(&self) -> Result<Vec<MapData>, WorldError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut maps = Vec::with_capacity(paths.len());
        for path in paths {
            let json = std::fs::read_to_string(&path)?;
            let map: MapData = serde_json::from_str(&json)?;
            tracing::debug!(path = %path.display(), area = %map.name, "map loaded");
            maps.push(map);
        }
        Ok(maps)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryMaps {
    maps: Vec<MapData>,
}

impl InMemoryMaps {
    pub fn new(maps: Vec<MapData>) -> Self {
        Self { maps }
    }
}

impl MapSource for InMemoryMaps {
    fn load_maps(&self) -> Result<Vec<MapData>, WorldError> {
        Ok(self.maps.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny(name: &str) -> String {
        format!(
            r#"{{"name":"{name}","width":2,"height":1,"walkable_tiles":[1],
                "floor":[[1,1]],"walls":[[0,0]],
                "links":[{{"name":"gate","x":1,"y":0}},{{"name":"enter","x":0,"y":0}}]}}"#
        )
    }

    #[test]
    fn entry_link_prefers_enter() {
        let map: MapData = serde_json::from_str(&tiny("a")).unwrap();
        assert_eq!(map.entry_link().unwrap().name, "enter");

        let mut no_enter = map.clone();
        no_enter.links.retain(|l| l.name != ENTRY_LINK);
        assert_eq!(no_enter.entry_link().unwrap().name, "gate");
    }

    #[test]
    fn to_grid_checks_dimensions_and_coordinates() {
        let mut map: MapData = serde_json::from_str(&tiny("a")).unwrap();
        assert!(map.to_grid().is_ok());

        map.links[0].x = 5;
        assert!(matches!(map.to_grid(), Err(WorldError::MapData { .. })));

        let mut map: MapData = serde_json::from_str(&tiny("a")).unwrap();
        map.floor = vec![vec![1]];
        assert!(matches!(map.to_grid(), Err(WorldError::MapData { .. })));
    }

    #[test]
    fn json_dir_loads_sorted_and_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), tiny("beta")).unwrap();
        std::fs::write(dir.path().join("a.json"), tiny("alpha")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let maps = JsonMapDir::new(dir.path()).load_maps().unwrap();
        let names: Vec<&str> = maps.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn patrol_region_must_fit_the_map() {
        let mut map: MapData = serde_json::from_str(&tiny("a")).unwrap();
        let patrol = |x, width| PatrolRect {
            x,
            y: 0,
            width,
            height: 1,
        };
        map.spawn_points.push(SpawnPointDef {
            type_id: "walker".into(),
            x: 0,
            y: 0,
            patrol: Some(patrol(0, 2)),
        });
        assert!(map.to_grid().is_ok());

        for bad in [patrol(1, 2), patrol(-1, 1), patrol(0, u32::MAX), patrol(i32::MAX, u32::MAX)] {
            map.spawn_points[0].patrol = Some(bad);
            assert!(matches!(map.to_grid(), Err(WorldError::MapData { .. })), "{bad:?}");
        }
    }
}
