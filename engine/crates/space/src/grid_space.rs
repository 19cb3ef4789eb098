use serde::{Deserialize, Serialize};

use crate::model::SpaceError;

/// Integer tile coordinate. Waypoints and "last grid-aligned" positions use this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Chess-board distance: diagonal neighbours are at distance 1.
    pub fn chebyshev(self, other: GridPos) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    pub fn to_vec2(self) -> Vec2 {
        Vec2::new(self.x as f32, self.y as f32)
    }
}

/// Continuous position in tile units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Vec2) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Move `step` units toward `target`, never overshooting it.
    pub fn step_toward(self, target: Vec2, step: f32) -> Vec2 {
        let dist = self.distance(target);
        if dist <= step || dist == 0.0 {
            return target;
        }
        let t = step / dist;
        Vec2::new(self.x + (target.x - self.x) * t, self.y + (target.y - self.y) * t)
    }

    /// True when this position sits exactly on the given tile.
    pub fn is_at(self, pos: GridPos) -> bool {
        self == pos.to_vec2()
    }
}

impl From<GridPos> for Vec2 {
    fn from(pos: GridPos) -> Self {
        pos.to_vec2()
    }
}

/// Dimensions of a tile grid. Coordinates run from 0 to width/height - 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    pub width: u32,
    pub height: u32,
}

impl GridConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn in_bounds(&self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as u32) < self.width && (pos.y as u32) < self.height
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Row-major index of an in-bounds position.
    pub fn index_of(&self, pos: GridPos) -> Option<usize> {
        if !self.in_bounds(pos) {
            return None;
        }
        Some(pos.y as usize * self.width as usize + pos.x as usize)
    }

    pub fn pos_of(&self, index: usize) -> GridPos {
        let w = self.width as usize;
        GridPos::new((index % w) as i32, (index / w) as i32)
    }
}

/// Floor and wall tile layers of one area, indexed `[y][x]`.
///
/// A wall value of 0 means "no wall on this cell".
#[derive(Debug, Clone)]
pub struct TileGrid {
    config: GridConfig,
    floor: Vec<Vec<u32>>,
    walls: Vec<Vec<u32>>,
}

impl TileGrid {
    pub fn new(
        config: GridConfig,
        floor: Vec<Vec<u32>>,
        walls: Vec<Vec<u32>>,
    ) -> Result<Self, SpaceError> {
        check_layer("floor", &config, &floor)?;
        check_layer("walls", &config, &walls)?;
        Ok(Self {
            config,
            floor,
            walls,
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn in_bounds(&self, pos: GridPos) -> bool {
        self.config.in_bounds(pos)
    }

    pub fn floor_at(&self, pos: GridPos) -> Option<u32> {
        if !self.in_bounds(pos) {
            return None;
        }
        Some(self.floor[pos.y as usize][pos.x as usize])
    }

    pub fn wall_at(&self, pos: GridPos) -> Option<u32> {
        if !self.in_bounds(pos) {
            return None;
        }
        match self.walls[pos.y as usize][pos.x as usize] {
            0 => None,
            id => Some(id),
        }
    }

    pub fn floor(&self) -> &[Vec<u32>] {
        &self.floor
    }

    pub fn walls(&self) -> &[Vec<u32>] {
        &self.walls
    }
}

fn check_layer(layer: &'static str, config: &GridConfig, rows: &[Vec<u32>]) -> Result<(), SpaceError> {
    let height = rows.len() as u32;
    let bad_row = rows.iter().find(|r| r.len() as u32 != config.width);
    if height != config.height || bad_row.is_some() {
        return Err(SpaceError::DimensionMismatch {
            layer,
            width: config.width,
            height: config.height,
            got_width: bad_row.map(|r| r.len() as u32).unwrap_or(config.width),
            got_height: height,
        });
    }
    Ok(())
}
