// A* pathfinding over an area's walkability grid.
//
// Diagonal steps are allowed but may not cut corners: stepping from (x, y)
// to (x+dx, y+dy) requires both (x+dx, y) and (x, y+dy) to be walkable.
// Costs are integers (10 straight, 14 diagonal) so ordering is exact, and
// the octile heuristic keeps the search admissible.
//
// Every search allocates its own `SearchScratch`; the navigator itself is
// only read during a search, so back-to-back or concurrent searches never
// share bookkeeping.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};

use crate::grid_space::{GridConfig, GridPos, TileGrid};
use crate::model::SpaceError;

const STRAIGHT_COST: u32 = 10;
const DIAGONAL_COST: u32 = 14;

const ORTHOGONAL: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];
const DIAGONAL: [(i32, i32); 4] = [(1, -1), (1, 1), (-1, 1), (-1, -1)];

/// Walkability index and path search for one area.
#[derive(Debug, Clone)]
pub struct Navigator {
    config: GridConfig,
    walkable: Vec<bool>,
    /// Upper bound on expanded nodes per search.
    max_expansions: usize,
}

/// Entry in the A* open set (min-heap via reversed ordering).
#[derive(Debug, PartialEq, Eq)]
struct OpenEntry {
    f_score: u32,
    h_score: u32,
    index: usize,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: smallest f is "greatest". Ties prefer the node closer to
        // the goal, then the lower cell index, so results are deterministic.
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.h_score.cmp(&self.h_score))
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Per-search bookkeeping, indexed by row-major cell index.
struct SearchScratch {
    g_score: Vec<u32>,
    came_from: Vec<Option<usize>>,
    closed: Vec<bool>,
}

impl SearchScratch {
    fn new(cells: usize) -> Self {
        Self {
            g_score: vec![u32::MAX; cells],
            came_from: vec![None; cells],
            closed: vec![false; cells],
        }
    }
}

impl Navigator {
    /// Build the walkability index from tile layers: a cell is walkable iff its
    /// floor tile is in `walkable_tiles` and it either has no wall or its wall
    /// tile is itself walkable.
    pub fn from_tiles(grid: &TileGrid, walkable_tiles: &BTreeSet<u32>) -> Self {
        let config = *grid.config();
        let walkable = (0..config.cell_count())
            .map(|i| {
                let pos = config.pos_of(i);
                let floor_ok = grid
                    .floor_at(pos)
                    .map(|t| walkable_tiles.contains(&t))
                    .unwrap_or(false);
                let wall_ok = grid
                    .wall_at(pos)
                    .map(|t| walkable_tiles.contains(&t))
                    .unwrap_or(true);
                floor_ok && wall_ok
            })
            .collect();
        Self {
            config,
            walkable,
            max_expansions: config.cell_count(),
        }
    }

    /// Every cell walkable.
    pub fn open(config: GridConfig) -> Self {
        Self {
            config,
            walkable: vec![true; config.cell_count()],
            max_expansions: config.cell_count(),
        }
    }

    /// Cap the number of expanded nodes per search. 0 restores the default
    /// (the grid's cell count).
    pub fn with_max_expansions(mut self, max_expansions: usize) -> Self {
        self.max_expansions = if max_expansions == 0 {
            self.config.cell_count()
        } else {
            max_expansions
        };
        self
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn in_bounds(&self, pos: GridPos) -> bool {
        self.config.in_bounds(pos)
    }

    pub fn is_walkable(&self, pos: GridPos) -> bool {
        self.config
            .index_of(pos)
            .map(|i| self.walkable[i])
            .unwrap_or(false)
    }

    pub fn set_walkable_at(&mut self, pos: GridPos, walkable: bool) -> Result<(), SpaceError> {
        let idx = self
            .config
            .index_of(pos)
            .ok_or(SpaceError::OutOfBounds { x: pos.x, y: pos.y })?;
        self.walkable[idx] = walkable;
        Ok(())
    }

    /// Walkability as `[y][x]` rows, for client snapshots.
    pub fn walkability_matrix(&self) -> Vec<Vec<bool>> {
        self.walkable
            .chunks(self.config.width.max(1) as usize)
            .map(|row| row.to_vec())
            .collect()
    }

    /// Walkable 4-directional neighbours (up, right, down, left).
    pub fn get_neighbors(&self, pos: GridPos) -> Vec<GridPos> {
        ORTHOGONAL
            .iter()
            .map(|&(dx, dy)| pos.offset(dx, dy))
            .filter(|&p| self.is_walkable(p))
            .collect()
    }

    /// Waypoints from `start` (exclusive) to `end` (inclusive).
    ///
    /// `None` if either endpoint is out of bounds or no route exists;
    /// `Some(vec![])` if `start == end`.
    pub fn find_path(&self, start: GridPos, end: GridPos) -> Option<Vec<GridPos>> {
        let start_idx = self.config.index_of(start)?;
        let end_idx = self.config.index_of(end)?;
        if start == end {
            return Some(Vec::new());
        }
        if !self.walkable[end_idx] {
            return None;
        }

        let mut scratch = SearchScratch::new(self.config.cell_count());
        let mut open = BinaryHeap::new();
        let h_start = octile(start, end);
        scratch.g_score[start_idx] = 0;
        open.push(OpenEntry {
            f_score: h_start,
            h_score: h_start,
            index: start_idx,
        });

        let mut expansions = 0usize;
        while let Some(current) = open.pop() {
            let ci = current.index;
            if ci == end_idx {
                return Some(reconstruct(&self.config, &scratch, start_idx, end_idx));
            }
            if scratch.closed[ci] {
                continue;
            }
            scratch.closed[ci] = true;

            expansions += 1;
            if expansions > self.max_expansions {
                tracing::trace!(?start, ?end, expansions, "path search hit expansion cap");
                return None;
            }

            let pos = self.config.pos_of(ci);
            let current_g = scratch.g_score[ci];
            for (next, cost) in self.successors(pos) {
                let ni = match self.config.index_of(next) {
                    Some(i) => i,
                    None => continue,
                };
                if scratch.closed[ni] {
                    continue;
                }
                let tentative_g = current_g + cost;
                if tentative_g < scratch.g_score[ni] {
                    scratch.g_score[ni] = tentative_g;
                    scratch.came_from[ni] = Some(ci);
                    let h = octile(next, end);
                    open.push(OpenEntry {
                        f_score: tentative_g + h,
                        h_score: h,
                        index: ni,
                    });
                }
            }
        }

        None
    }

    /// Search toward every candidate and keep the route with the fewest
    /// waypoints. Ties go to the earlier candidate.
    pub fn find_shortest_path(&self, start: GridPos, candidates: &[GridPos]) -> Option<Vec<GridPos>> {
        let mut best: Option<Vec<GridPos>> = None;
        for &end in candidates {
            if let Some(path) = self.find_path(start, end) {
                let better = best.as_ref().map(|b| path.len() < b.len()).unwrap_or(true);
                if better {
                    best = Some(path);
                }
            }
        }
        best
    }

    fn successors(&self, pos: GridPos) -> Vec<(GridPos, u32)> {
        let mut out = Vec::with_capacity(8);
        for &(dx, dy) in &ORTHOGONAL {
            let next = pos.offset(dx, dy);
            if self.is_walkable(next) {
                out.push((next, STRAIGHT_COST));
            }
        }
        for &(dx, dy) in &DIAGONAL {
            let next = pos.offset(dx, dy);
            if self.is_walkable(next)
                && self.is_walkable(pos.offset(dx, 0))
                && self.is_walkable(pos.offset(0, dy))
            {
                out.push((next, DIAGONAL_COST));
            }
        }
        out
    }
}

fn octile(a: GridPos, b: GridPos) -> u32 {
    let dx = (a.x - b.x).unsigned_abs();
    let dy = (a.y - b.y).unsigned_abs();
    STRAIGHT_COST * dx.max(dy) + (DIAGONAL_COST - STRAIGHT_COST) * dx.min(dy)
}

fn reconstruct(config: &GridConfig, scratch: &SearchScratch, start: usize, end: usize) -> Vec<GridPos> {
    let mut path = Vec::new();
    let mut current = end;
    while current != start {
        path.push(config.pos_of(current));
        match scratch.came_from[current] {
            Some(prev) => current = prev,
            None => break,
        }
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_grid(w: u32, h: u32) -> Navigator {
        Navigator::open(GridConfig::new(w, h))
    }

    fn with_walls(w: u32, h: u32, walls: &[(i32, i32)]) -> Navigator {
        let mut nav = open_grid(w, h);
        for &(x, y) in walls {
            nav.set_walkable_at(GridPos::new(x, y), false).unwrap();
        }
        nav
    }

    #[test]
    fn diagonal_path_on_open_grid() {
        let nav = open_grid(5, 5);
        let path = nav.find_path(GridPos::new(0, 0), GridPos::new(4, 4)).unwrap();
        assert_eq!(path.len(), 4);
        assert_eq!(path[0], GridPos::new(1, 1));
        assert_eq!(*path.last().unwrap(), GridPos::new(4, 4));
    }

    #[test]
    fn same_start_and_end_is_empty_path() {
        let nav = open_grid(3, 3);
        assert_eq!(nav.find_path(GridPos::new(1, 1), GridPos::new(1, 1)), Some(vec![]));
    }

    #[test]
    fn out_of_bounds_endpoint_is_none() {
        let nav = open_grid(3, 3);
        assert!(nav.find_path(GridPos::new(0, 0), GridPos::new(3, 0)).is_none());
        assert!(nav.find_path(GridPos::new(-1, 0), GridPos::new(1, 1)).is_none());
    }

    #[test]
    fn unreachable_is_none_not_empty() {
        // Column x=2 fully blocked.
        let nav = with_walls(5, 3, &[(2, 0), (2, 1), (2, 2)]);
        assert_eq!(nav.find_path(GridPos::new(0, 1), GridPos::new(4, 1)), None);
    }

    #[test]
    fn no_corner_cutting() {
        // From (0,0) to (1,1) with (1,0) blocked: the diagonal step would clip
        // the wall corner, so the route must go around through (0,1).
        let nav = with_walls(3, 3, &[(1, 0)]);
        let path = nav.find_path(GridPos::new(0, 0), GridPos::new(1, 1)).unwrap();
        assert_eq!(path, vec![GridPos::new(0, 1), GridPos::new(1, 1)]);
    }

    #[test]
    fn every_waypoint_is_walkable() {
        let nav = with_walls(8, 8, &[(3, 1), (3, 2), (3, 3), (3, 4), (3, 5), (5, 3), (5, 4), (5, 6)]);
        let path = nav.find_path(GridPos::new(0, 3), GridPos::new(7, 3)).unwrap();
        assert!(!path.is_empty());
        for wp in &path {
            assert!(nav.is_walkable(*wp), "waypoint {:?} not walkable", wp);
        }
        for pair in path.windows(2) {
            assert_eq!(pair[0].chebyshev(pair[1]), 1);
        }
    }

    #[test]
    fn find_path_is_idempotent() {
        let nav = with_walls(10, 10, &[(4, 0), (4, 1), (4, 2), (4, 3), (4, 4), (4, 5), (4, 6)]);
        let a = nav.find_path(GridPos::new(0, 0), GridPos::new(9, 0));
        let b = nav.find_path(GridPos::new(0, 0), GridPos::new(9, 0));
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    #[test]
    fn unwalkable_destination_is_none() {
        let nav = with_walls(3, 3, &[(2, 2)]);
        assert!(nav.find_path(GridPos::new(0, 0), GridPos::new(2, 2)).is_none());
    }

    #[test]
    fn shortest_path_picks_fewest_waypoints() {
        let nav = open_grid(10, 10);
        let start = GridPos::new(0, 0);
        let candidates = [GridPos::new(9, 9), GridPos::new(2, 0), GridPos::new(0, 5)];
        let best = nav.find_shortest_path(start, &candidates).unwrap();
        for &c in &candidates {
            let individual = nav.find_path(start, c).unwrap();
            assert!(best.len() <= individual.len());
        }
        assert_eq!(*best.last().unwrap(), GridPos::new(2, 0));
    }

    #[test]
    fn shortest_path_ties_go_to_first_candidate() {
        let nav = open_grid(5, 5);
        let start = GridPos::new(2, 2);
        let candidates = [GridPos::new(2, 0), GridPos::new(0, 2)];
        let best = nav.find_shortest_path(start, &candidates).unwrap();
        assert_eq!(*best.last().unwrap(), GridPos::new(2, 0));
    }

    #[test]
    fn shortest_path_none_when_all_unreachable() {
        let nav = with_walls(3, 3, &[(1, 0), (1, 1), (1, 2)]);
        assert!(nav
            .find_shortest_path(GridPos::new(0, 0), &[GridPos::new(2, 0), GridPos::new(2, 2)])
            .is_none());
    }

    #[test]
    fn neighbors_are_four_directional_and_walkable() {
        let nav = with_walls(3, 3, &[(1, 0)]);
        let n = nav.get_neighbors(GridPos::new(1, 1));
        assert_eq!(n, vec![GridPos::new(2, 1), GridPos::new(1, 2), GridPos::new(0, 1)]);
        let corner = nav.get_neighbors(GridPos::new(0, 0));
        assert_eq!(corner, vec![GridPos::new(0, 1)]);
    }

    #[test]
    fn set_walkable_at_changes_routes() {
        let mut nav = open_grid(3, 1);
        assert!(nav.find_path(GridPos::new(0, 0), GridPos::new(2, 0)).is_some());
        nav.set_walkable_at(GridPos::new(1, 0), false).unwrap();
        assert!(nav.find_path(GridPos::new(0, 0), GridPos::new(2, 0)).is_none());
        assert!(nav.set_walkable_at(GridPos::new(5, 5), true).is_err());
    }

    #[test]
    fn walkability_from_floor_and_walls() {
        let config = GridConfig::new(3, 1);
        // floor 1 walkable, floor 2 not; wall 5 is a walkable decoration, wall 6 blocks.
        let grid = TileGrid::new(config, vec![vec![1, 1, 2]], vec![vec![5, 6, 0]]).unwrap();
        let tiles: BTreeSet<u32> = [1, 5].into_iter().collect();
        let nav = Navigator::from_tiles(&grid, &tiles);
        assert!(nav.is_walkable(GridPos::new(0, 0)));
        assert!(!nav.is_walkable(GridPos::new(1, 0)));
        assert!(!nav.is_walkable(GridPos::new(2, 0)));
        assert_eq!(nav.walkability_matrix(), vec![vec![true, false, false]]);
    }

    #[test]
    fn expansion_cap_bounds_search() {
        let nav = open_grid(50, 50).with_max_expansions(3);
        assert!(nav.find_path(GridPos::new(0, 0), GridPos::new(49, 49)).is_none());
        let uncapped = open_grid(50, 50).with_max_expansions(0);
        assert_eq!(uncapped.find_path(GridPos::new(0, 0), GridPos::new(49, 49)).unwrap().len(), 49);
    }
}
