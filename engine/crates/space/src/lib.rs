pub mod grid_space;
pub mod model;
pub mod navigator;

pub use grid_space::{GridConfig, GridPos, TileGrid, Vec2};
pub use model::SpaceError;
pub use navigator::Navigator;
