#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpaceError {
    #[error("position ({x}, {y}) is out of bounds")]
    OutOfBounds { x: i32, y: i32 },

    #[error("{layer} layer is {got_width}x{got_height}, expected {width}x{height}")]
    DimensionMismatch {
        layer: &'static str,
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },
}
