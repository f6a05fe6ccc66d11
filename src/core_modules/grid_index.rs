// THEORY:
// The `grid_index` module is the pure coordinate math of the system. It maps a
// world position inside a bounded volume onto a cell of the 2D accumulation grid
// and flattens that cell into the integer index the chunks are keyed by.
//
// The vertical axis is ignored: the grid is a top-down projection. World and
// grid axes are swapped on purpose, world z drives the grid column and world x
// drives the grid row.

pub mod grid_index {
    use glam::Vec3;

    /// A cell of the accumulation grid. `x` is the column, `y` the row.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CellCoordinate {
        pub x: u32,
        pub y: u32,
    }

    impl CellCoordinate {
        pub fn new(x: u32, y: u32) -> Self {
            Self { x, y }
        }

        /// Flattens the cell to `y * grid_width + x`.
        pub fn index(&self, grid_width: u32) -> u32 {
            self.y * grid_width + self.x
        }

        /// Inverse of [`CellCoordinate::index`].
        pub fn from_index(index: u32, grid_width: u32) -> Self {
            Self {
                x: index % grid_width,
                y: index / grid_width,
            }
        }
    }

    /// Origin of a volume centred on `center`, flattened onto the horizontal plane.
    pub fn volume_origin(center: Vec3, extent: Vec3) -> Vec3 {
        let min = center - extent / 2.0;
        Vec3::new(min.x, 0.0, min.z)
    }

    /// Maps `position` to a grid cell, or `None` when it lies outside the volume.
    ///
    /// A position exactly on the far boundary would floor to `grid_width` or
    /// `grid_height`; it is clamped into the last row/column instead.
    pub fn map_to_cell(
        position: Vec3,
        volume_origin: Vec3,
        volume_extent: Vec3,
        grid_width: u32,
        grid_height: u32,
    ) -> Option<CellCoordinate> {
        let offset = position - volume_origin;
        if !(offset.x >= 0.0
            && offset.x <= volume_extent.x
            && offset.z >= 0.0
            && offset.z <= volume_extent.z)
        {
            return None;
        }

        let col = (offset.z / volume_extent.z * grid_width as f32).floor() as u32;
        let row = (offset.x / volume_extent.x * grid_height as f32).floor() as u32;

        Some(CellCoordinate {
            x: col.min(grid_width.saturating_sub(1)),
            y: row.min(grid_height.saturating_sub(1)),
        })
    }
}
