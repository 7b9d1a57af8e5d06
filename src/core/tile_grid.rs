use crate::types::{MosaicError, MosaicResult, StackedImage, TileIndex, RGB_CHANNELS};
use ndarray::{s, Array3};

/// One square cell of a stacked capture
#[derive(Debug, Clone)]
pub struct Tile {
    /// Grid position (row, col); stable across captures of the same ground tile
    pub index: TileIndex,
    /// Pixel data (tile_size x tile_size x channels)
    pub data: Array3<f32>,
}

impl Tile {
    pub fn new(index: TileIndex, data: Array3<f32>) -> Self {
        Self { index, data }
    }

    /// Colour channels only (tile_size x tile_size x 3)
    pub fn rgb(&self) -> Array3<f32> {
        let channels = self.data.dim().2.min(RGB_CHANNELS);
        self.data.slice(s![.., .., ..channels]).to_owned()
    }

    pub fn channels(&self) -> usize {
        self.data.dim().2
    }

    /// (rows, cols) of the tile
    pub fn size(&self) -> (usize, usize) {
        let (rows, cols, _) = self.data.dim();
        (rows, cols)
    }
}

/// Shape summary used to check that successive captures share one index space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    pub width: usize,
    pub height: usize,
    pub tile_size: usize,
    pub rows: usize,
    pub cols: usize,
}

impl GridShape {
    pub fn tile_count(&self) -> usize {
        self.rows * self.cols
    }
}

/// Non-overlapping tile_size x tile_size partition of a stacked capture
#[derive(Debug, Clone)]
pub struct TileGrid {
    pub tiles: Vec<Tile>,
    /// Source width in pixels
    pub width: usize,
    /// Source height in pixels
    pub height: usize,
    pub tile_size: usize,
}

impl TileGrid {
    /// Split `image` into complete tiles in row-major order.
    ///
    /// Trailing rows/columns that do not fill a whole tile are dropped. An image
    /// smaller than `tile_size` in either dimension yields an empty grid.
    pub fn from_array(image: &StackedImage, tile_size: usize) -> MosaicResult<Self> {
        if tile_size == 0 {
            return Err(MosaicError::InvalidParameter(
                "tile_size must be a positive integer".to_string(),
            ));
        }

        let (height, width, _) = image.dim();
        let rows = height / tile_size;
        let cols = width / tile_size;

        log::debug!(
            "Splitting {}x{} image into {}x{} tiles of {} pixels",
            width, height, rows, cols, tile_size
        );
        if height % tile_size != 0 || width % tile_size != 0 {
            log::debug!(
                "Dropping partial strip: {} trailing rows, {} trailing columns",
                height % tile_size,
                width % tile_size
            );
        }

        let mut tiles = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                let y = row * tile_size;
                let x = col * tile_size;
                let data = image
                    .slice(s![y..y + tile_size, x..x + tile_size, ..])
                    .to_owned();
                tiles.push(Tile::new((row, col), data));
            }
        }

        Ok(Self {
            tiles,
            width,
            height,
            tile_size,
        })
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Indices of every tile, row-major
    pub fn indices(&self) -> impl Iterator<Item = TileIndex> + '_ {
        self.tiles.iter().map(|tile| tile.index)
    }

    pub fn shape(&self) -> GridShape {
        GridShape {
            width: self.width,
            height: self.height,
            tile_size: self.tile_size,
            rows: self.height / self.tile_size,
            cols: self.width / self.tile_size,
        }
    }
}
