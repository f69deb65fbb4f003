// atlas.rs — 3x3 纹理图集: 五个面各放一份等比缩放、居中的源图

use crate::config::ResampleFilter;
use crate::source::{PixelSource, TileRect};
#[cfg(test)]
use image::GenericImageView;
use image::{imageops, GenericImage, Rgba, RgbaImage};
use std::sync::atomic::{AtomicU64, Ordering};

pub const GRID: u32 = 3;

/// One of the five rendered walls. The front of the box is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Face {
    Back,
    Ceiling,
    Floor,
    Left,
    Right,
}

impl Face {
    pub const ALL: [Face; 5] = [Face::Back, Face::Ceiling, Face::Floor, Face::Left, Face::Right];

    /// (column, row) of the face's cell in the 3x3 grid.
    pub const fn cell(self) -> (u32, u32) {
        match self {
            Face::Back => (1, 1),
            Face::Ceiling => (1, 0),
            Face::Floor => (1, 2),
            Face::Left => (0, 1),
            Face::Right => (2, 1),
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Face::Back => 0,
            Face::Ceiling => 1,
            Face::Floor => 2,
            Face::Left => 3,
            Face::Right => 4,
        }
    }
}

/// Cells never written by the builder.
#[cfg(test)]
pub const CORNER_CELLS: [(u32, u32); 4] = [(0, 0), (2, 0), (0, 2), (2, 2)];

/// Uniform fit of a crop into a tile: the crop's long edge fills the tile's
/// long edge, the short edge is letterboxed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub scale: f32,
    pub dw: f32,
    pub dh: f32,
    pub ox: f32,
    pub oy: f32,
}

impl Placement {
    pub fn fit(tile: (u32, u32), crop: TileRect) -> Self {
        let (tw, th) = (tile.0 as f32, tile.1 as f32);
        let (sw, sh) = (crop.sw as f32, crop.sh as f32);

        let scale = tw.max(th) / sw.max(sh);
        let dw = sw * scale;
        let dh = sh * scale;

        Self {
            scale,
            dw,
            dh,
            ox: (tw - dw) * 0.5,
            oy: (th - dh) * 0.5,
        }
    }

    /// Integer size of the placed copy.
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            (self.dw.round() as u32).max(1),
            (self.dh.round() as u32).max(1),
        )
    }

    /// Integer offset inside the cell. Negative when a crop's orientation
    /// differs from the tile's and the copy overhangs the cell.
    pub fn pixel_offset(&self, tile: (u32, u32)) -> (i64, i64) {
        let (pw, ph) = self.pixel_size();
        (
            (tile.0 as i64 - pw as i64).div_euclid(2),
            (tile.1 as i64 - ph as i64).div_euclid(2),
        )
    }
}

/// Per-face source crops. `None` reads the full source extent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellCrops([Option<TileRect>; 5]);

impl CellCrops {
    #[cfg(test)]
    pub fn with(mut self, face: Face, rect: TileRect) -> Self {
        self.0[face.index()] = Some(rect);
        self
    }

    pub fn get(&self, face: Face, source_size: (u32, u32)) -> TileRect {
        self.0[face.index()]
            .map(|r| r.clamp_to(source_size.0, source_size.1))
            .unwrap_or(TileRect::full(source_size.0, source_size.1))
    }
}

static NEXT_ALLOCATION: AtomicU64 = AtomicU64::new(1);

/// Off-screen RGBA surface holding the 3x3 atlas.
#[derive(Debug, Clone)]
pub struct AtlasSurface {
    image: RgbaImage,
    tile: (u32, u32),
    allocation: u64,
    generation: u64,
}

impl AtlasSurface {
    /// Fully transparent `3*tw x 3*th` surface.
    pub fn blank(tw: u32, th: u32) -> Self {
        Self {
            image: RgbaImage::new(tw * GRID, th * GRID),
            tile: (tw, th),
            allocation: NEXT_ALLOCATION.fetch_add(1, Ordering::Relaxed),
            generation: 0,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    #[cfg(test)]
    pub fn tile_size(&self) -> (u32, u32) {
        self.tile
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Unique per allocated surface; changes only on reallocation.
    pub fn allocation(&self) -> u64 {
        self.allocation
    }

    /// Bumped on every repaint.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Reset every channel, alpha included, so nothing stale survives.
    pub fn clear(&mut self) {
        for p in self.image.pixels_mut() {
            *p = Rgba([0, 0, 0, 0]);
        }
    }

    /// Pixel rectangle `(x, y, w, h)` of a grid cell.
    pub fn cell_rect(&self, col: u32, row: u32) -> (u32, u32, u32, u32) {
        let (tw, th) = self.tile;
        (col * tw, row * th, tw, th)
    }

    #[cfg(test)]
    pub fn cell_image(&self, col: u32, row: u32) -> RgbaImage {
        let (x, y, w, h) = self.cell_rect(col, row);
        imageops::crop_imm(&self.image, x, y, w, h).to_image()
    }

    #[cfg(test)]
    pub fn is_cell_blank(&self, col: u32, row: u32) -> bool {
        let (x, y, w, h) = self.cell_rect(col, row);
        imageops::crop_imm(&self.image, x, y, w, h)
            .pixels()
            .all(|(_, _, p)| p == Rgba([0, 0, 0, 0]))
    }
}

/// Reallocation law: a surface is reused only when its size already matches.
pub fn should_reallocate(current: (u32, u32), required: (u32, u32)) -> bool {
    current != required
}

/// Paint the atlas from the full source extent.
///
/// Returns `existing` untouched while the source has no valid dimensions.
pub fn build_atlas<S: PixelSource + ?Sized>(
    source: &S,
    existing: Option<AtlasSurface>,
    filter: ResampleFilter,
) -> Option<AtlasSurface> {
    build_atlas_with_crops(source, existing, &CellCrops::default(), filter)
}

pub fn build_atlas_with_crops<S: PixelSource + ?Sized>(
    source: &S,
    existing: Option<AtlasSurface>,
    crops: &CellCrops,
    filter: ResampleFilter,
) -> Option<AtlasSurface> {
    let (tw, th) = source.dimensions();
    if tw == 0 || th == 0 {
        log::trace!("atlas: source not ready, keeping previous surface");
        return existing;
    }

    let required = (tw * GRID, th * GRID);
    let mut atlas = match existing {
        Some(mut atlas) if !should_reallocate(atlas.size(), required) => {
            atlas.clear();
            atlas
        }
        previous => {
            log::debug!(
                "atlas: allocating {}x{} (was {:?})",
                required.0,
                required.1,
                previous.as_ref().map(AtlasSurface::size)
            );
            AtlasSurface::blank(tw, th)
        }
    };

    let tile = (tw, th);
    // 相同裁剪只缩放一次, 五个格子共用同一份结果
    let mut cached: Option<(TileRect, RgbaImage, (i64, i64))> = None;

    for face in Face::ALL {
        let crop = crops.get(face, tile);
        if crop.is_empty() {
            continue;
        }

        let reuse = matches!(&cached, Some((rect, _, _)) if *rect == crop);
        if !reuse {
            cached = Some(place_crop(source, crop, tile, filter));
        }
        let Some((_, placed, (ox, oy))) = &cached else {
            continue;
        };

        let (col, row) = face.cell();
        let (x, y, w, h) = atlas.cell_rect(col, row);
        let mut cell = atlas.image.sub_image(x, y, w, h);
        imageops::replace(&mut *cell, placed, *ox, *oy);
    }

    atlas.generation += 1;
    Some(atlas)
}

fn place_crop<S: PixelSource + ?Sized>(
    source: &S,
    crop: TileRect,
    tile: (u32, u32),
    filter: ResampleFilter,
) -> (TileRect, RgbaImage, (i64, i64)) {
    let placement = Placement::fit(tile, crop);
    let (pw, ph) = placement.pixel_size();
    let region = source.read_region(crop);

    let placed = if region.dimensions() == (pw, ph) {
        region
    } else {
        imageops::resize(&region, pw, ph, filter.into())
    };

    (crop, placed, placement.pixel_offset(tile))
}
