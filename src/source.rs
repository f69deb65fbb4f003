// source.rs — 视觉源: 静态图片 / 实时帧流

use image::{imageops, imageops::FilterType, Rgba, RgbaImage};
use std::sync::{Arc, Mutex};

/// Source-relative rectangle read from a pixel source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub sx: u32,
    pub sy: u32,
    pub sw: u32,
    pub sh: u32,
}

impl TileRect {
    pub const fn full(width: u32, height: u32) -> Self {
        Self { sx: 0, sy: 0, sw: width, sh: height }
    }

    pub fn is_empty(&self) -> bool {
        self.sw == 0 || self.sh == 0
    }

    /// Clamp to a `width x height` source. May come back empty.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let sx = self.sx.min(width);
        let sy = self.sy.min(height);
        Self {
            sx,
            sy,
            sw: self.sw.min(width - sx),
            sh: self.sh.min(height - sy),
        }
    }
}

/// Anything the atlas builder can read pixels from.
pub trait PixelSource {
    fn dimensions(&self) -> (u32, u32);

    fn read_region(&self, rect: TileRect) -> RgbaImage;

    fn is_ready(&self) -> bool {
        let (w, h) = self.dimensions();
        w > 0 && h > 0
    }
}

impl PixelSource for RgbaImage {
    fn dimensions(&self) -> (u32, u32) {
        RgbaImage::dimensions(self)
    }

    fn read_region(&self, rect: TileRect) -> RgbaImage {
        let (w, h) = RgbaImage::dimensions(self);
        let r = rect.clamp_to(w, h);
        if r == TileRect::full(w, h) {
            return self.clone();
        }
        imageops::crop_imm(self, r.sx, r.sy, r.sw, r.sh).to_image()
    }
}

#[derive(Default)]
struct FeedSlot {
    frame: Option<Arc<RgbaImage>>,
    serial: u64,
    closed: bool,
}

/// Latest-frame slot shared between a frame producer and the render thread.
///
/// Producers `publish` whole frames; the render thread takes an `Arc` to the
/// most recent one, so a frame is never observed half-written.
#[derive(Clone, Default)]
pub struct LiveFeed {
    slot: Arc<Mutex<FeedSlot>>,
}

impl LiveFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: RgbaImage) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.frame = Some(Arc::new(frame));
            slot.serial += 1;
        }
    }

    pub fn latest(&self) -> Option<Arc<RgbaImage>> {
        self.slot.lock().ok().and_then(|s| s.frame.clone())
    }

    /// Number of frames published so far.
    pub fn serial(&self) -> u64 {
        self.slot.lock().map(|s| s.serial).unwrap_or(0)
    }

    /// Zero until the first frame arrives.
    pub fn dimensions(&self) -> (u32, u32) {
        self.latest().map(|f| f.dimensions()).unwrap_or((0, 0))
    }

    /// Ask the producer to stop. Already published frames stay readable.
    pub fn close(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.closed = true;
        }
    }

    pub fn is_closed(&self) -> bool {
        // a poisoned slot has no live producer left
        self.slot.lock().map(|s| s.closed).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Static,
    Live,
}

#[derive(Clone)]
pub enum VisualSource {
    StaticImage(Arc<RgbaImage>),
    LiveFeed(LiveFeed),
}

impl VisualSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            VisualSource::StaticImage(_) => SourceKind::Static,
            VisualSource::LiveFeed(_) => SourceKind::Live,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            VisualSource::StaticImage(img) => img.dimensions(),
            VisualSource::LiveFeed(feed) => feed.dimensions(),
        }
    }

    pub fn is_ready(&self) -> bool {
        let (w, h) = self.dimensions();
        w > 0 && h > 0
    }

    /// Current frame, if the source has valid dimensions.
    ///
    /// Width, height and pixels of one snapshot always belong together, even
    /// if a live feed publishes a differently sized frame right after.
    pub fn snapshot(&self) -> Option<Arc<RgbaImage>> {
        let frame = match self {
            VisualSource::StaticImage(img) => Some(img.clone()),
            VisualSource::LiveFeed(feed) => feed.latest(),
        }?;
        frame.is_ready().then_some(frame)
    }
}

/// Resample so the long edge is at most `max_long_edge`. Zero disables it.
pub fn downscale_to_long_edge(img: RgbaImage, max_long_edge: u32, filter: FilterType) -> RgbaImage {
    let (w, h) = img.dimensions();
    let long_edge = w.max(h);
    if max_long_edge == 0 || long_edge <= max_long_edge {
        return img;
    }

    let scale = max_long_edge as f32 / long_edge as f32;
    let nw = ((w as f32 * scale).round() as u32).max(1);
    let nh = ((h as f32 * scale).round() as u32).max(1);
    log::debug!("downscaling source {}x{} -> {}x{}", w, h, nw, nh);
    imageops::resize(&img, nw, nh, filter)
}

/// Startup picture shown before the user opens anything.
pub fn placeholder_image(width: u32, height: u32) -> RgbaImage {
    let cell = (width.max(height) / 16).max(1);
    RgbaImage::from_fn(width, height, |x, y| {
        let dark = ((x / cell) + (y / cell)) % 2 == 0;
        let fx = x as f32 / width.max(1) as f32;
        let fy = y as f32 / height.max(1) as f32;
        let base = if dark { 60.0 } else { 190.0 };
        Rgba([
            (base * (0.6 + 0.4 * fx)) as u8,
            (base * (0.6 + 0.4 * fy)) as u8,
            (base * 0.9) as u8,
            255,
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_feed_not_ready_until_first_frame() {
        let feed = LiveFeed::new();
        let source = VisualSource::LiveFeed(feed.clone());
        assert!(!source.is_ready());
        assert!(source.snapshot().is_none());

        feed.publish(RgbaImage::new(4, 2));
        assert!(source.is_ready());
        assert_eq!(source.dimensions(), (4, 2));
        assert_eq!(feed.serial(), 1);
    }

    #[test]
    fn test_live_feed_dimensions_follow_latest_frame() {
        let feed = LiveFeed::new();
        feed.publish(RgbaImage::new(4, 2));
        let first = feed.latest().unwrap();
        feed.publish(RgbaImage::new(8, 6));

        // earlier snapshot keeps its own size
        assert_eq!(first.dimensions(), (4, 2));
        assert_eq!(feed.dimensions(), (8, 6));
    }

    #[test]
    fn test_zero_sized_static_image_is_not_ready() {
        let source = VisualSource::StaticImage(Arc::new(RgbaImage::new(0, 10)));
        assert!(!source.is_ready());
        assert!(source.snapshot().is_none());
    }

    #[test]
    fn test_close_is_sticky() {
        let feed = LiveFeed::new();
        assert!(!feed.is_closed());
        feed.close();
        assert!(feed.clone().is_closed());
    }

    #[test]
    fn test_read_region_crops_and_clamps() {
        let img = RgbaImage::from_fn(4, 4, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        let region = img.read_region(TileRect { sx: 2, sy: 1, sw: 10, sh: 2 });
        assert_eq!(region.dimensions(), (2, 2));
        assert_eq!(region.get_pixel(0, 0), &Rgba([2, 1, 0, 255]));

        let full = img.read_region(TileRect::full(4, 4));
        assert_eq!(full, img);
    }

    #[test]
    fn test_downscale_keeps_aspect() {
        let img = RgbaImage::new(1920, 1080);
        let out = downscale_to_long_edge(img, 960, FilterType::Triangle);
        assert_eq!(out.dimensions(), (960, 540));

        let small = RgbaImage::new(300, 200);
        let same = downscale_to_long_edge(small, 960, FilterType::Triangle);
        assert_eq!(same.dimensions(), (300, 200));
    }
}
