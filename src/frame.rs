// frame.rs — 每帧协调: 选定权威源、决定是否重建图集

use crate::atlas::{build_atlas, AtlasSurface};
use crate::config::{AppConfig, ResampleFilter};
use crate::room::{RoomLook, RoomScene};
use crate::source::{LiveFeed, SourceKind, VisualSource};
use image::RgbaImage;
use std::sync::Arc;
use thiserror::Error;

/// Transient reasons to skip a frame. All of them heal on a later tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameSkip {
    #[error("source has no valid dimensions yet")]
    NotReady,
    #[error("viewport is empty")]
    DegenerateViewport,
}

#[derive(Debug, Clone)]
pub struct FrameInfo {
    pub kind: SourceKind,
    pub source_size: (u32, u32),
    pub aspect: f32,
    /// Atlas repainted this frame.
    pub rebuilt: bool,
    /// Atlas surface replaced by a new allocation this frame.
    pub reallocated: bool,
}

#[derive(Debug, Clone)]
pub enum FramePlan {
    Skip(FrameSkip),
    Draw(FrameInfo, RoomScene),
}

/// Render state owned by the frame loop.
pub struct RenderContext {
    still: Option<Arc<RgbaImage>>,
    live: Option<LiveFeed>,
    atlas: Option<AtlasSurface>,
    /// Which source painted the current atlas.
    atlas_kind: Option<SourceKind>,
    pub look: RoomLook,
    pub resample: ResampleFilter,
    viewport: (u32, u32),
    dirty: bool,
}

impl RenderContext {
    pub fn new(config: &AppConfig, viewport: (u32, u32)) -> Self {
        Self {
            still: None,
            live: None,
            atlas: None,
            atlas_kind: None,
            look: config.look,
            resample: config.resample,
            viewport,
            dirty: true,
        }
    }

    /// Replace the still image and force a rebuild.
    pub fn set_static_image(&mut self, img: RgbaImage) {
        self.still = Some(Arc::new(img));
        self.dirty = true;
    }

    /// Start reading frames from `feed`. A previously attached feed is closed.
    pub fn attach_live_feed(&mut self, feed: LiveFeed) {
        self.detach_live_feed();
        self.live = Some(feed);
    }

    pub fn detach_live_feed(&mut self) {
        if let Some(feed) = self.live.take() {
            feed.close();
            self.dirty = true;
        }
    }

    pub fn has_live_feed(&self) -> bool {
        self.live.is_some()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.dirty = true;
    }

    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    pub fn atlas(&self) -> Option<&AtlasSurface> {
        self.atlas.as_ref()
    }

    /// A ready live feed wins; otherwise the still image.
    pub fn authoritative_source(&self) -> Option<VisualSource> {
        if let Some(feed) = &self.live {
            let source = VisualSource::LiveFeed(feed.clone());
            if source.is_ready() {
                return Some(source);
            }
        }
        self.still.clone().map(VisualSource::StaticImage)
    }

    /// Decide this frame: refresh the atlas if needed and lay out the room.
    pub fn plan_frame(&mut self) -> FramePlan {
        let (vw, vh) = self.viewport;
        if vw == 0 || vh == 0 {
            return FramePlan::Skip(FrameSkip::DegenerateViewport);
        }

        let Some(source) = self.authoritative_source() else {
            return FramePlan::Skip(FrameSkip::NotReady);
        };
        let kind = source.kind();
        let Some(frame) = source.snapshot() else {
            return FramePlan::Skip(FrameSkip::NotReady);
        };

        // 实时源每帧都重建; 静态图只在脏标记或来源切换时重建
        let needs_rebuild = match kind {
            SourceKind::Live => true,
            SourceKind::Static => self.dirty || self.atlas_kind != Some(kind) || self.atlas.is_none(),
        };

        let mut rebuilt = false;
        let mut reallocated = false;
        if needs_rebuild {
            let before = self.atlas.as_ref().map(AtlasSurface::allocation);
            self.atlas = build_atlas(&*frame, self.atlas.take(), self.resample);
            let after = self.atlas.as_ref().map(AtlasSurface::allocation);
            rebuilt = after.is_some();
            reallocated = before != after;
            if let (true, VisualSource::LiveFeed(feed)) = (reallocated, &source) {
                log::debug!(
                    "live frame #{} is {}x{}, atlas reallocated",
                    feed.serial(),
                    frame.width(),
                    frame.height()
                );
            }
            self.atlas_kind = Some(kind);
            self.dirty = false;
        }

        let source_size = frame.dimensions();
        let aspect = source_size.0 as f32 / source_size.1 as f32;
        match RoomScene::build(self.viewport, aspect, &self.look) {
            Some(scene) => FramePlan::Draw(
                FrameInfo {
                    kind,
                    source_size,
                    aspect,
                    rebuilt,
                    reallocated,
                },
                scene,
            ),
            None => FramePlan::Skip(FrameSkip::NotReady),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn ctx() -> RenderContext {
        RenderContext::new(&AppConfig::default(), (1280, 720))
    }

    fn solid(w: u32, h: u32, c: u8) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([c, c, c, 255]))
    }

    fn expect_draw(plan: FramePlan) -> FrameInfo {
        match plan {
            FramePlan::Draw(info, _) => info,
            FramePlan::Skip(skip) => panic!("unexpected skip: {}", skip),
        }
    }

    #[test]
    fn test_no_source_is_not_ready() {
        let mut c = ctx();
        assert!(matches!(c.plan_frame(), FramePlan::Skip(FrameSkip::NotReady)));
    }

    #[test]
    fn test_empty_viewport_skips() {
        let mut c = ctx();
        c.set_static_image(solid(4, 4, 10));
        c.resize(0, 720);
        assert!(matches!(c.plan_frame(), FramePlan::Skip(FrameSkip::DegenerateViewport)));
        c.resize(1280, 720);
        expect_draw(c.plan_frame());
    }

    #[test]
    fn test_static_image_builds_once() {
        let mut c = ctx();
        c.set_static_image(solid(40, 30, 10));

        let first = expect_draw(c.plan_frame());
        assert!(first.rebuilt && first.reallocated);
        assert_eq!(first.kind, SourceKind::Static);
        assert!((first.aspect - 4.0 / 3.0).abs() < 1e-6);

        let second = expect_draw(c.plan_frame());
        assert!(!second.rebuilt);

        c.resize(800, 600);
        let third = expect_draw(c.plan_frame());
        assert!(third.rebuilt && !third.reallocated);
    }

    #[test]
    fn test_live_feed_rebuilds_every_frame() {
        let mut c = ctx();
        c.set_static_image(solid(40, 30, 10));
        let feed = LiveFeed::new();
        c.attach_live_feed(feed.clone());

        // warming up: the still image stays authoritative
        let warmup = expect_draw(c.plan_frame());
        assert_eq!(warmup.kind, SourceKind::Static);

        feed.publish(solid(16, 9, 200));
        let a = expect_draw(c.plan_frame());
        assert_eq!(a.kind, SourceKind::Live);
        assert!(a.reallocated);
        assert_eq!(c.atlas().unwrap().size(), (48, 27));

        let b = expect_draw(c.plan_frame());
        assert!(b.rebuilt && !b.reallocated);
    }

    #[test]
    fn test_live_dimension_change_reallocates() {
        let mut c = ctx();
        let feed = LiveFeed::new();
        c.attach_live_feed(feed.clone());
        assert!(matches!(c.plan_frame(), FramePlan::Skip(FrameSkip::NotReady)));

        feed.publish(solid(2, 2, 1));
        expect_draw(c.plan_frame());
        feed.publish(solid(64, 48, 1));
        let info = expect_draw(c.plan_frame());
        assert!(info.reallocated);
        assert_eq!(info.source_size, (64, 48));
        assert_eq!(c.atlas().unwrap().size(), (192, 144));
    }

    #[test]
    fn test_detach_returns_to_still_image() {
        let mut c = ctx();
        c.set_static_image(solid(30, 30, 10));
        let feed = LiveFeed::new();
        feed.publish(solid(10, 20, 99));
        c.attach_live_feed(feed.clone());
        expect_draw(c.plan_frame());
        assert_eq!(c.atlas().unwrap().tile_size(), (10, 20));

        c.detach_live_feed();
        assert!(feed.is_closed());
        let info = expect_draw(c.plan_frame());
        assert_eq!(info.kind, SourceKind::Static);
        assert!(info.rebuilt);
        assert_eq!(c.atlas().unwrap().tile_size(), (30, 30));
    }
}
