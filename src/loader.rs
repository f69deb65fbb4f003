// loader.rs — 后台解码图片 / 动图, 动图作为实时帧流播放

use crate::source::{downscale_to_long_edge, LiveFeed};
use image::codecs::gif::GifDecoder;
use image::imageops::FilterType;
use image::io::Reader as ImageReader;
use image::{AnimationDecoder, ImageFormat, RgbaImage};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Floor for very short non-zero frame delays.
const MIN_FRAME_DELAY: Duration = Duration::from_millis(20);
/// Used for frames that carry no delay at all (0ms).
const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(100);

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp", "tga", "tiff"];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{path} contains no frames")]
    Empty { path: PathBuf },
}

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub max_long_edge: u32,
    pub filter: FilterType,
}

pub struct AnimationFrame {
    pub image: RgbaImage,
    pub delay: Duration,
}

pub enum Loaded {
    Still(RgbaImage),
    Animation(Vec<AnimationFrame>),
}

pub type LoadResult = Result<(PathBuf, Loaded), LoadError>;

pub fn load_path(path: &Path, opts: LoadOptions) -> Result<Loaded, LoadError> {
    let is_gif = matches!(ImageFormat::from_path(path), Ok(ImageFormat::Gif));
    if is_gif {
        let mut frames = decode_gif(path, opts)?;
        if frames.len() > 1 {
            return Ok(Loaded::Animation(frames));
        }
        return frames
            .pop()
            .map(|f| Loaded::Still(f.image))
            .ok_or_else(|| LoadError::Empty {
                path: path.to_path_buf(),
            });
    }

    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let img = ImageReader::new(BufReader::new(file))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)
        .and_then(|mut r| {
            r.no_limits();
            r.decode()
        })
        .map_err(|source| LoadError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    log::info!("image loaded: {}x{}", img.width(), img.height());
    Ok(Loaded::Still(downscale_to_long_edge(img.to_rgba8(), opts.max_long_edge, opts.filter)))
}

fn decode_gif(path: &Path, opts: LoadOptions) -> Result<Vec<AnimationFrame>, LoadError> {
    let decode_err = |source| LoadError::Decode {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let decoder = GifDecoder::new(BufReader::new(file)).map_err(decode_err)?;
    let frames = decoder.into_frames().collect_frames().map_err(decode_err)?;
    log::info!("animation loaded: {} frames", frames.len());

    Ok(frames
        .into_iter()
        .map(|frame| {
            let (num, den) = frame.delay().numer_denom_ms();
            let delay = if num == 0 || den == 0 {
                DEFAULT_FRAME_DELAY
            } else {
                Duration::from_secs_f64(num as f64 / den as f64 / 1000.0).max(MIN_FRAME_DELAY)
            };
            AnimationFrame {
                image: downscale_to_long_edge(frame.into_buffer(), opts.max_long_edge, opts.filter),
                delay,
            }
        })
        .collect())
}

/// Decode on a worker thread and send the result back to the frame loop.
pub fn spawn_load(path: PathBuf, opts: LoadOptions, tx: Sender<LoadResult>) {
    thread::spawn(move || {
        log::info!("loading {:?} in background", path);
        let result = load_path(&path, opts).map(|loaded| (path, loaded));
        if tx.send(result).is_err() {
            log::error!("frame loop gone, dropping decoded image");
        }
    });
}

/// Loop `frames` into `feed` until the feed is closed.
pub fn spawn_playback(frames: Vec<AnimationFrame>, feed: LiveFeed) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        log::debug!("playback started ({} frames)", frames.len());
        'outer: loop {
            for frame in &frames {
                if feed.is_closed() {
                    break 'outer;
                }
                feed.publish(frame.image.clone());
                thread::sleep(frame.delay);
            }
        }
        log::debug!("playback stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn opts() -> LoadOptions {
        LoadOptions {
            max_long_edge: 64,
            filter: FilterType::Triangle,
        }
    }

    #[test]
    fn test_missing_file_is_open_error() {
        let err = load_path(Path::new("/nonexistent/photo.png"), opts()).err().unwrap();
        assert!(matches!(err, LoadError::Open { .. }));
    }

    #[test]
    fn test_still_png_is_downscaled() {
        let path = std::env::temp_dir().join(format!("room_illusion_{}.png", std::process::id()));
        RgbaImage::from_pixel(200, 100, Rgba([1, 2, 3, 255])).save(&path).unwrap();

        let loaded = load_path(&path, opts()).unwrap();
        let _ = std::fs::remove_file(&path);
        match loaded {
            Loaded::Still(img) => assert_eq!(img.dimensions(), (64, 32)),
            Loaded::Animation(_) => panic!("png decoded as animation"),
        }
    }

    #[test]
    fn test_playback_publishes_until_closed() {
        let feed = LiveFeed::new();
        let frames = vec![
            AnimationFrame {
                image: RgbaImage::new(2, 2),
                delay: Duration::from_millis(1),
            },
            AnimationFrame {
                image: RgbaImage::new(3, 2),
                delay: Duration::from_millis(1),
            },
        ];
        let handle = spawn_playback(frames, feed.clone());
        while feed.serial() < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        feed.close();
        handle.join().unwrap();
        assert!(feed.dimensions().0 >= 2);
    }
}
