//! Decoded watermark images shared by every card on the render thread.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use image::RgbaImage;
use slotmap::SlotMap;
use smol_str::SmolStr;

slotmap::new_key_type! {
    pub struct WatermarkHandle;
}

#[derive(Debug, thiserror::Error)]
pub enum WatermarkLoadError {
    #[error("unsupported watermark source: {0}")]
    UnsupportedSource(String),
    #[error("failed to decode watermark image")]
    Decode(#[from] image::ImageError),
}

/// Fetch + decode for a watermark URL. Runs on a loader thread, never on the
/// frame loop.
pub trait WatermarkFetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> Result<RgbaImage, WatermarkLoadError>;
}

/// Reads local paths and `file://` URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileWatermarkFetcher;

impl WatermarkFetcher for FileWatermarkFetcher {
    fn fetch(&self, url: &str) -> Result<RgbaImage, WatermarkLoadError> {
        if url.contains("://") && !url.starts_with("file://") {
            return Err(WatermarkLoadError::UnsupportedSource(url.to_owned()));
        }
        let path = url.strip_prefix("file://").unwrap_or(url);
        Ok(image::open(Path::new(path))?.to_rgba8())
    }
}

#[derive(Debug, Default)]
pub struct WatermarkCache {
    images: SlotMap<WatermarkHandle, RgbaImage>,
    by_key: HashMap<SmolStr, WatermarkHandle>,
    by_url: HashMap<SmolStr, WatermarkHandle>,
    requested: HashSet<SmolStr>,
}

impl WatermarkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` as requested. Returns `false` if it was requested before,
    /// whether or not that load succeeded.
    pub fn begin_load(&mut self, key: &SmolStr) -> bool {
        self.requested.insert(key.clone())
    }

    pub fn insert(&mut self, key: SmolStr, url: SmolStr, image: RgbaImage) -> WatermarkHandle {
        let handle = match self.by_key.get(&key) {
            Some(&handle) if self.images.contains_key(handle) => {
                self.images[handle] = image;
                handle
            }
            _ => self.images.insert(image),
        };
        self.requested.insert(key.clone());
        self.by_key.insert(key, handle);
        self.by_url.insert(url, handle);
        handle
    }

    /// Looks an image up by request key first, then by source URL.
    pub fn lookup(&self, name: &str) -> Option<&RgbaImage> {
        let handle = self.by_key.get(name).or_else(|| self.by_url.get(name))?;
        self.images.get(*handle)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
