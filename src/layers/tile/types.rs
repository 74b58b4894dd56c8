//! Core data types for grid and tile layers

use crate::{
    background::pool::PoolBinding,
    core::{
        constants::{
            DEFAULT_KEEP_BUFFER, DEFAULT_MAX_ZOOM, DEFAULT_UPDATE_INTERVAL_MS,
            DEFAULT_WORKER_POOL_MAX, TILE_SIZE,
        },
        geo::{LatLngBounds, Point, TileCoord},
    },
    prelude::{Arc, Instant},
    rendering::Bitmap,
    Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Options shared by every grid layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridLayerOptions {
    pub tile_size: u32,
    pub opacity: f32,
    /// Only update tiles once panning settles
    pub update_when_idle: bool,
    /// Refresh the grid on every zoom level crossed during animation
    pub update_when_zooming: bool,
    /// Throttle for updates while panning
    pub update_interval_ms: u64,
    pub z_index: i32,
    /// Tiles are only requested inside these bounds
    pub bounds: Option<LatLngBounds>,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Lowest zoom the tile source actually serves
    pub min_native_zoom: Option<f64>,
    /// Highest zoom the tile source actually serves
    pub max_native_zoom: Option<f64>,
    pub no_wrap: bool,
    /// Ring of tiles around the view that keep their `current` flag
    pub keep_buffer: i32,
    pub fade_animation: bool,
    pub zoom_animation: bool,
}

impl Default for GridLayerOptions {
    fn default() -> Self {
        Self {
            tile_size: TILE_SIZE,
            opacity: 1.0,
            update_when_idle: false,
            update_when_zooming: true,
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            z_index: 1,
            bounds: None,
            min_zoom: 0.0,
            max_zoom: DEFAULT_MAX_ZOOM,
            min_native_zoom: None,
            max_native_zoom: None,
            no_wrap: false,
            keep_buffer: DEFAULT_KEEP_BUFFER,
            fade_animation: true,
            zoom_animation: true,
        }
    }
}

/// Options of a URL-template tile layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileLayerOptions {
    #[serde(flatten)]
    pub grid: GridLayerOptions,
    /// Values for the `{s}` token, chosen by `abs(x + y) % len`
    pub subdomains: Vec<String>,
    /// Image shown in place of tiles that fail to load
    pub error_tile_url: Option<String>,
    /// Inverts the Y axis (`{y}` counts from the bottom)
    pub tms: bool,
    /// Counts zoom down from `max_zoom` in URLs
    pub zoom_reverse: bool,
    pub zoom_offset: i32,
    /// Request higher zoom tiles at half size on dense displays
    pub detect_retina: bool,
    pub device_pixel_ratio: f64,
    pub worker_pool_max: usize,
    pub pool: PoolBinding,
    /// Extra template tokens
    pub params: BTreeMap<String, String>,
    /// Hosts whose tiles are kept as plain images, skipping the render step
    pub plain_image_hosts: Vec<String>,
}

impl Default for TileLayerOptions {
    fn default() -> Self {
        Self {
            grid: GridLayerOptions::default(),
            subdomains: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            error_tile_url: None,
            tms: false,
            zoom_reverse: false,
            zoom_offset: 0,
            detect_retina: false,
            device_pixel_ratio: 1.0,
            worker_pool_max: DEFAULT_WORKER_POOL_MAX,
            pool: PoolBinding::default(),
            params: BTreeMap::new(),
            plain_image_hosts: Vec::new(),
        }
    }
}

impl TileLayerOptions {
    /// Loads options from JSON; absent fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn retina(&self) -> bool {
        self.device_pixel_ratio > 1.0
    }

    /// Applies retina detection: half-size tiles fetched one zoom deeper
    pub fn apply_retina(&mut self) {
        if !(self.detect_retina && self.retina() && self.grid.max_zoom > 0.0) {
            return;
        }
        let grid = &mut self.grid;
        grid.tile_size /= 2;
        if !self.zoom_reverse {
            self.zoom_offset += 1;
            grid.max_zoom = grid.min_zoom.max(grid.max_zoom - 1.0);
        } else {
            self.zoom_offset -= 1;
            grid.min_zoom = grid.max_zoom.min(grid.min_zoom + 1.0);
        }
        grid.min_zoom = grid.min_zoom.max(0.0);
    }
}

/// What a tile element currently shows
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TileContent {
    /// Nothing drawn yet, or a failed tile without an error image
    #[default]
    Empty,
    /// Decoded square bitmap
    Bitmap(Bitmap),
    /// Encoded image bytes the display side still has to decode
    Encoded(Arc<Vec<u8>>),
    /// A plain image loaded straight from its URL
    Image { url: String, bytes: Arc<Vec<u8>> },
}

impl TileContent {
    pub fn is_empty(&self) -> bool {
        matches!(self, TileContent::Empty)
    }
}

/// The renderable handle of a tile, positioned inside its zoom level
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TileElement {
    /// Top-left corner relative to the level origin
    pub position: Point,
    /// Fade-in opacity, independent of the layer opacity
    pub opacity: f32,
    pub content: TileContent,
    /// Set once the tile loaded without error
    pub loaded: bool,
}

impl TileElement {
    pub fn new(content: TileContent) -> Self {
        Self {
            position: Point::default(),
            opacity: 1.0,
            content,
            loaded: false,
        }
    }
}

/// Registry entry for one requested tile
#[derive(Debug, Clone)]
pub struct TileRecord {
    /// Unique per registry insertion; never reused
    pub id: u64,
    /// Unwrapped coordinate the tile was requested for
    pub coords: TileCoord,
    pub el: TileElement,
    /// Needed by the latest view
    pub current: bool,
    /// Fully faded in
    pub active: bool,
    /// Scratch flag of a prune pass
    pub retain: bool,
    /// When the tile finished, successfully or not
    pub loaded: Option<Instant>,
}

impl TileRecord {
    pub fn new(coords: TileCoord, el: TileElement) -> Self {
        Self {
            id: 0,
            coords,
            el,
            current: true,
            active: false,
            retain: false,
            loaded: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }
}

/// Translate/scale applied to a whole zoom level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelTransform {
    pub translate: Point,
    pub scale: f64,
}

impl Default for LevelTransform {
    fn default() -> Self {
        Self {
            translate: Point::default(),
            scale: 1.0,
        }
    }
}

/// Container for the tiles of one zoom level
#[derive(Debug, Clone, PartialEq)]
pub struct TileLevel {
    pub zoom: i32,
    /// World pixel the level's local frame is anchored to
    pub origin: Point,
    pub z_index: i32,
    pub transform: LevelTransform,
}

impl TileLevel {
    pub fn new(zoom: i32, origin: Point, z_index: i32) -> Self {
        Self {
            zoom,
            origin,
            z_index,
            transform: LevelTransform::default(),
        }
    }
}
