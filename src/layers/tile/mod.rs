//! Grid and tile layers
//!
//! This module provides the tile grid engine:
//! - Grid diffing against the current view with nearest-first requests
//! - Per-zoom level containers with zoom transforms
//! - Fade-in and retention-aware pruning
//! - URL-template tile loading through the background worker pool

mod fade;
pub mod layer;
mod leaflet;
pub mod loader;
pub mod provider;
pub mod registry;
pub mod source;
pub mod types;

pub use layer::GridLayer;
pub use loader::{TileLayer, UrlTileProvider};
pub use provider::{TileCompletion, TileContext, TileDone, TileProvider};
pub use registry::{TileRegistry, Visit};
pub use source::{HttpFetcher, TileFetcher};
pub use types::{
    GridLayerOptions, LevelTransform, TileContent, TileElement, TileLayerOptions, TileLevel,
    TileRecord,
};
