//! # tilegrid
//!
//! The tile-grid engine of an interactive slippy map, in the manner of
//! Leaflet's `GridLayer`/`TileLayer`.
//!
//! Given a [`Viewport`] the engine works out which tiles the view needs,
//! requests them nearest-first, loads them off the caller's sequence on a
//! background worker pool, fades them in and evicts the ones that are no
//! longer needed while keeping covering ancestors or descendants around
//! during zoom transitions.

pub mod background;
pub mod core;
pub mod layers;
pub mod prelude;
pub mod rendering;
pub mod runtime;
pub mod traits;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    bounds::Bounds,
    crs::{Crs, Epsg3857, Simple},
    geo::{LatLng, LatLngBounds, Point, TileCoord},
    grid::{TileKey, TileRange},
    viewport::Viewport,
};

pub use layers::{
    events::{MapEvent, MapEventKind, TileEvent},
    tile::{
        GridLayer, GridLayerOptions, TileContent, TileLayer, TileLayerOptions, TileProvider,
        UrlTileProvider,
    },
};

pub use background::{PoolBinding, WorkerPool};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Unbounded tile range: pixel bounds {min:?} .. {max:?} are not finite")]
    UnboundedTileRange { min: Point, max: Point },

    #[error("Tile fetch error: {0}")]
    TileFetch(String),

    #[error("Tile render error: {0}")]
    TileRender(String),

    #[error("Worker task error: {0}")]
    WorkerTask(String),

    #[error("Invalid tile key: {0}")]
    InvalidTileKey(String),

    #[error("Worker pool terminated")]
    PoolTerminated,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Layer error: {0}")]
    Layer(String),
}

/// Error type alias for convenience
pub type Error = MapError;

/// Initialises `env_logger` from `RUST_LOG`. Safe to call more than once.
#[cfg(feature = "debug")]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
