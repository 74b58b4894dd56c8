//! Prelude module for common tilegrid types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use tilegrid::prelude::*;`

pub use crate::core::{
    bounds::Bounds,
    crs::{Crs, Epsg3857, Simple},
    geo::{LatLng, LatLngBounds, Point, TileCoord},
    grid::{TileKey, TileRange},
    viewport::Viewport,
};

pub use crate::layers::{
    events::{MapEvent, MapEventKind, TileEvent},
    tile::{
        GridLayer, GridLayerOptions, TileContent, TileContext, TileDone, TileElement,
        TileFetcher, TileLayer, TileLayerOptions, TileProvider, UrlTileProvider,
    },
};

pub use crate::background::pool::{PoolBinding, WorkerPool};

pub use crate::runtime::{runtime, spawn, AsyncHandle, AsyncSpawner};

pub use crate::traits::{Clock, ManualClock, SystemClock};

pub use crate::{MapError, Result};

pub use std::sync::{Arc, Mutex};

pub use instant::{Duration, Instant};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};

pub use futures::Future;
pub use std::pin::Pin;
