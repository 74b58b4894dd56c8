use crate::core::{
    geo::{LatLng, TileCoord},
    grid::TileKey,
};
use serde::{Deserialize, Serialize};

/// View changes the map framework reports to its layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MapEvent {
    /// Fired just before a view reset; every level is invalidated
    ViewPreReset,
    /// The view jumped somewhere new
    ViewReset { pinch: bool, fly_to: bool },
    /// The zoom changed
    Zoom { pinch: bool, fly_to: bool },
    /// An animated zoom towards `center`/`zoom` started
    ZoomAnim {
        center: LatLng,
        zoom: f64,
        no_update: bool,
    },
    /// The view is still panning
    Move,
    /// Panning or zooming settled
    MoveEnd,
}

impl MapEvent {
    pub fn kind(&self) -> MapEventKind {
        match self {
            MapEvent::ViewPreReset => MapEventKind::ViewPreReset,
            MapEvent::ViewReset { .. } => MapEventKind::ViewReset,
            MapEvent::Zoom { .. } => MapEventKind::Zoom,
            MapEvent::ZoomAnim { .. } => MapEventKind::ZoomAnim,
            MapEvent::Move => MapEventKind::Move,
            MapEvent::MoveEnd => MapEventKind::MoveEnd,
        }
    }
}

/// Discriminant of [`MapEvent`], used to describe subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapEventKind {
    ViewPreReset,
    ViewReset,
    Zoom,
    ZoomAnim,
    Move,
    MoveEnd,
}

/// Lifecycle notifications emitted by a grid layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TileEvent {
    /// A tile was requested and its element created
    TileLoadStart { key: TileKey, coords: TileCoord },
    /// A tile finished loading
    TileLoad { key: TileKey, coords: TileCoord },
    /// A tile failed; its slot still counts as loaded
    TileError {
        key: TileKey,
        coords: TileCoord,
        error: String,
    },
    /// A tile was evicted and its element detached
    TileUnload { key: TileKey, coords: TileCoord },
    /// A batch of tiles started loading
    Loading,
    /// Every requested tile has resolved
    Load,
}

impl TileEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TileEvent::TileLoadStart { .. } => "tileloadstart",
            TileEvent::TileLoad { .. } => "tileload",
            TileEvent::TileError { .. } => "tileerror",
            TileEvent::TileUnload { .. } => "tileunload",
            TileEvent::Loading => "loading",
            TileEvent::Load => "load",
        }
    }

    /// Tile the notification is about, if it concerns a single tile
    pub fn coords(&self) -> Option<TileCoord> {
        match self {
            TileEvent::TileLoadStart { coords, .. }
            | TileEvent::TileLoad { coords, .. }
            | TileEvent::TileError { coords, .. }
            | TileEvent::TileUnload { coords, .. } => Some(*coords),
            TileEvent::Loading | TileEvent::Load => None,
        }
    }
}

/// Callback invoked for every [`TileEvent`]
pub type TileEventListener = Box<dyn FnMut(&TileEvent) + Send>;
