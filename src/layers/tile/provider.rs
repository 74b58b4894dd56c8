//! The tile-creation hook.
//!
//! A [`TileProvider`] hands back initial content for a tile immediately and
//! reports readiness later through the [`TileDone`] it was given. Completions
//! travel over a channel and are applied by the layer on its own sequence, so
//! providers are free to finish from any thread.

use super::types::TileContent;
use crate::{
    core::{
        geo::{Point, TileCoord},
        grid::{TileKey, TileRange},
    },
    MapError,
};
use crossbeam_channel::Sender;

/// A finished tile request, delivered back to the owning layer
#[derive(Debug)]
pub struct TileCompletion {
    pub key: TileKey,
    pub record_id: u64,
    pub content: TileContent,
    pub error: Option<MapError>,
}

/// One-shot readiness callback for a single tile.
///
/// Consuming methods guarantee it fires at most once. Dropping it without
/// firing reports the tile as failed so that the layer never waits forever.
#[derive(Debug)]
pub struct TileDone {
    key: TileKey,
    record_id: u64,
    sender: Option<Sender<TileCompletion>>,
}

impl TileDone {
    pub(crate) fn new(key: TileKey, record_id: u64, sender: Sender<TileCompletion>) -> Self {
        Self {
            key,
            record_id,
            sender: Some(sender),
        }
    }

    /// A callback nobody listens to, for providers that do not signal readiness
    pub(crate) fn detached(key: TileKey) -> Self {
        Self {
            key,
            record_id: 0,
            sender: None,
        }
    }

    pub fn key(&self) -> &TileKey {
        &self.key
    }

    pub fn succeed(self, content: TileContent) {
        self.complete(content, None);
    }

    /// Reports a failure; `content` is whatever the tile should show instead
    pub fn fail(self, error: MapError, content: TileContent) {
        self.complete(content, Some(error));
    }

    pub fn complete(mut self, content: TileContent, error: Option<MapError>) {
        self.send(content, error);
    }

    fn send(&mut self, content: TileContent, error: Option<MapError>) {
        if let Some(sender) = self.sender.take() {
            let completion = TileCompletion {
                key: self.key.clone(),
                record_id: self.record_id,
                content,
                error,
            };
            // The layer may be gone already; nothing is waiting then.
            let _ = sender.send(completion);
        }
    }
}

impl Drop for TileDone {
    fn drop(&mut self) {
        if self.sender.is_some() {
            log::warn!("tile {} completion dropped without firing", self.key);
            self.send(
                TileContent::Empty,
                Some(MapError::Layer("tile completion dropped".to_string())),
            );
        }
    }
}

/// Layer state a provider may need while creating a tile
#[derive(Debug, Clone, PartialEq)]
pub struct TileContext {
    pub key: TileKey,
    /// Coordinate before wrapping; the key is derived from this one
    pub unwrapped: TileCoord,
    pub tile_size: Point,
    /// Tile range of the whole world at this zoom, absent when infinite
    pub global_tile_range: Option<TileRange>,
    pub infinite: bool,
}

/// Produces the content of tiles for a grid layer
pub trait TileProvider: Send {
    /// Creates a tile for the (wrapped) `coords`. The returned content is
    /// shown right away; `done` must be fired once the tile is ready.
    fn create_tile(&mut self, coords: TileCoord, ctx: &TileContext, done: TileDone) -> TileContent;

    /// Providers that return `false` never fire `done`; the layer treats
    /// their tiles as ready on the next frame.
    fn signals_readiness(&self) -> bool {
        true
    }
}

impl<F> TileProvider for F
where
    F: FnMut(TileCoord, &TileContext) -> TileContent + Send,
{
    fn create_tile(&mut self, coords: TileCoord, ctx: &TileContext, _done: TileDone) -> TileContent {
        self(coords, ctx)
    }

    fn signals_readiness(&self) -> bool {
        false
    }
}
