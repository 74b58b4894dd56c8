//! Fade-in and retention-aware pruning

use super::{
    layer::{FrameTask, GridLayer},
    provider::TileProvider,
    registry::Visit,
};
use crate::{
    core::{
        constants::{ANCESTOR_SEARCH_DEPTH, DESCENDANT_SEARCH_DEPTH, FADE_DURATION_MS},
        geo::TileCoord,
        grid::TileKey,
        viewport::Viewport,
    },
    layers::events::TileEvent,
};

impl<P: TileProvider> GridLayer<P> {
    /// One fade step: opacity = min(1, elapsed / 200 ms) for every current,
    /// loaded tile. Opaque tiles become active and trigger a prune; the loop
    /// keeps itself alive while anything is still fading.
    pub(crate) fn update_opacity(&mut self, viewport: &Viewport) {
        if !self.added {
            return;
        }
        let now = self.clock.now();
        let mut next_frame = false;
        let mut will_prune = false;

        for (_, tile) in self.tiles.iter_mut() {
            let Some(loaded) = tile.loaded.filter(|_| tile.current) else {
                continue;
            };
            let elapsed = now.saturating_duration_since(loaded).as_secs_f64() * 1000.0;
            let fade = (elapsed / FADE_DURATION_MS as f64).min(1.0);
            tile.el.opacity = fade as f32;
            if fade < 1.0 {
                next_frame = true;
            } else {
                tile.active = true;
                will_prune = true;
            }
        }

        if will_prune && !self.no_prune {
            self.prune_tiles(viewport);
        }
        if next_frame {
            self.request_frame(FrameTask::UpdateOpacity);
        }
    }

    /// Evicts tiles that are neither needed nor covering for a tile that is
    /// still loading.
    ///
    /// A current tile that is not active yet keeps its nearest loaded
    /// ancestors (up to five levels up, stopping at the first active one);
    /// without an active ancestor it keeps loaded descendants up to two
    /// levels down instead.
    pub fn prune_tiles(&mut self, viewport: &Viewport) {
        if !self.added {
            return;
        }
        let zoom = viewport.zoom;
        if zoom > self.options.max_zoom || zoom < self.options.min_zoom {
            self.remove_all_tiles();
            return;
        }

        let mut pending = Vec::new();
        for (_, tile) in self.tiles.iter_mut() {
            tile.retain = tile.current;
            if tile.current && !tile.active {
                pending.push(tile.coords);
            }
        }

        for c in pending {
            if !self.retain_parent(c.x, c.y, c.z, c.z - ANCESTOR_SEARCH_DEPTH) {
                self.retain_children(c.x, c.y, c.z, c.z + DESCENDANT_SEARCH_DEPTH);
            }
        }

        let removed = self.tiles.for_each(|_, tile| {
            if tile.retain {
                Visit::Keep
            } else {
                Visit::Remove
            }
        });
        if !removed.is_empty() {
            log::debug!("pruned {} tiles, {} left", removed.len(), self.tiles.len());
        }
        for (key, tile) in removed {
            self.fire(TileEvent::TileUnload {
                key,
                coords: tile.coords,
            });
        }
    }

    fn retain_parent(&mut self, x: i32, y: i32, z: i32, min_zoom: i32) -> bool {
        let mut coords = TileCoord::new(x, y, z);
        loop {
            coords = coords.parent();
            if let Some(tile) = self.tiles.get_mut(&TileKey::from(coords)) {
                if tile.active {
                    tile.retain = true;
                    return true;
                }
                if tile.loaded.is_some() {
                    tile.retain = true;
                }
            }
            if coords.z <= min_zoom {
                return false;
            }
        }
    }

    fn retain_children(&mut self, x: i32, y: i32, z: i32, max_zoom: i32) {
        for child in TileCoord::new(x, y, z).children() {
            if let Some(tile) = self.tiles.get_mut(&TileKey::from(child)) {
                if tile.active {
                    tile.retain = true;
                    continue;
                }
                if tile.loaded.is_some() {
                    tile.retain = true;
                }
            }
            if child.z < max_zoom {
                self.retain_children(child.x, child.y, child.z, max_zoom);
            }
        }
    }

    pub(crate) fn remove_tile(&mut self, key: &TileKey) {
        if let Some(tile) = self.tiles.remove(key) {
            self.fire(TileEvent::TileUnload {
                key: key.clone(),
                coords: tile.coords,
            });
        }
    }

    pub(crate) fn remove_tiles_at_zoom(&mut self, zoom: i32) {
        let keys: Vec<TileKey> = self
            .tiles
            .iter()
            .filter(|(_, tile)| tile.coords.z == zoom)
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            self.remove_tile(&key);
        }
    }

    pub(crate) fn remove_all_tiles(&mut self) {
        for (key, tile) in self.tiles.drain() {
            self.fire(TileEvent::TileUnload {
                key,
                coords: tile.coords,
            });
        }
    }

    pub(crate) fn no_tiles_to_load(&self) -> bool {
        self.tiles.iter().all(|(_, tile)| tile.is_loaded())
    }
}
