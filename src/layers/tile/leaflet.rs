//! Leaflet-style grid update cycle
//!
//! View resets, level bookkeeping, the per-update diff between the tiles the
//! view needs and the tiles the registry holds, and tile dispatch.

use super::{
    layer::{FrameTask, GridLayer},
    provider::{TileContext, TileDone, TileProvider},
    types::{LevelTransform, TileContent, TileElement, TileLevel, TileRecord},
};
use crate::{
    core::{
        bounds::Bounds,
        constants::PRUNE_DELAY_MS,
        geo::{LatLng, LatLngBounds, Point, TileCoord},
        grid::{
            compute_tile_range, sort_by_distance, tile_coords_to_pixel_origin, wrap_coords,
            TileKey,
        },
        viewport::Viewport,
    },
    layers::events::TileEvent,
    prelude::{Duration, HashSet},
    MapError, Result,
};

impl<P: TileProvider> GridLayer<P> {
    /// Moves the grid to `center`/`zoom`.
    ///
    /// The tile zoom is the rounded view zoom, clamped to the native range,
    /// or none at all when the view is outside `[min_zoom, max_zoom]`.
    /// `no_update` skips the grid refresh unless the tile zoom changed;
    /// `no_prune` keeps stale tiles until the next prune.
    pub fn set_view(
        &mut self,
        viewport: &Viewport,
        center: LatLng,
        zoom: f64,
        no_prune: bool,
        no_update: bool,
    ) -> Result<()> {
        let rounded = zoom.round();
        let tile_zoom = if rounded > self.options.max_zoom || rounded < self.options.min_zoom {
            None
        } else {
            Some(self.clamp_zoom(rounded).round() as i32)
        };

        let tile_zoom_changed = self.options.update_when_zooming && tile_zoom != self.tile_zoom;

        if !no_update || tile_zoom_changed {
            self.tile_zoom = tile_zoom;
            self.update_levels(viewport);
            self.reset_grid(viewport);

            if tile_zoom.is_some() {
                self.update(viewport, Some(center))?;
            }

            if !no_prune {
                self.prune_tiles(viewport);
            }

            self.no_prune = no_prune;
        }

        self.set_zoom_transforms(viewport, center, zoom);
        Ok(())
    }

    /// Clamps a zoom into the range the tile source actually serves
    pub(crate) fn clamp_zoom(&self, zoom: f64) -> f64 {
        match (self.options.min_native_zoom, self.options.max_native_zoom) {
            (Some(min), _) if zoom < min => min,
            (_, Some(max)) if zoom > max => max,
            _ => zoom,
        }
    }

    /// Reconciles the zoom level containers with the active tile zoom
    pub(crate) fn update_levels(&mut self, viewport: &Viewport) {
        let Some(zoom) = self.tile_zoom else {
            return;
        };
        let max_zoom = self.options.max_zoom;

        let populated: HashSet<i32> = self.tiles.iter().map(|(_, tile)| tile.coords.z).collect();
        let mut emptied = Vec::new();
        for (&z, level) in self.levels.iter_mut() {
            if populated.contains(&z) || z == zoom {
                level.z_index = (max_zoom - (zoom - z).abs() as f64).round() as i32;
            } else {
                emptied.push(z);
            }
        }
        for z in emptied {
            log::debug!("removing empty level z{}", z);
            self.levels.remove(&z);
            self.remove_tiles_at_zoom(z);
        }

        if !self.levels.contains_key(&zoom) {
            let anchor = viewport.unproject(&viewport.pixel_origin(), viewport.zoom);
            let origin = viewport.project(&anchor, zoom as f64).round();
            let mut level = TileLevel::new(zoom, origin, max_zoom.round() as i32);
            level.transform = level_transform(viewport, &level, &viewport.center, viewport.zoom);
            log::debug!("created level z{} with origin {:?}", zoom, origin);
            self.levels.insert(zoom, level);
        }
        self.level = Some(zoom);
    }

    /// Recomputes the global tile range and the wrap ranges for the tile zoom
    pub(crate) fn reset_grid(&mut self, viewport: &Viewport) {
        let tile_size = self.options.tile_size as f64;
        self.tile_size = Point::new(tile_size, tile_size);

        let Some(tile_zoom) = self.tile_zoom else {
            self.global_tile_range = None;
            self.wrap_x = None;
            self.wrap_y = None;
            return;
        };
        let z = tile_zoom as f64;
        let crs = viewport.crs().clone();

        self.global_tile_range = viewport
            .pixel_world_bounds(z)
            .and_then(|bounds| compute_tile_range(&bounds, &self.tile_size).ok());

        let wrap_range = |a: f64, b: f64| {
            let lo = (a / tile_size).floor() as i32;
            let hi = (b / tile_size).ceil() as i32;
            (lo.min(hi), lo.max(hi))
        };
        let no_wrap = self.options.no_wrap;
        self.wrap_x = crs.wrap_lng().filter(|_| !no_wrap).map(|(lo, hi)| {
            wrap_range(
                crs.project(&LatLng::new(0.0, lo), z).x,
                crs.project(&LatLng::new(0.0, hi), z).x,
            )
        });
        self.wrap_y = crs.wrap_lat().filter(|_| !no_wrap).map(|(lo, hi)| {
            wrap_range(
                crs.project(&LatLng::new(lo, 0.0), z).y,
                crs.project(&LatLng::new(hi, 0.0), z).y,
            )
        });
    }

    /// Pixel bounds at the tile zoom covered by the view around `center`.
    /// During an animated zoom the larger of the two zooms wins so that the
    /// grid never falls short of the target view.
    pub(crate) fn tiled_pixel_bounds(
        &self,
        viewport: &Viewport,
        center: &LatLng,
        tile_zoom: i32,
    ) -> Bounds {
        let map_zoom = match viewport.zoom_animation() {
            Some(anim) => anim.zoom.max(viewport.zoom),
            None => viewport.zoom,
        };
        let scale = viewport.zoom_scale(map_zoom, tile_zoom as f64);
        let pixel_center = viewport.project(center, tile_zoom as f64).floor();
        let half_size = viewport.size.divide_by(scale * 2.0);
        Bounds::new(
            pixel_center.subtract(&half_size),
            pixel_center.add(&half_size),
        )
    }

    /// Diffs the tiles the view needs against the registry, requests the
    /// missing ones nearest-first and prunes what is no longer needed.
    ///
    /// Fails with [`MapError::UnboundedTileRange`] before touching any tile
    /// when the view maps to a non-finite range.
    pub fn update(&mut self, viewport: &Viewport, center: Option<LatLng>) -> Result<()> {
        if !self.added {
            return Ok(());
        }
        let zoom = self.clamp_zoom(viewport.zoom);
        let center = center.unwrap_or(viewport.center);
        let Some(tile_zoom) = self.tile_zoom else {
            return Ok(());
        };

        let pixel_bounds = self.tiled_pixel_bounds(viewport, &center, tile_zoom);
        let tile_range = compute_tile_range(&pixel_bounds, &self.tile_size).map_err(|e| {
            log::warn!("aborting tile update at z{}: {}", tile_zoom, e);
            e
        })?;
        let tile_center = tile_range.center();
        let no_prune_range = tile_range.expand(self.options.keep_buffer);

        for (_, tile) in self.tiles.iter_mut() {
            let c = tile.coords;
            if c.z != tile_zoom || !no_prune_range.contains(c.x, c.y) {
                tile.current = false;
            }
        }

        // the view is more than one level away from the grid: start over
        if (zoom - tile_zoom as f64).abs() > 1.0 {
            return self.set_view(viewport, center, zoom, false, false);
        }

        let mut queue = Vec::new();
        for coords in tile_range.coords(tile_zoom) {
            if !self.is_valid_tile(viewport, &coords) {
                continue;
            }
            match self.tiles.get_mut(&TileKey::from(coords)) {
                Some(tile) => tile.current = true,
                None => queue.push(coords),
            }
        }

        sort_by_distance(&mut queue, &tile_center);

        if !queue.is_empty() {
            if !self.loading {
                self.loading = true;
                self.fire(TileEvent::Loading);
            }
            log::debug!(
                "requesting {} tiles at z{} ({} in registry)",
                queue.len(),
                tile_zoom,
                self.tiles.len()
            );
            for coords in queue {
                self.add_tile(viewport, coords);
            }
        }

        self.prune_tiles(viewport);
        // the prune evicted whatever was still in flight
        if self.loading && self.no_tiles_to_load() {
            self.loading = false;
            self.fire(TileEvent::Load);
        }
        Ok(())
    }

    /// A tile is valid when it lies inside the world (on axes that do not
    /// wrap) and overlaps the configured bounds
    pub(crate) fn is_valid_tile(&self, viewport: &Viewport, coords: &TileCoord) -> bool {
        let crs = viewport.crs();
        if !crs.infinite() {
            if let Some(range) = self.global_tile_range {
                let outside_x = crs.wrap_lng().is_none()
                    && (coords.x < range.min_x || coords.x > range.max_x);
                let outside_y = crs.wrap_lat().is_none()
                    && (coords.y < range.min_y || coords.y > range.max_y);
                if outside_x || outside_y {
                    return false;
                }
            }
        }

        match &self.options.bounds {
            None => true,
            Some(bounds) => bounds.overlaps(&self.tile_coords_to_bounds(viewport, coords)),
        }
    }

    /// Geographic extent of a tile, wrapped into the world unless `no_wrap`
    pub fn tile_coords_to_bounds(&self, viewport: &Viewport, coords: &TileCoord) -> LatLngBounds {
        let nw_point = coords.to_point().scale_by(&self.tile_size);
        let se_point = nw_point.add(&self.tile_size);
        let z = coords.z as f64;
        let bounds = LatLngBounds::from_corners(
            viewport.unproject(&nw_point, z),
            viewport.unproject(&se_point, z),
        );
        if self.options.no_wrap {
            bounds
        } else {
            viewport.crs().wrap_lat_lng_bounds(&bounds)
        }
    }

    /// Creates the record for `coords` and asks the provider for its tile
    pub(crate) fn add_tile(&mut self, viewport: &Viewport, coords: TileCoord) {
        let key = TileKey::from(coords);
        let level_origin = self
            .level
            .and_then(|z| self.levels.get(&z))
            .map(|level| level.origin)
            .unwrap_or_default();

        let mut el = TileElement::new(TileContent::Empty);
        el.position = tile_coords_to_pixel_origin(coords, &self.tile_size, &level_origin);
        if self.options.opacity < 1.0 {
            el.opacity = self.options.opacity;
        }

        let (record_id, _) = self.tiles.put(key.clone(), TileRecord::new(coords, el));

        let ctx = TileContext {
            key: key.clone(),
            unwrapped: coords,
            tile_size: self.tile_size,
            global_tile_range: self.global_tile_range,
            infinite: viewport.crs().infinite(),
        };
        let signals = self.provider.signals_readiness();
        let done = if signals {
            TileDone::new(key.clone(), record_id, self.completions_tx.clone())
        } else {
            TileDone::detached(key.clone())
        };

        let wrapped = wrap_coords(coords, self.wrap_x, self.wrap_y);
        let content = self.provider.create_tile(wrapped, &ctx, done);
        if let Some(tile) = self.tiles.get_mut(&key) {
            tile.el.content = content;
        }

        if !signals {
            self.request_frame(FrameTask::TileReady {
                key: key.clone(),
                record_id,
            });
        }

        self.fire(TileEvent::TileLoadStart { key, coords });
    }

    /// Marks a tile loaded (successfully or not) and starts its fade.
    ///
    /// Unknown keys are ignored. Once nothing is left loading, `Load` fires
    /// and a prune is scheduled.
    pub(crate) fn tile_ready(&mut self, viewport: &Viewport, key: &TileKey, error: Option<MapError>) {
        let now = self.clock.now();
        let fade = self.options.fade_animation;
        let succeeded = error.is_none();

        let coords = match self.tiles.get_mut(key) {
            Some(tile) => {
                tile.loaded = Some(now);
                if fade {
                    tile.el.opacity = 0.0;
                } else {
                    tile.active = true;
                }
                tile.el.loaded = succeeded;
                tile.coords
            }
            None => return,
        };

        if let Some(err) = error {
            log::warn!("tile {} failed: {}", key, err);
            self.fire(TileEvent::TileError {
                key: key.clone(),
                coords,
                error: err.to_string(),
            });
        }

        if fade {
            self.request_frame(FrameTask::UpdateOpacity);
        } else {
            self.prune_tiles(viewport);
        }

        if succeeded {
            self.fire(TileEvent::TileLoad {
                key: key.clone(),
                coords,
            });
        }

        if self.no_tiles_to_load() {
            self.loading = false;
            self.fire(TileEvent::Load);
            if fade {
                self.prune_at = Some(now + Duration::from_millis(PRUNE_DELAY_MS));
            } else {
                self.request_frame(FrameTask::Prune);
            }
        }
    }

    /// Drops every level and tile; the next reset rebuilds them
    pub(crate) fn invalidate_all(&mut self) {
        self.levels.clear();
        self.level = None;
        self.remove_all_tiles();
        self.tile_zoom = None;
    }

    pub(crate) fn set_zoom_transforms(&mut self, viewport: &Viewport, center: LatLng, zoom: f64) {
        for level in self.levels.values_mut() {
            level.transform = level_transform(viewport, level, &center, zoom);
        }
    }
}

/// Scale and offset that draw `level` as seen from `center`/`zoom`
fn level_transform(
    viewport: &Viewport,
    level: &TileLevel,
    center: &LatLng,
    zoom: f64,
) -> LevelTransform {
    let scale = viewport.zoom_scale(zoom, level.zoom as f64);
    let translate = level
        .origin
        .multiply(scale)
        .subtract(&viewport.new_pixel_origin(center, zoom))
        .round();
    LevelTransform { translate, scale }
}
