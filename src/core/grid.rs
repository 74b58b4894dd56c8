//! Tile grid algebra.
//!
//! Pure functions that map pixel-space viewport bounds to integer tile
//! ranges and back, wrap tile indices for repeating worlds, and encode tile
//! coordinates into registry keys. Nothing in here touches layer state.

use crate::core::{
    bounds::Bounds,
    constants::TILE_KEY_DELIMITER,
    geo::{Point, TileCoord},
};
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};

/// Inclusive rectangle of tile indices at one zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRange {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl TileRange {
    pub fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Fractional center of the range, used for nearest-first ordering
    pub fn center(&self) -> Point {
        Point::new(
            (self.min_x as f64 + self.max_x as f64) / 2.0,
            (self.min_y as f64 + self.max_y as f64) / 2.0,
        )
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    /// Number of tiles inside the range
    pub fn len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        let width = (self.max_x as i64 - self.min_x as i64 + 1) as usize;
        let height = (self.max_y as i64 - self.min_y as i64 + 1) as usize;
        width * height
    }

    /// Grows the range by `margin` tiles on every side (the keep-buffer ring)
    pub fn expand(&self, margin: i32) -> TileRange {
        TileRange::new(
            self.min_x.saturating_sub(margin),
            self.min_y.saturating_sub(margin),
            self.max_x.saturating_add(margin),
            self.max_y.saturating_add(margin),
        )
    }

    /// Enumerates the range row by row: y outer, x inner
    pub fn coords(&self, z: i32) -> impl Iterator<Item = TileCoord> + '_ {
        (self.min_y..=self.max_y)
            .flat_map(move |y| (self.min_x..=self.max_x).map(move |x| TileCoord::new(x, y, z)))
    }
}

/// Converts pixel bounds into the inclusive range of tiles covering them.
///
/// `min` is floored and `max` is ceiled minus one, so a bound lying exactly on
/// a tile edge does not pull in the next tile. Non-finite bounds (or bounds
/// so large the indices overflow) fail with [`MapError::UnboundedTileRange`].
pub fn compute_tile_range(pixel_bounds: &Bounds, tile_size: &Point) -> Result<TileRange> {
    let min = pixel_bounds.min.unscale_by(tile_size).floor();
    let max = pixel_bounds
        .max
        .unscale_by(tile_size)
        .ceil()
        .subtract(&Point::new(1.0, 1.0));

    let fits = |v: f64| v.is_finite() && v >= i32::MIN as f64 && v <= i32::MAX as f64;
    if !(fits(min.x) && fits(min.y) && fits(max.x) && fits(max.y)) {
        return Err(MapError::UnboundedTileRange { min, max });
    }

    Ok(TileRange::new(
        min.x as i32,
        min.y as i32,
        max.x as i32,
        max.y as i32,
    ))
}

/// Wraps `n` into `[lo, hi)` with a floored modulo so that overshoot on
/// either side lands back inside the range. An empty range leaves `n` alone.
pub fn wrap_num(n: f64, range: (f64, f64)) -> f64 {
    let (lo, hi) = range;
    let span = hi - lo;
    if !(span > 0.0) {
        return n;
    }
    ((n - lo) % span + span) % span + lo
}

/// Integer flavour of [`wrap_num`] for tile indices
pub fn wrap_index(n: i32, range: (i32, i32)) -> i32 {
    let (lo, hi) = range;
    let span = hi as i64 - lo as i64;
    if span <= 0 {
        return n;
    }
    ((n as i64 - lo as i64).rem_euclid(span) + lo as i64) as i32
}

/// Wraps a tile coordinate along whichever axes repeat
pub fn wrap_coords(
    coords: TileCoord,
    wrap_x: Option<(i32, i32)>,
    wrap_y: Option<(i32, i32)>,
) -> TileCoord {
    TileCoord::new(
        wrap_x.map_or(coords.x, |range| wrap_index(coords.x, range)),
        wrap_y.map_or(coords.y, |range| wrap_index(coords.y, range)),
        coords.z,
    )
}

/// Position of a tile's top-left corner inside its zoom level's local frame
pub fn tile_coords_to_pixel_origin(
    coords: TileCoord,
    tile_size: &Point,
    level_origin: &Point,
) -> Point {
    coords.to_point().scale_by(tile_size).subtract(level_origin)
}

/// Orders tiles nearest-first around `center`; equal distances keep their
/// enumeration order.
pub fn sort_by_distance(queue: &mut [TileCoord], center: &Point) {
    queue.sort_by(|a, b| {
        let da = a.to_point().distance_to(center);
        let db = b.to_point().distance_to(center);
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Bing-style quadkey for a tile, one base-4 digit per zoom level
pub fn quadkey(coords: TileCoord) -> String {
    let mut key = String::with_capacity(coords.z.max(0) as usize);
    for i in (1..=coords.z).rev() {
        let mask = 1i64 << (i - 1);
        let mut digit = 0u8;
        if (coords.x as i64) & mask != 0 {
            digit += 1;
        }
        if (coords.y as i64) & mask != 0 {
            digit += 2;
        }
        key.push((b'0' + digit) as char);
    }
    key
}

/// Registry identity of a tile: `"x:y:z"`.
///
/// The delimiter never appears in integer text, so decoding is exact for
/// every coordinate including negative ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey(String);

impl TileKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses an encoded key, validating every component
    pub fn parse(key: &str) -> Result<TileKey> {
        let coords = decode_key(key)?;
        Ok(TileKey::from(coords))
    }

    /// Decodes the key back into the coordinate it was built from
    pub fn to_coords(&self) -> Result<TileCoord> {
        decode_key(&self.0)
    }
}

fn decode_key(key: &str) -> Result<TileCoord> {
    let mut parts = key.split(TILE_KEY_DELIMITER);
    let mut next = || -> Result<i32> {
        parts
            .next()
            .and_then(|part| part.parse::<i32>().ok())
            .ok_or_else(|| MapError::InvalidTileKey(key.to_string()))
    };
    let (x, y, z) = (next()?, next()?, next()?);
    if parts.next().is_some() {
        return Err(MapError::InvalidTileKey(key.to_string()));
    }
    Ok(TileCoord::new(x, y, z))
}

impl From<TileCoord> for TileKey {
    fn from(coords: TileCoord) -> Self {
        TileKey(format!(
            "{}{d}{}{d}{}",
            coords.x,
            coords.y,
            coords.z,
            d = TILE_KEY_DELIMITER
        ))
    }
}

impl From<&TileCoord> for TileKey {
    fn from(coords: &TileCoord) -> Self {
        TileKey::from(*coords)
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
