//! Coordinate reference systems.
//!
//! The grid only needs a narrow slice of projection math: world to pixel and
//! back at a zoom level, the pixel extent of the world, and whether either
//! axis repeats. Two systems cover the common cases.

use crate::core::{
    bounds::Bounds,
    geo::{LatLng, LatLngBounds, Point},
    grid::wrap_num,
};
use std::f64::consts::PI;

const EARTH_RADIUS: f64 = 6378137.0;
const MAX_LATITUDE: f64 = 85.0511287798;

/// Projection and scaling used to place tiles in world-pixel space
pub trait Crs: std::fmt::Debug + Send + Sync {
    /// Projects a coordinate to world pixels at the given zoom
    fn project(&self, lat_lng: &LatLng, zoom: f64) -> Point;

    /// Inverse of [`Crs::project`]
    fn unproject(&self, point: &Point, zoom: f64) -> LatLng;

    /// Pixel size multiplier for a zoom level
    fn scale(&self, zoom: f64) -> f64 {
        256.0 * 2_f64.powf(zoom)
    }

    /// Longitude range that repeats horizontally, if any
    fn wrap_lng(&self) -> Option<(f64, f64)> {
        None
    }

    /// Latitude range that repeats vertically, if any
    fn wrap_lat(&self) -> Option<(f64, f64)> {
        None
    }

    /// An infinite system has no global tile range to clamp against
    fn infinite(&self) -> bool {
        false
    }

    /// Extent of the whole world in pixels at `zoom`, `None` when infinite
    fn pixel_world_bounds(&self, zoom: f64) -> Option<Bounds>;

    /// Scale factor between two zoom levels
    fn zoom_scale(&self, to_zoom: f64, from_zoom: f64) -> f64 {
        self.scale(to_zoom) / self.scale(from_zoom)
    }

    /// Wraps a coordinate into the repeating ranges. The upper edge is kept
    /// as-is so that 180° stays 180°.
    fn wrap_lat_lng(&self, lat_lng: &LatLng) -> LatLng {
        let wrap = |n: f64, range: Option<(f64, f64)>| match range {
            Some((lo, hi)) if n != hi => wrap_num(n, (lo, hi)),
            _ => n,
        };
        LatLng::new(
            wrap(lat_lng.lat, self.wrap_lat()),
            wrap(lat_lng.lng, self.wrap_lng()),
        )
    }

    /// Moves bounds so their center lies inside the wrapped world without
    /// changing their size
    fn wrap_lat_lng_bounds(&self, bounds: &LatLngBounds) -> LatLngBounds {
        let center = bounds.center();
        let wrapped = self.wrap_lat_lng(&center);
        let d_lat = center.lat - wrapped.lat;
        let d_lng = center.lng - wrapped.lng;
        if d_lat == 0.0 && d_lng == 0.0 {
            return bounds.clone();
        }
        bounds.translate(-d_lat, -d_lng)
    }
}

/// Spherical web mercator, the usual slippy-map projection
#[derive(Debug, Clone, Copy, Default)]
pub struct Epsg3857;

impl Crs for Epsg3857 {
    fn project(&self, lat_lng: &LatLng, zoom: f64) -> Point {
        let lat = lat_lng.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        let sin = lat.to_radians().sin();
        let x = EARTH_RADIUS * lat_lng.lng.to_radians();
        let y = EARTH_RADIUS * ((1.0 + sin) / (1.0 - sin)).ln() / 2.0;

        let unit = 0.5 / (PI * EARTH_RADIUS);
        let scale = self.scale(zoom);
        Point::new(scale * (unit * x + 0.5), scale * (-unit * y + 0.5))
    }

    fn unproject(&self, point: &Point, zoom: f64) -> LatLng {
        let unit = 0.5 / (PI * EARTH_RADIUS);
        let scale = self.scale(zoom);
        let x = (point.x / scale - 0.5) / unit;
        let y = (point.y / scale - 0.5) / -unit;

        let lng = (x / EARTH_RADIUS).to_degrees();
        let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
        LatLng::new(lat, lng)
    }

    fn wrap_lng(&self) -> Option<(f64, f64)> {
        Some((-180.0, 180.0))
    }

    fn pixel_world_bounds(&self, zoom: f64) -> Option<Bounds> {
        let size = self.scale(zoom);
        Some(Bounds::from_coords(0.0, 0.0, size, size))
    }
}

/// Flat cartesian system for non-geographic imagery: lng is x, lat is -y
#[derive(Debug, Clone, Copy, Default)]
pub struct Simple;

impl Crs for Simple {
    fn project(&self, lat_lng: &LatLng, zoom: f64) -> Point {
        let scale = self.scale(zoom);
        Point::new(lat_lng.lng * scale, -lat_lng.lat * scale)
    }

    fn unproject(&self, point: &Point, zoom: f64) -> LatLng {
        let scale = self.scale(zoom);
        LatLng::new(-point.y / scale, point.x / scale)
    }

    fn scale(&self, zoom: f64) -> f64 {
        2_f64.powf(zoom)
    }

    fn infinite(&self) -> bool {
        true
    }

    fn pixel_world_bounds(&self, _zoom: f64) -> Option<Bounds> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mercator_origin_is_world_center() {
        let crs = Epsg3857;
        let p = crs.project(&LatLng::new(0.0, 0.0), 0.0);
        assert!((p.x - 128.0).abs() < 1e-9);
        assert!((p.y - 128.0).abs() < 1e-9);
    }

    #[test]
    fn test_mercator_round_trip() {
        let crs = Epsg3857;
        let ll = LatLng::new(51.5, -0.12);
        let back = crs.unproject(&crs.project(&ll, 7.0), 7.0);
        assert!((back.lat - ll.lat).abs() < 1e-9);
        assert!((back.lng - ll.lng).abs() < 1e-9);
    }

    #[test]
    fn test_world_bounds_double_per_zoom() {
        let crs = Epsg3857;
        let b = crs.pixel_world_bounds(2.0).unwrap();
        assert_eq!(b.max, Point::new(1024.0, 1024.0));
        assert_eq!(crs.zoom_scale(3.0, 2.0), 2.0);
    }

    #[test]
    fn test_wrap_keeps_antimeridian() {
        let crs = Epsg3857;
        assert_eq!(crs.wrap_lat_lng(&LatLng::new(10.0, 180.0)).lng, 180.0);
        assert_eq!(crs.wrap_lat_lng(&LatLng::new(10.0, 190.0)).lng, -170.0);
        assert_eq!(crs.wrap_lat_lng(&LatLng::new(95.0, 0.0)).lat, 95.0);
    }

    #[test]
    fn test_wrap_bounds_shifts_whole_box() {
        let crs = Epsg3857;
        let bounds = LatLngBounds::from_coords(0.0, 370.0, 10.0, 380.0);
        let wrapped = crs.wrap_lat_lng_bounds(&bounds);
        assert_eq!(wrapped, LatLngBounds::from_coords(0.0, 10.0, 10.0, 20.0));
    }

    #[test]
    fn test_simple_is_infinite() {
        let crs = Simple;
        assert!(crs.infinite());
        assert!(crs.pixel_world_bounds(3.0).is_none());
        assert_eq!(crs.project(&LatLng::new(-2.0, 3.0), 1.0), Point::new(6.0, 4.0));
    }
}
