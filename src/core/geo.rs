use serde::{Deserialize, Serialize};

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Validates that the coordinates are within valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat >= -90.0 && self.lat <= 90.0 && self.lng >= -180.0 && self.lng <= 180.0
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a point in screen or projected coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn subtract(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn multiply(&self, scalar: f64) -> Point {
        Point::new(self.x * scalar, self.y * scalar)
    }

    pub fn divide_by(&self, scalar: f64) -> Point {
        Point::new(self.x / scalar, self.y / scalar)
    }

    /// Component-wise multiplication
    pub fn scale_by(&self, other: &Point) -> Point {
        Point::new(self.x * other.x, self.y * other.y)
    }

    /// Component-wise division
    pub fn unscale_by(&self, other: &Point) -> Point {
        Point::new(self.x / other.x, self.y / other.y)
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn floor(&self) -> Point {
        Point::new(self.x.floor(), self.y.floor())
    }

    pub fn ceil(&self) -> Point {
        Point::new(self.x.ceil(), self.y.ceil())
    }

    /// Rounds halves towards positive infinity, like browser pixel snapping.
    pub fn round(&self) -> Point {
        Point::new((self.x + 0.5).floor(), (self.y + 0.5).floor())
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a bounding box of geographical coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl LatLngBounds {
    pub fn new(south_west: LatLng, north_east: LatLng) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// Creates bounds from individual coordinates
    pub fn from_coords(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self::new(LatLng::new(south, west), LatLng::new(north, east))
    }

    /// Builds bounds from two arbitrary corners
    pub fn from_corners(a: LatLng, b: LatLng) -> Self {
        Self::from_coords(
            a.lat.min(b.lat),
            a.lng.min(b.lng),
            a.lat.max(b.lat),
            a.lng.max(b.lng),
        )
    }

    /// Checks if the bounds contain a point
    pub fn contains(&self, point: &LatLng) -> bool {
        point.lat >= self.south_west.lat
            && point.lat <= self.north_east.lat
            && point.lng >= self.south_west.lng
            && point.lng <= self.north_east.lng
    }

    /// Checks if the bounds intersect with another bounds (touching edges count)
    pub fn intersects(&self, other: &LatLngBounds) -> bool {
        !(other.north_east.lat < self.south_west.lat
            || other.south_west.lat > self.north_east.lat
            || other.north_east.lng < self.south_west.lng
            || other.south_west.lng > self.north_east.lng)
    }

    /// Checks if the bounds share an area with another bounds (touching edges do not count)
    pub fn overlaps(&self, other: &LatLngBounds) -> bool {
        let lat_overlaps = other.north_east.lat > self.south_west.lat
            && other.south_west.lat < self.north_east.lat;
        let lng_overlaps = other.north_east.lng > self.south_west.lng
            && other.south_west.lng < self.north_east.lng;
        lat_overlaps && lng_overlaps
    }

    /// Gets the center point of the bounds
    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0,
        )
    }

    /// Returns the bounds shifted by a lat/lng offset
    pub fn translate(&self, d_lat: f64, d_lng: f64) -> LatLngBounds {
        LatLngBounds::from_coords(
            self.south_west.lat + d_lat,
            self.south_west.lng + d_lng,
            self.north_east.lat + d_lat,
            self.north_east.lng + d_lng,
        )
    }
}

/// Represents a tile coordinate in the slippy map tile system.
///
/// Indices are signed: before wrapping, a grid that repeats horizontally
/// happily produces negative columns, and infinite projections have no
/// global range at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl TileCoord {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Gets the parent tile one zoom level up (floor division keeps negatives consistent)
    pub fn parent(&self) -> TileCoord {
        TileCoord::new(self.x.div_euclid(2), self.y.div_euclid(2), self.z - 1)
    }

    /// Gets the four child tiles one zoom level down, row by row
    pub fn children(&self) -> [TileCoord; 4] {
        let (x, y, z) = (self.x * 2, self.y * 2, self.z + 1);
        [
            TileCoord::new(x, y, z),
            TileCoord::new(x, y + 1, z),
            TileCoord::new(x + 1, y, z),
            TileCoord::new(x + 1, y + 1, z),
        ]
    }

    /// Grid position as a floating point
    pub fn to_point(&self) -> Point {
        Point::new(self.x as f64, self.y as f64)
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, z{})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lat_lng_creation() {
        let coord = LatLng::new(40.7128, -74.0060);
        assert_eq!(coord.lat, 40.7128);
        assert_eq!(coord.lng, -74.0060);
        assert!(coord.is_valid());
    }

    #[test]
    fn test_bounds_contains() {
        let bounds = LatLngBounds::from_coords(40.0, -75.0, 41.0, -73.0);
        let point_inside = LatLng::new(40.5, -74.0);
        let point_outside = LatLng::new(42.0, -74.0);

        assert!(bounds.contains(&point_inside));
        assert!(!bounds.contains(&point_outside));
    }

    #[test]
    fn test_overlaps_ignores_shared_edges() {
        let a = LatLngBounds::from_coords(0.0, 0.0, 10.0, 10.0);
        let touching = LatLngBounds::from_coords(10.0, 0.0, 20.0, 10.0);
        let crossing = LatLngBounds::from_coords(5.0, 5.0, 15.0, 15.0);

        assert!(a.intersects(&touching));
        assert!(!a.overlaps(&touching));
        assert!(a.overlaps(&crossing));
    }

    #[test]
    fn test_parent_of_negative_tile() {
        assert_eq!(TileCoord::new(-1, -3, 4).parent(), TileCoord::new(-1, -2, 3));
        assert_eq!(TileCoord::new(5, 4, 3).parent(), TileCoord::new(2, 2, 2));
    }

    #[test]
    fn test_children_cover_parent() {
        let children = TileCoord::new(2, 3, 4).children();
        for child in children {
            assert_eq!(child.parent(), TileCoord::new(2, 3, 4));
        }
    }

    #[test]
    fn test_point_round_half_up() {
        assert_eq!(Point::new(0.5, -0.5).round(), Point::new(1.0, 0.0));
        assert_eq!(Point::new(1.4, -1.6).round(), Point::new(1.0, -2.0));
    }
}
