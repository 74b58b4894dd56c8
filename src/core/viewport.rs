use crate::core::{
    bounds::Bounds,
    crs::{Crs, Epsg3857},
    geo::{LatLng, Point},
};
use std::sync::Arc;

/// Target of a zoom animation in progress
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomAnimation {
    pub center: LatLng,
    pub zoom: f64,
}

/// Manages the current view of the map: center, zoom, and screen dimensions.
///
/// This is the slice of the map the tile grid reads on every update. The
/// pixel origin is fixed at the last view reset; panning only moves the pane.
#[derive(Debug, Clone)]
pub struct Viewport {
    /// The center of the map view in geographical coordinates
    pub center: LatLng,
    /// The current (possibly fractional) zoom level
    pub zoom: f64,
    /// The size of the viewport in pixels
    pub size: Point,
    crs: Arc<dyn Crs>,
    /// World pixel anchoring layer coordinates, set on view reset
    pixel_origin: Point,
    /// Offset of the map pane since the last reset
    pane_pos: Point,
    zoom_animation: Option<ZoomAnimation>,
}

impl Viewport {
    /// Creates a web mercator viewport
    pub fn new(center: LatLng, zoom: f64, size: Point) -> Self {
        Self::with_crs(Arc::new(Epsg3857), center, zoom, size)
    }

    pub fn with_crs(crs: Arc<dyn Crs>, center: LatLng, zoom: f64, size: Point) -> Self {
        let mut viewport = Self {
            center,
            zoom,
            size,
            crs,
            pixel_origin: Point::default(),
            pane_pos: Point::default(),
            zoom_animation: None,
        };
        viewport.set_view(center, zoom);
        viewport
    }

    pub fn crs(&self) -> &Arc<dyn Crs> {
        &self.crs
    }

    /// Jumps to a new view, resetting the pixel origin and the pane
    pub fn set_view(&mut self, center: LatLng, zoom: f64) {
        self.center = center;
        self.zoom = zoom;
        self.pane_pos = Point::default();
        self.pixel_origin = self.new_pixel_origin(&center, zoom);
    }

    /// Sets the viewport size
    pub fn set_size(&mut self, size: Point) {
        self.size = size;
    }

    /// Pans by a pixel offset without resetting the pixel origin
    pub fn pan_by(&mut self, offset: Point) {
        let moved = self.project(&self.center, self.zoom).add(&offset);
        self.center = self.unproject(&moved, self.zoom);
        self.pane_pos = self.pane_pos.subtract(&offset);
    }

    /// Marks the start of an animated zoom towards `center`/`zoom`
    pub fn start_zoom_animation(&mut self, center: LatLng, zoom: f64) {
        self.zoom_animation = Some(ZoomAnimation { center, zoom });
    }

    /// Ends the animated zoom, landing on its target view
    pub fn end_zoom_animation(&mut self) {
        if let Some(anim) = self.zoom_animation.take() {
            self.set_view(anim.center, anim.zoom);
        }
    }

    pub fn is_animating_zoom(&self) -> bool {
        self.zoom_animation.is_some()
    }

    pub fn zoom_animation(&self) -> Option<ZoomAnimation> {
        self.zoom_animation
    }

    pub fn pixel_origin(&self) -> Point {
        self.pixel_origin
    }

    /// Projects a LatLng to world pixel coordinates at the given zoom level
    pub fn project(&self, lat_lng: &LatLng, zoom: f64) -> Point {
        self.crs.project(lat_lng, zoom)
    }

    /// Unprojects world pixel coordinates back to LatLng at the given zoom level
    pub fn unproject(&self, point: &Point, zoom: f64) -> LatLng {
        self.crs.unproject(point, zoom)
    }

    pub fn zoom_scale(&self, to_zoom: f64, from_zoom: f64) -> f64 {
        self.crs.zoom_scale(to_zoom, from_zoom)
    }

    pub fn pixel_world_bounds(&self, zoom: f64) -> Option<Bounds> {
        self.crs.pixel_world_bounds(zoom)
    }

    /// Pixel origin the map would have if it were reset to `center`/`zoom`
    pub fn new_pixel_origin(&self, center: &LatLng, zoom: f64) -> Point {
        let half = self.size.divide_by(2.0);
        self.project(center, zoom)
            .subtract(&half)
            .add(&self.pane_pos)
            .round()
    }

    /// Visible area in world pixels at the current zoom
    pub fn pixel_bounds(&self) -> Bounds {
        let center = self.project(&self.center, self.zoom).floor();
        Bounds::from_center_and_size(center, self.size.x, self.size.y)
    }
}
