//! Core constants derived from Leaflet defaults and common web-map conventions.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Time a freshly loaded tile takes to fade from transparent to opaque.
pub const FADE_DURATION_MS: u64 = 200;

/// Delay before the post-load prune when fading is enabled.
pub const PRUNE_DELAY_MS: u64 = 250;

/// How many zoom levels above a loading tile we look for a covering ancestor.
pub const ANCESTOR_SEARCH_DEPTH: i32 = 5;

/// How many zoom levels below a loading tile we look for covering descendants.
pub const DESCENDANT_SEARCH_DEPTH: i32 = 2;

/// Upper bound on background workers when the layer does not set one.
pub const DEFAULT_WORKER_POOL_MAX: usize = 4;

/// Assumed core count when the platform cannot report one.
pub const FALLBACK_HARDWARE_CONCURRENCY: usize = 2;

/// Throttle interval for tile updates while the map is still moving.
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 200;

/// Extra ring of tiles kept around the viewport.
pub const DEFAULT_KEEP_BUFFER: i32 = 2;

/// Default maximum zoom of a URL tile layer.
pub const DEFAULT_MAX_ZOOM: f64 = 18.0;

/// Delimiter between the integer parts of a tile key.
pub const TILE_KEY_DELIMITER: char = ':';
