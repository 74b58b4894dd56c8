//! URL-template tile loading
//!
//! [`UrlTileProvider`] turns each requested tile into a background pipeline:
//! URL synthesis on the worker pool, fetch, then decode/composite on the pool
//! again. The pipeline runs on the ambient runtime and reports back through
//! the tile's [`TileDone`].

use super::{
    layer::GridLayer,
    provider::{TileContext, TileDone, TileProvider},
    source::{url_host, HttpFetcher, TileFetcher},
    types::{TileContent, TileLayerOptions},
};
use crate::{
    background::{
        pool::WorkerPool,
        tasks::{RenderOutput, RenderRequest, TaskOutput, UrlRequest, WorkerTask},
    },
    core::{geo::TileCoord, viewport::Viewport},
    prelude::Arc,
    MapError, Result,
};

/// Tile provider backed by a URL template such as
/// `https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png`
pub struct UrlTileProvider {
    url: String,
    options: TileLayerOptions,
    pool: Arc<WorkerPool>,
    fetcher: Arc<dyn TileFetcher>,
}

impl std::fmt::Debug for UrlTileProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlTileProvider")
            .field("url", &self.url)
            .field("pool", &self.pool)
            .finish()
    }
}

impl UrlTileProvider {
    /// Binds to the worker pool named by `options.pool` and fetches over HTTP
    pub fn new(url: impl Into<String>, options: TileLayerOptions) -> Result<Self> {
        let pool = options.pool.resolve(options.worker_pool_max)?;
        Ok(Self {
            url: url.into(),
            options,
            pool,
            fetcher: Arc::new(HttpFetcher::new()),
        })
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn TileFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn options(&self) -> &TileLayerOptions {
        &self.options
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    fn url_request(&self, coords: TileCoord, ctx: &TileContext) -> UrlRequest {
        UrlRequest {
            coords,
            template: self.url.clone(),
            subdomains: self.options.subdomains.clone(),
            max_zoom: self.options.grid.max_zoom,
            zoom_reverse: self.options.zoom_reverse,
            zoom_offset: self.options.zoom_offset,
            tms: self.options.tms,
            retina: self.options.retina(),
            infinite: ctx.infinite,
            global_tile_range: ctx.global_tile_range,
            params: self.options.params.clone(),
        }
    }
}

impl TileProvider for UrlTileProvider {
    fn create_tile(&mut self, coords: TileCoord, ctx: &TileContext, done: TileDone) -> TileContent {
        let job = TileJob {
            request: self.url_request(coords, ctx),
            tile_size: self.options.grid.tile_size,
            pool: self.pool.clone(),
            fetcher: self.fetcher.clone(),
            plain_image_hosts: self.options.plain_image_hosts.clone(),
            error_tile_url: self.options.error_tile_url.clone(),
        };
        crate::runtime::spawn(job.run(done));
        TileContent::Empty
    }
}

/// Everything one tile pipeline needs, detached from the layer
struct TileJob {
    request: UrlRequest,
    tile_size: u32,
    pool: Arc<WorkerPool>,
    fetcher: Arc<dyn TileFetcher>,
    plain_image_hosts: Vec<String>,
    error_tile_url: Option<String>,
}

impl TileJob {
    async fn run(self, done: TileDone) {
        match self.load().await {
            Ok(content) => done.succeed(content),
            Err(err) => match self.load_error_tile().await {
                Some(content) => {
                    log::debug!("tile {} replaced by error tile: {}", done.key(), err);
                    done.succeed(content)
                }
                None => done.fail(err, TileContent::Empty),
            },
        }
    }

    async fn load(&self) -> Result<TileContent> {
        let completion = self
            .pool
            .post_task(WorkerTask::ComputeUrl(self.request.clone()))
            .await?;
        let url = match completion.output {
            TaskOutput::Url(Some(url)) => url,
            TaskOutput::Url(None) => {
                return Err(MapError::TileFetch(format!(
                    "no URL for tile {:?} from template {}",
                    self.request.coords, self.request.template
                )))
            }
            other => {
                return Err(MapError::WorkerTask(format!(
                    "compute-url request {} answered with {:?}",
                    completion.request_id, other
                )))
            }
        };

        let bytes = Arc::new(self.fetcher.fetch(&url).await?);
        if self.is_plain_image(&url) {
            return Ok(TileContent::Image { url, bytes });
        }
        self.render(bytes).await
    }

    async fn load_error_tile(&self) -> Option<TileContent> {
        let url = self.error_tile_url.as_deref()?;
        let bytes = match self.fetcher.fetch(url).await {
            Ok(bytes) => Arc::new(bytes),
            Err(e) => {
                log::warn!("error tile {} unavailable: {}", url, e);
                return None;
            }
        };
        if self.is_plain_image(url) {
            return Some(TileContent::Image {
                url: url.to_string(),
                bytes,
            });
        }
        match self.render(bytes).await {
            Ok(TileContent::Empty) | Err(_) => None,
            Ok(content) => Some(content),
        }
    }

    fn is_plain_image(&self, url: &str) -> bool {
        url_host(url).map_or(false, |host| self.plain_image_hosts.iter().any(|h| *h == host))
    }

    async fn render(&self, data: Arc<Vec<u8>>) -> Result<TileContent> {
        let completion = self
            .pool
            .post_task(WorkerTask::RenderTile(RenderRequest {
                data,
                tile_size: self.tile_size,
            }))
            .await?;
        match completion.output {
            TaskOutput::Render(Some(RenderOutput::Bitmap(bitmap))) => Ok(TileContent::Bitmap(bitmap)),
            TaskOutput::Render(Some(RenderOutput::Fallback(data))) => {
                decode_on_caller(data, self.tile_size)
            }
            TaskOutput::Url(_) => Err(MapError::WorkerTask(format!(
                "render request {} answered with a URL",
                completion.request_id
            ))),
            // NOTE: an undecodable payload completes as an empty tile, without
            // tileerror or the error tile (see "Render task returning nothing"
            // in DESIGN.md)
            TaskOutput::Render(None) => {
                log::warn!(
                    "render task {} returned nothing for tile {:?}",
                    completion.request_id,
                    self.request.coords
                );
                Ok(TileContent::Empty)
            }
        }
    }
}

/// Decode path for when the pool hands the bytes back untouched
#[cfg(feature = "render")]
fn decode_on_caller(data: Arc<Vec<u8>>, tile_size: u32) -> Result<TileContent> {
    crate::rendering::decode_and_composite(&data, tile_size).map(TileContent::Bitmap)
}

#[cfg(not(feature = "render"))]
fn decode_on_caller(data: Arc<Vec<u8>>, _tile_size: u32) -> Result<TileContent> {
    Ok(TileContent::Encoded(data))
}

/// A grid layer loading its tiles from a URL template
pub type TileLayer = GridLayer<UrlTileProvider>;

impl GridLayer<UrlTileProvider> {
    /// Builds a tile layer, applying retina detection to the options first
    pub fn from_url(url: impl Into<String>, mut options: TileLayerOptions) -> Result<Self> {
        options.apply_retina();
        let grid = options.grid.clone();
        Ok(GridLayer::new(grid, UrlTileProvider::new(url, options)?))
    }

    /// Replaces the HTTP fetcher, e.g. with a cache or a test double
    pub fn with_fetcher(mut self, fetcher: Arc<dyn TileFetcher>) -> Self {
        self.provider.fetcher = fetcher;
        self
    }

    /// Swaps the URL template. Unless `no_redraw` is set every tile is
    /// requested again; setting the same URL without a flag is a no-op redraw.
    pub fn set_url(
        &mut self,
        viewport: &Viewport,
        url: impl Into<String>,
        no_redraw: Option<bool>,
    ) -> Result<()> {
        let url = url.into();
        let no_redraw = no_redraw.unwrap_or(url == self.provider.url);
        self.provider.url = url;
        if !no_redraw {
            self.redraw(viewport)?;
        }
        Ok(())
    }

    pub fn url(&self) -> &str {
        self.provider.url()
    }
}
