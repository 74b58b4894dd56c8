//! Core GridLayer implementation

use super::{
    provider::{TileCompletion, TileProvider},
    registry::TileRegistry,
    types::{GridLayerOptions, TileLevel},
};
use crate::{
    core::{
        geo::Point,
        grid::{TileKey, TileRange},
        viewport::Viewport,
    },
    layers::events::{MapEvent, MapEventKind, TileEvent, TileEventListener},
    prelude::{Arc, Duration, Instant},
    traits::{Clock, SystemClock},
    Result,
};
use crossbeam_channel::{Receiver, Sender};
use std::collections::BTreeMap;

/// Work deferred to the next animation frame
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FrameTask {
    UpdateOpacity,
    /// Readiness of a tile whose provider never fires `done`
    TileReady { key: TileKey, record_id: u64 },
    Prune,
}

/// A layer that covers the view with a grid of tiles.
///
/// The layer owns the registry of tiles and the per-zoom level containers.
/// Everything happens on the caller's sequence: map events, frame callbacks
/// and tile completions are fed in through [`GridLayer::handle_event`],
/// [`GridLayer::on_frame`] and [`GridLayer::process_tile_results`].
pub struct GridLayer<P> {
    pub(crate) options: GridLayerOptions,
    pub(crate) provider: P,
    pub(crate) tiles: TileRegistry,
    pub(crate) levels: BTreeMap<i32, TileLevel>,
    /// Zoom of the level new tiles are added to
    pub(crate) level: Option<i32>,
    pub(crate) tile_zoom: Option<i32>,
    pub(crate) tile_size: Point,
    pub(crate) global_tile_range: Option<TileRange>,
    pub(crate) wrap_x: Option<(i32, i32)>,
    pub(crate) wrap_y: Option<(i32, i32)>,
    pub(crate) loading: bool,
    pub(crate) no_prune: bool,
    pub(crate) added: bool,

    pub(crate) frame_tasks: Vec<FrameTask>,
    pub(crate) prune_at: Option<Instant>,
    last_move_update: Option<Instant>,
    move_pending: bool,

    pub(crate) completions_tx: Sender<TileCompletion>,
    completions_rx: Receiver<TileCompletion>,
    listeners: Vec<TileEventListener>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl<P: TileProvider> GridLayer<P> {
    pub fn new(options: GridLayerOptions, provider: P) -> Self {
        let (completions_tx, completions_rx) = crossbeam_channel::unbounded();
        let tile_size = Point::new(options.tile_size as f64, options.tile_size as f64);
        Self {
            options,
            provider,
            tiles: TileRegistry::new(),
            levels: BTreeMap::new(),
            level: None,
            tile_zoom: None,
            tile_size,
            global_tile_range: None,
            wrap_x: None,
            wrap_y: None,
            loading: false,
            no_prune: false,
            added: false,
            frame_tasks: Vec::new(),
            prune_at: None,
            last_move_update: None,
            move_pending: false,
            completions_tx,
            completions_rx,
            listeners: Vec::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source used for fades and throttling
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Subscribes to lifecycle notifications
    pub fn on<F>(&mut self, listener: F)
    where
        F: FnMut(&TileEvent) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub(crate) fn fire(&mut self, event: TileEvent) {
        log::trace!("{} {:?}", event.name(), event.coords());
        for listener in self.listeners.iter_mut() {
            listener(&event);
        }
    }

    /// Map events this layer wants to receive
    pub fn events(&self) -> Vec<MapEventKind> {
        let mut events = vec![
            MapEventKind::ViewPreReset,
            MapEventKind::ViewReset,
            MapEventKind::Zoom,
            MapEventKind::MoveEnd,
        ];
        if !self.options.update_when_idle {
            events.push(MapEventKind::Move);
        }
        if self.options.zoom_animation {
            events.push(MapEventKind::ZoomAnim);
        }
        events
    }

    /// Attaches the layer to a map showing `viewport`
    pub fn on_add(&mut self, viewport: &Viewport) -> Result<()> {
        self.added = true;
        self.levels.clear();
        self.level = None;
        self.tile_zoom = None;
        self.reset_view(viewport, false)
    }

    /// Detaches the layer, evicting every tile
    pub fn on_remove(&mut self) {
        self.remove_all_tiles();
        self.levels.clear();
        self.level = None;
        self.tile_zoom = None;
        self.frame_tasks.clear();
        self.prune_at = None;
        self.move_pending = false;
        self.added = false;
    }

    /// Feeds one map event into the layer
    pub fn handle_event(&mut self, event: &MapEvent, viewport: &Viewport) -> Result<()> {
        if !self.added || !self.events().contains(&event.kind()) {
            return Ok(());
        }
        match event {
            MapEvent::ViewPreReset => {
                self.invalidate_all();
                Ok(())
            }
            MapEvent::ViewReset { pinch, fly_to } | MapEvent::Zoom { pinch, fly_to } => {
                self.reset_view(viewport, *pinch || *fly_to)
            }
            MapEvent::ZoomAnim {
                center,
                zoom,
                no_update,
            } => self.set_view(viewport, *center, *zoom, true, *no_update),
            MapEvent::MoveEnd => self.on_move_end(viewport),
            MapEvent::Move => self.on_move(viewport),
        }
    }

    pub(crate) fn reset_view(&mut self, viewport: &Viewport, animating: bool) -> Result<()> {
        self.set_view(
            viewport,
            viewport.center,
            viewport.zoom,
            animating,
            animating,
        )
    }

    fn on_move_end(&mut self, viewport: &Viewport) -> Result<()> {
        if viewport.is_animating_zoom() {
            return Ok(());
        }
        self.update(viewport, None)
    }

    /// Throttled move: runs at most once per update interval, with one
    /// trailing run picked up by the frame driver
    fn on_move(&mut self, viewport: &Viewport) -> Result<()> {
        let now = self.clock.now();
        let interval = Duration::from_millis(self.options.update_interval_ms);
        match self.last_move_update {
            Some(last) if now.saturating_duration_since(last) < interval => {
                self.move_pending = true;
                Ok(())
            }
            _ => {
                self.last_move_update = Some(now);
                self.move_pending = false;
                self.on_move_end(viewport)
            }
        }
    }

    /// Runs the work queued for this frame: opacity fades, readiness of
    /// callback-less tiles, deferred prunes and the trailing throttled move.
    /// Work queued while running waits for the next frame.
    pub fn on_frame(&mut self, viewport: &Viewport) -> Result<()> {
        let tasks = std::mem::take(&mut self.frame_tasks);
        for task in tasks {
            match task {
                FrameTask::UpdateOpacity => self.update_opacity(viewport),
                FrameTask::TileReady { key, record_id } => {
                    if self.tiles.get(&key).map(|t| t.id) == Some(record_id) {
                        self.tile_ready(viewport, &key, None);
                    }
                }
                FrameTask::Prune => self.prune_tiles(viewport),
            }
        }

        let now = self.clock.now();
        if matches!(self.prune_at, Some(at) if now >= at) {
            self.prune_at = None;
            self.prune_tiles(viewport);
        }

        if self.move_pending {
            let interval = Duration::from_millis(self.options.update_interval_ms);
            let due = self
                .last_move_update
                .map_or(true, |last| now.saturating_duration_since(last) >= interval);
            if due {
                self.move_pending = false;
                self.last_move_update = Some(now);
                self.on_move_end(viewport)?;
            }
        }
        Ok(())
    }

    /// True while frame work or a delayed prune is outstanding
    pub fn has_pending_frame_work(&self) -> bool {
        !self.frame_tasks.is_empty() || self.prune_at.is_some() || self.move_pending
    }

    pub(crate) fn request_frame(&mut self, task: FrameTask) {
        if task == FrameTask::UpdateOpacity && self.frame_tasks.contains(&task) {
            return;
        }
        self.frame_tasks.push(task);
    }

    /// Applies every tile completion that has arrived so far
    pub fn process_tile_results(&mut self, viewport: &Viewport) -> usize {
        let mut processed = 0;
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.apply_completion(viewport, completion);
            processed += 1;
        }
        processed
    }

    /// Blocks up to `timeout` for the next completion, then applies it and
    /// anything else already queued
    pub fn wait_tile_results(&mut self, viewport: &Viewport, timeout: Duration) -> usize {
        match self.completions_rx.recv_timeout(timeout) {
            Ok(completion) => {
                self.apply_completion(viewport, completion);
                1 + self.process_tile_results(viewport)
            }
            Err(_) => 0,
        }
    }

    fn apply_completion(&mut self, viewport: &Viewport, completion: TileCompletion) {
        let TileCompletion {
            key,
            record_id,
            content,
            error,
        } = completion;
        match self.tiles.get_mut(&key) {
            Some(record) if record.id == record_id => record.el.content = content,
            _ => {
                log::debug!("dropping completion for stale tile {}", key);
                return;
            }
        }
        self.tile_ready(viewport, &key, error);
    }

    /// Evicts everything and requests the current view again
    pub fn redraw(&mut self, viewport: &Viewport) -> Result<()> {
        if !self.added {
            return Ok(());
        }
        self.remove_all_tiles();
        let tile_zoom = Some(self.clamp_zoom(viewport.zoom.round()) as i32);
        if tile_zoom != self.tile_zoom {
            self.tile_zoom = tile_zoom;
            self.update_levels(viewport);
        }
        self.update(viewport, None)
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.options.opacity = opacity.clamp(0.0, 1.0);
    }

    pub fn opacity(&self) -> f32 {
        self.options.opacity
    }

    pub fn set_z_index(&mut self, z_index: i32) {
        self.options.z_index = z_index;
    }

    pub fn z_index(&self) -> i32 {
        self.options.z_index
    }

    /// True from the first dispatched tile of a batch until the last resolves
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn tile_zoom(&self) -> Option<i32> {
        self.tile_zoom
    }

    pub fn tile_size(&self) -> Point {
        self.tile_size
    }

    pub fn tiles(&self) -> &TileRegistry {
        &self.tiles
    }

    pub fn levels(&self) -> &BTreeMap<i32, TileLevel> {
        &self.levels
    }

    pub fn global_tile_range(&self) -> Option<TileRange> {
        self.global_tile_range
    }

    pub fn options(&self) -> &GridLayerOptions {
        &self.options
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }
}
