use async_trait::async_trait;
use std::collections::HashMap as StdHashMap;
use std::sync::{Arc, Mutex};
use tilegrid::{layers::tile::TileFetcher, prelude::*};

/// URL tile layers end to end, with the network replaced by a mock
#[cfg(test)]
mod tile_layer_tests {
    use super::*;

    /// Serves canned responses; unknown URLs answer 404
    #[derive(Default)]
    struct MockFetcher {
        responses: StdHashMap<String, Vec<u8>>,
        requested: Mutex<Vec<String>>,
    }

    impl MockFetcher {
        fn serve(mut self, url: &str, body: Vec<u8>) -> Self {
            self.responses.insert(url.to_string(), body);
            self
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TileFetcher for MockFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.requested.lock().unwrap().push(url.to_string());
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| MapError::TileFetch(format!("HTTP 404 Not Found for {}", url)))
        }
    }

    #[cfg(feature = "render")]
    fn tile_image() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([20, 40, 60, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageOutputFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[cfg(not(feature = "render"))]
    fn tile_image() -> Vec<u8> {
        b"\x89PNG fake tile".to_vec()
    }

    /// Web mercator view at zoom 1 showing the whole 2x2 world
    fn world_view() -> Viewport {
        Viewport::new(LatLng::new(0.0, 0.0), 1.0, Point::new(512.0, 512.0))
    }

    fn options() -> TileLayerOptions {
        let mut options = TileLayerOptions::default();
        options.grid.fade_animation = false;
        options
    }

    /// Fetcher serving every z1 tile of `base` except the ones listed
    fn world_fetcher(base: &str, missing: &[(i32, i32)]) -> MockFetcher {
        let mut fetcher = MockFetcher::default();
        for y in 0..2 {
            for x in 0..2 {
                if !missing.contains(&(x, y)) {
                    fetcher = fetcher.serve(&format!("{}/1/{}/{}.png", base, x, y), tile_image());
                }
            }
        }
        fetcher
    }

    fn record_events(layer: &mut TileLayer) -> Arc<Mutex<Vec<TileEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        layer.on(move |event| sink.lock().unwrap().push(event.clone()));
        events
    }

    fn count(events: &Arc<Mutex<Vec<TileEvent>>>, name: &str) -> usize {
        events.lock().unwrap().iter().filter(|e| e.name() == name).count()
    }

    /// Drives the layer until the batch settles
    fn settle(layer: &mut TileLayer, viewport: &Viewport) {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while layer.is_loading() && std::time::Instant::now() < deadline {
            layer.wait_tile_results(viewport, Duration::from_millis(50));
        }
        assert!(!layer.is_loading(), "tiles did not settle in time");
    }

    fn content(layer: &TileLayer, x: i32, y: i32) -> TileContent {
        let key = TileKey::from(TileCoord::new(x, y, 1));
        layer.tiles().get(&key).unwrap().el.content.clone()
    }

    #[test]
    fn test_missing_tile_reports_error_once() {
        let base = "https://tiles.test";
        let fetcher = Arc::new(world_fetcher(base, &[(1, 0)]));
        let mut layer = TileLayer::from_url(format!("{}/{{z}}/{{x}}/{{y}}.png", base), options())
            .unwrap()
            .with_fetcher(fetcher.clone());
        let events = record_events(&mut layer);
        let viewport = world_view();

        layer.on_add(&viewport).unwrap();
        assert_eq!(count(&events, "tileloadstart"), 4);
        settle(&mut layer, &viewport);

        assert_eq!(count(&events, "tileerror"), 1);
        assert_eq!(count(&events, "tileload"), 3);
        assert_eq!(count(&events, "load"), 1);

        let failed = layer.tiles().get(&TileKey::from(TileCoord::new(1, 0, 1))).unwrap();
        assert!(failed.is_loaded());
        assert!(!failed.el.loaded);
        assert!(failed.el.content.is_empty());
        assert!(!content(&layer, 0, 0).is_empty());
        assert_eq!(fetcher.requested().len(), 4);

        let error = events
            .lock()
            .unwrap()
            .iter()
            .find_map(|e| match e {
                TileEvent::TileError { error, .. } => Some(error.clone()),
                _ => None,
            })
            .unwrap();
        assert!(error.contains("404"));
    }

    #[cfg(feature = "render")]
    #[test]
    fn test_rendered_tiles_are_square_bitmaps() {
        let base = "https://tiles.test";
        let mut layer = TileLayer::from_url(format!("{}/{{z}}/{{x}}/{{y}}.png", base), options())
            .unwrap()
            .with_fetcher(Arc::new(world_fetcher(base, &[])));
        let viewport = world_view();
        layer.on_add(&viewport).unwrap();
        settle(&mut layer, &viewport);

        match content(&layer, 1, 1) {
            TileContent::Bitmap(bitmap) => {
                assert_eq!((bitmap.width, bitmap.height), (256, 256));
                assert_eq!(&bitmap.pixels[0..4], &[20, 40, 60, 255]);
            }
            other => panic!("expected a bitmap, got {:?}", other),
        }
    }

    #[test]
    fn test_error_tile_replaces_missing_tile() {
        let base = "https://tiles.test";
        let error_url = "https://tiles.test/error.png";
        let fetcher = Arc::new(world_fetcher(base, &[(0, 1)]).serve(error_url, tile_image()));
        let mut opts = options();
        opts.error_tile_url = Some(error_url.to_string());
        let mut layer = TileLayer::from_url(format!("{}/{{z}}/{{x}}/{{y}}.png", base), opts)
            .unwrap()
            .with_fetcher(fetcher.clone());
        let events = record_events(&mut layer);
        let viewport = world_view();

        layer.on_add(&viewport).unwrap();
        settle(&mut layer, &viewport);

        assert_eq!(count(&events, "tileerror"), 0);
        assert_eq!(count(&events, "tileload"), 4);
        assert!(!content(&layer, 0, 1).is_empty());
        assert!(fetcher.requested().contains(&error_url.to_string()));
    }

    #[test]
    fn test_unavailable_error_tile_keeps_original_error() {
        let base = "https://tiles.test";
        let fetcher = Arc::new(world_fetcher(base, &[(0, 1)]));
        let mut opts = options();
        opts.error_tile_url = Some("https://tiles.test/missing-error.png".to_string());
        let mut layer = TileLayer::from_url(format!("{}/{{z}}/{{x}}/{{y}}.png", base), opts)
            .unwrap()
            .with_fetcher(fetcher);
        let events = record_events(&mut layer);
        let viewport = world_view();

        layer.on_add(&viewport).unwrap();
        settle(&mut layer, &viewport);

        let errors: Vec<String> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                TileEvent::TileError { error, .. } => Some(error.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("/1/0/1.png"));
        assert!(content(&layer, 0, 1).is_empty());
    }

    /// Bytes the worker cannot decode still complete the tile, empty and
    /// without an error notification
    #[cfg(feature = "render")]
    #[test]
    fn test_undecodable_tile_completes_empty() {
        let base = "https://tiles.test";
        let error_url = "https://tiles.test/error.png";
        let mut fetcher = world_fetcher(base, &[]).serve(error_url, tile_image());
        fetcher = fetcher.serve(&format!("{}/1/1/1.png", base), b"not an image".to_vec());
        let fetcher = Arc::new(fetcher);
        let mut opts = options();
        opts.error_tile_url = Some(error_url.to_string());
        let mut layer = TileLayer::from_url(format!("{}/{{z}}/{{x}}/{{y}}.png", base), opts)
            .unwrap()
            .with_fetcher(fetcher.clone());
        let events = record_events(&mut layer);
        let viewport = world_view();

        layer.on_add(&viewport).unwrap();
        settle(&mut layer, &viewport);

        assert_eq!(count(&events, "tileerror"), 0);
        assert_eq!(count(&events, "tileload"), 4);
        assert!(content(&layer, 1, 1).is_empty());
        assert!(!content(&layer, 0, 0).is_empty());
        assert!(!fetcher.requested().contains(&error_url.to_string()));
    }

    #[test]
    fn test_plain_image_hosts_skip_rendering() {
        let base = "https://plain.test";
        let mut opts = options();
        opts.plain_image_hosts = vec!["plain.test".to_string()];
        let mut layer = TileLayer::from_url(format!("{}/{{z}}/{{x}}/{{y}}.png", base), opts)
            .unwrap()
            .with_fetcher(Arc::new(world_fetcher(base, &[])));
        let viewport = world_view();
        layer.on_add(&viewport).unwrap();
        settle(&mut layer, &viewport);

        match content(&layer, 1, 0) {
            TileContent::Image { url, bytes } => {
                assert_eq!(url, "https://plain.test/1/1/0.png");
                assert_eq!(*bytes, tile_image());
            }
            other => panic!("expected a plain image, got {:?}", other),
        }
    }

    #[test]
    fn test_unbuildable_url_fails_every_tile() {
        let mut opts = options();
        opts.subdomains.clear();
        let fetcher = Arc::new(MockFetcher::default());
        let mut layer = TileLayer::from_url("https://{s}.tiles.test/{z}/{x}/{y}.png", opts)
            .unwrap()
            .with_fetcher(fetcher.clone());
        let events = record_events(&mut layer);
        let viewport = world_view();

        layer.on_add(&viewport).unwrap();
        settle(&mut layer, &viewport);

        assert_eq!(count(&events, "tileerror"), 4);
        assert_eq!(count(&events, "load"), 1);
        assert!(fetcher.requested().is_empty());
    }

    #[test]
    fn test_set_url_redraws_from_new_source() {
        let fetcher = Arc::new(MockFetcher::default());
        let mut layer = TileLayer::from_url("https://a.test/{z}/{x}/{y}.png", options())
            .unwrap()
            .with_fetcher(fetcher.clone());
        let viewport = world_view();
        layer.on_add(&viewport).unwrap();
        settle(&mut layer, &viewport);
        assert_eq!(fetcher.requested().len(), 4);

        layer
            .set_url(&viewport, "https://a.test/{z}/{x}/{y}.png", None)
            .unwrap();
        assert!(!layer.is_loading());

        layer
            .set_url(&viewport, "https://b.test/{z}/{x}/{y}.png", None)
            .unwrap();
        settle(&mut layer, &viewport);
        let requested = fetcher.requested();
        assert_eq!(requested.len(), 8);
        assert!(requested.contains(&"https://b.test/1/1/1.png".to_string()));
    }

    #[test]
    fn test_tms_layer_inverts_rows() {
        let fetcher = Arc::new(MockFetcher::default());
        let mut opts = options();
        opts.tms = true;
        let mut layer = TileLayer::from_url("https://tms.test/{z}/{x}/{y}.png", opts)
            .unwrap()
            .with_fetcher(fetcher.clone());
        let viewport = world_view();
        layer.on_add(&viewport).unwrap();
        settle(&mut layer, &viewport);

        let requested = fetcher.requested();
        // row 0 of a two-row world is row 1 in TMS
        assert!(requested.contains(&"https://tms.test/1/0/1.png".to_string()));
        assert_eq!(requested.len(), 4);
    }

    /// Pipelines run on the ambient Tokio runtime when there is one
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tiles_load_on_tokio_runtime() {
        let base = "https://tiles.test";
        let mut layer = TileLayer::from_url(format!("{}/{{z}}/{{x}}/{{y}}.png", base), options())
            .unwrap()
            .with_fetcher(Arc::new(world_fetcher(base, &[])));
        let events = record_events(&mut layer);
        let viewport = world_view();
        layer.on_add(&viewport).unwrap();

        for _ in 0..500 {
            if !layer.is_loading() {
                break;
            }
            layer.process_tile_results(&viewport);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert!(!layer.is_loading());
        assert_eq!(count(&events, "tileload"), 4);
        assert_eq!(count(&events, "load"), 1);
    }
}
