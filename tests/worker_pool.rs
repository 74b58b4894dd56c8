use futures::executor::block_on;
use futures::future::join_all;
use tilegrid::background::{
    pool::{pool_size, WorkerPool},
    tasks::{RenderOutput, RenderRequest, TaskOutput, UrlRequest, WorkerTask},
};
use tilegrid::prelude::*;

/// Worker pool dispatch and completion matching
#[cfg(test)]
mod worker_pool_tests {
    use super::*;

    #[cfg(feature = "render")]
    fn payload(_i: usize) -> Arc<Vec<u8>> {
        let img = image::RgbaImage::from_pixel(3, 3, image::Rgba([0, 128, 255, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageOutputFormat::Png)
            .unwrap();
        Arc::new(out.into_inner())
    }

    #[cfg(not(feature = "render"))]
    fn payload(i: usize) -> Arc<Vec<u8>> {
        Arc::new(vec![i as u8; 16])
    }

    fn render_task(i: usize) -> WorkerTask {
        WorkerTask::RenderTile(RenderRequest {
            data: payload(i),
            tile_size: 8 + i as u32,
        })
    }

    /// Asserts the render output belongs to the i-th request
    fn assert_render_output(i: usize, output: &TaskOutput) {
        match output {
            TaskOutput::Render(Some(RenderOutput::Bitmap(bitmap))) => {
                assert_eq!(bitmap.width, 8 + i as u32);
            }
            TaskOutput::Render(Some(RenderOutput::Fallback(data))) => {
                assert_eq!(data, &payload(i));
            }
            other => panic!("task {} produced {:?}", i, other),
        }
    }

    /// Five render tasks on two workers alternate 0,1,0,1,0 and every
    /// completion carries the id of the request that produced it
    #[test]
    fn test_round_robin_dispatch() {
        let pool = WorkerPool::new(2).unwrap();
        let futures: Vec<_> = (0..5).map(|i| pool.post_task(render_task(i))).collect();
        let completions = block_on(join_all(futures));

        let workers: Vec<usize> = completions
            .iter()
            .map(|c| c.as_ref().unwrap().worker)
            .collect();
        assert_eq!(workers, vec![0, 1, 0, 1, 0]);

        for (i, completion) in completions.into_iter().enumerate() {
            let completion = completion.unwrap();
            assert_eq!(completion.request_id, i as u64);
            assert_render_output(i, &completion.output);
        }
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn test_completions_matched_across_threads() {
        let pool = Arc::new(WorkerPool::new(3).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .map(|n| {
                            let x = t * 100 + n;
                            let task = WorkerTask::ComputeUrl(UrlRequest {
                                coords: TileCoord::new(x, 0, 10),
                                template: "{x}".to_string(),
                                subdomains: Vec::new(),
                                max_zoom: 18.0,
                                zoom_reverse: false,
                                zoom_offset: 0,
                                tms: false,
                                retina: false,
                                infinite: true,
                                global_tile_range: None,
                                params: Default::default(),
                            });
                            let completion = block_on(pool.post_task(task)).unwrap();
                            (x, completion)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            for (x, completion) in handle.join().unwrap() {
                assert_eq!(completion.output, TaskOutput::Url(Some(x.to_string())));
                assert_eq!(completion.worker, (completion.request_id % 3) as usize);
                ids.push(completion.request_id);
            }
        }
        ids.sort_unstable();
        assert_eq!(ids, (0..100).collect::<Vec<u64>>());
    }

    #[test]
    fn test_malformed_task_resolves_empty() {
        let pool = WorkerPool::new(1).unwrap();
        let task = WorkerTask::ComputeUrl(UrlRequest {
            coords: TileCoord::new(0, 0, 0),
            template: "https://{s}.example.org/{z}".to_string(),
            subdomains: Vec::new(),
            max_zoom: 18.0,
            zoom_reverse: false,
            zoom_offset: 0,
            tms: false,
            retina: false,
            infinite: false,
            global_tile_range: None,
            params: Default::default(),
        });
        let completion = block_on(pool.post_task(task)).unwrap();
        assert_eq!(completion.output, TaskOutput::Url(None));
    }

    #[test]
    fn test_pool_size_respects_cap() {
        assert_eq!(pool_size(1), 1);
        let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
        assert_eq!(pool_size(64), cpus.min(64));
    }
}
