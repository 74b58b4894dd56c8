use std::time::Duration;
use tilegrid::{prelude::*, TileLayer};

/// Drives a tile layer without any UI: a few view changes against the
/// OpenStreetMap tile servers, printing the lifecycle as it happens.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    #[cfg(feature = "debug")]
    tilegrid::init_logging();

    println!("tilegrid headless example");
    println!("=========================");

    let options = TileLayerOptions::from_json(
        r#"{ "max_zoom": 19, "keep_buffer": 1, "error_tile_url": null }"#,
    )?;
    let mut layer = TileLayer::from_url("https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png", options)?;
    layer.on(|event| match event {
        TileEvent::TileLoad { key, .. } => println!("   loaded   {}", key),
        TileEvent::TileError { key, error, .. } => println!("   failed   {} ({})", key, error),
        TileEvent::TileUnload { key, .. } => println!("   unloaded {}", key),
        TileEvent::Load => println!("   all tiles settled"),
        _ => {}
    });

    let mut viewport = Viewport::new(
        LatLng::new(37.7749, -122.4194),
        12.0,
        Point::new(1024.0, 768.0),
    );
    layer.on_add(&viewport)?;
    settle(&mut layer, &viewport).await?;

    let locations = [
        ("New York", LatLng::new(40.7128, -74.0060), 11.0),
        ("London", LatLng::new(51.5074, -0.1278), 10.0),
        ("Tokyo", LatLng::new(35.6762, 139.6503), 12.0),
    ];

    for (name, location, zoom) in locations {
        println!("\n{} at zoom {}", name, zoom);
        viewport.set_view(location, zoom);
        layer.handle_event(&MapEvent::ViewPreReset, &viewport)?;
        layer.handle_event(
            &MapEvent::ViewReset {
                pinch: false,
                fly_to: false,
            },
            &viewport,
        )?;
        settle(&mut layer, &viewport).await?;
        println!(
            "   {} tiles at z{:?} on {} levels",
            layer.tiles().len(),
            layer.tile_zoom(),
            layer.levels().len()
        );
    }

    println!("\nPanning 300px east in small steps");
    for _ in 0..6 {
        viewport.pan_by(Point::new(50.0, 0.0));
        layer.handle_event(&MapEvent::Move, &viewport)?;
        layer.on_frame(&viewport)?;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    layer.handle_event(&MapEvent::MoveEnd, &viewport)?;
    settle(&mut layer, &viewport).await?;

    layer.on_remove();
    println!("\nDone");
    Ok(())
}

/// Applies completions and frame work until the batch and its fades settle
async fn settle(layer: &mut TileLayer, viewport: &Viewport) -> anyhow::Result<()> {
    for _ in 0..600 {
        layer.process_tile_results(viewport);
        layer.on_frame(viewport)?;
        if !layer.is_loading() && !layer.has_pending_frame_work() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(16)).await;
    }
    anyhow::bail!("tiles did not settle within ten seconds")
}
