//! Decoded tile pixels.

use crate::prelude::Arc;
#[cfg(feature = "render")]
use crate::{MapError, Result};

/// Square RGBA8 raster produced from an encoded tile image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA8, `width * height * 4` bytes
    pub pixels: Arc<Vec<u8>>,
}

impl Bitmap {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels: Arc::new(pixels),
        }
    }

    /// Fully transparent bitmap
    pub fn blank(size: u32) -> Self {
        Self::new(size, size, vec![0; (size as usize) * (size as usize) * 4])
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

/// Decodes an encoded image (PNG, JPEG, ...) and draws it stretched into a
/// `tile_size` square.
#[cfg(feature = "render")]
pub fn decode_and_composite(data: &[u8], tile_size: u32) -> Result<Bitmap> {
    if tile_size == 0 {
        return Err(MapError::TileRender("tile size must be positive".to_string()));
    }

    let img = image::load_from_memory(data)
        .map_err(|e| MapError::TileRender(format!("Failed to load image: {}", e)))?
        .to_rgba8();

    let img = if img.dimensions() == (tile_size, tile_size) {
        img
    } else {
        image::imageops::resize(
            &img,
            tile_size,
            tile_size,
            image::imageops::FilterType::Triangle,
        )
    };

    Ok(Bitmap::new(tile_size, tile_size, img.into_raw()))
}

#[cfg(all(test, feature = "render"))]
pub(crate) fn encode_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}
