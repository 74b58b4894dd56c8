pub mod bitmap;

pub use bitmap::Bitmap;
#[cfg(feature = "render")]
pub use bitmap::decode_and_composite;
