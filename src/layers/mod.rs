pub mod events;
pub mod tile;
