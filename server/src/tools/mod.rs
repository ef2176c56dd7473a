pub mod archive;
pub mod tracks;
pub mod wind;
