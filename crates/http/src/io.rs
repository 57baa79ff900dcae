mod chunks;
mod decoder;

pub use chunks::{BodyError, Chunks};
pub use decoder::{FrameDecoder, FrameReader};
