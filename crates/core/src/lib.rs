pub mod chunk;
pub mod clock;
pub mod codec;
pub mod document;
pub mod error;
pub mod ids;
pub mod model;
pub mod transport;

pub use chunk::{Chunk, ChunkSet};
pub use clock::{Clock, ManualClock, SystemClock};
pub use document::DocValue;
pub use error::{CodecError, CoreError};
pub use ids::*;
pub use model::*;
