pub mod decimation;
pub mod primitives;
pub mod stream_buffer;
pub mod types;
pub mod windowing;

pub use decimation::{decimate, decimate_indices};
pub use stream_buffer::{AppendOutcome, StreamBuffer};
pub use types::{ChannelId, Sample};
pub use windowing::WindowSpec;
