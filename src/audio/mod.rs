pub mod buffer;
pub mod decode;
pub mod waveform;

pub use buffer::SampleBuffer;
