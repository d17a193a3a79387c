pub mod capture;
pub mod mic;
pub mod pcm;
pub mod segmenter;
pub mod wav;

pub use capture::{CaptureBackend, CaptureProcessor, CaptureStream};
pub use mic::MicBackend;
pub use segmenter::{Segment, Segmenter, SegmenterConfig};
