pub mod audio;
pub mod config;
pub mod dispatch;
pub mod server;
pub mod transport;

pub use audio::{
    CaptureBackend, CaptureProcessor, CaptureStream, MicBackend, Segment, Segmenter,
    SegmenterConfig,
};
pub use config::Config;
pub use dispatch::{HttpSpeechService, SpeechService, SynthesisRequest, Transcription};
pub use server::{
    create_router, AppState, AssembleError, ChunkStore, GapPolicy, MergedRecording, SessionManager,
};
pub use transport::{
    ClientMessage, FinishResponse, HttpUploader, OverflowPolicy, SegmentQueue, ServerMessage,
    WireFormat, WsUploader,
};
