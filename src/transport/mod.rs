//! Segment transport between the recording client and the server
//!
//! Two equally valid carriers move chunks:
//! - a persistent WebSocket where metadata is declared once at register
//!   time and each segment travels as a chunk_meta + binary frame pair
//! - discrete HTTP uploads, each self-describing via headers
//!
//! Neither carrier is trusted for ordering: reassembly depends only on
//! the embedded sequence numbers.

pub mod http_client;
pub mod messages;
pub mod queue;
pub mod ws_client;

pub use http_client::HttpUploader;
pub use messages::{ClientMessage, FinishResponse, ServerMessage, WireFormat};
pub use queue::{Offer, OverflowPolicy, SegmentQueue};
pub use ws_client::WsUploader;
