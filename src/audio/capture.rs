use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// A running capture stream: the negotiated device format plus the
/// receiving side of the quantum channel.
pub struct CaptureStream {
    pub sample_rate: u32,
    pub channels: u16,
    pub rx: mpsc::Receiver<Vec<f32>>,
}

/// Audio capture backend trait
///
/// Implementations install a [`CaptureProcessor`] inside a device
/// callback and hand the consuming side of the channel back to the
/// caller.
#[async_trait::async_trait]
pub trait CaptureBackend: Send {
    /// Start capturing audio
    async fn start(&mut self) -> Result<CaptureStream>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// The callback-side half of the capture pipeline.
///
/// Runs inside the real-time audio callback, so it must never block:
/// each render quantum is copied into a fresh buffer (the device may
/// reuse its backing memory for the next quantum) and offered to the
/// channel with `try_send`. A full channel drops the quantum and counts
/// it; backpressure is the consumer's problem, not the callback's.
pub struct CaptureProcessor {
    tx: mpsc::Sender<Vec<f32>>,
    dropped: AtomicU64,
}

impl CaptureProcessor {
    /// Create a processor with a bounded channel of `capacity` quanta.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Vec<f32>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Forward one planar render quantum (a single channel's samples).
    ///
    /// Returns a keep-alive flag: true while the consumer is attached,
    /// including for empty quanta (absence of data is not an error),
    /// false once the receiver has gone away and capture may stop.
    pub fn process(&self, channel: &[f32]) -> bool {
        if channel.is_empty() {
            return true;
        }
        self.forward(channel.to_vec())
    }

    /// Forward an interleaved quantum, keeping only the first channel.
    pub fn process_interleaved(&self, data: &[f32], channels: u16) -> bool {
        if data.is_empty() {
            return true;
        }
        if channels <= 1 {
            return self.forward(data.to_vec());
        }
        let first: Vec<f32> = data.iter().step_by(channels as usize).copied().collect();
        self.forward(first)
    }

    /// Quanta lost to a full channel since capture started.
    pub fn dropped_quanta(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn forward(&self, quantum: Vec<f32>) -> bool {
        match self.tx.try_send(quantum) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}
