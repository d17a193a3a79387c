// Microphone capture backend built on cpal.
//
// cpal streams are not Send, so the stream lives on a dedicated thread
// that parks until stop is requested. The cpal input callback runs on
// the device's real-time thread and only ever touches the
// CaptureProcessor, which never blocks.

use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{info, warn};

use super::capture::{CaptureBackend, CaptureProcessor, CaptureStream};

pub struct MicBackend {
    /// Quanta the capture channel buffers before dropping
    queue_quanta: usize,
    stop_tx: Option<std_mpsc::Sender<()>>,
    join: Option<thread::JoinHandle<()>>,
    capturing: bool,
}

impl MicBackend {
    pub fn new(queue_quanta: usize) -> Self {
        Self {
            queue_quanta,
            stop_tx: None,
            join: None,
            capturing: false,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for MicBackend {
    async fn start(&mut self) -> Result<CaptureStream> {
        if self.capturing {
            anyhow::bail!("microphone capture already running");
        }

        let (processor, rx) = CaptureProcessor::new(self.queue_quanta);
        let processor = Arc::new(processor);
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(u32, u16)>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let join = thread::spawn(move || run_input_stream(processor, ready_tx, stop_rx));

        let (sample_rate, channels) = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .context("capture readiness task failed")?
            .context("capture thread exited before reporting readiness")??;

        info!(
            sample_rate,
            channels, "microphone capture started"
        );

        self.stop_tx = Some(stop_tx);
        self.join = Some(join);
        self.capturing = true;

        Ok(CaptureStream {
            sample_rate,
            channels,
            rx,
        })
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join) = self.join.take() {
            tokio::task::spawn_blocking(move || join.join())
                .await
                .context("capture join task failed")?
                .map_err(|_| anyhow!("capture thread panicked"))?;
        }
        self.capturing = false;
        info!("microphone capture stopped");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "cpal-microphone"
    }
}

fn log_stream_error(err: cpal::StreamError) {
    warn!(error = %err, "input stream error");
}

fn run_input_stream(
    processor: Arc<CaptureProcessor>,
    ready_tx: std_mpsc::Sender<Result<(u32, u16)>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let built = (|| -> Result<(cpal::Stream, u32, u16)> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("no default input device"))?;
        let supported = device
            .default_input_config()
            .context("no default input config")?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        let config: cpal::StreamConfig = supported.config();

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => {
                let p = Arc::clone(&processor);
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        p.process_interleaved(data, channels);
                    },
                    log_stream_error,
                    None,
                )?
            }
            cpal::SampleFormat::I16 => {
                let p = Arc::clone(&processor);
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let floats: Vec<f32> = data
                            .iter()
                            .map(|&v| {
                                if v < 0 {
                                    v as f32 / 32768.0
                                } else {
                                    v as f32 / 32767.0
                                }
                            })
                            .collect();
                        p.process_interleaved(&floats, channels);
                    },
                    log_stream_error,
                    None,
                )?
            }
            other => anyhow::bail!("unsupported input sample format: {other:?}"),
        };

        stream.play().context("failed to start input stream")?;
        Ok((stream, sample_rate, channels))
    })();

    match built {
        Ok((stream, sample_rate, channels)) => {
            let _ = ready_tx.send(Ok((sample_rate, channels)));
            // Hold the stream alive until stop is requested or the
            // backend is dropped.
            let _ = stop_rx.recv();
            if processor.dropped_quanta() > 0 {
                warn!(
                    dropped = processor.dropped_quanta(),
                    "capture consumer fell behind; quanta were dropped"
                );
            }
            drop(stream);
        }
        Err(err) => {
            let _ = ready_tx.send(Err(err));
        }
    }
}
