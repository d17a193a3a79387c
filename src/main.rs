use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use voicepipe::audio::{CaptureBackend, MicBackend, Segmenter, SegmenterConfig};
use voicepipe::config::Config;
use voicepipe::dispatch::HttpSpeechService;
use voicepipe::server::{self, AppState, ChunkStore, GapPolicy};
use voicepipe::transport::queue::{Offer, OverflowPolicy, SegmentQueue};
use voicepipe::transport::ws_client::WsUploader;

#[derive(Parser)]
#[command(name = "voicepipe", about = "Real-time audio capture, chunking and reassembly")]
struct Cli {
    /// Path to the configuration file (without extension)
    #[arg(long, default_value = "config/voicepipe")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the chunk ingestion and reassembly server
    Serve,
    /// Capture from the default microphone and stream to a server
    Record {
        /// WebSocket endpoint of a running server
        #[arg(long, default_value = "ws://127.0.0.1:8090/ws")]
        url: String,
        /// Stop recording after this many seconds
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config))?;

    info!("voicepipe v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Record { url, seconds } => record(cfg, url, seconds).await,
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let store = Arc::new(ChunkStore::new(&cfg.storage.data_dir)?);
    let gap_policy = if cfg.audio.fill_gaps_with_silence {
        GapPolicy::FillSilence
    } else {
        GapPolicy::Skip
    };

    let mut state = AppState::new(store, gap_policy);
    if let Some(dispatch) = &cfg.dispatch {
        let api_key = dispatch
            .api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok());
        state = state.with_speech(Arc::new(HttpSpeechService::new(
            &dispatch.transcribe_url,
            &dispatch.synthesize_url,
            &dispatch.model,
            api_key,
        )));
        info!("speech dispatch enabled: {}", dispatch.transcribe_url);
    }

    let max_age = Duration::from_secs(cfg.storage.orphan_max_age_hours * 3600);
    tokio::spawn(server::run_gc(
        state.clone(),
        Duration::from_secs(15 * 60),
        max_age,
    ));

    let app = server::create_router(state);
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {addr}");

    axum::serve(listener, app).await.context("server error")
}

async fn record(cfg: Config, url: String, seconds: u64) -> Result<()> {
    let mut backend = MicBackend::new(64);
    let mut stream = backend.start().await?;
    info!(
        backend = backend.name(),
        sample_rate = stream.sample_rate,
        "capture started"
    );

    let mut segmenter = Segmenter::new(SegmenterConfig {
        sample_rate: stream.sample_rate,
        segment_seconds: cfg.audio.segment_seconds,
        normalize: cfg.audio.normalize,
        normalize_target: 0.99,
        pad_last_segment: cfg.audio.pad_last_segment,
    });
    let chunk_samples = segmenter.segment_frames();

    let mut uploader = WsUploader::connect(&url).await?;
    let session_id = uploader
        .register(None, stream.sample_rate, 1, Some(chunk_samples))
        .await?;
    info!(session = %session_id, "recording for {seconds}s");

    let mut queue = SegmentQueue::new(cfg.audio.queue_segments, OverflowPolicy::DropOldest);
    let mut last_seq = None;

    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            quantum = stream.rx.recv() => {
                let Some(quantum) = quantum else { break };
                for segment in segmenter.push_frame(&quantum) {
                    enqueue(&mut queue, segment);
                }
                drain(&mut queue, &mut uploader, &mut last_seq).await;
            }
            _ = &mut deadline => break,
        }
    }

    backend.stop().await?;

    // the device thread is gone; drain whatever it already produced
    while let Ok(quantum) = stream.rx.try_recv() {
        for segment in segmenter.push_frame(&quantum) {
            enqueue(&mut queue, segment);
        }
    }
    // stopping is an explicit flush, not just the end of pushes
    if let Some(final_segment) = segmenter.stop() {
        enqueue(&mut queue, final_segment);
    }
    drain(&mut queue, &mut uploader, &mut last_seq).await;

    match uploader.finish(last_seq, None).await? {
        voicepipe::ServerMessage::Result {
            url, total_samples, ..
        } => info!(total_samples, "merged recording available at {url}"),
        other => warn!(?other, "unexpected finish reply"),
    }
    Ok(())
}

fn enqueue(queue: &mut SegmentQueue, segment: voicepipe::Segment) {
    match queue.offer(segment) {
        Offer::Accepted => {}
        Offer::Evicted { seq } => warn!(seq, "upload backlog full, dropped oldest segment"),
        Offer::Refused { seq } => warn!(seq, "upload backlog full, refused segment"),
        Offer::MustWait(segment) => {
            warn!(seq = segment.seq, "upload backlog full, segment dropped")
        }
    }
}

async fn drain(queue: &mut SegmentQueue, uploader: &mut WsUploader, last_seq: &mut Option<u64>) {
    while let Some(segment) = queue.pop() {
        match uploader.send_segment(&segment).await {
            Ok(()) => *last_seq = Some(segment.seq),
            Err(err) => {
                // the gap in sequence numbers stays visible downstream
                warn!(seq = segment.seq, error = %err, "segment upload failed, dropping");
            }
        }
    }
}
