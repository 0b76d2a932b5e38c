use anyhow::{Context, Result};
use audio_session::storage::SettingsStore;
use audio_session::{
    create_router, AppState, ClockPlayer, Collaborators, CommitForwarder, Config,
    FileReplaySource, JsonRecordStore, JsonSettings, LocalFileStore, MetadataDecoder, NatsClient,
    SessionEvent, SessionOrchestrator, SymphoniaDecoder, WavCaptureDevice,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Frame size used when replaying a WAV file into the capture device
const REPLAY_FRAME_MS: u64 = 20;

#[derive(Parser)]
#[command(name = "audio-session", version, about = "Recording session service")]
struct Cli {
    /// Config file, without extension
    #[arg(long, default_value = "config/audio-session")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control API
    Serve,
    /// Import an audio file into the recordings directory
    Import { file: PathBuf },
    /// Print metadata of an audio file
    Info { file: PathBuf },
    /// Record a session, feeding the capture from a WAV file
    Record {
        #[arg(long)]
        from: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Import { file } => import(cfg, file).await,
        Command::Info { file } => print_info(&file).await,
        Command::Record { from } => record(cfg, from).await,
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let (session, _) = build_session(&cfg).await?;

    let forwarder = if cfg.nats.enabled {
        let client = NatsClient::connect(&cfg.nats.url, session.config().session_id.clone()).await?;
        Some(CommitForwarder::spawn(
            client,
            cfg.nats.subject.clone(),
            session.subscribe_commits(),
        ))
    } else {
        info!("NATS disabled, commits stay local");
        None
    };

    let app = create_router(AppState::new(session.clone()));
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl-c: {}", e);
            }
        })
        .await?;

    session.shutdown().await;
    if let Some(forwarder) = forwarder {
        forwarder.abort();
    }
    Ok(())
}

async fn import(cfg: Config, file: PathBuf) -> Result<()> {
    let (session, _) = build_session(&cfg).await?;
    session.attach(Arc::new(log_event));

    session.import_file(file);
    session.settle().await;
    session.shutdown().await;
    Ok(())
}

async fn print_info(file: &Path) -> Result<()> {
    let info = SymphoniaDecoder::new().read_info(file).await?;

    println!("{}", file.display());
    println!("  Duration:    {:.1} s", info.duration_ms as f64 / 1000.0);
    println!(
        "  Details:     {}",
        audio_session::session::information_line(info.size, &info.format, info.sample_rate)
    );
    println!("  Channels:    {}", info.channel_count);
    println!("  Bitrate:     {} bps", info.bitrate);
    Ok(())
}

async fn record(cfg: Config, from: PathBuf) -> Result<()> {
    let source = FileReplaySource::open(&from, REPLAY_FRAME_MS)?;
    let (session, sink) = build_session(&cfg).await?;
    session.attach(Arc::new(log_event));

    session.start_recording();
    session.settle().await;

    info!("Replaying {} ({:?})", from.display(), source.duration());
    if let Err(e) = source.spawn(sink).await {
        warn!("Replay task failed: {}", e);
    }

    session.stop_recording(false);
    session.settle().await;
    session.shutdown().await;
    Ok(())
}

async fn build_session(
    cfg: &Config,
) -> Result<(SessionOrchestrator, audio_session::audio::FrameSink)> {
    let records_db = cfg.storage.records_db();
    let settings_file = cfg.storage.settings_file();
    for path in [&records_db, &settings_file] {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let settings = JsonSettings::open(&settings_file)?;
    let recording = &cfg.recording;
    settings.update(&mut |s| {
        s.format = recording.format.clone();
        s.sample_rate = recording.sample_rate;
        s.channel_count = recording.channels;
        s.bitrate = recording.bitrate;
    })?;

    let device = WavCaptureDevice::new();
    let sink = device.sink();

    let parts = Collaborators {
        device: Box::new(device),
        engine: cfg.engine(),
        player: Arc::new(ClockPlayer::new(Duration::from_millis(
            cfg.recording.progress_interval_ms,
        ))),
        records: Arc::new(JsonRecordStore::open(records_db).await?),
        files: Arc::new(LocalFileStore::new(
            cfg.storage.recordings_dir(),
            cfg.storage.quota_bytes,
        )?),
        decoder: Arc::new(SymphoniaDecoder::new()),
        settings: Arc::new(settings),
    };

    Ok((SessionOrchestrator::new(parts, cfg.session()), sink))
}

fn log_event(event: SessionEvent) {
    match &event {
        SessionEvent::Error { code, message } => error!("{:?}: {}", code, message),
        SessionEvent::RecordingProgress { .. } | SessionEvent::PlaybackProgress { .. } => {}
        other => info!("{:?}", other),
    }
}
