mod app;
mod config;
mod input;
mod lyrics;
mod recognition;
mod storage;
mod sync;
mod track;
mod tracker;

use anyhow::Context;
use app::events::{Event, RecognitionEvent};
use app::{Device, LyricsCache, RecognitionSetup};
use clap::{Parser, Subcommand};
use lyrics::{LrclibClient, LrclibProvider, LyricsProvider, ParsedLyrics};
use recognition::capture::{self, CaptureSettings};
use recognition::{AcrCloudClient, AcrCloudCredentials, Recognizer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sync::{LyricResolution, SharedSynchronizer};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use track::{PlaybackState, Provider, TrackIdentity};

#[derive(Debug, Parser)]
#[command(name = "music-companion", version, about = "Synchronized lyrics for whatever is playing")]
struct Cli {
    /// Override config file path.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Follow JSON-line player reports on stdin and print lyrics in time,
    /// until Ctrl-C.
    Follow {
        /// Device name from config (defaults to the first one).
        #[arg(long)]
        device: Option<String>,
    },
    /// Play an LRC file against the local clock.
    Simulate {
        lrc: PathBuf,
        /// Start this far into the track.
        #[arg(long, default_value_t = 0)]
        start_ms: u64,
    },
    /// Fetch synced lyrics and print them as LRC.
    Lyrics { artist: String, title: String },
    /// Identify a WAV file with ACRCloud.
    Recognize { wav: PathBuf },
    /// Capture UDP audio, identify it, then follow along with lyrics.
    Listen {
        #[arg(long)]
        device: Option<String>,
    },
    /// Lyrics cache maintenance.
    Cache {
        #[command(subcommand)]
        cmd: CacheCommand,
    },
    /// Config file helpers.
    Config {
        #[command(subcommand)]
        cmd: ConfigCommand,
    },
}

#[derive(Debug, Subcommand)]
enum CacheCommand {
    /// List recently cached tracks.
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Remove every cached entry.
    Clear,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the config file location.
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref()).context("load config")?;

    let level = cfg
        .logging
        .level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    // Logs go to stderr; stdout carries lyrics.
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Follow { device } => {
            let device_cfg = cfg.device(device.as_deref())?;
            let mut dev = build_device(&cfg, device_cfg)?;
            if device_cfg.tagging_enabled {
                match acrcloud_client(&cfg) {
                    Ok(client) => {
                        dev = dev.with_recognition(RecognitionSetup {
                            recognizer: Arc::new(client),
                            udp_port: cfg.acrcloud.udp_port,
                            capture: capture_settings(&cfg),
                        });
                    }
                    Err(e) => tracing::warn!(device = %device_cfg.name, "tagging disabled: {e:#}"),
                }
            }

            let (tx, rx) = mpsc::channel::<Event>(256);
            input::spawn_input_task(tx.clone());
            run_until_interrupted(dev.run(tx, rx, std::io::stdout())).await;
        }
        Command::Simulate { lrc, start_ms } => {
            let raw = std::fs::read_to_string(&lrc)
                .with_context(|| format!("read {}", lrc.display()))?;
            let document = ParsedLyrics::parse(&raw, true)
                .to_document(None, cfg.lyrics.last_line_ms)
                .context("file has no synced lyric lines")?;

            let name = lrc
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let track = TrackIdentity::new(Provider::Manual, lrc.display().to_string(), name, "");
            let shared = SharedSynchronizer::default();
            let display = sync::display::spawn_display(
                "simulate".into(),
                shared.subscribe(),
                std::io::stdout(),
            );
            shared.load_track(track.clone(), Some(document))?;

            let started = tokio::time::Instant::now();
            let mut ticker = tokio::time::interval(Duration::from_millis(cfg.sync.tick_ms.max(1)));
            let simulation = async {
                loop {
                    ticker.tick().await;
                    let position = start_ms + started.elapsed().as_millis() as u64;
                    let state = PlaybackState::new(Some(track.clone()), position, true);
                    if shared.resolve(&state) == LyricResolution::AfterLast {
                        break;
                    }
                }
            };
            run_until_interrupted(simulation).await;
            // Let the display flush the final window.
            tokio::time::sleep(Duration::from_millis(50)).await;
            display.abort();
        }
        Command::Lyrics { artist, title } => {
            let provider = lyrics_provider(&cfg)?;
            let cache = LyricsCache::new(cfg.lyrics.memory_cache_size, Some(cfg.cache_path()));
            let track = TrackIdentity::new(
                Provider::Manual,
                format!("{artist} - {title}"),
                title.as_str(),
                artist.as_str(),
            );
            match app::fetch_lyrics(&track, provider.as_ref(), &cache).await {
                Some(document) => println!("{}", ParsedLyrics::format_lrc(&document)),
                None => println!("No synced lyrics found for {artist} - {title}"),
            }
        }
        Command::Recognize { wav } => {
            let client = acrcloud_client(&cfg)?;
            let sample =
                std::fs::read(&wav).with_context(|| format!("read {}", wav.display()))?;
            let found = client
                .recognize(sample, OffsetDateTime::now_utc())
                .await
                .context("recognize")?;
            print_recognition(&found);
        }
        Command::Listen { device } => {
            let device_cfg = cfg.device(device.as_deref())?;
            let client = acrcloud_client(&cfg)?;
            let socket = capture::bind(cfg.acrcloud.udp_port).await?;
            let found = capture::listen_and_recognize(&socket, &client, capture_settings(&cfg))
                .await
                .context("listen")?;
            print_recognition(&found);

            let dev = build_device(&cfg, device_cfg)?;
            let (tx, rx) = mpsc::channel::<Event>(256);
            tx.send(Event::Recognition(RecognitionEvent::Recognized(found)))
                .await
                .context("queue recognition")?;
            run_until_interrupted(dev.run(tx, rx, std::io::stdout())).await;
        }
        Command::Cache { cmd } => {
            let storage = storage::Storage::open(&cfg.cache_path())?;
            match cmd {
                CacheCommand::List { limit } => {
                    for (i, (track, has_lyrics)) in storage.recent(limit)?.iter().enumerate() {
                        let mark = if *has_lyrics { "lyrics" } else { "none" };
                        println!("{:02}. [{mark}] {track}", i + 1);
                    }
                }
                CacheCommand::Clear => {
                    let removed = storage.clear()?;
                    println!("Removed {removed} cached entries.");
                }
            }
        }
        Command::Config { cmd } => match cmd {
            ConfigCommand::Path => {
                let path = match cli.config {
                    Some(p) => p,
                    None => config::default_config_path().context("default config path")?,
                };
                println!("{}", path.display());
            }
        },
    }

    Ok(())
}

fn lyrics_provider(cfg: &config::Config) -> anyhow::Result<Arc<dyn LyricsProvider>> {
    let client = LrclibClient::new(
        &cfg.lyrics.base_url,
        Duration::from_secs(cfg.lyrics.timeout_secs),
    )?;
    Ok(Arc::new(LrclibProvider::new(client, cfg.lyrics.last_line_ms)))
}

fn acrcloud_client(cfg: &config::Config) -> anyhow::Result<AcrCloudClient> {
    if !cfg.has_acrcloud() {
        anyhow::bail!("set [acrcloud] host, access_key and access_secret in the config file");
    }
    let credentials = Arc::new(AcrCloudCredentials {
        host: cfg.acrcloud.host.clone(),
        access_key: cfg.acrcloud.access_key.clone(),
        access_secret: cfg.acrcloud.access_secret.clone(),
    });
    AcrCloudClient::new(credentials, Duration::from_secs(cfg.acrcloud.timeout_secs))
}

fn capture_settings(cfg: &config::Config) -> CaptureSettings {
    CaptureSettings {
        chunk_seconds: cfg.acrcloud.chunk_seconds,
        max_seconds: cfg.acrcloud.max_seconds,
    }
}

fn build_device(cfg: &config::Config, device: &config::DeviceConfig) -> anyhow::Result<Device> {
    let cache = LyricsCache::new(cfg.lyrics.memory_cache_size, Some(cfg.cache_path()));
    Ok(Device::new(device, &cfg.sync, lyrics_provider(cfg)?, cache))
}

async fn run_until_interrupted<F: std::future::Future>(work: F) {
    tokio::select! {
        _ = work => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
    }
}

fn print_recognition(found: &recognition::Recognition) {
    let secs = found.play_offset_ms / 1000;
    println!(
        "{} - {} at {:02}:{:02}",
        found.identity.artist(),
        found.identity.title(),
        secs / 60,
        secs % 60
    );
    if let Some(id) = &found.spotify_id {
        println!("spotify:track:{id}");
    }
}
