use super::{
    AcrCloudConfig, Config, DeviceConfig, LoggingConfig, LyricsConfig, PathsConfig, SyncConfig,
};

pub const LOG_LEVEL: &str = "info";
pub const TICK_MS: u64 = 100;
pub const RECOGNITION_LATENCY_MS: u64 = 2_000;
pub const LYRICS_TIMEOUT_SECS: u64 = 10;
pub const ACRCLOUD_TIMEOUT_SECS: u64 = 10;
pub const MEMORY_CACHE_SIZE: usize = 64;

/// Config written on first run: every section at its default plus one
/// device so `follow` works out of the box.
pub fn defaults() -> Config {
    Config {
        logging: LoggingConfig::default(),
        paths: PathsConfig::default(),
        acrcloud: AcrCloudConfig::default(),
        lyrics: LyricsConfig::default(),
        sync: SyncConfig::default(),
        devices: vec![DeviceConfig::default()],
    }
}
