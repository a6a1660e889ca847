use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub mod defaults;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub paths: PathsConfig,
    pub acrcloud: AcrCloudConfig,
    pub lyrics: LyricsConfig,
    pub sync: SyncConfig,
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcrCloudConfig {
    /// e.g. identify-eu-west-1.acrcloud.com
    pub host: String,
    pub access_key: String,
    pub access_secret: String,
    pub timeout_secs: u64,
    /// UDP port devices stream PCM samples to.
    pub udp_port: u16,
    pub chunk_seconds: u32,
    pub max_seconds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LyricsConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// How long the final line stays up when the track length is unknown.
    pub last_line_ms: u64,
    /// Entries kept in the in-memory cache in front of SQLite.
    pub memory_cache_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub tick_ms: u64,
    pub seek_threshold_ms: u64,
    pub recognition_latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub name: String,
    /// Media player entity whose reports drive this device. Empty takes
    /// reports from any player.
    pub media_player: String,
    /// Whether audio recognition may run for this device.
    pub tagging_enabled: bool,
    /// Content id prefixes treated as radio.
    pub radio_prefixes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        defaults::defaults()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let proj = ProjectDirs::from("dev", "music-companion", "music-companion");
        let data_dir = proj
            .as_ref()
            .map(|p| p.data_dir().to_path_buf())
            .unwrap_or_else(|| std::env::temp_dir().join("music-companion"));
        Self { data_dir }
    }
}

impl Default for AcrCloudConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            access_key: String::new(),
            access_secret: String::new(),
            timeout_secs: defaults::ACRCLOUD_TIMEOUT_SECS,
            udp_port: crate::recognition::capture::DEFAULT_UDP_PORT,
            chunk_seconds: crate::recognition::capture::DEFAULT_CHUNK_SECONDS,
            max_seconds: crate::recognition::capture::DEFAULT_MAX_SECONDS,
        }
    }
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            base_url: crate::lyrics::LrclibClient::DEFAULT_BASE_URL.to_string(),
            timeout_secs: defaults::LYRICS_TIMEOUT_SECS,
            last_line_ms: crate::lyrics::parser::DEFAULT_LAST_LINE_MS,
            memory_cache_size: defaults::MEMORY_CACHE_SIZE,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_ms: defaults::TICK_MS,
            seek_threshold_ms: crate::tracker::DEFAULT_SEEK_THRESHOLD_MS,
            recognition_latency_ms: defaults::RECOGNITION_LATENCY_MS,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            media_player: String::new(),
            tagging_enabled: false,
            radio_prefixes: vec![crate::tracker::DEFAULT_RADIO_PREFIX.to_string()],
        }
    }
}

impl Config {
    /// True when ACRCloud credentials are filled in.
    pub fn has_acrcloud(&self) -> bool {
        !self.acrcloud.host.is_empty()
            && !self.acrcloud.access_key.is_empty()
            && !self.acrcloud.access_secret.is_empty()
    }

    /// Device by name, or the first configured one.
    pub fn device(&self, name: Option<&str>) -> anyhow::Result<&DeviceConfig> {
        match name {
            Some(name) => self
                .devices
                .iter()
                .find(|d| d.name == name)
                .with_context(|| format!("no device named {name:?} in config")),
            None => self.devices.first().context("no devices configured"),
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        self.paths.data_dir.join("cache.sqlite3")
    }
}

pub fn save(cfg: &Config, override_path: Option<&Path>) -> anyhow::Result<()> {
    let path = match override_path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };
    write_private(&path, cfg)
}

fn write_private(path: &Path, cfg: &Config) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }
    let raw = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(path, raw).with_context(|| format!("write {}", path.display()))?;
    // Holds the ACRCloud secret
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    Ok(())
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let proj = ProjectDirs::from("dev", "music-companion", "music-companion")
        .context("ProjectDirs unavailable")?;
    Ok(proj.config_dir().join("config.toml"))
}

pub fn load(override_path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match override_path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        let cfg = defaults::defaults();
        write_private(&path, &cfg).context("write default config")?;
        tracing::info!(path = %path.display(), "created default config");
        return Ok(cfg);
    }

    let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cfg = toml::from_str::<Config>(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
