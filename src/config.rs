use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            ingest: IngestConfig::default(),
            similarity: SimilarityConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/fragments.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Archive entries processed beyond this count are skipped, not fatal.
    #[serde(default = "default_max_archive_entries")]
    pub max_archive_entries: usize,
    /// Per-entry decompressed byte ceiling; oversize entries are skipped.
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_archive_entries: default_max_archive_entries(),
            max_entry_bytes: default_max_entry_bytes(),
        }
    }
}

fn default_max_archive_entries() -> usize {
    100
}
fn default_max_entry_bytes() -> u64 {
    10 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimilarityConfig {
    /// Interactive mode: minimum score for a related-fragment entry.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Batch mode: minimum score for a signal to reach the log.
    #[serde(default = "default_batch_threshold")]
    pub batch_threshold: f64,
    #[serde(default = "default_signal_log")]
    pub signal_log: PathBuf,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            top_k: default_top_k(),
            batch_threshold: default_batch_threshold(),
            signal_log: default_signal_log(),
        }
    }
}

fn default_threshold() -> f64 {
    crate::similarity::DEFAULT_THRESHOLD
}
fn default_top_k() -> usize {
    crate::similarity::DEFAULT_TOP_K
}
fn default_batch_threshold() -> f64 {
    crate::similarity::DEFAULT_BATCH_THRESHOLD
}
fn default_signal_log() -> PathBuf {
    PathBuf::from("logs/signals.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load the config file if it exists; otherwise fall back to defaults so
/// commands can run without one.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.ingest.max_archive_entries == 0 {
        anyhow::bail!("ingest.max_archive_entries must be >= 1");
    }
    if config.ingest.max_entry_bytes == 0 {
        anyhow::bail!("ingest.max_entry_bytes must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.similarity.threshold) {
        anyhow::bail!("similarity.threshold must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&config.similarity.batch_threshold) {
        anyhow::bail!("similarity.batch_threshold must be in [0.0, 1.0]");
    }
    if config.similarity.top_k == 0 {
        anyhow::bail!("similarity.top_k must be >= 1");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        validate(&Config::default()).unwrap();
    }

    #[test]
    fn parses_full_config() {
        let toml = r#"
[db]
path = "data/test.sqlite"

[ingest]
max_archive_entries = 10
max_entry_bytes = 4096

[similarity]
threshold = 0.3
top_k = 3
batch_threshold = 0.8
signal_log = "out/signals.json"

[server]
bind = "127.0.0.1:9000"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.ingest.max_archive_entries, 10);
        assert_eq!(config.similarity.top_k, 3);
        assert_eq!(config.server.bind, "127.0.0.1:9000");
    }

    #[test]
    fn bare_section_headers_fall_back_to_defaults() {
        let toml = "[db]\n[server]\n[ingest]\n[similarity]\n";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.db.path, Config::default().db.path);
        assert_eq!(config.server.bind, Config::default().server.bind);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut config = Config::default();
        config.similarity.batch_threshold = 1.5;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_zero_archive_bound() {
        let mut config = Config::default();
        config.ingest.max_archive_entries = 0;
        assert!(validate(&config).is_err());
    }
}
