//! Configuration management for vcqpu.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (`VCQPU_TARGET`, `VCQPU_NUM_QPUS`, ...)
//! 2. Project-local config file (`./vcqpu.toml`)
//! 3. User config file (`~/.config/vcqpu/config.toml`)
//! 4. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # vcqpu.toml
//!
//! # Hardware generation: "vc4" (Pi 1-3) or "v3d" (Pi 4)
//! target = "vc4"
//!
//! # QPUs used by a launch
//! num_qpus = 8
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use crate::backend::Target;
use crate::emu::engine::DEFAULT_MAX_STEPS;

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Default heap size in bytes.
pub const DEFAULT_HEAP_SIZE: usize = 16 << 20;

/// Default submission timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// vcqpu configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Hardware generation to compile for.
    pub target: Option<Target>,

    /// QPUs used by a launch.
    pub num_qpus: Option<usize>,

    /// Heap size in bytes.
    pub heap_size: Option<usize>,

    /// Submission timeout in milliseconds.
    pub timeout_ms: Option<u64>,

    /// Emulator step budget per core.
    pub max_steps: Option<u64>,

    /// Merge independent add and mul instructions into one VC4 word.
    pub vc4_pairing: Option<bool>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `vcqpu.toml`
    /// 3. User config `~/.config/vcqpu/config.toml`
    /// 4. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        config.apply_env_overrides(|key| std::env::var(key).ok());

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    pub fn target(&self) -> Target {
        self.target.unwrap_or_default()
    }

    /// QPU count, defaulting to the largest count every target supports.
    pub fn num_qpus(&self) -> usize {
        self.num_qpus.unwrap_or(match self.target() {
            Target::Vc4 => 12,
            Target::V3d => 8,
        })
    }

    pub fn heap_size(&self) -> usize {
        self.heap_size.unwrap_or(DEFAULT_HEAP_SIZE)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS))
    }

    pub fn max_steps(&self) -> u64 {
        self.max_steps.unwrap_or(DEFAULT_MAX_STEPS)
    }

    pub fn vc4_pairing(&self) -> bool {
        self.vc4_pairing.unwrap_or(true)
    }

    /// Load user configuration from ~/.config/vcqpu/config.toml
    fn load_user_config() -> Option<Self> {
        Self::load_from_file(&Self::user_config_path()?)
    }

    /// Load project-local configuration from ./vcqpu.toml
    fn load_local_config() -> Option<Self> {
        Self::load_from_file(Path::new("vcqpu.toml"))
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    fn merge(&mut self, other: Self) {
        if other.target.is_some() {
            self.target = other.target;
        }
        if other.num_qpus.is_some() {
            self.num_qpus = other.num_qpus;
        }
        if other.heap_size.is_some() {
            self.heap_size = other.heap_size;
        }
        if other.timeout_ms.is_some() {
            self.timeout_ms = other.timeout_ms;
        }
        if other.max_steps.is_some() {
            self.max_steps = other.max_steps;
        }
        if other.vc4_pairing.is_some() {
            self.vc4_pairing = other.vc4_pairing;
        }
    }

    /// Apply environment variable overrides read through `var`.
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        fn parse<T: FromStr>(key: &str, value: Option<String>) -> Option<T>
        where
            T::Err: std::fmt::Display,
        {
            let value = value?;
            match value.parse() {
                Ok(v) => {
                    log::info!("Using {} from environment: {}", key, value);
                    Some(v)
                }
                Err(e) => {
                    log::warn!("Ignoring {}={}: {}", key, value, e);
                    None
                }
            }
        }

        if let Some(v) = parse("VCQPU_TARGET", var("VCQPU_TARGET")) {
            self.target = Some(v);
        }
        if let Some(v) = parse("VCQPU_NUM_QPUS", var("VCQPU_NUM_QPUS")) {
            self.num_qpus = Some(v);
        }
        if let Some(v) = parse("VCQPU_HEAP_SIZE", var("VCQPU_HEAP_SIZE")) {
            self.heap_size = Some(v);
        }
        if let Some(v) = parse("VCQPU_TIMEOUT_MS", var("VCQPU_TIMEOUT_MS")) {
            self.timeout_ms = Some(v);
        }
        if let Some(v) = parse("VCQPU_MAX_STEPS", var("VCQPU_MAX_STEPS")) {
            self.max_steps = Some(v);
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("vcqpu").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# vcqpu configuration
# Place this file at ~/.config/vcqpu/config.toml or ./vcqpu.toml

# Hardware generation: "vc4" (Pi 1-3) or "v3d" (Pi 4)
target = "vc4"

# QPUs per launch (vc4: 1-12, v3d: 1 or 8)
num_qpus = 12

# Heap for kernel buffers, in bytes
# heap_size = 16777216

# Give up on a launch after this many milliseconds
# timeout_ms = 10000

# Emulator step budget per core
# max_steps = 16777216

# Merge independent add/mul instructions into one VC4 word
# vc4_pairing = true
"#
        .to_string()
    }
}
