use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for `max_length`: BERT-family position embeddings stop at 512.
pub const MAX_SUPPORTED_LENGTH: usize = 512;

/// File name of the ONNX graph inside the model directory.
pub const MODEL_FILE: &str = "model.onnx";

/// File name of the HuggingFace tokenizer definition inside the model directory.
pub const TOKENIZER_FILE: &str = "tokenizer.json";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Upper bound on one request's pipeline run. `0` disables the bound.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    pub dir: String,
    pub max_length: usize,
    pub intra_threads: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8091,
            log_level: "info".into(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dir: "/model".into(),
            max_length: 128,
            intra_threads: 4,
        }
    }
}

/// Returns the default config file path: `<config dir>/embed-svc/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("embed-svc").join("config.toml"))
}

impl ServiceConfig {
    /// Load config from the default TOML location (if any) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_layered(default_config_path().as_deref())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_layered(Some(path.as_ref()))
    }

    /// Defaults, then the TOML file when it exists, then env overrides, then validation.
    fn load_layered(path: Option<&Path>) -> Result<Self> {
        let mut config = match path.filter(|p| p.exists()) {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                toml::from_str(&contents).context("failed to parse config TOML")?
            }
            None => ServiceConfig::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides (MODEL_DIR, PORT, MAX_LENGTH, HOST, LOG_LEVEL,
    /// REQUEST_TIMEOUT_SECS) looked up through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(val) = lookup("MODEL_DIR") {
            self.model.dir = val;
        }
        if let Some(val) = lookup("PORT") {
            self.server.port = val
                .parse()
                .with_context(|| format!("PORT must be a port number, got {val:?}"))?;
        }
        if let Some(val) = lookup("MAX_LENGTH") {
            self.model.max_length = val
                .parse()
                .with_context(|| format!("MAX_LENGTH must be an integer, got {val:?}"))?;
        }
        if let Some(val) = lookup("HOST") {
            self.server.host = val;
        }
        if let Some(val) = lookup("LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Some(val) = lookup("REQUEST_TIMEOUT_SECS") {
            self.server.request_timeout_secs = val.parse().with_context(|| {
                format!("REQUEST_TIMEOUT_SECS must be an integer, got {val:?}")
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            (1..=MAX_SUPPORTED_LENGTH).contains(&self.model.max_length),
            "max_length must be between 1 and {MAX_SUPPORTED_LENGTH}, got {}",
            self.model.max_length
        );
        anyhow::ensure!(self.server.port != 0, "port must be nonzero");
        anyhow::ensure!(self.model.intra_threads > 0, "intra_threads must be positive");
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        match self.server.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl ModelConfig {
    /// Resolve the model directory, expanding `~` if needed.
    pub fn resolved_dir(&self) -> PathBuf {
        expand_tilde(&self.dir)
    }

    pub fn model_path(&self) -> PathBuf {
        self.resolved_dir().join(MODEL_FILE)
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.resolved_dir().join(TOKENIZER_FILE)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
