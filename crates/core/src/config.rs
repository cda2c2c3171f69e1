use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub surface: SurfaceConfig,
    pub timing: TimingConfig,
    pub stall: StallConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct SurfaceConfig {
    pub mode: SurfaceMode,
    pub bridge_url: Option<String>,
    /// Settle time after the initial navigation before the session starts
    /// reaching for a human.
    pub navigation_settle_secs: u64,
}

/// Timer defaults for the session runtime. All values are wall-clock and
/// deliberately coarse; the runtime never promises responsiveness faster than
/// the polling interval.
#[derive(Clone, Debug)]
pub struct TimingConfig {
    pub poll_interval_secs: u64,
    pub debounce_secs: u64,
    pub watchdog_secs: u64,
    /// Watchdog interval used when the remote snapshot suggests the other
    /// party is composing a reply.
    pub watchdog_composing_secs: u64,
    pub typing_suppression_secs: u64,
}

#[derive(Clone, Debug)]
pub struct StallConfig {
    pub initial_delay_secs: u64,
    pub min_interval_secs: u64,
    pub jitter_max_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceMode {
    Noop,
    HttpBridge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub surface_mode: Option<SurfaceMode>,
    pub bridge_url: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 60,
                max_retries: 2,
            },
            surface: SurfaceConfig {
                mode: SurfaceMode::Noop,
                bridge_url: None,
                navigation_settle_secs: 3,
            },
            timing: TimingConfig {
                poll_interval_secs: 5,
                debounce_secs: 2,
                watchdog_secs: 15,
                watchdog_composing_secs: 300,
                typing_suppression_secs: 20,
            },
            stall: StallConfig {
                initial_delay_secs: 20,
                min_interval_secs: 45,
                jitter_max_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn watchdog(&self) -> Duration {
        Duration::from_secs(self.watchdog_secs)
    }

    pub fn watchdog_composing(&self) -> Duration {
        Duration::from_secs(self.watchdog_composing_secs)
    }

    pub fn typing_suppression(&self) -> Duration {
        Duration::from_secs(self.typing_suppression_secs)
    }
}

impl StallConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }

    pub fn jitter_max(&self) -> Duration {
        Duration::from_secs(self.jitter_max_secs)
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for SurfaceMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "noop" => Ok(Self::Noop),
            "http_bridge" | "bridge" => Ok(Self::HttpBridge),
            other => Err(ConfigError::Validation(format!(
                "unsupported surface mode `{other}` (expected noop|http_bridge)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("parley.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(surface) = patch.surface {
            if let Some(mode) = surface.mode {
                self.surface.mode = mode;
            }
            if let Some(bridge_url) = surface.bridge_url {
                self.surface.bridge_url = Some(bridge_url);
            }
            if let Some(settle) = surface.navigation_settle_secs {
                self.surface.navigation_settle_secs = settle;
            }
        }

        if let Some(timing) = patch.timing {
            if let Some(value) = timing.poll_interval_secs {
                self.timing.poll_interval_secs = value;
            }
            if let Some(value) = timing.debounce_secs {
                self.timing.debounce_secs = value;
            }
            if let Some(value) = timing.watchdog_secs {
                self.timing.watchdog_secs = value;
            }
            if let Some(value) = timing.watchdog_composing_secs {
                self.timing.watchdog_composing_secs = value;
            }
            if let Some(value) = timing.typing_suppression_secs {
                self.timing.typing_suppression_secs = value;
            }
        }

        if let Some(stall) = patch.stall {
            if let Some(value) = stall.initial_delay_secs {
                self.stall.initial_delay_secs = value;
            }
            if let Some(value) = stall.min_interval_secs {
                self.stall.min_interval_secs = value;
            }
            if let Some(value) = stall.jitter_max_secs {
                self.stall.jitter_max_secs = value;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PARLEY_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("PARLEY_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PARLEY_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("PARLEY_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("PARLEY_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("PARLEY_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("PARLEY_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("PARLEY_SURFACE_MODE") {
            self.surface.mode = value.parse()?;
        }
        if let Some(value) = read_env("PARLEY_BRIDGE_URL") {
            self.surface.bridge_url = Some(value);
        }

        if let Some(value) = read_env("PARLEY_POLL_INTERVAL_SECS") {
            self.timing.poll_interval_secs = parse_u64("PARLEY_POLL_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_DEBOUNCE_SECS") {
            self.timing.debounce_secs = parse_u64("PARLEY_DEBOUNCE_SECS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_WATCHDOG_SECS") {
            self.timing.watchdog_secs = parse_u64("PARLEY_WATCHDOG_SECS", &value)?;
        }

        let log_level = read_env("PARLEY_LOGGING_LEVEL").or_else(|| read_env("PARLEY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PARLEY_LOGGING_FORMAT").or_else(|| read_env("PARLEY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(provider) = overrides.llm_provider {
            self.llm.provider = provider;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(api_key));
        }
        if let Some(mode) = overrides.surface_mode {
            self.surface.mode = mode;
        }
        if let Some(bridge_url) = overrides.bridge_url {
            self.surface.bridge_url = Some(bridge_url);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_surface(&self.surface)?;
        validate_timing(&self.timing)?;
        validate_stall(&self.stall)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("parley.toml"), PathBuf::from("config/parley.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_surface(surface: &SurfaceConfig) -> Result<(), ConfigError> {
    if surface.mode == SurfaceMode::HttpBridge {
        let missing =
            surface.bridge_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "surface.bridge_url is required when surface.mode = http_bridge".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_timing(timing: &TimingConfig) -> Result<(), ConfigError> {
    if timing.poll_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "timing.poll_interval_secs must be greater than zero".to_string(),
        ));
    }
    if timing.debounce_secs >= timing.watchdog_secs {
        return Err(ConfigError::Validation(
            "timing.debounce_secs must be shorter than timing.watchdog_secs".to_string(),
        ));
    }
    if timing.watchdog_composing_secs < timing.watchdog_secs {
        return Err(ConfigError::Validation(
            "timing.watchdog_composing_secs must not be shorter than timing.watchdog_secs"
                .to_string(),
        ));
    }
    if timing.typing_suppression_secs == 0 {
        return Err(ConfigError::Validation(
            "timing.typing_suppression_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_stall(stall: &StallConfig) -> Result<(), ConfigError> {
    if stall.min_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "stall.min_interval_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
    let level = logging.level.trim().to_ascii_lowercase();
    if !LEVELS.contains(&level.as_str()) {
        return Err(ConfigError::Validation(format!(
            "logging.level must be one of trace|debug|info|warn|error, got `{}`",
            logging.level
        )));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    surface: Option<SurfacePatch>,
    timing: Option<TimingPatch>,
    stall: Option<StallPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SurfacePatch {
    mode: Option<SurfaceMode>,
    bridge_url: Option<String>,
    navigation_settle_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TimingPatch {
    poll_interval_secs: Option<u64>,
    debounce_secs: Option<u64>,
    watchdog_secs: Option<u64>,
    watchdog_composing_secs: Option<u64>,
    typing_suppression_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StallPatch {
    initial_delay_secs: Option<u64>,
    min_interval_secs: Option<u64>,
    jitter_max_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{AppConfig, ConfigError, LlmProvider, LoadOptions, SurfaceMode};

    #[test]
    fn defaults_validate_cleanly() {
        let config = AppConfig::default();
        config.validate().expect("defaults must be valid");
        assert_eq!(config.timing.debounce_secs, 2);
        assert_eq!(config.timing.watchdog_secs, 15);
        assert_eq!(config.stall.initial_delay_secs, 20);
    }

    #[test]
    fn file_patch_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
[llm]
provider = "anthropic"
api_key = "sk-test"
model = "claude-sonnet"

[timing]
debounce_secs = 1
watchdog_secs = 10

[surface]
mode = "noop"
"#
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            ..LoadOptions::default()
        })
        .expect("config should load");

        assert_eq!(config.llm.provider, LlmProvider::Anthropic);
        assert_eq!(config.llm.model, "claude-sonnet");
        assert_eq!(config.timing.debounce_secs, 1);
        assert_eq!(config.timing.watchdog_secs, 10);
        assert_eq!(config.surface.mode, SurfaceMode::Noop);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some("does-not-exist.toml".into()),
            require_file: true,
            ..LoadOptions::default()
        });
        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn bridge_mode_requires_bridge_url() {
        let mut config = AppConfig::default();
        config.surface.mode = SurfaceMode::HttpBridge;
        let error = config.validate().expect_err("bridge url is required");
        assert!(matches!(error, ConfigError::Validation(_)));
    }

    #[test]
    fn debounce_must_stay_below_watchdog() {
        let mut config = AppConfig::default();
        config.timing.debounce_secs = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    fn api_key_required_for_hosted_providers() {
        let mut config = AppConfig::default();
        config.llm.provider = LlmProvider::Anthropic;
        config.llm.api_key = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn interpolation_reports_unterminated_expression() {
        let error =
            super::interpolate_env_vars("key = \"${UNTERMINATED\"").expect_err("must fail");
        assert!(matches!(error, ConfigError::UnterminatedInterpolation));
    }
}
