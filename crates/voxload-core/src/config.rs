use crate::error::ConfigError;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "voxload.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub chunks: ChunksConfig,

    #[serde(default)]
    pub pacing: PacingConfig,

    #[serde(default)]
    pub load: LoadConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    #[serde(default)]
    pub project_id: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: f64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_conversation_name")]
    pub conversation_name: String,

    #[serde(default = "default_source")]
    pub source: String,

    #[serde(default = "default_content_type")]
    pub content_type: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
            conversation_name: default_conversation_name(),
            source: default_source(),
            content_type: default_content_type(),
        }
    }
}

impl TargetConfig {
    pub fn request_timeout(&self) -> Duration {
        secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionMode {
    /// A random contiguous sub-range per conversation.
    #[default]
    Random,
    /// Every loaded chunk, in index order.
    All,
}

impl FromStr for SelectionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(SelectionMode::Random),
            "all" => Ok(SelectionMode::All),
            other => Err(ConfigError::Invalid(format!(
                "unknown chunk selection mode '{other}' (expected 'random' or 'all')"
            ))),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunksConfig {
    #[serde(default = "default_chunks_dir")]
    pub directory: PathBuf,

    #[serde(default)]
    pub start: u32,

    #[serde(default = "default_chunk_end")]
    pub end: u32,

    #[serde(default)]
    pub selection: SelectionMode,

    #[serde(default = "default_min_chunks")]
    pub min_chunks: usize,

    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
}

impl Default for ChunksConfig {
    fn default() -> Self {
        Self {
            directory: default_chunks_dir(),
            start: 0,
            end: default_chunk_end(),
            selection: SelectionMode::default(),
            min_chunks: default_min_chunks(),
            max_chunks: default_max_chunks(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PacingConfig {
    #[serde(default = "default_record_interval_secs")]
    pub record_interval_secs: f64,

    #[serde(default = "default_think_time_secs")]
    pub think_time_secs: f64,

    #[serde(default = "default_failure_backoff_secs")]
    pub failure_backoff_secs: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            record_interval_secs: default_record_interval_secs(),
            think_time_secs: default_think_time_secs(),
            failure_backoff_secs: default_failure_backoff_secs(),
        }
    }
}

impl PacingConfig {
    pub fn record_interval(&self) -> Duration {
        secs(self.record_interval_secs)
    }

    pub fn think_time(&self) -> Duration {
        secs(self.think_time_secs)
    }

    pub fn failure_backoff(&self) -> Duration {
        secs(self.failure_backoff_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorKind {
    /// Staged ramp over the total run duration.
    #[default]
    Ramping,
    /// Fixed VU pool sharing an iteration budget.
    SharedIterations,
}

impl FromStr for ExecutorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ramping" | "ramping-vus" => Ok(ExecutorKind::Ramping),
            "shared-iterations" => Ok(ExecutorKind::SharedIterations),
            other => Err(ConfigError::Invalid(format!(
                "unknown executor '{other}' (expected 'ramping' or 'shared-iterations')"
            ))),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoadConfig {
    #[serde(default)]
    pub executor: ExecutorKind,

    #[serde(default = "default_max_vus")]
    pub max_vus: usize,

    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: f64,

    #[serde(default = "default_graceful_drain_secs")]
    pub graceful_drain_secs: f64,

    #[serde(default = "default_iterations")]
    pub iterations: usize,

    #[serde(default = "default_max_duration_minutes")]
    pub max_duration_minutes: f64,

    #[serde(default = "default_true")]
    pub call_finish: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorKind::default(),
            max_vus: default_max_vus(),
            duration_minutes: default_duration_minutes(),
            graceful_drain_secs: default_graceful_drain_secs(),
            iterations: default_iterations(),
            max_duration_minutes: default_max_duration_minutes(),
            call_finish: default_true(),
        }
    }
}

impl LoadConfig {
    pub fn duration(&self) -> Duration {
        secs(self.duration_minutes * 60.0)
    }

    pub fn graceful_drain(&self) -> Duration {
        secs(self.graceful_drain_secs)
    }

    pub fn max_duration(&self) -> Duration {
        secs(self.max_duration_minutes * 60.0)
    }
}

/// Values supplied on the command line or through environment variables.
/// Every `Some` replaces the corresponding file/default value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub project_id: Option<String>,
    pub api_base: Option<String>,
    pub request_timeout_secs: Option<f64>,
    pub chunks_dir: Option<PathBuf>,
    pub start: Option<u32>,
    pub end: Option<u32>,
    pub selection: Option<SelectionMode>,
    pub min_chunks: Option<usize>,
    pub max_chunks: Option<usize>,
    pub record_interval_secs: Option<f64>,
    pub think_time_secs: Option<f64>,
    pub executor: Option<ExecutorKind>,
    pub max_vus: Option<usize>,
    pub duration_minutes: Option<f64>,
    pub graceful_drain_secs: Option<f64>,
    pub iterations: Option<usize>,
    pub max_duration_minutes: Option<f64>,
    pub call_finish: Option<bool>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_base() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout_secs() -> f64 {
    60.0
}

fn default_user_agent() -> String {
    "voxload/0.1 (mass load test)".to_string()
}

fn default_conversation_name() -> String {
    "voxload Mass Test".to_string()
}

fn default_source() -> String {
    "PORTAL_AUDIO".to_string()
}

fn default_content_type() -> String {
    "audio/webm".to_string()
}

fn default_chunks_dir() -> PathBuf {
    PathBuf::from("audioChunks")
}

fn default_chunk_end() -> u32 {
    25
}

fn default_min_chunks() -> usize {
    4
}

fn default_max_chunks() -> usize {
    10
}

fn default_record_interval_secs() -> f64 {
    30.0
}

fn default_think_time_secs() -> f64 {
    30.0
}

fn default_failure_backoff_secs() -> f64 {
    5.0
}

fn default_max_vus() -> usize {
    10
}

fn default_duration_minutes() -> f64 {
    10.0
}

fn default_graceful_drain_secs() -> f64 {
    30.0
}

fn default_iterations() -> usize {
    10
}

fn default_max_duration_minutes() -> f64 {
    30.0
}

fn default_true() -> bool {
    true
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Interpolate `${VAR}` patterns with environment variable values.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::Invalid(e.to_string()))?;
    let mut result = input.to_string();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(val) => {
                result = result.replace(&cap[0], &val);
            }
            Err(_) => return Err(ConfigError::EnvVarNotFound(var_name.to_string())),
        }
    }

    Ok(result)
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Invalid(message()))
    }
}

/// Longest accepted duration or timeout: one year.
const MAX_DURATION_SECS: f64 = 366.0 * 24.0 * 3600.0;

/// `value` is in units of `unit_secs` seconds.
fn ensure_positive(name: &str, value: f64, unit_secs: f64) -> Result<(), ConfigError> {
    ensure(value.is_finite() && value > 0.0, || {
        format!("{name} must be a positive number (got {value})")
    })?;
    ensure_within_limit(name, value, unit_secs)
}

fn ensure_non_negative(name: &str, value: f64, unit_secs: f64) -> Result<(), ConfigError> {
    ensure(value.is_finite() && value >= 0.0, || {
        format!("{name} must not be negative (got {value})")
    })?;
    ensure_within_limit(name, value, unit_secs)
}

fn ensure_within_limit(name: &str, value: f64, unit_secs: f64) -> Result<(), ConfigError> {
    ensure(value * unit_secs <= MAX_DURATION_SECS, || {
        format!("{name} is too large (got {value}, limit is one year)")
    })
}

impl AppConfig {
    /// Load configuration from a TOML file, with environment variable interpolation.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load `path` if given; otherwise the default file when present, else built-in defaults.
    pub fn load_optional(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load_from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parse configuration from a TOML string (for testing).
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(s)?;
        let config: AppConfig = toml::from_str(&interpolated)?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        let ConfigOverrides {
            log_level,
            project_id,
            api_base,
            request_timeout_secs,
            chunks_dir,
            start,
            end,
            selection,
            min_chunks,
            max_chunks,
            record_interval_secs,
            think_time_secs,
            executor,
            max_vus,
            duration_minutes,
            graceful_drain_secs,
            iterations,
            max_duration_minutes,
            call_finish,
        } = overrides;

        if let Some(v) = log_level {
            self.general.log_level = v;
        }
        if let Some(v) = project_id {
            self.target.project_id = v;
        }
        if let Some(v) = api_base {
            self.target.api_base = v;
        }
        if let Some(v) = request_timeout_secs {
            self.target.request_timeout_secs = v;
        }
        if let Some(v) = chunks_dir {
            self.chunks.directory = v;
        }
        if let Some(v) = start {
            self.chunks.start = v;
        }
        if let Some(v) = end {
            self.chunks.end = v;
        }
        if let Some(v) = selection {
            self.chunks.selection = v;
        }
        if let Some(v) = min_chunks {
            self.chunks.min_chunks = v;
        }
        if let Some(v) = max_chunks {
            self.chunks.max_chunks = v;
        }
        if let Some(v) = record_interval_secs {
            self.pacing.record_interval_secs = v;
        }
        if let Some(v) = think_time_secs {
            self.pacing.think_time_secs = v;
        }
        if let Some(v) = executor {
            self.load.executor = v;
        }
        if let Some(v) = max_vus {
            self.load.max_vus = v;
        }
        if let Some(v) = duration_minutes {
            self.load.duration_minutes = v;
        }
        if let Some(v) = graceful_drain_secs {
            self.load.graceful_drain_secs = v;
        }
        if let Some(v) = iterations {
            self.load.iterations = v;
        }
        if let Some(v) = max_duration_minutes {
            self.load.max_duration_minutes = v;
        }
        if let Some(v) = call_finish {
            self.load.call_finish = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(!self.target.project_id.trim().is_empty(), || {
            "target.project_id is required (set PROJECT_ID)".to_string()
        })?;
        ensure(!self.target.api_base.trim().is_empty(), || {
            "target.api_base must not be empty".to_string()
        })?;
        ensure_positive("target.request_timeout_secs", self.target.request_timeout_secs, 1.0)?;

        ensure(self.chunks.end >= self.chunks.start, || {
            format!(
                "chunks.end ({}) must not be below chunks.start ({})",
                self.chunks.end, self.chunks.start
            )
        })?;
        ensure(self.chunks.min_chunks >= 1, || {
            "chunks.min_chunks must be at least 1".to_string()
        })?;
        ensure(self.chunks.max_chunks >= self.chunks.min_chunks, || {
            format!(
                "chunks.max_chunks ({}) must not be below chunks.min_chunks ({})",
                self.chunks.max_chunks, self.chunks.min_chunks
            )
        })?;

        ensure_non_negative("pacing.record_interval_secs", self.pacing.record_interval_secs, 1.0)?;
        ensure_non_negative("pacing.think_time_secs", self.pacing.think_time_secs, 1.0)?;
        ensure_non_negative("pacing.failure_backoff_secs", self.pacing.failure_backoff_secs, 1.0)?;

        ensure(self.load.max_vus >= 1, || "load.max_vus must be at least 1".to_string())?;
        ensure_non_negative("load.graceful_drain_secs", self.load.graceful_drain_secs, 1.0)?;
        match self.load.executor {
            ExecutorKind::Ramping => {
                ensure_positive("load.duration_minutes", self.load.duration_minutes, 60.0)?;
            }
            ExecutorKind::SharedIterations => {
                ensure(self.load.iterations >= 1, || {
                    "load.iterations must be at least 1".to_string()
                })?;
                ensure_positive("load.max_duration_minutes", self.load.max_duration_minutes, 60.0)?;
            }
        }

        Ok(())
    }
}
