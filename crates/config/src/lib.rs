//! Configuration loading, validation, and management for CaseDraft.
//!
//! Loads configuration from `~/.casedraft/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! Every limit that shapes a request lives here: the token budget and its
//! category caps, evidence selection limits, pipeline stage settings, and
//! per-class rate limits. None of it is mutated at run time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.casedraft/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default generation provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Token budget and category caps
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Evidence selection and per-item caps
    #[serde(default)]
    pub assembly: AssemblyConfig,

    /// Staged generation settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Admission control (per-identity, per-class quotas)
    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_provider() -> String {
    "anthropic".into()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("providers", &self.providers)
            .field("budget", &self.budget)
            .field("assembly", &self.assembly)
            .field("pipeline", &self.pipeline)
            .field("rate_limits", &self.rate_limits)
            .field("gateway", &self.gateway)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// HTTP timeout for a single generation call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ── Budget ────────────────────────────────────────────────────────────────

/// Token budget in estimated tokens.
///
/// `total_tokens` deliberately sits below `context_window`; the gap is
/// headroom for estimation error and must not be configured away.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Total capacity the assembled prompt plus output may use
    #[serde(default = "default_total_tokens")]
    pub total_tokens: usize,

    /// The backend's hard context limit
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    #[serde(default = "default_source_material")]
    pub source_material: usize,

    #[serde(default = "default_reference_material")]
    pub reference_material: usize,

    #[serde(default = "default_precedent_material")]
    pub precedent_material: usize,

    #[serde(default = "default_instructions")]
    pub instructions: usize,

    #[serde(default = "default_reserved_output")]
    pub reserved_output: usize,
}

fn default_total_tokens() -> usize {
    150_000
}
fn default_context_window() -> usize {
    200_000
}
fn default_source_material() -> usize {
    60_000
}
fn default_reference_material() -> usize {
    40_000
}
fn default_precedent_material() -> usize {
    20_000
}
fn default_instructions() -> usize {
    20_000
}
fn default_reserved_output() -> usize {
    10_000
}

impl BudgetConfig {
    /// Sum of all category caps, or `None` if it overflows `usize`.
    pub fn caps_total(&self) -> Option<usize> {
        [
            self.source_material,
            self.reference_material,
            self.precedent_material,
            self.instructions,
            self.reserved_output,
        ]
        .into_iter()
        .try_fold(0usize, |sum, cap| sum.checked_add(cap))
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            total_tokens: default_total_tokens(),
            context_window: default_context_window(),
            source_material: default_source_material(),
            reference_material: default_reference_material(),
            precedent_material: default_precedent_material(),
            instructions: default_instructions(),
            reserved_output: default_reserved_output(),
        }
    }
}

// ── Assembly ──────────────────────────────────────────────────────────────

/// How many retrieved items are considered, and how large each may be.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// Reference hits considered, highest relevance first
    #[serde(default = "default_max_reference_hits")]
    pub max_reference_hits: usize,

    /// Precedent hits considered, highest relevance first
    #[serde(default = "default_max_precedent_hits")]
    pub max_precedent_hits: usize,

    /// Cap on the raw text of one source document
    #[serde(default = "default_source_item_tokens")]
    pub source_item_tokens: usize,

    /// Cap on one reference hit's content
    #[serde(default = "default_reference_item_tokens")]
    pub reference_item_tokens: usize,

    /// Cap on each free-text field of one precedent
    #[serde(default = "default_precedent_field_tokens")]
    pub precedent_field_tokens: usize,
}

fn default_max_reference_hits() -> usize {
    10
}
fn default_max_precedent_hits() -> usize {
    5
}
fn default_source_item_tokens() -> usize {
    5_000
}
fn default_reference_item_tokens() -> usize {
    3_000
}
fn default_precedent_field_tokens() -> usize {
    2_000
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            max_reference_hits: default_max_reference_hits(),
            max_precedent_hits: default_max_precedent_hits(),
            source_item_tokens: default_source_item_tokens(),
            reference_item_tokens: default_reference_item_tokens(),
            precedent_field_tokens: default_precedent_field_tokens(),
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────

/// What to do when tone finishing drops a section marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerPolicy {
    /// Fail the tone-finishing stage.
    #[default]
    Enforce,
    /// Log a warning and keep the output.
    Warn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Run the three-stage pipeline. `false` selects the single-call
    /// direct pipeline.
    #[serde(default = "default_true")]
    pub staged: bool,

    /// Per-stage deadline in seconds (0 = none beyond the HTTP timeout)
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,

    /// Max output tokens per generation call
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default = "default_fact_temperature")]
    pub fact_extraction_temperature: f32,

    #[serde(default = "default_structuring_temperature")]
    pub structuring_temperature: f32,

    #[serde(default = "default_tone_temperature")]
    pub tone_finishing_temperature: f32,

    #[serde(default)]
    pub marker_policy: MarkerPolicy,
}

fn default_stage_timeout_secs() -> u64 {
    180
}
fn default_max_output_tokens() -> u32 {
    8_192
}
fn default_fact_temperature() -> f32 {
    0.2
}
fn default_structuring_temperature() -> f32 {
    0.3
}
fn default_tone_temperature() -> f32 {
    0.4
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            staged: true,
            stage_timeout_secs: default_stage_timeout_secs(),
            max_output_tokens: default_max_output_tokens(),
            fact_extraction_temperature: default_fact_temperature(),
            structuring_temperature: default_structuring_temperature(),
            tone_finishing_temperature: default_tone_temperature(),
            marker_policy: MarkerPolicy::default(),
        }
    }
}

// ── Rate limits ───────────────────────────────────────────────────────────

/// Where sliding-window counters live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterBackend {
    /// In-process; counters are per gateway instance.
    #[default]
    Memory,
    /// SQLite file shared by every process pointing at it.
    Sqlite,
}

/// One operation class's quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLimit {
    /// Requests allowed per window
    pub limit: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl ClassLimit {
    pub const fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub backend: CounterBackend,

    /// SQLite database path (only for `backend = "sqlite"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<String>,

    /// General API traffic per authenticated caller
    #[serde(default = "default_api_limit")]
    pub api: ClassLimit,

    /// Final artifact generation
    #[serde(default = "default_generation_limit")]
    pub generation: ClassLimit,

    /// Analysis-only requests (context preview)
    #[serde(default = "default_analysis_limit")]
    pub analysis: ClassLimit,

    /// Upload-style requests
    #[serde(default = "default_upload_limit")]
    pub upload: ClassLimit,

    /// Unauthenticated traffic, keyed by client address
    #[serde(default = "default_anonymous_limit")]
    pub anonymous: ClassLimit,
}

fn default_api_limit() -> ClassLimit {
    ClassLimit::new(60, 60)
}
fn default_generation_limit() -> ClassLimit {
    ClassLimit::new(10, 3_600)
}
fn default_analysis_limit() -> ClassLimit {
    ClassLimit::new(20, 3_600)
}
fn default_upload_limit() -> ClassLimit {
    ClassLimit::new(30, 3_600)
}
fn default_anonymous_limit() -> ClassLimit {
    ClassLimit::new(100, 60)
}

impl RateLimitConfig {
    fn classes(&self) -> [(&'static str, ClassLimit); 5] {
        [
            ("api", self.api),
            ("generation", self.generation),
            ("analysis", self.analysis),
            ("upload", self.upload),
            ("anonymous", self.anonymous),
        ]
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CounterBackend::default(),
            sqlite_path: None,
            api: default_api_limit(),
            generation: default_generation_limit(),
            analysis: default_analysis_limit(),
            upload: default_upload_limit(),
            anonymous: default_anonymous_limit(),
        }
    }
}

// ── Gateway ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Bearer tokens accepted by the gateway, each bound to a caller id
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_tokens: Vec<ApiTokenConfig>,

    /// Maximum request body size in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_port() -> u16 {
    42618
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_body_limit() -> usize {
    16 * 1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            api_tokens: vec![],
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ApiTokenConfig {
    pub token: String,
    pub caller_id: String,
}

impl std::fmt::Debug for ApiTokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiTokenConfig")
            .field("token", &"[REDACTED]")
            .field("caller_id", &self.caller_id)
            .finish()
    }
}

// ── Loading ───────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from the default path (~/.casedraft/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `CASEDRAFT_API_KEY` (highest priority)
    /// - `ANTHROPIC_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("CASEDRAFT_API_KEY")
                .ok()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("CASEDRAFT_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("CASEDRAFT_MODEL") {
            config.default_model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".casedraft")
    }

    /// Get the configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Resolved SQLite path for the shared rate-limit counters.
    pub fn rate_limit_db_path(&self) -> PathBuf {
        self.rate_limits
            .sqlite_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::config_dir().join("ratelimit.db"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let budget = &self.budget;
        if budget.total_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "budget.total_tokens must be > 0".into(),
            ));
        }
        if budget.total_tokens > budget.context_window {
            return Err(ConfigError::ValidationError(format!(
                "budget.total_tokens ({}) exceeds budget.context_window ({})",
                budget.total_tokens, budget.context_window
            )));
        }
        match budget.caps_total() {
            Some(caps) if caps <= budget.total_tokens => {}
            Some(caps) => {
                return Err(ConfigError::ValidationError(format!(
                    "budget category caps sum to {} but total_tokens is {}",
                    caps, budget.total_tokens
                )));
            }
            None => {
                return Err(ConfigError::ValidationError(
                    "budget category caps overflow when summed".into(),
                ));
            }
        }

        let assembly = &self.assembly;
        if assembly.source_item_tokens == 0
            || assembly.reference_item_tokens == 0
            || assembly.precedent_field_tokens == 0
        {
            return Err(ConfigError::ValidationError(
                "assembly per-item caps must be > 0".into(),
            ));
        }

        let pipeline = &self.pipeline;
        for (name, t) in [
            ("fact_extraction_temperature", pipeline.fact_extraction_temperature),
            ("structuring_temperature", pipeline.structuring_temperature),
            ("tone_finishing_temperature", pipeline.tone_finishing_temperature),
        ] {
            if !(0.0..=1.0).contains(&t) {
                return Err(ConfigError::ValidationError(format!(
                    "pipeline.{name} must be between 0.0 and 1.0"
                )));
            }
        }
        if pipeline.max_output_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.max_output_tokens must be > 0".into(),
            ));
        }

        for (name, class) in self.rate_limits.classes() {
            if class.limit == 0 || class.window_secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "rate_limits.{name} needs a non-zero limit and window"
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for `init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            providers: HashMap::new(),
            budget: BudgetConfig::default(),
            assembly: AssemblyConfig::default(),
            pipeline: PipelineConfig::default(),
            rate_limits: RateLimitConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
