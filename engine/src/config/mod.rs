//! Configuration management
//!
//! This module handles loading, validation, and management of the Somnus configuration.
//! Configuration is stored in TOML format at ~/.somnus/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **llm**: Model tier routing and provider settings
//! - **quality**: Metric threshold table for the quality gate
//! - **resilience**: Attempt cap, backoff and cost ledger settings
//! - **verification**: Rule and acceptance thresholds for the verification pipeline
//! - **memory**: Summarization window and session history retention
//!
//! # Examples
//!
//! ```no_run
//! use somnus_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Data dir: {:?}", config.core.data_dir);
//! println!("Default tier: {}", config.llm.default_tier);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use sdk::types::ModelTier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// LLM provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Quality gate thresholds
    #[serde(default)]
    pub quality: QualityConfig,

    /// Failure recovery settings
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Verification pipeline settings
    #[serde(default)]
    pub verification: VerificationConfig,

    /// Memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Tier used for the first attempt of every reasoning step
    #[serde(default)]
    pub default_tier: ModelTier,

    /// Timeout for a single model call in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Ollama provider settings (edge tier)
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Gemini provider settings (flash and pro tiers)
    #[serde(default)]
    pub gemini: GeminiConfig,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

/// Gemini provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Base URL for Gemini API
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,

    /// Model used for the flash tier
    #[serde(default = "default_gemini_flash_model")]
    pub flash_model: String,

    /// Model used for the pro tier
    #[serde(default = "default_gemini_pro_model")]
    pub pro_model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_gemini_api_key_env")]
    pub api_key_env: String,
}

/// Breach direction of a metric
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Breach when the value exceeds the threshold (latency, error rate)
    Above,
    /// Breach when the value falls under the threshold (completion rate)
    Below,
}

/// One row of the quality threshold table
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MetricThreshold {
    pub warn: f64,
    pub critical: f64,
    pub direction: Direction,
}

impl MetricThreshold {
    pub fn above(warn: f64, critical: f64) -> Self {
        Self {
            warn,
            critical,
            direction: Direction::Above,
        }
    }

    pub fn below(warn: f64, critical: f64) -> Self {
        Self {
            warn,
            critical,
            direction: Direction::Below,
        }
    }
}

/// Quality gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Threshold table keyed by metric name
    #[serde(default = "default_metrics")]
    pub metrics: BTreeMap<String, MetricThreshold>,
}

/// Failure recovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Maximum model calls per turn, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff delay in milliseconds
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Spend after which the default policy stops paying for calls
    #[serde(default = "default_cost_ceiling")]
    pub cost_ceiling_usd: f64,

    /// Estimated cost of one flash-tier call
    #[serde(default = "default_flash_cost")]
    pub flash_cost_usd: f64,

    /// Estimated cost of one pro-tier call
    #[serde(default = "default_pro_cost")]
    pub pro_cost_usd: f64,
}

impl ResilienceConfig {
    /// Estimated cost of one call on `tier`
    pub fn tier_cost(&self, tier: ModelTier) -> f64 {
        match tier {
            ModelTier::Flash => self.flash_cost_usd,
            ModelTier::Pro => self.pro_cost_usd,
            ModelTier::Edge => 0.0,
        }
    }
}

/// Verification pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Minimum length in characters of verified text
    #[serde(default = "default_min_length")]
    pub min_length: usize,

    /// Maximum length in characters of verified text
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Model confidence required to approve without human review
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f64,

    /// Tier used for the model stage
    #[serde(default)]
    pub tier: ModelTier,
}

/// Memory system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum episodic memories consolidated per summarization run
    #[serde(default = "default_summary_window")]
    pub summary_window: usize,

    /// Snapshots retained per session for rollback
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Tier used for fact extraction
    #[serde(default)]
    pub summary_tier: ModelTier,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.somnus")
}

fn default_request_timeout() -> u64 {
    60
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_flash_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_gemini_pro_model() -> String {
    "gemini-1.5-pro".to_string()
}

fn default_gemini_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

/// Built-in threshold table
///
/// MTTH is measured in minutes of unassisted operation between human
/// interventions; longer is better, so it breaches downwards.
pub fn default_metrics() -> BTreeMap<String, MetricThreshold> {
    let mut metrics = BTreeMap::new();
    metrics.insert(
        "LATENCY_MS".to_string(),
        MetricThreshold::above(1500.0, 3000.0),
    );
    metrics.insert("ERROR_RATE".to_string(), MetricThreshold::above(0.05, 0.10));
    metrics.insert("UCR".to_string(), MetricThreshold::below(0.85, 0.70));
    metrics.insert("MTTH".to_string(), MetricThreshold::below(30.0, 10.0));
    metrics
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    250
}

fn default_backoff_max_ms() -> u64 {
    4000
}

fn default_cost_ceiling() -> f64 {
    0.05
}

fn default_flash_cost() -> f64 {
    0.0005
}

fn default_pro_cost() -> f64 {
    0.005
}

fn default_min_length() -> usize {
    10
}

fn default_max_length() -> usize {
    4000
}

fn default_acceptance_threshold() -> f64 {
    0.8
}

fn default_summary_window() -> usize {
    50
}

fn default_history_limit() -> usize {
    sdk::session::DEFAULT_HISTORY_LIMIT
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            default_tier: ModelTier::Flash,
            request_timeout_secs: default_request_timeout(),
            ollama: OllamaConfig::default(),
            gemini: GeminiConfig::default(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: default_gemini_base_url(),
            flash_model: default_gemini_flash_model(),
            pro_model: default_gemini_pro_model(),
            api_key_env: default_gemini_api_key_env(),
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            metrics: default_metrics(),
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            cost_ceiling_usd: default_cost_ceiling(),
            flash_cost_usd: default_flash_cost(),
            pro_cost_usd: default_pro_cost(),
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            min_length: default_min_length(),
            max_length: default_max_length(),
            acceptance_threshold: default_acceptance_threshold(),
            tier: ModelTier::Flash,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            summary_window: default_summary_window(),
            history_limit: default_history_limit(),
            summary_tier: ModelTier::Flash,
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.somnus/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();

        // Serialize before path expansion so the file keeps the portable ~ form
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.somnus/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".somnus").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                data_dir: default_data_dir(),
            },
            llm: LLMConfig::default(),
            quality: QualityConfig::default(),
            resilience: ResilienceConfig::default(),
            verification: VerificationConfig::default(),
            memory: MemoryConfig::default(),
        }
    }

    /// Path of the SQLite database inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("somnus.db")
    }

    /// Validate and process configuration
    ///
    /// This method validates ranges and threshold ordering, expands ~ in the
    /// data directory and creates it if missing.
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.llm.request_timeout_secs == 0 {
            return Err(EngineError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        for (name, threshold) in &self.quality.metrics {
            validate_threshold(name, threshold)?;
        }

        if self.resilience.max_attempts == 0 {
            return Err(EngineError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.resilience.backoff_base_ms > self.resilience.backoff_max_ms {
            return Err(EngineError::Config(
                "backoff_base_ms must not exceed backoff_max_ms".to_string(),
            ));
        }
        let costs = [
            self.resilience.cost_ceiling_usd,
            self.resilience.flash_cost_usd,
            self.resilience.pro_cost_usd,
        ];
        if costs.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(EngineError::Config(
                "resilience costs must be non-negative".to_string(),
            ));
        }

        if self.verification.acceptance_threshold < 0.0
            || self.verification.acceptance_threshold > 1.0
        {
            return Err(EngineError::Config(
                "acceptance_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.verification.min_length > self.verification.max_length {
            return Err(EngineError::Config(
                "min_length must not exceed max_length".to_string(),
            ));
        }

        if self.memory.summary_window == 0 || self.memory.history_limit == 0 {
            return Err(EngineError::Config(
                "summary_window and history_limit must be greater than 0".to_string(),
            ));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Check that warn and critical are ordered consistently with the direction
fn validate_threshold(name: &str, threshold: &MetricThreshold) -> Result<(), EngineError> {
    if !threshold.warn.is_finite() || !threshold.critical.is_finite() {
        return Err(EngineError::Config(format!(
            "Thresholds for metric '{}' must be finite",
            name
        )));
    }

    let ordered = match threshold.direction {
        Direction::Above => threshold.warn <= threshold.critical,
        Direction::Below => threshold.warn >= threshold.critical,
    };

    if !ordered {
        return Err(EngineError::Config(format!(
            "Metric '{}': warn threshold must be reached before critical",
            name
        )));
    }

    Ok(())
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
