//! Configuration management
//!
//! Model assignments, generation budget, update policy, scheduling and
//! refinement limits. Stored as TOML in the platform config directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Model assignments for each generation role
    #[serde(default)]
    pub models: ModelsConfig,
    /// Provider endpoint and per-call budget
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Profile update policy
    #[serde(default)]
    pub profile: ProfileConfig,
    /// Path scheduling limits
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Iterative refinement limits
    #[serde(default)]
    pub refinement: RefinementConfig,
    /// Feedback cache
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Model assignments for different generation roles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Model that builds and updates learner profiles
    #[serde(default = "default_profiler_model")]
    pub profiler: String,
    /// Model that authors and revises learning sessions
    #[serde(default = "default_scheduler_model")]
    pub scheduler: String,
    /// Model that role-plays the learner; a faster model keeps refinement cheap
    #[serde(default = "default_simulator_model")]
    pub simulator: String,
}

fn default_profiler_model() -> String {
    "openai/gpt-4o".to_string()
}

fn default_scheduler_model() -> String {
    "openai/gpt-4o".to_string()
}

fn default_simulator_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            profiler: default_profiler_model(),
            scheduler: default_scheduler_model(),
            simulator: default_simulator_model(),
        }
    }
}

impl ModelsConfig {
    /// Get model for a role name
    pub fn get(&self, role: &str) -> Option<&str> {
        match role.to_lowercase().as_str() {
            "profiler" | "profile" => Some(&self.profiler),
            "scheduler" | "schedule" => Some(&self.scheduler),
            "simulator" | "simulation" => Some(&self.simulator),
            _ => None,
        }
    }

    /// Set model for a role name
    pub fn set(&mut self, role: &str, model: String) -> bool {
        match role.to_lowercase().as_str() {
            "profiler" | "profile" => { self.profiler = model; true }
            "scheduler" | "schedule" => { self.scheduler = model; true }
            "simulator" | "simulation" => { self.simulator = model; true }
            _ => false,
        }
    }

    pub fn roles() -> &'static [&'static str] {
        &["profiler", "scheduler", "simulator"]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// OpenAI-compatible API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-call time budget
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_base_url() -> String {
    crate::generation::llm::OPENROUTER_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    4096
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// How far one full-strength preference signal moves an FSLSM dimension
    #[serde(default = "default_fslsm_step")]
    pub fslsm_step: f64,
}

fn default_fslsm_step() -> f64 {
    0.2
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self { fslsm_step: default_fslsm_step() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_session_count")]
    pub default_session_count: usize,
    /// Hard ceiling on sessions per path
    #[serde(default = "default_max_session_count")]
    pub max_session_count: usize,
}

fn default_session_count() -> usize {
    8
}

fn default_max_session_count() -> usize {
    10
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_session_count: default_session_count(),
            max_session_count: default_max_session_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementConfig {
    #[serde(default = "default_iterations")]
    pub default_iterations: usize,
    /// Upper bound on iterations a caller may request
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Simulate against an enriched "ground truth" learner instead of the raw profile
    #[serde(default = "default_true")]
    pub use_ground_truth: bool,
}

fn default_iterations() -> usize {
    2
}

fn default_max_iterations() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            default_iterations: default_iterations(),
            max_iterations: default_max_iterations(),
            use_ground_truth: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum cached feedback reports
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

fn default_cache_capacity() -> usize {
    64
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: default_cache_capacity() }
    }
}

impl Config {
    /// Load configuration from the default location, writing defaults on first run
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load configuration from a specific file, writing defaults if it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .context("Failed to read config file")?;
            let config: Config = toml::from_str(&contents)
                .context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = path.parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Requested iteration count bounded by the configured maximum
    pub fn clamp_iterations(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.refinement.default_iterations)
            .min(self.refinement.max_iterations)
    }

    /// Requested session count bounded by the configured maximum
    pub fn clamp_sessions(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.scheduler.default_session_count)
            .min(self.scheduler.max_session_count)
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "adaptive-learner", "adaptive-learner")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Human-readable summary of the active configuration
pub fn describe(config: &Config) -> String {
    let mut out = String::new();
    out.push_str("Model Assignments:\n");
    for role in ModelsConfig::roles() {
        out.push_str(&format!("  {:<12} {}\n", role, config.models.get(role).unwrap_or("-")));
    }
    out.push_str(&format!(
        "Generation: {} (timeout {}s, max {} tokens)\n",
        config.generation.base_url, config.generation.timeout_secs, config.generation.max_tokens
    ));
    out.push_str(&format!("FSLSM step: {}\n", config.profile.fslsm_step));
    out.push_str(&format!(
        "Sessions: default {}, max {}\n",
        config.scheduler.default_session_count, config.scheduler.max_session_count
    ));
    out.push_str(&format!(
        "Refinement: default {} iterations, max {}, ground truth {}\n",
        config.refinement.default_iterations,
        config.refinement.max_iterations,
        if config.refinement.use_ground_truth { "on" } else { "off" }
    ));
    out.push_str(&format!("Feedback cache: {} entries\n", config.cache.capacity));
    out
}

/// Get default configuration as TOML string
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| "# Default configuration\n".to_string())
}
