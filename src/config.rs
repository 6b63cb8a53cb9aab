use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::HunterError;
use crate::models::CandidateProfile;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HunterConfig {
    pub db_path: PathBuf,
    pub output_dir: PathBuf,
    pub profile_path: PathBuf,
    pub model: String,
    pub discovery: DiscoveryConfig,
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Empty means the built-in query set.
    pub queries: Vec<String>,
    pub max_results_per_query: usize,
    pub query_delay_ms: u64,
    pub page_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub max_jobs_per_run: usize,
    pub min_match_score: f64,
    pub item_delay_ms: u64,
    pub target_roles: Vec<String>,
    pub exclude_keywords: Vec<String>,
}

impl Default for HunterConfig {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            db_path: data_dir.join("hunter.db"),
            output_dir: data_dir.join("output"),
            profile_path: data_dir.join("master_resume.json"),
            model: "claude-sonnet-4-20250514".to_string(),
            discovery: DiscoveryConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            queries: Vec::new(),
            max_results_per_query: 30,
            query_delay_ms: 2000,
            page_delay_ms: 500,
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        let to_vec = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            max_jobs_per_run: 50,
            min_match_score: 0.5,
            item_delay_ms: 2000,
            target_roles: to_vec(&[
                "product manager",
                "operations manager",
                "project manager",
                "revenue operations",
                "sales operations",
                "business operations",
                "customer success",
                "program manager",
            ]),
            exclude_keywords: to_vec(&["senior director", "vp", "vice president", "chief", "intern"]),
        }
    }
}

impl DiscoveryConfig {
    pub fn query_delay(&self) -> Duration {
        Duration::from_millis(self.query_delay_ms)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

impl ProcessingConfig {
    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }
}

fn data_dir() -> PathBuf {
    // XDG data directory, or the working directory when there is no home
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "hunter") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        PathBuf::from(".")
    }
}

impl HunterConfig {
    /// Defaults, overlaid with the JSON file when one is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: HunterConfig = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                serde_json::from_str(&raw).map_err(|e| {
                    HunterError::config(format!("Invalid config file {}: {}", path.display(), e))
                })?
            }
            None => HunterConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), HunterError> {
        let threshold = self.processing.min_match_score;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(HunterError::config(format!(
                "min_match_score must be within [0, 1], got {}",
                threshold
            )));
        }
        if self.processing.target_roles.iter().all(|r| r.trim().is_empty()) {
            return Err(HunterError::config("target_roles must name at least one role"));
        }
        Ok(())
    }

    pub fn load_profile(&self) -> Result<CandidateProfile, HunterError> {
        let raw = std::fs::read_to_string(&self.profile_path).map_err(|e| {
            HunterError::config(format!(
                "Profile not found at {}: {}",
                self.profile_path.display(),
                e
            ))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            HunterError::config(format!(
                "Invalid profile {}: {}",
                self.profile_path.display(),
                e
            ))
        })
    }
}

/// API credentials, resolved from flags or the environment by the CLI.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub google_api_key: Option<String>,
    pub google_cse_id: Option<String>,
    pub serpapi_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_service_key: Option<String>,
}

impl Credentials {
    pub fn require_anthropic(&self) -> Result<&str, HunterError> {
        non_empty(&self.anthropic_api_key).ok_or_else(|| {
            HunterError::config(
                "ANTHROPIC_API_KEY is required for analysis. Set it with: export ANTHROPIC_API_KEY=your-key-here",
            )
        })
    }

    pub fn require_supabase(&self) -> Result<(&str, &str), HunterError> {
        match (non_empty(&self.supabase_url), non_empty(&self.supabase_service_key)) {
            (Some(url), Some(key)) => Ok((url, key)),
            _ => Err(HunterError::config(
                "Missing SUPABASE_URL or SUPABASE_SERVICE_KEY. Get these from your Supabase project settings.",
            )),
        }
    }
}

pub fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
