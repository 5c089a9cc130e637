//! Application configuration
//!
//! Defaults come from the embedded `config.toml`. A user file at
//! `{config_dir}/consult-script/config.toml` is merged over them key by key,
//! and a few environment variables (also read from `.env`) win over both.

use crate::error::AppError;
use crate::gateway::CompletionParams;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing::info;

const DEFAULT_CONFIG_TOML: &str = include_str!("../config.toml");

/// Environment variable holding the OpenAI API key
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
const MODEL_VAR: &str = "OPENAI_MODEL";
const DATA_DIR_VAR: &str = "CONSULT_DATA_DIR";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub openai: OpenAiSettings,
    pub chat: ChatSettings,
    pub script: CompletionParams,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiSettings {
    pub api_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Opening line of the doctor; empty means no greeting
    #[serde(default)]
    pub greeting: String,
}

impl ChatSettings {
    pub fn params(&self) -> CompletionParams {
        CompletionParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    data_dir: String,
}

impl StorageSettings {
    /// Configured data directory, if one was set
    pub fn data_dir(&self) -> Option<PathBuf> {
        let trimmed = self.data_dir.trim();
        (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
    }
}

/// Path of the optional user configuration file
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("consult-script").join("config.toml"))
}

impl Config {
    /// Load defaults, the user file and environment overrides.
    pub fn load() -> Result<Self, AppError> {
        let overlay = match user_config_path() {
            Some(path) if path.exists() => {
                let text = fs::read_to_string(&path).map_err(|e| {
                    AppError::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                info!("Loaded user configuration from {:?}", path);
                Some(text)
            }
            _ => None,
        };

        let mut config = Self::from_overlay(overlay.as_deref())?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Embedded defaults with an optional TOML document merged over them
    pub fn from_overlay(overlay: Option<&str>) -> Result<Self, AppError> {
        let mut table: toml::Table = toml::from_str(DEFAULT_CONFIG_TOML)
            .map_err(|e| AppError::Config(format!("Invalid embedded config.toml: {}", e)))?;

        if let Some(text) = overlay {
            let user: toml::Table = toml::from_str(text)
                .map_err(|e| AppError::Config(format!("Invalid user config: {}", e)))?;
            merge_tables(&mut table, user);
        }

        toml::Value::Table(table)
            .try_into()
            .map_err(|e| AppError::Config(format!("Invalid configuration: {}", e)))
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup(MODEL_VAR).filter(|v| !v.trim().is_empty()) {
            self.openai.model = model;
        }
        if let Some(dir) = lookup(DATA_DIR_VAR).filter(|v| !v.trim().is_empty()) {
            self.storage.data_dir = dir;
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        url::Url::parse(&self.openai.api_url).map_err(|e| {
            AppError::Config(format!("Invalid openai.api_url {:?}: {}", self.openai.api_url, e))
        })?;

        for (section, params) in [("chat", self.chat.params()), ("script", self.script)] {
            if params.max_tokens == 0 {
                return Err(AppError::Config(format!(
                    "{}.max_tokens must be positive",
                    section
                )));
            }
            if !(0.0..=2.0).contains(&params.temperature) {
                return Err(AppError::Config(format!(
                    "{}.temperature must be between 0 and 2",
                    section
                )));
            }
        }
        Ok(())
    }
}

/// Read the OpenAI API key from the environment
pub fn api_key() -> Result<String, AppError> {
    std::env::var(API_KEY_VAR)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| {
            AppError::Config(format!(
                "{} is not set. Export it or add it to a .env file.",
                API_KEY_VAR
            ))
        })
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(overlay_inner) = value {
            if let Some(toml::Value::Table(base_inner)) = base.get_mut(&key) {
                merge_tables(base_inner, overlay_inner);
                continue;
            }
            base.insert(key, toml::Value::Table(overlay_inner));
        } else {
            base.insert(key, value);
        }
    }
}
