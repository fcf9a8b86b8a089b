//! Layered configuration: defaults, then `editloop.yml`, then the environment.

use crate::data::protocol::Grammar;
use crate::llm::DEFAULT_BASE_URL;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;

pub const SETTINGS_FILE: &str = "editloop.yml";

/// Errors that can occur while loading settings
#[derive(Debug)]
pub enum SettingsError {
    Read(String),
    Parse(String),
    InvalidValue { key: String, value: String },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SettingsError::Read(details) => write!(f, "Failed to read settings: {}", details),
            SettingsError::Parse(details) => write!(f, "Invalid settings file: {}", details),
            SettingsError::InvalidValue { key, value } => {
                write!(f, "Invalid value '{}' for {}", value, key)
            }
        }
    }
}

impl std::error::Error for SettingsError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub ollama_base_url: String,
    /// Model used when none is given on the command line
    pub model: Option<String>,
    pub grammar: Grammar,
    /// Upper bound on request/reply rounds in one session
    pub max_rounds: usize,
    pub timeout_secs: u64,
    pub strict_ranges: bool,
    /// Write every prompt and reply under `.editloop/sessions/`
    pub transcripts: bool,
    pub number_lines: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ollama_base_url: DEFAULT_BASE_URL.to_string(),
            model: None,
            grammar: Grammar::Json,
            max_rounds: 3,
            timeout_secs: 300,
            strict_ranges: false,
            transcripts: true,
            number_lines: true,
        }
    }
}

/// Optional overrides as written in `editloop.yml`
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    ollama_base_url: Option<String>,
    model: Option<String>,
    grammar: Option<String>,
    max_rounds: Option<usize>,
    timeout_secs: Option<u64>,
    strict_ranges: Option<bool>,
    transcripts: Option<bool>,
    number_lines: Option<bool>,
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SettingsError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SettingsError> {
    value.trim().parse().map_err(|_| SettingsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_grammar(key: &str, value: &str) -> Result<Grammar, SettingsError> {
    value.parse().map_err(|_| SettingsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

impl Settings {
    /// Loads settings for the project in `dir`, reading `.env` first
    pub fn load(dir: &Path) -> Result<Self, SettingsError> {
        dotenvy::dotenv().ok();

        let path = dir.join(SETTINGS_FILE);
        let yaml = if path.exists() {
            Some(fs::read_to_string(&path).map_err(|e| {
                SettingsError::Read(format!("{}: {}", path.display(), e))
            })?)
        } else {
            None
        };

        Self::from_sources(yaml.as_deref(), |key| std::env::var(key).ok())
    }

    /// Builds settings from an optional YAML document and an environment lookup
    pub fn from_sources<E>(yaml: Option<&str>, env: E) -> Result<Self, SettingsError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(yaml) = yaml.filter(|y| !y.trim().is_empty()) {
            let file: SettingsFile =
                serde_yaml::from_str(yaml).map_err(|e| SettingsError::Parse(e.to_string()))?;
            settings.apply_file(file)?;
        }

        settings.apply_env(env)?;
        Ok(settings)
    }

    fn apply_file(&mut self, file: SettingsFile) -> Result<(), SettingsError> {
        if let Some(url) = file.ollama_base_url {
            self.ollama_base_url = url;
        }
        if let Some(model) = file.model {
            self.model = Some(model);
        }
        if let Some(grammar) = file.grammar {
            self.grammar = parse_grammar("grammar", &grammar)?;
        }
        if let Some(max_rounds) = file.max_rounds {
            self.max_rounds = max_rounds;
        }
        if let Some(timeout_secs) = file.timeout_secs {
            self.timeout_secs = timeout_secs;
        }
        if let Some(strict) = file.strict_ranges {
            self.strict_ranges = strict;
        }
        if let Some(transcripts) = file.transcripts {
            self.transcripts = transcripts;
        }
        if let Some(number_lines) = file.number_lines {
            self.number_lines = number_lines;
        }
        Ok(())
    }

    fn apply_env<E>(&mut self, env: E) -> Result<(), SettingsError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("OLLAMA_BASE_URL") {
            self.ollama_base_url = url;
        }
        // Generic size tiers are a fallback for the dedicated variable.
        if let Some(model) = ["EDITLOOP_MODEL", "MEDIUM_MODEL", "LARGE_MODEL", "SMALL_MODEL"]
            .iter()
            .find_map(|&key| get(key))
        {
            self.model = Some(model);
        }
        if let Some(value) = get("EDITLOOP_GRAMMAR") {
            self.grammar = parse_grammar("EDITLOOP_GRAMMAR", &value)?;
        }
        if let Some(value) = get("EDITLOOP_MAX_ROUNDS") {
            self.max_rounds = parse_number("EDITLOOP_MAX_ROUNDS", &value)?;
        }
        if let Some(value) = get("EDITLOOP_TIMEOUT_SECS") {
            self.timeout_secs = parse_number("EDITLOOP_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = get("EDITLOOP_STRICT_RANGES") {
            self.strict_ranges = parse_bool("EDITLOOP_STRICT_RANGES", &value)?;
        }
        if let Some(value) = get("EDITLOOP_TRANSCRIPTS") {
            self.transcripts = parse_bool("EDITLOOP_TRANSCRIPTS", &value)?;
        }
        if let Some(value) = get("EDITLOOP_NUMBER_LINES") {
            self.number_lines = parse_bool("EDITLOOP_NUMBER_LINES", &value)?;
        }
        Ok(())
    }
}
