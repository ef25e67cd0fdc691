//! Configuration loading and validation.
//!
//! Config comes from a JSON5 file with `${ENV_VAR}` substitution; secrets can
//! be given directly or via `*_env` indirection. Deployment environments that
//! only set environment variables (the common case on managed runtimes) work
//! with no config file at all.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Clarion configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerationConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech: Option<SpeechConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<SynthesisConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Reply-model (Gemini) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Model identifier, passed through opaque (e.g. "gemini-2.5-flash-lite").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: None,
            model: None,
            temperature: None,
            max_output_tokens: None,
            base_url: None,
            timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl GenerationConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
            .or_else(|| non_empty_env("GOOGLE_API_KEY"))
    }
}

/// Speech-to-text (recognizer) configuration. Endpoint/model/recognizer ids
/// are opaque strings passed through to the provider, not validated locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Cloud project owning the recognizer resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Region selecting the recognizer endpoint (e.g. "us", "eu").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Recognition model identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default)]
    pub language_codes: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            location: None,
            model: None,
            language_codes: Vec::new(),
            api_key: None,
            api_key_env: None,
            base_url: None,
            timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl SpeechConfig {
    /// Project id: config first, then the env vars managed runtimes populate.
    pub fn resolve_project_id(&self) -> Option<String> {
        self.project_id
            .clone()
            .filter(|v| !v.is_empty())
            .or_else(|| non_empty_env("GOOGLE_CLOUD_PROJECT"))
            .or_else(|| non_empty_env("GCP_PROJECT"))
            .or_else(|| non_empty_env("PROJECT_ID"))
    }

    pub fn resolve_location(&self) -> String {
        self.location
            .clone()
            .filter(|v| !v.is_empty())
            .or_else(|| non_empty_env("SPEECH_LOCATION"))
            .unwrap_or_else(|| "us".into())
    }

    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
            .or_else(|| non_empty_env("GOOGLE_API_KEY"))
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("chirp_3")
    }

    pub fn language_codes(&self) -> Vec<String> {
        if self.language_codes.is_empty() {
            vec!["en-US".into()]
        } else {
            self.language_codes.clone()
        }
    }
}

/// Text-to-speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,

    /// Provider voice name (optional; provider default otherwise).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: None,
            language_code: None,
            voice: None,
            base_url: None,
            timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl SynthesisConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
            .or_else(|| non_empty_env("GOOGLE_API_KEY"))
    }

    pub fn language_code(&self) -> &str {
        self.language_code.as_deref().unwrap_or("en-US")
    }
}

/// Audio normalization configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Target sample rate for normalized audio.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate_hz: Option<u32>,

    /// Transcoder binary (default "ffmpeg", resolved via PATH).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<String>,

    /// Directory for scoped transcode scratch files (default: OS temp dir).
    /// Tilde paths are expanded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<String>,

    #[serde(default = "default_transcode_timeout_ms")]
    pub transcode_timeout_ms: u64,

    /// Normalized payloads below this size are treated as silence.
    #[serde(default = "default_min_speech_bytes")]
    pub min_speech_bytes: usize,
}

fn default_transcode_timeout_ms() -> u64 {
    20_000
}

fn default_min_speech_bytes() -> usize {
    2_000
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: None,
            ffmpeg_path: None,
            scratch_dir: None,
            transcode_timeout_ms: default_transcode_timeout_ms(),
            min_speech_bytes: default_min_speech_bytes(),
        }
    }
}

impl AudioConfig {
    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
            .or_else(|| non_empty_env("SAMPLE_RATE").and_then(|v| v.parse().ok()))
            .unwrap_or(16_000)
    }

    pub fn ffmpeg_path(&self) -> &str {
        self.ffmpeg_path.as_deref().unwrap_or("ffmpeg")
    }

    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_millis(self.transcode_timeout_ms)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .as_deref()
            .map(|d| PathBuf::from(shellexpand::tilde(d).as_ref()))
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Bounded-retry parameters. The defaults match typical transient-fault
/// handling; deployments can tighten or widen them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Extra transcription attempts after the first, transient errors only.
    #[serde(default = "default_transcription_max_retries")]
    pub transcription_max_retries: u32,

    /// Base backoff between transcription attempts (multiplied per attempt).
    #[serde(default = "default_transcription_backoff_ms")]
    pub transcription_backoff_ms: u64,

    /// Retry reply generation once when the first attempt times out.
    #[serde(default = "default_true")]
    pub generation_retry_on_timeout: bool,
}

fn default_transcription_max_retries() -> u32 {
    2
}

fn default_transcription_backoff_ms() -> u64 {
    250
}

fn default_true() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            transcription_max_retries: default_transcription_max_retries(),
            transcription_backoff_ms: default_transcription_backoff_ms(),
            generation_retry_on_timeout: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "clarion_pipeline=debug").
    #[serde(default)]
    pub filters: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: None,
            filters: Vec::new(),
        }
    }
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Some(val) = non_empty_env(env) {
            return Some(val);
        }
    }
    None
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Substitute `${ENV_VAR}` patterns in a string with their values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    /// A missing file yields the default config (env vars still apply).
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::PipelineError::Io)?;
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::PipelineError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file location: `~/.clarion/config.json`.
    pub fn default_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn generation(&self) -> GenerationConfig {
        self.generation.clone().unwrap_or_default()
    }

    pub fn speech(&self) -> SpeechConfig {
        self.speech.clone().unwrap_or_default()
    }

    pub fn synthesis(&self) -> SynthesisConfig {
        self.synthesis.clone().unwrap_or_default()
    }

    pub fn audio(&self) -> AudioConfig {
        self.audio.clone().unwrap_or_default()
    }

    pub fn retry(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }

    /// Language-model id, overridable via `CLARION_MODEL`.
    pub fn model(&self) -> String {
        self.generation
            .as_ref()
            .and_then(|g| g.model.clone())
            .filter(|v| !v.is_empty())
            .or_else(|| non_empty_env("CLARION_MODEL"))
            .unwrap_or_else(|| "gemini-2.5-flash-lite".into())
    }

    /// Get a config value by dotted path (e.g. "speech.location").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if self.generation().resolve_api_key().is_none() {
            warnings.push(
                "No language-model API key configured (generation.api_key or GOOGLE_API_KEY)"
                    .into(),
            );
        }
        if self.speech().resolve_project_id().is_none() {
            warnings.push(
                "No cloud project configured for the recognizer (speech.project_id or \
                 GOOGLE_CLOUD_PROJECT)"
                    .into(),
            );
        }
        if self.audio().sample_rate_hz() == 0 {
            errors.push("audio.sample_rate_hz cannot be 0".into());
        }
        if self.audio().min_speech_bytes == 0 {
            warnings.push("audio.min_speech_bytes is 0; silent captures won't be rejected".into());
        }

        (warnings, errors)
    }
}

/// Base directory for Clarion data: `~/.clarion/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".clarion")
}
