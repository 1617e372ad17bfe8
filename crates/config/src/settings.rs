//! Application settings

use serde::Deserialize;

use crate::ConfigError;

/// Top-level settings, deserialized from file + environment.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub call: CallConfig,
    #[serde(default)]
    pub providers: ProviderConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// HTTP/WebSocket server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

/// Live-call tuning knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct CallConfig {
    /// Recognizer locale, e.g. "en-AU".
    #[serde(default = "default_language")]
    pub language: String,
    /// Trailing silence that closes an utterance (ms).
    #[serde(default = "default_utterance_end_ms")]
    pub utterance_end_ms: u32,
    /// Recognizer endpointing window for fast sentence detection (ms).
    #[serde(default = "default_endpointing_ms")]
    pub endpointing_ms: u32,
    /// Hard floor on average utterance confidence; below this the caller
    /// is asked to repeat and no classification is attempted.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    /// Business name spoken when no profile is resolved for the call.
    #[serde(default = "default_business_name")]
    pub default_business_name: String,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            utterance_end_ms: default_utterance_end_ms(),
            endpointing_ms: default_endpointing_ms(),
            min_confidence: default_min_confidence(),
            default_business_name: default_business_name(),
        }
    }
}

/// Credentials and endpoints for outbound providers. All optional; an
/// absent key routes that concern to its fallback.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProviderConfig {
    // Speech-to-text
    pub stt_api_key: Option<String>,

    // Text-to-speech
    pub tts_api_key: Option<String>,
    #[serde(default = "default_voice_id")]
    pub tts_voice_id: String,

    // LLM completion
    pub llm_api_key: Option<String>,
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    // Distance matrix
    pub maps_api_key: Option<String>,

    // SMS
    pub sms_account_sid: Option<String>,
    pub sms_auth_token: Option<String>,
    pub sms_from_number: Option<String>,
    /// Base URL for customer-facing links sent by SMS.
    #[serde(default = "default_link_base_url")]
    pub link_base_url: String,
}

/// Best-effort snapshot cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// TTL for cached classification results (seconds).
    #[serde(default = "default_classification_ttl")]
    pub classification_ttl_secs: u64,
    /// TTL for cached lead/profile snapshots (seconds).
    #[serde(default = "default_snapshot_ttl")]
    pub snapshot_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            classification_ttl_secs: default_classification_ttl(),
            snapshot_ttl_secs: default_snapshot_ttl(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_language() -> String {
    "en-AU".to_string()
}
fn default_utterance_end_ms() -> u32 {
    1_500
}
fn default_endpointing_ms() -> u32 {
    300
}
fn default_min_confidence() -> f32 {
    0.30
}
fn default_business_name() -> String {
    "our plumbing team".to_string()
}
fn default_voice_id() -> String {
    "au-female-1".to_string()
}
fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}
fn default_llm_model() -> String {
    "anthropic/claude-3-haiku".to_string()
}
fn default_link_base_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_cache_enabled() -> bool {
    true
}
fn default_classification_ttl() -> u64 {
    3_600
}
fn default_snapshot_ttl() -> u64 {
    300
}

/// Load settings from an optional file plus `LEADLINE_` environment
/// overrides (`LEADLINE_SERVER__PORT=9000`).
pub fn load_settings(path: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = config::Config::builder();

    let file = path.unwrap_or("leadline.toml");
    builder = builder.add_source(config::File::with_name(file).required(false));
    builder = builder.add_source(
        config::Environment::with_prefix("LEADLINE")
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    validate(&settings)?;

    tracing::info!(
        stt = settings.providers.stt_api_key.is_some(),
        tts = settings.providers.tts_api_key.is_some(),
        llm = settings.providers.llm_api_key.is_some(),
        maps = settings.providers.maps_api_key.is_some(),
        sms = settings.providers.sms_account_sid.is_some(),
        "Settings loaded (provider keys present)"
    );

    Ok(settings)
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    let conf = settings.call.min_confidence;
    if !(0.0..=1.0).contains(&conf) {
        return Err(ConfigError::Invalid(format!(
            "call.min_confidence must be within [0, 1], got {conf}"
        )));
    }
    if settings.call.utterance_end_ms == 0 {
        return Err(ConfigError::Invalid(
            "call.utterance_end_ms must be positive".into(),
        ));
    }
    Ok(())
}
