use std::env;
use std::fmt;
use std::path::PathBuf;

pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const DEFAULT_MAX_TOKENS: u32 = 8096;
const DEFAULT_API_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_CONTEXT_FILE_NAME: &str = ".agentcc_context.json";

#[derive(Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub model_timeout_secs: Option<u64>,
    pub context_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    pub fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Self {
        let api_key = get_var(API_KEY_VAR).filter(|value| !value.trim().is_empty());
        let api_base_url = get_var("ANTHROPIC_BASE_URL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let model_timeout_secs = parse_model_timeout_secs(get_var("MODEL_TIMEOUT_SECS").as_deref());
        let context_path = parse_context_path(get_var("AGENTCC_CONTEXT_FILE").as_deref());

        Self {
            api_key,
            api_base_url,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            model_timeout_secs,
            context_path,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("model_timeout_secs", &self.model_timeout_secs)
            .field("context_path", &self.context_path)
            .finish()
    }
}

pub fn default_context_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_CONTEXT_FILE_NAME)
}

fn parse_positive_u64(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
}

fn parse_model_timeout_secs(raw: Option<&str>) -> Option<u64> {
    parse_positive_u64(raw)
}

fn parse_context_path(raw: Option<&str>) -> PathBuf {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(default_context_path)
}
