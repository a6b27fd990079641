//! Configuration
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables. The CLI applies its flags on top of the result.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{LlamaError, LlamaResult};
use crate::prompts::DEFAULT_SYSTEM_PROMPT;

/// Model fetched when nothing else is configured
pub const DEFAULT_MODEL_ID: &str = "meta-llama/Llama-2-70b-chat-hf";

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "llama-stream.toml";

/// Environment variable names
pub mod env_vars {
    /// Hub access token (preferred)
    pub const HF_TOKEN: &str = "HF_TOKEN";
    /// Hub access token (legacy name)
    pub const HUGGING_FACE_HUB_TOKEN: &str = "HUGGING_FACE_HUB_TOKEN";
    pub const MODEL_ID: &str = "LLAMA_STREAM_MODEL_ID";
    pub const REVISION: &str = "LLAMA_STREAM_REVISION";
    pub const MODEL_DIR: &str = "LLAMA_STREAM_MODEL_DIR";
    pub const TOKENIZER_DIR: &str = "LLAMA_STREAM_TOKENIZER_DIR";
    pub const CACHE_DIR: &str = "LLAMA_STREAM_CACHE_DIR";
    pub const DEVICE: &str = "LLAMA_STREAM_DEVICE";
}

/// Hub access token. Wiped from memory on drop and never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct HubToken(String);

impl HubToken {
    /// Returns `None` for blank input
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let mut raw = token.into();
        let token = raw.trim().to_string();
        raw.zeroize();
        if token.is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for HubToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HubToken(<redacted>)")
    }
}

/// Generation options as configured. Unset sampling fields fall back to the
/// model's `generation_config.json`, then to greedy decoding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationOptions {
    /// Maximum tokens to generate
    pub max_new_tokens: usize,
    /// Sampling temperature (<= 0 means greedy)
    pub temperature: Option<f64>,
    /// Nucleus sampling cutoff
    pub top_p: Option<f64>,
    /// Only sample among the top K tokens
    pub top_k: Option<usize>,
    /// 1.0 disables the penalty
    pub repeat_penalty: f32,
    /// Context size considered by the repeat penalty
    pub repeat_last_n: usize,
    /// Sampling seed
    pub seed: u64,
    /// Do not echo the prompt before the generated text
    pub skip_prompt: bool,
    pub use_kv_cache: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 500,
            temperature: None,
            top_p: None,
            top_k: None,
            repeat_penalty: 1.0,
            repeat_last_n: 64,
            seed: 299_792_458,
            skip_prompt: false,
            use_kv_cache: true,
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hub repository id
    pub model_id: String,
    /// Branch, tag or commit
    pub revision: String,
    /// Where model weights and config are saved
    pub model_dir: PathBuf,
    /// Where tokenizer files are saved
    pub tokenizer_dir: PathBuf,
    /// Hub cache override (hf-hub default when unset)
    pub cache_dir: Option<PathBuf>,
    /// `auto`, `cpu`, `cuda`, `cuda:N` or `metal`
    pub device: String,
    /// `f16`, `bf16` or `f32`
    pub dtype: Option<String>,
    pub use_flash_attn: bool,
    pub system_prompt: String,
    /// Show hf-hub download progress bars
    pub show_progress: bool,
    pub generation: GenerationOptions,
    #[serde(skip_serializing, deserialize_with = "deserialize_token")]
    pub hub_token: Option<HubToken>,
}

/// Blank tokens in a config file count as unset
fn deserialize_token<'de, D>(deserializer: D) -> Result<Option<HubToken>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(HubToken::new))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: "main".to_string(),
            model_dir: PathBuf::from("./model"),
            tokenizer_dir: PathBuf::from("./tokenizer"),
            cache_dir: None,
            device: "auto".to_string(),
            dtype: None,
            use_flash_attn: false,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            show_progress: true,
            generation: GenerationOptions::default(),
            hub_token: None,
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the file, then the process environment.
    ///
    /// An explicit `path` must exist. Without one, `llama-stream.toml` in the
    /// working directory is used if present.
    pub fn load(path: Option<&Path>) -> LlamaResult<Self> {
        let mut config = match path {
            Some(p) if !p.exists() => {
                return Err(LlamaError::Config(format!("config file not found: {}", p.display())));
            }
            Some(p) => Self::from_file(p)?,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::from_file(fallback)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> LlamaResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| LlamaError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let config = toml::from_str(&contents)?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Overlay environment variables using `lookup` to read them
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup(env_vars::HF_TOKEN)
            .and_then(HubToken::new)
            .or_else(|| lookup(env_vars::HUGGING_FACE_HUB_TOKEN).and_then(HubToken::new));
        if token.is_some() {
            self.hub_token = token;
        }

        if let Some(v) = lookup(env_vars::MODEL_ID) {
            self.model_id = v;
        }
        if let Some(v) = lookup(env_vars::REVISION) {
            self.revision = v;
        }
        if let Some(v) = lookup(env_vars::MODEL_DIR) {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(env_vars::TOKENIZER_DIR) {
            self.tokenizer_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(env_vars::CACHE_DIR) {
            self.cache_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup(env_vars::DEVICE) {
            self.device = v;
        }
    }

    /// Render as TOML (the token is never written)
    pub fn to_toml(&self) -> LlamaResult<String> {
        toml::to_string_pretty(self).map_err(|e| LlamaError::Config(e.to_string()))
    }
}
