//! Generation parameters
//!
//! Resolves configured options against the model's `generation_config.json`
//! and maps the result onto candle's sampling strategies.

use std::path::Path;

use candle_transformers::generation::Sampling;
use serde::Deserialize;

use crate::config::GenerationOptions;
use crate::error::{LlamaResult, ModelError};
use crate::setup::paths::GENERATION_CONFIG_FILE;

/// Top-k applied by the hub's generation defaults when a repo enables
/// sampling without naming one
const HUB_DEFAULT_TOP_K: usize = 50;

/// One or several end-of-sequence ids
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EosTokens {
    Single(u32),
    Multiple(Vec<u32>),
}

impl EosTokens {
    pub fn to_vec(&self) -> Vec<u32> {
        match self {
            EosTokens::Single(id) => vec![*id],
            EosTokens::Multiple(ids) => ids.clone(),
        }
    }
}

/// The fields of `generation_config.json` that affect decoding
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GenerationConfig {
    pub do_sample: Option<bool>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<usize>,
    pub repetition_penalty: Option<f32>,
    pub eos_token_id: Option<EosTokens>,
    pub bos_token_id: Option<u32>,
}

impl GenerationConfig {
    pub fn from_json(json: &str) -> LlamaResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            ModelError::load_failed(format!("invalid {}: {}", GENERATION_CONFIG_FILE, e)).into()
        })
    }

    /// Read from a model directory; `None` when the repo shipped no file
    pub fn read(model_dir: &Path) -> LlamaResult<Option<Self>> {
        let path = model_dir.join(GENERATION_CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        Self::from_json(&contents).map(Some)
    }
}

/// Fully resolved decoding parameters
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: usize,
    /// <= 0 selects greedy decoding
    pub temperature: f64,
    pub top_p: Option<f64>,
    pub top_k: Option<usize>,
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
    pub seed: u64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::resolve(&GenerationOptions::default(), None)
    }
}

impl GenerationParams {
    /// Configured options win. Otherwise the model's defaults apply, but only
    /// when the model enables sampling; greedy decoding is the fallback.
    pub fn resolve(options: &GenerationOptions, model: Option<&GenerationConfig>) -> Self {
        let sampling_defaults = model.filter(|m| m.do_sample == Some(true));

        let temperature = options
            .temperature
            .or_else(|| sampling_defaults.map(|m| m.temperature.unwrap_or(1.0)))
            .unwrap_or(0.0);
        let top_p = options
            .top_p
            .or_else(|| sampling_defaults.and_then(|m| m.top_p))
            .filter(|p| *p > 0.0 && *p < 1.0);
        let top_k = options
            .top_k
            .or_else(|| sampling_defaults.map(|m| m.top_k.unwrap_or(HUB_DEFAULT_TOP_K)))
            .filter(|k| *k > 0);

        // An explicit non-default penalty in the options overrides the model's
        let repeat_penalty = if options.repeat_penalty != 1.0 {
            options.repeat_penalty
        } else {
            model.and_then(|m| m.repetition_penalty).unwrap_or(1.0)
        };

        Self {
            max_new_tokens: options.max_new_tokens,
            temperature,
            top_p,
            top_k,
            repeat_penalty,
            repeat_last_n: options.repeat_last_n,
            seed: options.seed,
        }
    }

    pub fn is_greedy(&self) -> bool {
        self.temperature <= 0.0
    }

    pub fn sampling(&self) -> Sampling {
        if self.is_greedy() {
            return Sampling::ArgMax;
        }
        let temperature = self.temperature;
        match (self.top_k, self.top_p) {
            (None, None) => Sampling::All { temperature },
            (Some(k), None) => Sampling::TopK { k, temperature },
            (None, Some(p)) => Sampling::TopP { p, temperature },
            (Some(k), Some(p)) => Sampling::TopKThenTopP { k, p, temperature },
        }
    }
}
