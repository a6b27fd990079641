//! Path utilities for setup locations
//!
//! The model and tokenizer are saved to two plain directories
//! (`./model` and `./tokenizer` by default) that can be loaded without the hub.

use std::path::{Path, PathBuf};

use crate::config::Config;

pub const CONFIG_FILE: &str = "config.json";
pub const GENERATION_CONFIG_FILE: &str = "generation_config.json";
pub const WEIGHTS_INDEX_FILE: &str = "model.safetensors.index.json";
pub const SINGLE_WEIGHTS_FILE: &str = "model.safetensors";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Tokenizer side files copied when the repo has them
pub const OPTIONAL_TOKENIZER_FILES: &[&str] = &[
    "tokenizer_config.json",
    "special_tokens_map.json",
    "tokenizer.model",
];

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Get the model directory
pub fn get_model_dir(config: &Config) -> PathBuf {
    expand_home(&config.model_dir)
}

/// Get the tokenizer directory
pub fn get_tokenizer_dir(config: &Config) -> PathBuf {
    expand_home(&config.tokenizer_dir)
}

/// Get the hub cache override, if any
pub fn get_cache_dir(config: &Config) -> Option<PathBuf> {
    config.cache_dir.as_deref().map(expand_home)
}

/// Ensure all required directories exist
pub fn ensure_directories(config: &Config) -> std::io::Result<()> {
    std::fs::create_dir_all(get_model_dir(config))?;
    std::fs::create_dir_all(get_tokenizer_dir(config))?;
    if let Some(cache) = get_cache_dir(config) {
        std::fs::create_dir_all(cache)?;
    }
    Ok(())
}

/// Parse the shard file names out of a safetensors index document.
///
/// Names are deduplicated and sorted.
pub fn weight_files(index_json: &str) -> Result<Vec<String>, serde_json::Error> {
    #[derive(serde::Deserialize)]
    struct Index {
        weight_map: std::collections::BTreeMap<String, String>,
    }

    let index: Index = serde_json::from_str(index_json)?;
    let mut files: Vec<String> = index.weight_map.into_values().collect();
    files.sort();
    files.dedup();
    Ok(files)
}

/// Weight files present in `model_dir`: every shard named by the index, or
/// the single-file checkpoint. Returns `None` if neither layout is complete.
pub fn local_weight_files(model_dir: &Path) -> Option<Vec<PathBuf>> {
    let index_path = model_dir.join(WEIGHTS_INDEX_FILE);
    if index_path.exists() {
        let contents = std::fs::read_to_string(&index_path).ok()?;
        let shards = weight_files(&contents).ok()?;
        let paths: Vec<PathBuf> = shards.iter().map(|s| model_dir.join(s)).collect();
        if !paths.is_empty() && paths.iter().all(|p| p.exists()) {
            return Some(paths);
        }
        return None;
    }

    let single = model_dir.join(SINGLE_WEIGHTS_FILE);
    if single.exists() {
        Some(vec![single])
    } else {
        None
    }
}

/// Check if setup is complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupStatus {
    pub model_ok: bool,
    pub tokenizer_ok: bool,
}

impl SetupStatus {
    pub fn check(model_dir: &Path, tokenizer_dir: &Path) -> Self {
        // Model needs its config and every weight shard
        let model_ok =
            model_dir.join(CONFIG_FILE).exists() && local_weight_files(model_dir).is_some();

        let tokenizer_path = tokenizer_dir.join(TOKENIZER_FILE);
        let tokenizer_ok = std::fs::metadata(&tokenizer_path)
            .map(|m| m.len() > 0)
            .unwrap_or(false);

        SetupStatus {
            model_ok,
            tokenizer_ok,
        }
    }

    pub fn for_config(config: &Config) -> Self {
        Self::check(&get_model_dir(config), &get_tokenizer_dir(config))
    }

    pub fn is_complete(&self) -> bool {
        self.model_ok && self.tokenizer_ok
    }
}
