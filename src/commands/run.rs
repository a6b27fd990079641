//! Run command
//!
//! Loads the saved model, wraps the request in the chat template and streams
//! the completion to stdout.

use crate::config::Config;
use crate::error::{LlamaResult, ModelError};
use crate::hardware::{detect_gpu, select_device, select_dtype, DeviceChoice};
use crate::prompts::{PromptTemplate, DEFAULT_USER_PROMPT};
use crate::providers::local::{LoadOptions, LocalLlamaProvider};
use crate::providers::{GenerationParams, GenerationStats, TextGenerator};
use crate::setup::downloader::{download_model, download_tokenizer};
use crate::setup::paths::{get_model_dir, get_tokenizer_dir, SetupStatus};
use crate::stream::{TextStreamer, TokenSink};

/// Format `user_prompt` with `template` and stream the generation into `sink`
pub fn stream_prompt(
    generator: &mut dyn TextGenerator,
    template: &PromptTemplate,
    user_prompt: &str,
    params: &GenerationParams,
    sink: &mut dyn TokenSink,
) -> LlamaResult<GenerationStats> {
    let prompt = template.format(user_prompt);
    tracing::debug!(provider = generator.name(), chars = prompt.len(), "Streaming prompt");
    generator.generate(&prompt, params, sink)
}

/// Load the local model and stream one completion to stdout.
///
/// With `download_missing`, whichever of the model or tokenizer is incomplete
/// is downloaded first; otherwise an incomplete setup is an error.
pub fn run(config: &Config, user_prompt: Option<&str>, download_missing: bool) -> LlamaResult<GenerationStats> {
    let status = SetupStatus::for_config(config);
    if !status.is_complete() {
        if download_missing {
            tracing::info!(
                model_ok = status.model_ok,
                tokenizer_ok = status.tokenizer_ok,
                "Local setup incomplete, downloading missing parts first"
            );
            if !status.model_ok {
                download_model(config)?;
            }
            if !status.tokenizer_ok {
                download_tokenizer(config)?;
            }
        } else {
            return Err(ModelError::not_downloaded(format!(
                "model_ok={}, tokenizer_ok={}; run `llama-stream download` first",
                status.model_ok, status.tokenizer_ok
            ))
            .into());
        }
    }

    let gpu = detect_gpu();
    tracing::debug!(gpu = %gpu.name, kind = gpu.gpu_type.as_str(), "Hardware");

    let choice: DeviceChoice = config.device.parse()?;
    let device = select_device(choice)?;
    let dtype = select_dtype(config.dtype.as_deref(), &device)?;

    let mut provider = LocalLlamaProvider::load(
        &get_model_dir(config),
        &get_tokenizer_dir(config),
        LoadOptions {
            device,
            dtype,
            use_flash_attn: config.use_flash_attn,
            use_kv_cache: config.generation.use_kv_cache,
        },
    )?;

    let params = GenerationParams::resolve(&config.generation, provider.generation_defaults());
    tracing::debug!(?params, "Generation parameters");

    let template = PromptTemplate::new(config.system_prompt.as_str());
    let mut sink = TextStreamer::stdout(config.generation.skip_prompt);
    stream_prompt(
        &mut provider,
        &template,
        user_prompt.unwrap_or(DEFAULT_USER_PROMPT),
        &params,
        &mut sink,
    )
}
