//! Local Model Provider using Candle ML Framework
//!
//! Loads a Llama safetensors checkpoint saved by `download` and streams
//! completions from it. Supports CUDA (NVIDIA), Metal (Apple), and CPU.

use std::path::Path;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaConfig, LlamaEosToks};
use tokenizers::Tokenizer;

use crate::error::{LlamaError, LlamaResult, ModelError};
use crate::providers::params::{GenerationConfig, GenerationParams};
use crate::providers::{GenerationStats, TextGenerator};
use crate::setup::paths::{local_weight_files, CONFIG_FILE, TOKENIZER_FILE};
use crate::stream::{TokenOutputStream, TokenSink};

/// Looked up in the vocabulary when the model config names no EOS id
const EOS_TOKEN: &str = "</s>";

/// How to place the weights
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub device: Device,
    pub dtype: DType,
    pub use_flash_attn: bool,
    pub use_kv_cache: bool,
}

/// Llama model, tokenizer and the settings needed to run them
pub struct LocalLlamaProvider {
    model: Llama,
    config: Config,
    tokenizer: Tokenizer,
    device: Device,
    dtype: DType,
    use_kv_cache: bool,
    eos_token_ids: Vec<u32>,
    generation_defaults: Option<GenerationConfig>,
}

impl LocalLlamaProvider {
    /// Load from the directories written by `download`
    pub fn load(model_dir: &Path, tokenizer_dir: &Path, options: LoadOptions) -> LlamaResult<Self> {
        let start = Instant::now();
        tracing::info!(model_dir = %model_dir.display(), dtype = ?options.dtype, "Loading model");

        let config_path = model_dir.join(CONFIG_FILE);
        let raw = std::fs::read(&config_path).map_err(|e| {
            ModelError::not_downloaded(format!("{}: {}", config_path.display(), e))
        })?;
        let llama_config: LlamaConfig = serde_json::from_slice(&raw)
            .map_err(|e| ModelError::load_failed(format!("invalid {}: {}", CONFIG_FILE, e)))?;
        let config = llama_config.into_config(options.use_flash_attn);

        let filenames = local_weight_files(model_dir).ok_or_else(|| {
            ModelError::not_downloaded(format!(
                "no complete safetensors checkpoint in {}",
                model_dir.display()
            ))
        })?;
        tracing::debug!(files = filenames.len(), "Memory-mapping weights");

        // Safety: the files are not modified while mapped
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&filenames, options.dtype, &options.device) }
            .map_err(|e| ModelError::load_failed(format!("Failed to map weights: {}", e)))?;
        let model = Llama::load(vb, &config)
            .map_err(|e| ModelError::load_failed(format!("Failed to build model: {}", e)))?;

        tracing::info!(elapsed_s = start.elapsed().as_secs_f64(), "Model weights loaded");

        let tokenizer = load_tokenizer(tokenizer_dir)?;
        let generation_defaults = GenerationConfig::read(model_dir)?;
        let eos_token_ids = resolve_eos(config.eos_token_id.as_ref(), generation_defaults.as_ref(), &tokenizer);
        if eos_token_ids.is_empty() {
            tracing::warn!("No EOS token found; generation will always run to max_new_tokens");
        }

        Ok(Self {
            model,
            config,
            tokenizer,
            device: options.device,
            dtype: options.dtype,
            use_kv_cache: options.use_kv_cache,
            eos_token_ids,
            generation_defaults,
        })
    }

    /// Defaults from the model's `generation_config.json`, if it had one
    pub fn generation_defaults(&self) -> Option<&GenerationConfig> {
        self.generation_defaults.as_ref()
    }

    /// Longest sequence (prompt + generated) the model accepts
    pub fn context_length(&self) -> usize {
        self.config.max_position_embeddings
    }

    fn encode(&self, prompt: &str) -> LlamaResult<Vec<u32>> {
        // add_special_tokens prepends BOS, matching the chat template's expectations
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| LlamaError::Tokenizer(format!("Tokenization failed: {}", e)))?;
        Ok(encoding.get_ids().to_vec())
    }
}

impl TextGenerator for LocalLlamaProvider {
    fn name(&self) -> &str {
        "LocalLlama"
    }

    fn generate(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
        sink: &mut dyn TokenSink,
    ) -> LlamaResult<GenerationStats> {
        let mut tokens = self.encode(prompt)?;
        let prompt_tokens = tokens.len();
        let budget = generation_budget(prompt_tokens, params.max_new_tokens, self.context_length())?;

        tracing::debug!(prompt_tokens, budget, greedy = params.is_greedy(), "Starting generation");

        let cache = Cache::new(self.use_kv_cache, self.dtype, &self.config, &self.device)
            .map_err(|e| ModelError::inference_failed(format!("Failed to allocate cache: {}", e)))?;
        let mut step = LlamaStep {
            model: &self.model,
            cache,
            device: &self.device,
        };
        let mut stream = TokenOutputStream::new(self.tokenizer.clone());

        sink.on_prompt(prompt)?;

        let start = Instant::now();
        let settings = DecodeSettings {
            budget,
            use_kv_cache: self.use_kv_cache,
            eos_token_ids: &self.eos_token_ids,
        };
        let outcome = decode_loop(&mut step, &mut tokens, &settings, params, &mut stream, sink)?;

        if let Some(rest) = stream.decode_rest()? {
            sink.on_text(&rest)?;
        }
        sink.on_end()?;

        let stats = GenerationStats::new(prompt_tokens, outcome.generated, start.elapsed(), outcome.hit_eos);
        tracing::info!(
            prompt_tokens = stats.prompt_tokens,
            generated = stats.tokens_generated,
            tokens_per_second = stats.tokens_per_second,
            hit_eos = stats.hit_eos,
            "Generation complete"
        );
        Ok(stats)
    }
}

/// How many tokens may be generated after a prompt of `prompt_tokens`
fn generation_budget(prompt_tokens: usize, max_new_tokens: usize, context_length: usize) -> LlamaResult<usize> {
    if prompt_tokens == 0 {
        return Err(ModelError::invalid_input("prompt encodes to zero tokens").into());
    }
    if prompt_tokens >= context_length {
        return Err(ModelError::invalid_input(format!(
            "prompt is {} tokens, model context is {}",
            prompt_tokens, context_length
        ))
        .into());
    }
    Ok(max_new_tokens.min(context_length - prompt_tokens))
}

/// One forward pass: f32 logits over the vocabulary for the last position
trait ForwardStep {
    fn forward(&mut self, input: &[u32], index_pos: usize) -> LlamaResult<Tensor>;
}

struct LlamaStep<'a> {
    model: &'a Llama,
    cache: Cache,
    device: &'a Device,
}

impl ForwardStep for LlamaStep<'_> {
    fn forward(&mut self, input: &[u32], index_pos: usize) -> LlamaResult<Tensor> {
        let input = Tensor::new(input, self.device)?.unsqueeze(0)?;
        let logits = self.model.forward(&input, index_pos, &mut self.cache)?;
        Ok(logits.squeeze(0)?.to_dtype(DType::F32)?)
    }
}

struct DecodeSettings<'a> {
    budget: usize,
    use_kv_cache: bool,
    eos_token_ids: &'a [u32],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DecodeOutcome {
    generated: usize,
    hit_eos: bool,
}

/// Sample up to `settings.budget` tokens onto `tokens`, streaming text into
/// `sink`. An EOS token ends the loop and is never decoded.
fn decode_loop(
    step: &mut dyn ForwardStep,
    tokens: &mut Vec<u32>,
    settings: &DecodeSettings<'_>,
    params: &GenerationParams,
    stream: &mut TokenOutputStream,
    sink: &mut dyn TokenSink,
) -> LlamaResult<DecodeOutcome> {
    let mut logits_processor = LogitsProcessor::from_sampling(params.seed, params.sampling());
    let mut index_pos = 0;
    let mut outcome = DecodeOutcome {
        generated: 0,
        hit_eos: false,
    };

    for index in 0..settings.budget {
        // With a KV cache only the newest token is fed after the first step
        let (context_size, context_index) = if settings.use_kv_cache && index > 0 {
            (1, index_pos)
        } else {
            (tokens.len(), 0)
        };
        let ctxt = &tokens[tokens.len().saturating_sub(context_size)..];
        let logits = step.forward(ctxt, context_index)?;

        let logits = if params.repeat_penalty == 1.0 {
            logits
        } else {
            let start_at = tokens.len().saturating_sub(params.repeat_last_n);
            candle_transformers::utils::apply_repeat_penalty(
                &logits,
                params.repeat_penalty,
                &tokens[start_at..],
            )?
        };
        index_pos += ctxt.len();

        let next_token = logits_processor.sample(&logits)?;
        outcome.generated += 1;
        tokens.push(next_token);

        if settings.eos_token_ids.contains(&next_token) {
            outcome.hit_eos = true;
            break;
        }
        if let Some(text) = stream.next_token(next_token)? {
            sink.on_text(&text)?;
        }
    }
    Ok(outcome)
}

fn load_tokenizer(tokenizer_dir: &Path) -> LlamaResult<Tokenizer> {
    let path = tokenizer_dir.join(TOKENIZER_FILE);
    if !path.exists() {
        return Err(ModelError::not_downloaded(format!("{} not found", path.display())).into());
    }
    tracing::info!(path = %path.display(), "Loading tokenizer");
    Tokenizer::from_file(&path)
        .map_err(|e| LlamaError::Tokenizer(format!("Failed to load tokenizer: {}", e)))
}

/// EOS ids: the model config first, then `generation_config.json`, then the
/// `</s>` vocabulary entry
fn resolve_eos(
    from_config: Option<&LlamaEosToks>,
    defaults: Option<&GenerationConfig>,
    tokenizer: &Tokenizer,
) -> Vec<u32> {
    if let Some(eos) = from_config {
        return match eos {
            LlamaEosToks::Single(id) => vec![*id],
            LlamaEosToks::Multiple(ids) => ids.clone(),
        };
    }
    if let Some(eos) = defaults.and_then(|d| d.eos_token_id.as_ref()) {
        return eos.to_vec();
    }
    tokenizer.token_to_id(EOS_TOKEN).into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelErrorKind;
    use crate::providers::params::EosTokens;
    use crate::stream::TextStreamer;
    use std::str::FromStr;

    /// Returns one-hot logits for a fixed script of next tokens and records
    /// every `(input_len, index_pos)` it is called with
    struct ScriptedStep {
        script: Vec<u32>,
        vocab: usize,
        calls: Vec<(usize, usize)>,
    }

    impl ScriptedStep {
        fn new(script: &[u32]) -> Self {
            Self {
                script: script.to_vec(),
                vocab: 6,
                calls: Vec::new(),
            }
        }
    }

    impl ForwardStep for ScriptedStep {
        fn forward(&mut self, input: &[u32], index_pos: usize) -> LlamaResult<Tensor> {
            let next = self.script[self.calls.len()] as usize;
            self.calls.push((input.len(), index_pos));
            let mut logits = vec![0f32; self.vocab];
            logits[next] = 10.0;
            Ok(Tensor::new(logits.as_slice(), &Device::Cpu)?)
        }
    }

    /// ids: <unk>=0 (used as EOS here), one=1, two=2, three=3
    fn run_script(
        script: &[u32],
        budget: usize,
        use_kv_cache: bool,
    ) -> (DecodeOutcome, Vec<(usize, usize)>, String) {
        let mut step = ScriptedStep::new(script);
        let mut tokens = vec![1, 2, 3];
        let settings = DecodeSettings {
            budget,
            use_kv_cache,
            eos_token_ids: &[0],
        };
        let mut stream = TokenOutputStream::new(crate::stream::token_output_tests::word_tokenizer());
        let mut sink = TextStreamer::new(Vec::new(), true);
        let outcome = decode_loop(
            &mut step,
            &mut tokens,
            &settings,
            &GenerationParams::default(),
            &mut stream,
            &mut sink,
        )
        .unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        (outcome, step.calls, text)
    }

    fn tokenizer_with_eos() -> Tokenizer {
        Tokenizer::from_str(
            r#"{
                "version": "1.0",
                "truncation": null,
                "padding": null,
                "added_tokens": [],
                "normalizer": null,
                "pre_tokenizer": {"type": "Whitespace"},
                "post_processor": null,
                "decoder": null,
                "model": {"type": "WordLevel", "vocab": {"<unk>": 0, "</s>": 2}, "unk_token": "<unk>"}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_eos_prefers_model_config() {
        let defaults = GenerationConfig {
            eos_token_id: Some(EosTokens::Single(7)),
            ..GenerationConfig::default()
        };
        let ids = resolve_eos(
            Some(&LlamaEosToks::Multiple(vec![3, 4])),
            Some(&defaults),
            &tokenizer_with_eos(),
        );
        assert_eq!(ids, vec![3, 4]);
    }

    #[test]
    fn test_eos_falls_back_to_generation_config_then_vocab() {
        let defaults = GenerationConfig {
            eos_token_id: Some(EosTokens::Single(7)),
            ..GenerationConfig::default()
        };
        assert_eq!(resolve_eos(None, Some(&defaults), &tokenizer_with_eos()), vec![7]);
        assert_eq!(resolve_eos(None, None, &tokenizer_with_eos()), vec![2]);
    }

    #[test]
    fn test_load_without_download_reports_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let options = LoadOptions {
            device: Device::Cpu,
            dtype: DType::F32,
            use_flash_attn: false,
            use_kv_cache: true,
        };
        match LocalLlamaProvider::load(dir.path(), dir.path(), options) {
            Err(LlamaError::Model(e)) => {
                assert_eq!(e.kind, crate::error::ModelErrorKind::NotDownloaded)
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("load should fail on an empty directory"),
        }
    }

    #[test]
    fn test_missing_tokenizer_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_tokenizer(dir.path()).unwrap_err();
        assert!(matches!(err, LlamaError::Model(_)));
    }

    #[test]
    fn test_eos_stops_without_reaching_sink() {
        let (outcome, calls, text) = run_script(&[1, 2, 0, 3], 10, true);
        assert_eq!(
            outcome,
            DecodeOutcome {
                generated: 3,
                hit_eos: true
            }
        );
        assert_eq!(calls.len(), 3);
        assert_eq!(text, "one two");
        assert!(!text.contains("<unk>"));
    }

    #[test]
    fn test_budget_caps_generation() {
        let (outcome, calls, text) = run_script(&[1, 2, 3, 1], 2, true);
        assert_eq!(
            outcome,
            DecodeOutcome {
                generated: 2,
                hit_eos: false
            }
        );
        assert_eq!(calls.len(), 2);
        assert_eq!(text, "one two");
    }

    #[test]
    fn test_kv_cache_feeds_one_token_at_advancing_positions() {
        let (_, calls, _) = run_script(&[1, 2, 3, 0], 10, true);
        // prompt of 3, then one token at a time
        assert_eq!(calls, vec![(3, 0), (1, 3), (1, 4), (1, 5)]);
    }

    #[test]
    fn test_without_kv_cache_refeeds_whole_sequence() {
        let (_, calls, _) = run_script(&[1, 2, 0], 10, false);
        assert_eq!(calls, vec![(3, 0), (4, 0), (5, 0)]);
    }

    #[test]
    fn test_generation_budget() {
        assert_eq!(generation_budget(10, 500, 4096).unwrap(), 500);
        // clamped to the room left in the context
        assert_eq!(generation_budget(4000, 500, 4096).unwrap(), 96);

        for (prompt, ctx) in [(0, 4096), (4096, 4096), (5000, 4096)] {
            match generation_budget(prompt, 500, ctx) {
                Err(LlamaError::Model(e)) => assert_eq!(e.kind, ModelErrorKind::InvalidInput),
                other => panic!("expected InvalidInput, got {:?}", other),
            }
        }
    }
}
