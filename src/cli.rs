//! Command-line interface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use llama_stream_lib::Config;

#[derive(Parser, Debug)]
#[command(name = "llama-stream")]
#[command(version)]
#[command(about = "Download a Llama chat model from the Hugging Face Hub and stream a completion", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file (defaults to ./llama-stream.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Hub repository id
    #[arg(long, global = true)]
    pub model_id: Option<String>,

    /// Branch, tag or commit
    #[arg(long, global = true)]
    pub revision: Option<String>,

    /// Directory the model is saved to and loaded from
    #[arg(long, global = true)]
    pub model_dir: Option<PathBuf>,

    /// Directory the tokenizer is saved to and loaded from
    #[arg(long, global = true)]
    pub tokenizer_dir: Option<PathBuf>,

    /// Hub cache directory
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// auto, cpu, cuda, cuda:N or metal
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// f16, bf16 or f32
    #[arg(long, global = true)]
    pub dtype: Option<String>,

    /// Hide download progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download the model and tokenizer, save them locally, and exit
    Download,

    /// Stream a completion for PROMPT from the saved model
    Run {
        /// User request (defaults to "Count to ten")
        prompt: Option<String>,

        /// Download first if the local model is incomplete
        #[arg(long)]
        download: bool,

        #[command(flatten)]
        generation: GenerationArgs,
    },

    /// Print the resolved configuration as TOML (the hub token is never shown)
    Config,

    /// Print the formatted prompt without loading the model
    Prompt {
        /// User request (defaults to "Count to ten")
        prompt: Option<String>,

        /// Override the system prompt
        #[arg(long)]
        system_prompt: Option<String>,
    },
}

#[derive(Args, Debug, Default)]
pub struct GenerationArgs {
    /// Override the system prompt
    #[arg(long)]
    pub system_prompt: Option<String>,

    /// The number of tokens to generate
    #[arg(short = 'n', long)]
    pub max_new_tokens: Option<usize>,

    /// The temperature used to generate samples (0 = greedy)
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Nucleus sampling probability cutoff
    #[arg(long)]
    pub top_p: Option<f64>,

    /// Only sample among the top K tokens
    #[arg(long)]
    pub top_k: Option<usize>,

    /// The seed to use when generating random samples
    #[arg(long)]
    pub seed: Option<u64>,

    /// Penalty applied to repeated tokens, 1.0 means no penalty
    #[arg(long)]
    pub repeat_penalty: Option<f32>,

    /// The context size considered for the repeat penalty
    #[arg(long)]
    pub repeat_last_n: Option<usize>,

    /// Do not echo the prompt before the completion
    #[arg(long)]
    pub skip_prompt: bool,

    /// Disable the key-value cache
    #[arg(long)]
    pub no_kv_cache: bool,

    #[arg(long)]
    pub use_flash_attn: bool,
}

impl Cli {
    /// Apply global flags on top of a loaded config
    pub fn apply(&self, config: &mut Config) {
        if let Some(v) = &self.model_id {
            config.model_id = v.clone();
        }
        if let Some(v) = &self.revision {
            config.revision = v.clone();
        }
        if let Some(v) = &self.model_dir {
            config.model_dir = v.clone();
        }
        if let Some(v) = &self.tokenizer_dir {
            config.tokenizer_dir = v.clone();
        }
        if let Some(v) = &self.cache_dir {
            config.cache_dir = Some(v.clone());
        }
        if let Some(v) = &self.device {
            config.device = v.clone();
        }
        if let Some(v) = &self.dtype {
            config.dtype = Some(v.clone());
        }
        if self.no_progress {
            config.show_progress = false;
        }
    }
}

impl GenerationArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(v) = &self.system_prompt {
            config.system_prompt = v.clone();
        }
        let generation = &mut config.generation;
        if let Some(v) = self.max_new_tokens {
            generation.max_new_tokens = v;
        }
        if let Some(v) = self.temperature {
            generation.temperature = Some(v);
        }
        if let Some(v) = self.top_p {
            generation.top_p = Some(v);
        }
        if let Some(v) = self.top_k {
            generation.top_k = Some(v);
        }
        if let Some(v) = self.seed {
            generation.seed = v;
        }
        if let Some(v) = self.repeat_penalty {
            generation.repeat_penalty = v;
        }
        if let Some(v) = self.repeat_last_n {
            generation.repeat_last_n = v;
        }
        if self.skip_prompt {
            generation.skip_prompt = true;
        }
        if self.no_kv_cache {
            generation.use_kv_cache = false;
        }
        if self.use_flash_attn {
            config.use_flash_attn = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["llama-stream", "run"]).unwrap();
        match cli.command {
            Commands::Run { prompt, download, .. } => {
                assert_eq!(prompt, None);
                assert!(!download);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "llama-stream",
            "run",
            "Count to five",
            "--model-id",
            "meta-llama/Llama-2-7b-chat-hf",
            "--device",
            "cpu",
            "-n",
            "32",
            "--temperature",
            "0.5",
            "--skip-prompt",
        ])
        .unwrap();

        let mut config = Config::default();
        cli.apply(&mut config);
        let Commands::Run { prompt, generation, .. } = &cli.command else {
            panic!("expected run");
        };
        generation.apply(&mut config);

        assert_eq!(prompt.as_deref(), Some("Count to five"));
        assert_eq!(config.model_id, "meta-llama/Llama-2-7b-chat-hf");
        assert_eq!(config.device, "cpu");
        assert_eq!(config.generation.max_new_tokens, 32);
        assert_eq!(config.generation.temperature, Some(0.5));
        assert!(config.generation.skip_prompt);
        // untouched
        assert_eq!(config.generation.seed, 299_792_458);
        assert_eq!(config.model_dir, PathBuf::from("./model"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["llama-stream", "download", "--model-dir", "/tmp/m", "--no-progress"]).unwrap();
        let mut config = Config::default();
        cli.apply(&mut config);
        assert!(matches!(cli.command, Commands::Download));
        assert_eq!(config.model_dir, PathBuf::from("/tmp/m"));
        assert!(!config.show_progress);
    }

    #[test]
    fn test_unknown_subcommand_rejected() {
        assert!(Cli::try_parse_from(["llama-stream", "train"]).is_err());
    }
}
