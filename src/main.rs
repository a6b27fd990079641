//! llama-stream binary

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use llama_stream_lib::commands::{download::download, prompt::render_prompt, run::run};
use llama_stream_lib::Config;

mod cli;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();
    // before tracing so RUST_LOG from a dotenv file applies
    load_env_files(Path::new("."));
    init_tracing(cli.verbose);

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut config);

    match &cli.command {
        Commands::Download => {
            let report = download(&config)
                .with_context(|| format!("Failed to download {}", config.model_id))?;
            tracing::info!(
                model_dir = %config.model_dir.display(),
                tokenizer_dir = %config.tokenizer_dir.display(),
                files = report.model_files.len() + report.tokenizer_files.len(),
                "Saved model and tokenizer"
            );
        }
        Commands::Run {
            prompt,
            download,
            generation,
        } => {
            generation.apply(&mut config);
            let stats = run(&config, prompt.as_deref(), *download).context("Generation failed")?;
            tracing::info!(
                tokens = stats.tokens_generated,
                seconds = stats.total_time.as_secs_f64(),
                tokens_per_second = stats.tokens_per_second,
                "Done"
            );
        }
        Commands::Config => {
            print!("{}", config.to_toml().context("Failed to render configuration")?);
            tracing::info!(token_set = config.hub_token.is_some(), "Hub token");
        }
        Commands::Prompt {
            prompt,
            system_prompt,
        } => {
            if let Some(system) = system_prompt {
                config.system_prompt = system.clone();
            }
            print!("{}", render_prompt(&config, prompt.as_deref()));
        }
    }

    Ok(())
}

/// Load `.env.local` then `.env` from `dir`. Earlier values win and neither
/// overrides the real environment.
fn load_env_files(dir: &Path) {
    for name in [".env.local", ".env"] {
        let path = dir.join(name);
        if path.exists() {
            if let Err(e) = dotenv::from_path(&path) {
                eprintln!("Ignoring {}: {}", path.display(), e);
            }
        }
    }
}

/// Logs go to stderr so stdout carries only generated text
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "llama_stream=debug,llama_stream_lib=debug"
    } else {
        "llama_stream=info,llama_stream_lib=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
