//! Download command
//!
//! Fetches the model and tokenizer and saves them locally. The process is
//! expected to exit right after; generation is a separate `run`.

use crate::config::Config;
use crate::error::LlamaResult;
use crate::setup::downloader::{download_all, DownloadReport};
use crate::setup::paths::SetupStatus;

pub fn download(config: &Config) -> LlamaResult<DownloadReport> {
    let before = SetupStatus::for_config(config);
    tracing::info!(
        model_ok = before.model_ok,
        tokenizer_ok = before.tokenizer_ok,
        "Setup status before download"
    );

    let report = download_all(config)?;

    let after = SetupStatus::for_config(config);
    if !after.is_complete() {
        tracing::warn!(
            model_ok = after.model_ok,
            tokenizer_ok = after.tokenizer_ok,
            "Download finished but the local directories are incomplete"
        );
    }
    Ok(report)
}
