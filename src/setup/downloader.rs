//! Hub Downloader
//!
//! Fetches model and tokenizer files through hf-hub (which owns the cache
//! and the progress bars) and saves them into the local directories.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::Instant;

use hf_hub::api::sync::{Api, ApiBuilder, ApiRepo};
use hf_hub::{Cache, Repo, RepoType};

use super::paths::{
    ensure_directories, get_cache_dir, get_model_dir, get_tokenizer_dir, weight_files,
    CONFIG_FILE, GENERATION_CONFIG_FILE, OPTIONAL_TOKENIZER_FILES, SINGLE_WEIGHTS_FILE,
    TOKENIZER_FILE, WEIGHTS_INDEX_FILE,
};
use crate::config::{Config, HubToken};
use crate::error::{HubError, HubErrorCode, LlamaError, LlamaResult};

/// Somewhere repo files can be fetched from by name
pub trait FileSource {
    /// Fetch a required file, returning its local path
    fn fetch(&self, filename: &str) -> LlamaResult<PathBuf>;

    /// Fetch a file the repo may not have. Only a 404 yields `None`; auth
    /// and network failures are still errors.
    fn try_fetch(&self, filename: &str) -> LlamaResult<Option<PathBuf>> {
        match self.fetch(filename) {
            Ok(path) => Ok(Some(path)),
            Err(LlamaError::Hub(e)) if e.code == HubErrorCode::NotFound => {
                tracing::debug!(file = filename, error = %e, "Optional file not in repo");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl FileSource for ApiRepo {
    fn fetch(&self, filename: &str) -> LlamaResult<PathBuf> {
        tracing::debug!(file = filename, "Fetching from hub");
        self.get(filename).map_err(|e| {
            let mut err = HubError::classify(e.to_string());
            err.message = format!("{}: {}", filename, err.message);
            LlamaError::Hub(err)
        })
    }
}

/// What a download run saved
#[derive(Debug, Default, Clone)]
pub struct DownloadReport {
    pub model_files: Vec<PathBuf>,
    pub tokenizer_files: Vec<PathBuf>,
    /// Files written this run (the rest were already up to date)
    pub saved: usize,
}

/// Where the hub credential for a download comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// `HF_TOKEN`, a dotenv file or the config file
    Configured,
    /// The token saved by `huggingface-cli login`
    CachedLogin,
    Anonymous,
}

/// A configured token wins over the saved login
pub fn token_source(configured: Option<&HubToken>, cached_login: Option<&str>) -> TokenSource {
    if configured.is_some() {
        TokenSource::Configured
    } else if cached_login.is_some_and(|t| !t.trim().is_empty()) {
        TokenSource::CachedLogin
    } else {
        TokenSource::Anonymous
    }
}

/// Build the hub client from config
pub fn build_api(config: &Config) -> LlamaResult<Api> {
    // ApiBuilder::new() already picked up the saved login; only replace it
    // with a token we actually have
    let mut builder = ApiBuilder::new().with_progress(config.show_progress);

    let cached_login = Cache::default().token();
    match token_source(config.hub_token.as_ref(), cached_login.as_deref()) {
        TokenSource::Configured => {
            let token = config.hub_token.as_ref().map(|t| t.expose().to_string());
            builder = builder.with_token(token);
        }
        TokenSource::CachedLogin => {
            tracing::debug!("Using the token saved by huggingface-cli login");
        }
        TokenSource::Anonymous => {
            tracing::warn!(
                "No hub token set (HF_TOKEN or huggingface-cli login); gated repos such as {} will refuse the download",
                config.model_id
            );
        }
    }

    if let Some(cache) = get_cache_dir(config) {
        builder = builder.with_cache_dir(cache);
    }
    Ok(builder.build()?)
}

/// Open the configured model repo
pub fn open_repo(api: &Api, config: &Config) -> ApiRepo {
    api.repo(Repo::with_revision(
        config.model_id.clone(),
        RepoType::Model,
        config.revision.clone(),
    ))
}

/// Download model and tokenizer into their local directories
pub fn download_all(config: &Config) -> LlamaResult<DownloadReport> {
    let start = Instant::now();
    ensure_directories(config)?;

    let api = build_api(config)?;
    let repo = open_repo(&api, config);

    tracing::info!(model = %config.model_id, revision = %config.revision, "Starting download");

    let mut report = DownloadReport::default();
    let model_dir = get_model_dir(config);
    let tokenizer_dir = get_tokenizer_dir(config);

    let (files, saved) = download_model_files(&repo, &model_dir)?;
    report.model_files = files;
    report.saved += saved;

    let (files, saved) = download_tokenizer_files(&repo, &tokenizer_dir)?;
    report.tokenizer_files = files;
    report.saved += saved;

    tracing::info!(
        model_files = report.model_files.len(),
        tokenizer_files = report.tokenizer_files.len(),
        saved = report.saved,
        elapsed_s = start.elapsed().as_secs_f64(),
        "Download complete"
    );
    Ok(report)
}

/// Download only the model files into the configured model directory
pub fn download_model(config: &Config) -> LlamaResult<(Vec<PathBuf>, usize)> {
    let api = build_api(config)?;
    download_model_files(&open_repo(&api, config), &get_model_dir(config))
}

/// Download only the tokenizer files into the configured tokenizer directory
pub fn download_tokenizer(config: &Config) -> LlamaResult<(Vec<PathBuf>, usize)> {
    let api = build_api(config)?;
    download_tokenizer_files(&open_repo(&api, config), &get_tokenizer_dir(config))
}

/// Fetch config, generation config and weights into `model_dir`.
///
/// Returns the saved paths and how many were written this run.
pub fn download_model_files(
    source: &dyn FileSource,
    model_dir: &Path,
) -> LlamaResult<(Vec<PathBuf>, usize)> {
    let mut fetched: Vec<(String, PathBuf)> = Vec::new();

    fetched.push((CONFIG_FILE.to_string(), source.fetch(CONFIG_FILE)?));
    if let Some(path) = source.try_fetch(GENERATION_CONFIG_FILE)? {
        fetched.push((GENERATION_CONFIG_FILE.to_string(), path));
    }

    match source.try_fetch(WEIGHTS_INDEX_FILE)? {
        Some(index_path) => {
            let contents = std::fs::read_to_string(&index_path)?;
            let shards = weight_files(&contents)?;
            if shards.is_empty() {
                return Err(HubError::not_found(format!("{} lists no shards", WEIGHTS_INDEX_FILE)).into());
            }
            tracing::info!(shards = shards.len(), "Fetching sharded weights");
            fetched.push((WEIGHTS_INDEX_FILE.to_string(), index_path));
            for shard in shards {
                let path = source.fetch(&shard)?;
                fetched.push((shard, path));
            }
        }
        None => {
            fetched.push((SINGLE_WEIGHTS_FILE.to_string(), source.fetch(SINGLE_WEIGHTS_FILE)?));
        }
    }

    save_all(&fetched, model_dir)
}

/// Fetch `tokenizer.json` and the optional side files into `tokenizer_dir`
pub fn download_tokenizer_files(
    source: &dyn FileSource,
    tokenizer_dir: &Path,
) -> LlamaResult<(Vec<PathBuf>, usize)> {
    let mut fetched = vec![(TOKENIZER_FILE.to_string(), source.fetch(TOKENIZER_FILE)?)];
    for name in OPTIONAL_TOKENIZER_FILES {
        if let Some(path) = source.try_fetch(name)? {
            fetched.push((name.to_string(), path));
        }
    }
    save_all(&fetched, tokenizer_dir)
}

fn save_all(fetched: &[(String, PathBuf)], dest_dir: &Path) -> LlamaResult<(Vec<PathBuf>, usize)> {
    std::fs::create_dir_all(dest_dir)?;
    let mut saved_paths = Vec::with_capacity(fetched.len());
    let mut written = 0;
    for (name, src) in fetched {
        let dest = dest_dir.join(name);
        if save_file(src, &dest)? {
            written += 1;
        }
        saved_paths.push(dest);
    }
    Ok((saved_paths, written))
}

/// Place `src` at `dest`. Returns false when `dest` is already up to date
/// with the blob `src` resolves to.
///
/// The hub cache stores blobs behind symlinks, so the link target is resolved
/// and hard-linked; copying is the fallback across filesystems.
pub fn save_file(src: &Path, dest: &Path) -> LlamaResult<bool> {
    let resolved = std::fs::canonicalize(src)?;
    let blob = std::fs::metadata(&resolved)?;
    let src_len = blob.len();
    if let Ok(existing) = std::fs::metadata(dest) {
        if is_current(&blob, &existing) {
            tracing::debug!(file = %dest.display(), "Already saved, skipping");
            return Ok(false);
        }
        std::fs::remove_file(dest)?;
    }

    if let Err(e) = std::fs::hard_link(&resolved, dest) {
        tracing::debug!(error = %e, "Hard link failed, copying instead");
        std::fs::copy(&resolved, dest)?;
    }
    tracing::info!(file = %dest.display(), bytes = src_len, "Saved");
    Ok(true)
}

/// `dest` is current when it is the blob itself (a hard link), or a copy
/// of the same length written no earlier than the blob. A new revision
/// brings a newer blob, so an older copy is replaced even at equal length.
fn is_current(blob: &Metadata, dest: &Metadata) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if blob.dev() == dest.dev() && blob.ino() == dest.ino() {
            return true;
        }
    }

    if blob.len() != dest.len() {
        return false;
    }
    match (blob.modified(), dest.modified()) {
        (Ok(blob_time), Ok(dest_time)) => dest_time >= blob_time,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::paths::SetupStatus;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    /// Serves files out of a directory, 404 for anything else
    struct DirSource {
        root: PathBuf,
    }

    impl FileSource for DirSource {
        fn fetch(&self, filename: &str) -> LlamaResult<PathBuf> {
            let path = self.root.join(filename);
            if path.exists() {
                Ok(path)
            } else {
                Err(HubError::not_found(format!("{}: status code 404", filename)).into())
            }
        }
    }

    /// Like `DirSource`, but one file fails with a transport error
    struct FlakySource {
        inner: DirSource,
        broken: &'static str,
    }

    impl FileSource for FlakySource {
        fn fetch(&self, filename: &str) -> LlamaResult<PathBuf> {
            if filename == self.broken {
                return Err(HubError::network(format!("{}: Transport(Connection reset)", filename)).into());
            }
            self.inner.fetch(filename)
        }
    }

    fn write(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn test_sharded_model_download() {
        let hub = tempdir().unwrap();
        let out = tempdir().unwrap();
        write(hub.path(), CONFIG_FILE, "{}");
        write(
            hub.path(),
            WEIGHTS_INDEX_FILE,
            r#"{"weight_map": {"a": "model-00001-of-00002.safetensors", "b": "model-00002-of-00002.safetensors"}}"#,
        );
        write(hub.path(), "model-00001-of-00002.safetensors", "one");
        write(hub.path(), "model-00002-of-00002.safetensors", "two");

        let source = DirSource { root: hub.path().to_path_buf() };
        let (files, saved) = download_model_files(&source, out.path()).unwrap();

        // config + index + 2 shards, no generation config in this repo
        assert_eq!(files.len(), 4);
        assert_eq!(saved, 4);
        assert_eq!(
            std::fs::read_to_string(out.path().join("model-00002-of-00002.safetensors")).unwrap(),
            "two"
        );
        assert!(!out.path().join(GENERATION_CONFIG_FILE).exists());
    }

    #[test]
    fn test_second_run_skips_saved_files() {
        let hub = tempdir().unwrap();
        let out = tempdir().unwrap();
        write(hub.path(), CONFIG_FILE, "{}");
        write(hub.path(), GENERATION_CONFIG_FILE, "{}");
        write(hub.path(), SINGLE_WEIGHTS_FILE, "weights");

        let source = DirSource { root: hub.path().to_path_buf() };
        let (_, first) = download_model_files(&source, out.path()).unwrap();
        let (files, second) = download_model_files(&source, out.path()).unwrap();

        assert_eq!(first, 3);
        assert_eq!(second, 0);
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn test_missing_config_fails() {
        let hub = tempdir().unwrap();
        let out = tempdir().unwrap();
        write(hub.path(), SINGLE_WEIGHTS_FILE, "weights");

        let source = DirSource { root: hub.path().to_path_buf() };
        match download_model_files(&source, out.path()) {
            Err(LlamaError::Hub(e)) => assert_eq!(e.code, HubErrorCode::NotFound),
            other => panic!("expected hub error, got {:?}", other),
        }
    }

    #[test]
    fn test_tokenizer_download_with_optional_files() {
        let hub = tempdir().unwrap();
        let model_out = tempdir().unwrap();
        let tok_out = tempdir().unwrap();
        write(hub.path(), TOKENIZER_FILE, r#"{"model": {}}"#);
        write(hub.path(), "tokenizer_config.json", "{}");

        let source = DirSource { root: hub.path().to_path_buf() };
        let (files, saved) = download_tokenizer_files(&source, tok_out.path()).unwrap();

        assert_eq!(saved, 2);
        assert_eq!(files[0], tok_out.path().join(TOKENIZER_FILE));
        assert!(!tok_out.path().join("special_tokens_map.json").exists());
        assert!(SetupStatus::check(model_out.path(), tok_out.path()).tokenizer_ok);
    }

    #[test]
    fn test_save_file_replaces_truncated_copy() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.bin");
        let dest = dir.path().join("dest.bin");
        std::fs::write(&src, "complete").unwrap();
        std::fs::write(&dest, "part").unwrap();

        assert!(save_file(&src, &dest).unwrap());
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "complete");
        assert!(!save_file(&src, &dest).unwrap());
    }

    #[test]
    fn test_index_network_error_is_not_treated_as_missing() {
        let hub = tempdir().unwrap();
        let out = tempdir().unwrap();
        write(hub.path(), CONFIG_FILE, "{}");
        write(hub.path(), WEIGHTS_INDEX_FILE, r#"{"weight_map": {"a": "model-00001-of-00001.safetensors"}}"#);
        write(hub.path(), "model-00001-of-00001.safetensors", "one");

        let source = FlakySource {
            inner: DirSource { root: hub.path().to_path_buf() },
            broken: WEIGHTS_INDEX_FILE,
        };
        match download_model_files(&source, out.path()) {
            Err(LlamaError::Hub(e)) => {
                assert_eq!(e.code, HubErrorCode::Network);
                assert!(e.message.contains(WEIGHTS_INDEX_FILE));
            }
            other => panic!("expected network error, got {:?}", other),
        }
        assert!(!out.path().join(SINGLE_WEIGHTS_FILE).exists());
    }

    #[test]
    fn test_optional_tokenizer_file_auth_error_propagates() {
        let hub = tempdir().unwrap();
        let out = tempdir().unwrap();
        write(hub.path(), TOKENIZER_FILE, r#"{"model": {}}"#);

        struct Gated(DirSource);
        impl FileSource for Gated {
            fn fetch(&self, filename: &str) -> LlamaResult<PathBuf> {
                if filename == TOKENIZER_FILE {
                    return self.0.fetch(filename);
                }
                Err(HubError::classify(format!("{}: status code 401", filename)).into())
            }
        }

        let source = Gated(DirSource { root: hub.path().to_path_buf() });
        match download_tokenizer_files(&source, out.path()) {
            Err(LlamaError::Hub(e)) => assert_eq!(e.code, HubErrorCode::InvalidToken),
            other => panic!("expected auth error, got {:?}", other),
        }
    }

    #[test]
    fn test_token_source_precedence() {
        let configured = HubToken::new("hf_env");
        assert_eq!(token_source(configured.as_ref(), Some("hf_login")), TokenSource::Configured);
        assert_eq!(token_source(None, Some("hf_login")), TokenSource::CachedLogin);
        assert_eq!(token_source(None, Some("  ")), TokenSource::Anonymous);
        assert_eq!(token_source(None, None), TokenSource::Anonymous);
    }

    #[test]
    fn test_save_file_replaces_stale_copy_of_same_length() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("blob");
        let dest = dir.path().join("config.json");
        std::fs::write(&dest, r#"{"rev":"a"}"#).unwrap();
        std::fs::File::options()
            .write(true)
            .open(&dest)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(3600))
            .unwrap();
        std::fs::write(&src, r#"{"rev":"b"}"#).unwrap();

        assert!(save_file(&src, &dest).unwrap());
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), r#"{"rev":"b"}"#);
        // now linked to the blob
        assert!(!save_file(&src, &dest).unwrap());
    }
}
