//! Extract files from a CASC installation or CDN build

use anyhow::{Context, Result, bail};
use cascade_storage::{CascHandler, Mode, RetryPolicy, StorageConfig};
use clap::Parser;
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "cascade-extract",
    about = "Extract files from a CASC installation or CDN build",
    version
)]
struct Cli {
    /// Installation directory containing .build.info
    #[arg(long, env = "CASCADE_BASE_PATH", default_value = ".")]
    base_path: PathBuf,

    /// JSON storage configuration; command line options override it
    #[arg(long, env = "CASCADE_CONFIG")]
    config: Option<PathBuf>,

    /// Data source: local, online or offline
    #[arg(long, env = "CASCADE_MODE")]
    mode: Option<Mode>,

    /// CDN host, may be repeated
    #[arg(long = "cdn-host", env = "CASCADE_CDN_HOSTS", value_delimiter = ',')]
    cdn_hosts: Vec<String>,

    /// CDN path prefix such as tpr/wow
    #[arg(long, env = "CASCADE_CDN_PATH")]
    cdn_path: Option<String>,

    /// Cache directory for CDN downloads
    #[arg(long, env = "CASCADE_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Validate cached files by size only
    #[arg(long, env = "CASCADE_FAST_VALIDATION")]
    fast_validation: bool,

    /// Maximum attempts per CDN host
    #[arg(long, env = "CASCADE_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Key file with name;key lines
    #[arg(long, env = "CASCADE_KEY_FILE")]
    key_file: Option<PathBuf>,

    /// Locale name (enUS, deDE, ...) or hex mask
    #[arg(long, env = "CASCADE_LOCALE")]
    locale: Option<String>,

    /// Content flags mask
    #[arg(long, env = "CASCADE_CONTENT_FLAGS")]
    content_flags: Option<u32>,

    /// File path to extract, may be repeated
    #[arg(long = "name")]
    names: Vec<String>,

    /// File data ID to extract, may be repeated
    #[arg(long = "id")]
    ids: Vec<i32>,

    /// File with one path per line to extract
    #[arg(long)]
    list_file: Option<PathBuf>,

    /// Extract every file of the root table, named by name hash
    #[arg(long)]
    all: bool,

    /// Output directory
    #[arg(short, long, env = "CASCADE_OUTPUT", default_value = "extracted")]
    output: PathBuf,
}

impl Cli {
    fn storage_config(&self) -> Result<StorageConfig> {
        let mut config = match &self.config {
            Some(path) => StorageConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => StorageConfig::new(&self.base_path),
        };

        if self.config.is_some() && self.base_path != Path::new(".") {
            config.base_path.clone_from(&self.base_path);
        }
        if let Some(mode) = self.mode {
            config = config.with_mode(mode);
        }
        if !self.cdn_hosts.is_empty() {
            config = config.with_cdn_hosts(self.cdn_hosts.iter().cloned());
        }
        if let Some(path) = &self.cdn_path {
            config = config.with_cdn_path(path.clone());
        }
        if let Some(dir) = &self.cache_dir {
            config = config.with_cache_dir(dir);
        }
        if self.fast_validation {
            config = config.with_fast_validation(true);
        }
        if let Some(attempts) = self.max_retries {
            config = config.with_retry(RetryPolicy::default().with_max_attempts(attempts));
        }
        if let Some(path) = &self.key_file {
            config = config.with_key_file(path);
        }
        if let Some(locale) = &self.locale {
            config = config.with_locale(locale.clone());
        }
        if let Some(flags) = self.content_flags {
            config = config.with_content_flags(flags);
        }
        Ok(config)
    }
}

#[derive(Debug, Default)]
struct Summary {
    extracted: usize,
    failed: usize,
    bytes: u64,
}

impl Summary {
    fn record(&mut self, what: &str, output: &Path, result: cascade_storage::Result<Vec<u8>>) {
        let written = result
            .map_err(anyhow::Error::from)
            .and_then(|data| write_output(output, &data).map(|()| data.len()));

        match written {
            Ok(len) => {
                self.extracted += 1;
                self.bytes += len as u64;
            }
            Err(e) => {
                warn!("skipping {}: {:#}", what, e);
                self.failed += 1;
            }
        }
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut names = cli.names.clone();
    if let Some(path) = &cli.list_file {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading list file {}", path.display()))?;
        names.extend(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string),
        );
    }
    if names.is_empty() && cli.ids.is_empty() && !cli.all {
        bail!("nothing to extract; pass --name, --id, --list-file or --all");
    }

    let config = cli.storage_config()?;
    let handler = CascHandler::open(config).context("opening storage")?;
    if let Some(build) = handler.build_number() {
        info!("opened build {}", build);
    }

    let mut summary = Summary::default();

    for name in &names {
        let output = cli.output.join(relative_output_path(name));
        summary.record(name, &output, handler.read_file_by_name(name));
    }

    for id in &cli.ids {
        let output = cli.output.join(id.to_string());
        summary.record(&format!("file data ID {id}"), &output, handler.read_file_by_id(*id));
    }

    if cli.all {
        let mut seen = HashSet::new();
        for (entry, result) in handler.read_files(handler.locale(), handler.content_flags()) {
            let hash = entry.name_hash;
            // Further content variants of a name also carry their content key
            let file_name = if seen.insert(hash) {
                format!("{hash:016x}")
            } else {
                format!("{hash:016x}.{}", entry.md5)
            };
            let output = cli.output.join(file_name);
            summary.record(&format!("name hash {hash:016x}"), &output, result);
        }
    }

    info!(
        "extracted {} files ({} bytes), {} failed",
        summary.extracted, summary.bytes, summary.failed
    );
    println!(
        "extracted {} files ({} bytes), {} failed",
        summary.extracted, summary.bytes, summary.failed
    );
    Ok(())
}

fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, data).with_context(|| format!("writing {}", path.display()))
}

/// Relative output path for a CASC file name, dropping root and parent components
fn relative_output_path(name: &str) -> PathBuf {
    Path::new(&name.replace('\\', "/"))
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}
