//! Effective archiver settings
//!
//! Each setting resolves as: command line, then the `[archive]` table of the
//! TOML config, then the compiled default. The root folder follows the common
//! resolver (which also honours `CHARTKEEP_ROOT_FOLDER`).

use crate::error::{ArchiverError, Result};
use crate::fetch::client::DEFAULT_BASE_URL;
use crate::ranking::{RankPolicy, DEFAULT_CHART_SIZE};
use crate::scheduler::ResumePolicy;
use chartkeep_common::config::{RootFolderResolver, StorageBackend, TomlConfig};
use chartkeep_common::Cadence;
use chrono::NaiveDate;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REQUEST_SPACING_MS: u64 = 0;

/// Values supplied on the command line; `None` defers to the config file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root_folder: Option<PathBuf>,
    pub start_date: Option<NaiveDate>,
    pub concurrency: Option<usize>,
    pub backend: Option<StorageBackend>,
    pub resume_policy: Option<ResumePolicy>,
    pub rank_policy: Option<RankPolicy>,
    pub no_fetch: bool,
}

/// Fully resolved configuration for one archival cycle
#[derive(Debug, Clone)]
pub struct ArchiverConfig {
    pub root_folder: PathBuf,
    pub backend: StorageBackend,
    pub cadence: Cadence,
    pub start_date: NaiveDate,
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub request_spacing: Duration,
    pub base_url: String,
    pub chart_size: u32,
    pub resume_policy: ResumePolicy,
    pub rank_policy: RankPolicy,
    /// False re-ranks the existing archive without contacting upstream
    pub fetch: bool,
}

impl ArchiverConfig {
    pub fn resolve(cli: &CliOverrides, toml: &TomlConfig) -> Result<Self> {
        let archive = &toml.archive;
        let cadence = Cadence::weekly();

        let root_folder = RootFolderResolver::new(cli.root_folder.as_deref(), toml).resolve();

        let concurrency = cli
            .concurrency
            .or(archive.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(ArchiverError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }

        let chart_size = archive.chart_size.unwrap_or(DEFAULT_CHART_SIZE);
        if chart_size == 0 {
            return Err(ArchiverError::Config(
                "chart_size must be at least 1".to_string(),
            ));
        }

        let timeout_secs = archive
            .request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ArchiverError::Config(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }

        let resume_policy = match cli.resume_policy {
            Some(policy) => policy,
            None => parse_setting("resume_policy", archive.resume_policy.as_deref())?
                .unwrap_or_default(),
        };
        let rank_policy = match cli.rank_policy {
            Some(policy) => policy,
            None => parse_setting("rank_policy", archive.rank_policy.as_deref())?
                .unwrap_or_default(),
        };

        Ok(Self {
            root_folder,
            backend: cli.backend.or(archive.backend).unwrap_or_default(),
            cadence,
            start_date: cli
                .start_date
                .or(archive.start_date)
                .unwrap_or_else(|| cadence.anchor()),
            concurrency,
            request_timeout: Duration::from_secs(timeout_secs),
            request_spacing: Duration::from_millis(
                archive
                    .request_spacing_ms
                    .unwrap_or(DEFAULT_REQUEST_SPACING_MS),
            ),
            base_url: archive
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            chart_size,
            resume_policy,
            rank_policy,
            fetch: !cli.no_fetch,
        })
    }
}

/// Parse an optional string setting from the config file
fn parse_setting<T: FromStr<Err = String>>(key: &str, value: Option<&str>) -> Result<Option<T>> {
    value
        .map(|raw| {
            raw.parse()
                .map_err(|e| ArchiverError::Config(format!("[archive] {}: {}", key, e)))
        })
        .transpose()
}
