//! Run configuration: optional TOML file merged with CLI flags.
//!
//! Precedence is CLI flag > config file > built-in default.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use archive_fetcher::archive::DEFAULT_ARCHIVE_BASE;
use archive_fetcher::crawl::DEFAULT_ALLOWED_DOMAINS;
use archive_fetcher::download::{DEFAULT_MAX_RETRIES, DEFAULT_PROXY_URL, Transport};
use archive_fetcher::identity::{ControlAuth, DEFAULT_CONTROL_ADDR, DEFAULT_SETTLE};
use archive_fetcher::{DEFAULT_CONCURRENCY, DEFAULT_ROTATE_EVERY, RunMode};
use serde::Deserialize;
use url::Url;

use crate::cli::Args;

const CONFIG_DIR_NAME: &str = "archive-fetcher";
const CONFIG_FILE_NAME: &str = "config.toml";

/// TOML-backed file configuration. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// `sequential` or `concurrent`.
    pub mode: Option<RunMode>,
    /// Worker count (1..=100).
    pub concurrency: Option<usize>,
    /// Backoff cycles per page (1..=100).
    pub max_retries: Option<u32>,
    /// Output root directory.
    pub output_dir: Option<PathBuf>,
    /// Archive service base URL.
    pub archive_base: Option<String>,
    /// Proxy URL.
    pub proxy: Option<String>,
    /// Disable the proxy entirely.
    pub direct: Option<bool>,
    /// Tor control port address.
    pub control_addr: Option<String>,
    /// Tor control port password.
    pub control_password: Option<String>,
    /// Tor control cookie file.
    pub control_cookie: Option<PathBuf>,
    /// Pages between identity rotations (0 disables).
    pub rotate_every: Option<u32>,
    /// Pause after a rotation, in seconds (0..=600).
    pub settle_secs: Option<u64>,
    /// Hosts whose resources are always fetched.
    pub allowed_domains: Option<Vec<String>>,
}

impl FileConfig {
    /// Parses TOML text.
    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates config values against the same constraints as the CLI.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=100).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=100");
        }
        if let Some(max_retries) = self.max_retries
            && !(1..=100).contains(&max_retries)
        {
            bail!("Invalid config value for `max_retries`: {max_retries}. Expected range: 1..=100");
        }
        if let Some(settle_secs) = self.settle_secs
            && settle_secs > 600
        {
            bail!("Invalid config value for `settle_secs`: {settle_secs}. Expected range: 0..=600");
        }
        if let Some(base) = &self.archive_base {
            validate_archive_base(base)?;
        }
        if let Some(proxy) = &self.proxy {
            validate_proxy(proxy)?;
        }
        if self.proxy.is_some() && self.direct == Some(true) {
            bail!("Config sets both `proxy` and `direct = true`");
        }
        if self.control_password.is_some() && self.control_cookie.is_some() {
            bail!("Config sets both `control_password` and `control_cookie`");
        }
        Ok(())
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub input: PathBuf,
    pub mode: RunMode,
    pub concurrency: usize,
    pub max_retries: u32,
    pub output_dir: PathBuf,
    pub archive_base: String,
    pub transport: Transport,
    pub control_addr: String,
    pub control_auth: ControlAuth,
    pub rotate_every: u32,
    pub settle: Duration,
    pub allowed_domains: Vec<String>,
}

impl Settings {
    /// Merges CLI flags over the (optional) file config and fills defaults.
    pub fn resolve(args: &Args, file: Option<&FileConfig>) -> Result<Self> {
        let file = file.cloned().unwrap_or_default();

        let mode = args.mode.or(file.mode).unwrap_or_default();
        let archive_base = args
            .archive_base
            .clone()
            .or(file.archive_base)
            .unwrap_or_else(|| DEFAULT_ARCHIVE_BASE.to_string());
        validate_archive_base(&archive_base)?;

        // An explicit CLI choice of transport beats anything in the file.
        let (proxy, direct) = if args.direct || args.proxy.is_some() {
            (args.proxy.clone(), args.direct)
        } else {
            (file.proxy, file.direct.unwrap_or(false))
        };
        let transport = match (proxy, direct, mode) {
            (_, true, _) => Transport::Direct,
            (Some(proxy), false, _) => {
                validate_proxy(&proxy)?;
                Transport::Proxy(proxy)
            }
            (None, false, RunMode::Sequential) => Transport::Direct,
            (None, false, RunMode::Concurrent) => Transport::Proxy(DEFAULT_PROXY_URL.to_string()),
        };

        let control_auth = match (args.control_password.clone(), args.control_cookie.clone()) {
            (Some(password), _) => ControlAuth::Password(password),
            (None, Some(cookie)) => ControlAuth::CookieFile(cookie),
            (None, None) => match (file.control_password, file.control_cookie) {
                (Some(password), _) => ControlAuth::Password(password),
                (None, Some(cookie)) => ControlAuth::CookieFile(cookie),
                (None, None) => ControlAuth::Auto,
            },
        };

        Ok(Self {
            input: args.input.clone(),
            mode,
            concurrency: args
                .concurrency
                .map(usize::from)
                .or(file.concurrency)
                .unwrap_or(DEFAULT_CONCURRENCY),
            max_retries: args
                .max_retries
                .or(file.max_retries)
                .unwrap_or(DEFAULT_MAX_RETRIES),
            output_dir: args
                .output_dir
                .clone()
                .or(file.output_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            archive_base,
            transport,
            control_addr: args
                .control_addr
                .clone()
                .or(file.control_addr)
                .unwrap_or_else(|| DEFAULT_CONTROL_ADDR.to_string()),
            control_auth,
            rotate_every: args
                .rotate_every
                .or(file.rotate_every)
                .unwrap_or(DEFAULT_ROTATE_EVERY),
            settle: args
                .settle_secs
                .or(file.settle_secs)
                .map_or(DEFAULT_SETTLE, Duration::from_secs),
            allowed_domains: file.allowed_domains.unwrap_or_else(|| {
                DEFAULT_ALLOWED_DOMAINS
                    .iter()
                    .map(ToString::to_string)
                    .collect()
            }),
        })
    }
}

fn validate_archive_base(base: &str) -> Result<()> {
    let parsed = Url::parse(base).with_context(|| format!("Invalid archive base URL '{base}'"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("Archive base URL must be http or https, got '{base}'");
    }
    Ok(())
}

fn validate_proxy(proxy: &str) -> Result<()> {
    let parsed = Url::parse(proxy).with_context(|| format!("Invalid proxy URL '{proxy}'"))?;
    if !matches!(
        parsed.scheme(),
        "socks5" | "socks5h" | "socks4" | "socks4a" | "http" | "https"
    ) {
        bail!("Unsupported proxy scheme in '{proxy}'");
    }
    Ok(())
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/archive-fetcher/config.toml`
/// 2. `$HOME/.config/archive-fetcher/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist. The default path is optional: a missing
/// file yields `None`.
pub fn load_config(explicit: Option<&Path>) -> Result<Option<(PathBuf, FileConfig)>> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match resolve_default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(None),
        },
    };
    let config = load_file_config(&path)?;
    Ok(Some((path, config)))
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    FileConfig::parse(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}
