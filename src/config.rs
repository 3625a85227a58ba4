//! Process configuration, read once from the environment at startup.
//!
//! The resulting [`Config`] is shared by reference with every component;
//! nothing reads the environment after `main` has built it.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::RepositoryUrl;

/// Default data directory holding repos, html, ssl and the log file.
const DEFAULT_DATA_DIR: &str = "/app";

/// Default timeout for a single git invocation (5 minutes).
const DEFAULT_GIT_TIMEOUT_SECS: u64 = 300;

/// Default timeout for a single build step (30 minutes).
const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 1800;

/// Default number of branch jobs allowed to run at the same time.
const DEFAULT_MAX_CONCURRENT_BUILDS: usize = 2;

const DEFAULT_HTTP_PORT: u16 = 80;
const DEFAULT_HTTPS_PORT: u16 = 443;

/// Errors that prevent the service from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Filesystem layout under the data directory.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Working trees, one per branch slot.
    pub repos_root: PathBuf,
    /// Published output, one per branch slot.
    pub html_root: PathBuf,
    pub tls_cert: PathBuf,
    pub tls_key: PathBuf,
    /// Append-only process log.
    pub log_file: PathBuf,
}

impl Paths {
    /// Derives the fixed layout from a data directory.
    pub fn under(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Paths {
            repos_root: data_dir.join("repos"),
            html_root: data_dir.join("html"),
            tls_cert: data_dir.join("ssl").join("cert.pem"),
            tls_key: data_dir.join("ssl").join("key.pem"),
            log_file: data_dir.join("webhook.log"),
        }
    }

    /// Returns true if both TLS files are present.
    pub fn has_tls(&self) -> bool {
        self.tls_cert.is_file() && self.tls_key.is_file()
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared secret for webhook HMAC verification.
    pub webhook_secret: Vec<u8>,

    /// Discord webhook endpoint. `None` disables notifications.
    pub notify_url: Option<String>,

    /// Base domain, e.g. `docs.example.com`. Branches live on subdomains.
    pub base_domain: String,

    /// Repository listed at startup to backfill missing deployments.
    pub base_repository: Option<RepositoryUrl>,

    pub paths: Paths,

    pub http_port: u16,
    pub https_port: u16,

    /// Upper bound for a single git invocation.
    pub git_timeout: Duration,

    /// Upper bound for a single build step.
    pub build_timeout: Duration,

    /// Jobs allowed to run at once across all branches.
    pub max_concurrent_builds: usize,
}

impl Config {
    /// Builds a configuration with defaults for everything but the domain.
    pub fn new(base_domain: impl Into<String>, webhook_secret: impl Into<Vec<u8>>) -> Self {
        Config {
            webhook_secret: webhook_secret.into(),
            notify_url: None,
            base_domain: normalize_domain(&base_domain.into()),
            base_repository: None,
            paths: Paths::under(DEFAULT_DATA_DIR),
            http_port: DEFAULT_HTTP_PORT,
            https_port: DEFAULT_HTTPS_PORT,
            git_timeout: Duration::from_secs(DEFAULT_GIT_TIMEOUT_SECS),
            build_timeout: Duration::from_secs(DEFAULT_BUILD_TIMEOUT_SECS),
            max_concurrent_builds: DEFAULT_MAX_CONCURRENT_BUILDS,
        }
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let base_domain = get("BASE_URL").ok_or(ConfigError::Missing("BASE_URL"))?;
        let secret = get("WEBHOOK_SECRET").unwrap_or_default();

        let mut config = Config::new(base_domain, secret.into_bytes());
        config.notify_url = get("DISCORD_WEBHOOK_URL");
        config.base_repository = get("BASE_REPOSITORY").map(RepositoryUrl::new);

        if let Some(dir) = get("DOCKTAINER_DATA_DIR") {
            config.paths = Paths::under(dir);
        }
        if let Some(port) = parse_var(&get, "DOCKTAINER_HTTP_PORT")? {
            config.http_port = port;
        }
        if let Some(port) = parse_var(&get, "DOCKTAINER_HTTPS_PORT")? {
            config.https_port = port;
        }
        if let Some(secs) = parse_var(&get, "DOCKTAINER_GIT_TIMEOUT_SECS")? {
            config.git_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&get, "DOCKTAINER_BUILD_TIMEOUT_SECS")? {
            config.build_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse_var::<usize>(&get, "DOCKTAINER_MAX_CONCURRENT_BUILDS")? {
            if n == 0 {
                return Err(ConfigError::Invalid {
                    name: "DOCKTAINER_MAX_CONCURRENT_BUILDS",
                    value: "0".to_string(),
                });
            }
            config.max_concurrent_builds = n;
        }

        Ok(config)
    }

    /// Sets the data directory (builder style, mostly for tests).
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.paths = Paths::under(dir);
        self
    }

    /// Host that receives webhooks when routing is host based.
    pub fn webhook_host(&self) -> String {
        format!("webhook.{}", self.base_domain)
    }

    /// Host that redirects to the bare base domain.
    pub fn main_host(&self) -> String {
        format!("main.{}", self.base_domain)
    }

    /// Public URL of a branch's site, as shown in notifications.
    pub fn site_url(&self, branch: &crate::types::BranchName) -> String {
        format!("https://{}.{}", branch, self.base_domain)
    }
}

fn parse_var<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match get(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

/// Lowercases and strips a scheme or trailing slash from `BASE_URL`.
fn normalize_domain(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    without_scheme.trim_end_matches('/').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn base_url_is_required() {
        let result = Config::from_lookup(lookup(&[("WEBHOOK_SECRET", "s")]));
        assert!(matches!(result, Err(ConfigError::Missing("BASE_URL"))));

        let result = Config::from_lookup(lookup(&[("BASE_URL", "  ")]));
        assert!(matches!(result, Err(ConfigError::Missing("BASE_URL"))));
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[
            ("BASE_URL", "example.com"),
            ("WEBHOOK_SECRET", "s3cret"),
        ]))
        .unwrap();

        assert_eq!(config.base_domain, "example.com");
        assert_eq!(config.webhook_secret, b"s3cret");
        assert!(config.notify_url.is_none());
        assert!(config.base_repository.is_none());
        assert_eq!(config.paths.repos_root, PathBuf::from("/app/repos"));
        assert_eq!(config.paths.html_root, PathBuf::from("/app/html"));
        assert_eq!(config.paths.tls_cert, PathBuf::from("/app/ssl/cert.pem"));
        assert_eq!(config.paths.log_file, PathBuf::from("/app/webhook.log"));
        assert_eq!(config.http_port, 80);
        assert_eq!(config.https_port, 443);
        assert_eq!(config.git_timeout, Duration::from_secs(300));
        assert_eq!(config.max_concurrent_builds, 2);
    }

    #[test]
    fn optional_values_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("BASE_URL", "https://Docs.Example.com/"),
            ("DISCORD_WEBHOOK_URL", "https://discord.test/hook"),
            ("BASE_REPOSITORY", "https://github.com/org/docs.git"),
            ("DOCKTAINER_DATA_DIR", "/srv/dt"),
            ("DOCKTAINER_HTTP_PORT", "8080"),
            ("DOCKTAINER_BUILD_TIMEOUT_SECS", "60"),
            ("DOCKTAINER_MAX_CONCURRENT_BUILDS", "4"),
        ]))
        .unwrap();

        assert_eq!(config.base_domain, "docs.example.com");
        assert_eq!(
            config.notify_url.as_deref(),
            Some("https://discord.test/hook")
        );
        assert_eq!(
            config.base_repository.as_ref().map(|u| u.expose()),
            Some("https://github.com/org/docs.git")
        );
        assert_eq!(config.paths.html_root, PathBuf::from("/srv/dt/html"));
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.build_timeout, Duration::from_secs(60));
        assert_eq!(config.max_concurrent_builds, 4);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("BASE_URL", "example.com"),
            ("DOCKTAINER_HTTP_PORT", "eighty"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                name: "DOCKTAINER_HTTP_PORT",
                ..
            })
        ));

        let result = Config::from_lookup(lookup(&[
            ("BASE_URL", "example.com"),
            ("DOCKTAINER_MAX_CONCURRENT_BUILDS", "0"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn derived_hosts() {
        let config = Config::new("example.com", b"s".to_vec());
        assert_eq!(config.webhook_host(), "webhook.example.com");
        assert_eq!(config.main_host(), "main.example.com");

        let branch = crate::types::BranchName::parse("docs-v2").unwrap();
        assert_eq!(config.site_url(&branch), "https://docs-v2.example.com");
    }
}
