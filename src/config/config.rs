use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::proxy;
use crate::news::query::Region;

const fn _default_port() -> u16 { 8501 }
const fn _default_metrics_port() -> u16 { 9090 }
const fn _default_bind_address() -> IpAddr { IpAddr::V4(Ipv4Addr::UNSPECIFIED) }

const fn _default_search_concurrency() -> usize { 10 }
const fn _default_max_retries() -> u32 { 3 }
const fn _default_timeout_secs() -> u64 { 30 }
const fn _default_jitter_min_ms() -> u64 { 500 }
const fn _default_jitter_max_ms() -> u64 { 2000 }
const fn _default_rate_limit_base_ms() -> u64 { 10_000 }
const fn _default_network_retry_base_ms() -> u64 { 5_000 }

const fn _default_scrape_concurrency() -> usize { 20 }
const fn _default_proxied_concurrency() -> usize { 5 }
const fn _default_min_content_chars() -> usize { 100 }

const fn _default_control_port() -> u16 { 9151 }
const fn _default_cooldown_ms() -> u64 { 2000 }
const fn _default_request_timeout_ms() -> u64 { 10_000 }

fn _default_base_url() -> String { "https://news.google.com".to_string() }
fn _default_control_host() -> String { "127.0.0.1".to_string() }
fn _default_tor_socks_url() -> String { proxy::TOR_DEFAULT_SOCKS_URL.to_string() }
fn _default_regions() -> Vec<String> {
    ["IN:en", "US:en", "GB:en", "AU:en", "CA:en", "SG:en"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Deserialize, Clone, Debug)]
pub(crate) struct AppConfig {
    #[serde(default = "_default_bind_address")]
    pub(crate) bind_address: IpAddr,
    #[serde(default = "_default_port")]
    pub(crate) port: u16,
    #[serde(default = "_default_metrics_port")]
    pub(crate) metrics_port: u16,
    #[serde(default)]
    pub(crate) proxy: ProxySection,
    #[serde(default)]
    pub(crate) tor: TorSection,
    #[serde(default)]
    pub(crate) search: SearchSection,
    #[serde(default)]
    pub(crate) scrape: ScrapeSection,
}

/// What to do when `PROXY_URL` is not set.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum ProxyFallback {
    #[default]
    Tor,
    Direct,
}

#[derive(Deserialize, Clone, Debug)]
pub(crate) struct ProxySection {
    #[serde(default)]
    pub(crate) fallback: ProxyFallback,
    #[serde(default = "_default_tor_socks_url")]
    pub(crate) tor_socks_url: String,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub(crate) enum TorAuth {
    #[default]
    Null,
    Password { password: String },
    Cookie { cookie_file: PathBuf },
    SafeCookie { cookie_file: PathBuf },
}

#[derive(Deserialize, Clone, Debug)]
pub(crate) struct TorSection {
    #[serde(default = "_default_control_host")]
    pub(crate) control_host: String,
    #[serde(default = "_default_control_port")]
    pub(crate) control_port: u16,
    #[serde(default = "_default_cooldown_ms")]
    pub(crate) cooldown_ms: u64,
    #[serde(default = "_default_request_timeout_ms")]
    pub(crate) request_timeout_ms: u64,
    #[serde(default)]
    pub(crate) auth: TorAuth,
}

#[derive(Deserialize, Clone, Debug)]
pub(crate) struct SearchSection {
    #[serde(default = "_default_base_url")]
    pub(crate) base_url: String,
    #[serde(default = "_default_search_concurrency")]
    pub(crate) concurrency: usize,
    #[serde(default = "_default_max_retries")]
    pub(crate) max_retries: u32,
    #[serde(default = "_default_timeout_secs")]
    pub(crate) timeout_secs: u64,
    #[serde(default = "_default_jitter_min_ms")]
    pub(crate) jitter_min_ms: u64,
    #[serde(default = "_default_jitter_max_ms")]
    pub(crate) jitter_max_ms: u64,
    #[serde(default = "_default_rate_limit_base_ms")]
    pub(crate) rate_limit_base_ms: u64,
    #[serde(default = "_default_network_retry_base_ms")]
    pub(crate) network_retry_base_ms: u64,
    #[serde(default = "_default_regions")]
    pub(crate) default_regions: Vec<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub(crate) struct ScrapeSection {
    #[serde(default = "_default_scrape_concurrency")]
    pub(crate) concurrency: usize,
    #[serde(default = "_default_proxied_concurrency")]
    pub(crate) proxied_concurrency: usize,
    #[serde(default = "_default_timeout_secs")]
    pub(crate) timeout_secs: u64,
    #[serde(default = "_default_min_content_chars")]
    pub(crate) min_content_chars: usize,
    #[serde(default)]
    pub(crate) accept_invalid_certs: bool,
}

// Every section is fully defaulted, so an empty TOML document is a valid config.
macro_rules! default_from_empty_toml {
    ($($section:ty),*) => {
        $(impl Default for $section {
            fn default() -> Self {
                toml::from_str("").expect("all fields carry serde defaults")
            }
        })*
    };
}

default_from_empty_toml!(AppConfig, ProxySection, TorSection, SearchSection, ScrapeSection);

impl AppConfig {
    /// Reads `path` when it exists, otherwise falls back to the defaults.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(config_file = %path.display(), "Config file not found, using defaults.");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Couldn't read config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Couldn't parse config file {}", path.display()))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.search.concurrency > 0, "search.concurrency must be at least 1");
        anyhow::ensure!(self.scrape.concurrency > 0, "scrape.concurrency must be at least 1");
        anyhow::ensure!(
            self.scrape.proxied_concurrency > 0,
            "scrape.proxied_concurrency must be at least 1"
        );
        anyhow::ensure!(
            self.search.jitter_min_ms <= self.search.jitter_max_ms,
            "search.jitter_min_ms ({}) is greater than search.jitter_max_ms ({})",
            self.search.jitter_min_ms,
            self.search.jitter_max_ms,
        );
        anyhow::ensure!(
            !self.search.default_regions.is_empty(),
            "search.default_regions must not be empty"
        );
        for region in &self.search.default_regions {
            region.parse::<Region>()?;
        }
        anyhow::ensure!(self.tor.request_timeout_ms > 0, "tor.request_timeout_ms must be positive");
        reqwest::Url::parse(&self.search.base_url)
            .with_context(|| format!("Invalid search.base_url \"{}\"", self.search.base_url))?;
        proxy::parse_socks_url(&self.proxy.tor_socks_url).context("Invalid proxy.tor_socks_url")?;
        Ok(())
    }
}

impl SearchSection {
    pub(crate) fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl TorSection {
    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl ScrapeSection {
    pub(crate) fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() -> Result<()> {
        let config: AppConfig = toml::from_str("")?;
        assert_eq!(config.port, 8501);
        assert_eq!(config.proxy.fallback, ProxyFallback::Tor);
        assert_eq!(config.proxy.tor_socks_url, "socks5h://127.0.0.1:9150");
        assert_eq!(config.tor.control_port, 9151);
        assert_eq!(config.tor.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.tor.auth, TorAuth::Null);
        assert_eq!(config.search.concurrency, 10);
        assert_eq!(config.search.max_retries, 3);
        assert_eq!(config.scrape.concurrency, 20);
        assert_eq!(config.scrape.proxied_concurrency, 5);
        assert_eq!(config.search.default_regions.len(), 6);
        config.validate()?;
        Ok(())
    }

    #[test]
    fn parses_sections() -> Result<()> {
        let config: AppConfig = toml::from_str(
            r#"
            port = 8600

            [proxy]
            fallback = "direct"

            [tor]
            control_port = 9051
            auth = { method = "safe-cookie", cookie_file = "/var/lib/tor/control_auth_cookie" }

            [search]
            concurrency = 4
            default_regions = ["US:en"]
            "#,
        )?;
        assert_eq!(config.port, 8600);
        assert_eq!(config.proxy.fallback, ProxyFallback::Direct);
        assert_eq!(config.tor.control_port, 9051);
        assert_eq!(
            config.tor.auth,
            TorAuth::SafeCookie {
                cookie_file: PathBuf::from("/var/lib/tor/control_auth_cookie")
            }
        );
        assert_eq!(config.search.concurrency, 4);
        assert_eq!(config.search.default_regions, vec!["US:en".to_string()]);
        config.validate()?;
        Ok(())
    }

    #[test]
    fn rejects_inverted_jitter() -> Result<()> {
        let config: AppConfig = toml::from_str(
            r#"
            [search]
            jitter_min_ms = 3000
            jitter_max_ms = 1000
            "#,
        )?;
        assert!(config.validate().is_err());
        Ok(())
    }

    #[test]
    fn rejects_http_tor_socks_url() -> Result<()> {
        let config: AppConfig = toml::from_str(
            r#"
            [proxy]
            tor_socks_url = "http://127.0.0.1:8118"
            "#,
        )?;
        assert!(config.validate().is_err());
        Ok(())
    }

    #[test]
    fn rejects_bad_region() -> Result<()> {
        let config: AppConfig = toml::from_str(
            r#"
            [search]
            default_regions = ["india"]
            "#,
        )?;
        assert!(config.validate().is_err());
        Ok(())
    }

    #[test]
    fn shipped_config_is_valid() -> Result<()> {
        let config: AppConfig = toml::from_str(include_str!("../../config.toml"))?;
        config.validate()?;
        assert_eq!(config.bind_address, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.tor.auth, TorAuth::Null);
        assert_eq!(config.proxy.tor_socks_url, proxy::TOR_DEFAULT_SOCKS_URL);
        Ok(())
    }

    #[test]
    fn rejects_zero_tor_request_timeout() -> Result<()> {
        let config: AppConfig = toml::from_str(
            r#"
            [tor]
            request_timeout_ms = 0
            "#,
        )?;
        assert!(config.validate().is_err());
        Ok(())
    }

    #[test]
    fn missing_file_falls_back_to_defaults() -> Result<()> {
        let config = AppConfig::load(Path::new("/nonexistent/newsprobe.toml"))?;
        assert_eq!(config.metrics_port, 9090);
        Ok(())
    }
}
