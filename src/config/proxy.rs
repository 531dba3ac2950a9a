//! Resolution of the outbound SOCKS5 proxy.
//!
//! The proxy is decided once at startup: `PROXY_URL` wins (e.g. the WARP
//! container at `socks5://warp:1080`), otherwise the configured fallback
//! applies, which is either the local Tor SOCKS port or a direct connection.

use anyhow::{Context, Result};
use reqwest::Url;
use serde::Serialize;

use super::{ProxyFallback, ProxySection};

pub(crate) const PROXY_URL_ENV: &str = "PROXY_URL";
/// `socks5h` so hostnames are resolved by Tor rather than the local resolver.
pub(crate) const TOR_DEFAULT_SOCKS_URL: &str = "socks5h://127.0.0.1:9150";
pub(crate) const DEFAULT_SOCKS_PORT: u16 = 1080;

const SOCKS_SCHEMES: [&str; 2] = ["socks5", "socks5h"];

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum ProxySource {
    Environment,
    TorDefault,
    None,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ProxySettings {
    pub(crate) source: ProxySource,
    pub(crate) url: Option<Url>,
}

impl ProxySettings {
    pub(crate) fn from_env(section: &ProxySection) -> Result<Self> {
        Self::resolve(|key| std::env::var(key).ok(), section)
    }

    pub(crate) fn resolve<F>(lookup: F, section: &ProxySection) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let from_env = lookup(PROXY_URL_ENV).filter(|value| !value.trim().is_empty());
        if let Some(raw) = from_env {
            let url = parse_socks_url(&raw)
                .with_context(|| format!("Invalid {PROXY_URL_ENV} environment variable"))?;
            return Ok(Self {
                source: ProxySource::Environment,
                url: Some(url),
            });
        }

        match section.fallback {
            ProxyFallback::Tor => Ok(Self {
                source: ProxySource::TorDefault,
                url: Some(parse_socks_url(&section.tor_socks_url)?),
            }),
            ProxyFallback::Direct => Ok(Self {
                source: ProxySource::None,
                url: None,
            }),
        }
    }

    pub(crate) fn is_tor(&self) -> bool {
        self.source == ProxySource::TorDefault
    }

    /// The proxy url with any password masked, suitable for logs.
    pub(crate) fn redacted(&self) -> Option<String> {
        self.url.as_ref().map(|url| {
            let mut url = url.clone();
            if url.password().is_some() {
                // Only fails for cannot-be-a-base urls, which parse_socks_url rejects.
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        })
    }
}

pub(crate) fn parse_socks_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim()).with_context(|| format!("\"{raw}\" is not a URL"))?;
    anyhow::ensure!(
        SOCKS_SCHEMES.contains(&url.scheme()),
        "Proxy URL \"{raw}\" must use one of the schemes {SOCKS_SCHEMES:?}"
    );
    anyhow::ensure!(
        url.host_str().is_some_and(|host| !host.is_empty()),
        "Proxy URL \"{raw}\" has no host"
    );
    anyhow::ensure!(
        url.path().is_empty() || url.path() == "/",
        "Proxy URL \"{raw}\" must not carry a path"
    );
    if url.port().is_none() {
        url.set_port(Some(DEFAULT_SOCKS_PORT))
            .map_err(|_| anyhow::anyhow!("Couldn't set default port on \"{raw}\""))?;
    }
    Ok(url)
}
