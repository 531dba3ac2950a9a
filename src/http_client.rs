use anyhow::{Context, Result};
use std::time::Duration;

use crate::config::proxy::ProxySettings;

#[derive(Clone, Debug)]
pub(crate) struct ClientOptions {
    pub(crate) timeout: Duration,
    pub(crate) accept_invalid_certs: bool,
}

/// A client together with how its traffic leaves the process.
#[derive(Clone, Debug)]
pub(crate) struct ClientRoute {
    pub(crate) client: reqwest::Client,
    pub(crate) proxied: bool,
    pub(crate) tor: bool,
}

/// Direct and proxied clients, built once at startup.
#[derive(Clone, Debug)]
pub(crate) struct HttpClients {
    direct: reqwest::Client,
    proxied: Option<reqwest::Client>,
    settings: ProxySettings,
}

impl HttpClients {
    pub(crate) fn build(settings: ProxySettings, options: &ClientOptions) -> Result<Self> {
        let direct = builder(options)
            .no_proxy()
            .build()
            .context("Couldn't build direct HTTP client")?;

        let proxied = match &settings.url {
            Some(url) => {
                let proxy = reqwest::Proxy::all(url.as_str())
                    .with_context(|| format!("Couldn't configure proxy {}", url))?;
                Some(
                    builder(options)
                        .proxy(proxy)
                        .build()
                        .context("Couldn't build proxied HTTP client")?,
                )
            }
            None => None,
        };

        Ok(Self {
            direct,
            proxied,
            settings,
        })
    }

    pub(crate) fn settings(&self) -> &ProxySettings {
        &self.settings
    }

    pub(crate) fn select(&self, use_proxy: bool) -> ClientRoute {
        match (use_proxy, &self.proxied) {
            (true, Some(client)) => ClientRoute {
                client: client.clone(),
                proxied: true,
                tor: self.settings.is_tor(),
            },
            (true, None) => {
                tracing::warn!("Secure proxy requested but none is configured, connecting directly.");
                self.direct_route()
            }
            (false, _) => self.direct_route(),
        }
    }

    fn direct_route(&self) -> ClientRoute {
        ClientRoute {
            client: self.direct.clone(),
            proxied: false,
            tor: false,
        }
    }
}

fn builder(options: &ClientOptions) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(options.timeout)
        .danger_accept_invalid_certs(options.accept_invalid_certs)
}
