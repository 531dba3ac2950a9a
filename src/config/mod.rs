#[allow(clippy::module_inception)]
mod config;
pub(crate) mod proxy;

pub(crate) use config::{
    AppConfig, ProxyFallback, ProxySection, ScrapeSection, SearchSection, TorAuth, TorSection,
};
