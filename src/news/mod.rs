pub(crate) mod fetcher;
pub(crate) mod query;
pub(crate) mod rss;

use serde::Serialize;

pub(crate) use fetcher::{FetchSettings, NewsFetcher, SearchRequest};

pub(crate) const NO_DESCRIPTION: &str = "No description";
pub(crate) const UNKNOWN_SOURCE: &str = "Unknown";

/// Reports `(completed, total)` as work items finish.
pub(crate) type Progress<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Article {
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) source: String,
    pub(crate) link: String,
    pub(crate) published: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) full_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) summary: Option<String>,
    pub(crate) is_paywall: bool,
}

impl Article {
    #[cfg(test)]
    pub(crate) fn stub(title: &str, link: &str) -> Self {
        Self {
            title: title.to_string(),
            description: NO_DESCRIPTION.to_string(),
            source: UNKNOWN_SOURCE.to_string(),
            link: link.to_string(),
            published: String::new(),
            full_text: None,
            summary: None,
            is_paywall: false,
        }
    }
}
