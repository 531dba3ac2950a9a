use anyhow::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use rand::Rng;
use regex::Regex;
use reqwest::StatusCode;
use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tracing::instrument;

use super::query::{self, Region};
use super::rss::{self, FeedEntry};
use super::{Article, Progress, NO_DESCRIPTION, UNKNOWN_SOURCE};
use crate::browser;
use crate::config::SearchSection;
use crate::content::extract;
use crate::http_client::ClientRoute;
use crate::metrics::consts::{ARTICLES_FOUND, FEED_RATE_LIMITED, FEED_REQUEST_DURATION_SECS};
use crate::tor::TorRotator;

static AND_MORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*and more\s*»").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

#[derive(Clone, Debug)]
pub(crate) struct FetchSettings {
    pub(crate) base_url: String,
    pub(crate) concurrency: usize,
    pub(crate) max_retries: u32,
    pub(crate) timeout: Duration,
    pub(crate) jitter: RangeInclusive<Duration>,
    pub(crate) rate_limit_base: Duration,
    pub(crate) network_retry_base: Duration,
}

impl From<&SearchSection> for FetchSettings {
    fn from(section: &SearchSection) -> Self {
        Self {
            base_url: section.base_url.clone(),
            concurrency: section.concurrency,
            max_retries: section.max_retries,
            timeout: section.timeout(),
            jitter: Duration::from_millis(section.jitter_min_ms)..=Duration::from_millis(section.jitter_max_ms),
            rate_limit_base: Duration::from_millis(section.rate_limit_base_ms),
            network_retry_base: Duration::from_millis(section.network_retry_base_ms),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct SearchRequest<'a> {
    pub(crate) keyword: &'a str,
    pub(crate) sector: Option<&'a str>,
    pub(crate) days: u32,
    pub(crate) regions: &'a [Region],
    pub(crate) max_articles: usize,
    pub(crate) saturation: bool,
}

enum FeedResponse {
    Entries(Vec<FeedEntry>),
    RateLimited(StatusCode),
    Rejected(StatusCode),
    Malformed(anyhow::Error),
}

pub(crate) struct NewsFetcher {
    route: ClientRoute,
    tor: Option<Arc<TorRotator>>,
    settings: FetchSettings,
}

impl NewsFetcher {
    pub(crate) fn new(route: ClientRoute, tor: Option<Arc<TorRotator>>, settings: FetchSettings) -> Self {
        Self { route, tor, settings }
    }

    #[instrument(skip_all, fields(keyword = request.keyword, proxied = self.route.proxied))]
    pub(crate) async fn search(&self, request: &SearchRequest<'_>, progress: Progress<'_>) -> Vec<Article> {
        let queries = query::build_queries(request.keyword, request.sector, request.saturation);
        let urls = query::search_urls(
            &self.settings.base_url,
            &queries,
            request.regions,
            request.days,
            Utc::now().date_naive(),
        );
        let total = urls.len();
        tracing::info!(urls = total, concurrency = self.settings.concurrency, "Launching news search.");

        let completed = AtomicUsize::new(0);
        let feeds: Vec<Vec<FeedEntry>> = stream::iter(urls)
            .map(|url| {
                let completed = &completed;
                async move {
                    tokio::time::sleep(random_between(&self.settings.jitter)).await;
                    let entries = self.fetch_feed(&url).await;
                    progress(completed.fetch_add(1, Ordering::Relaxed) + 1, total);
                    entries
                }
            })
            .buffered(self.settings.concurrency)
            .collect()
            .await;

        let articles = collect_articles(feeds.into_iter().flatten(), request.max_articles);
        metrics::histogram!(ARTICLES_FOUND).record(articles.len() as f64);
        tracing::info!(articles = articles.len(), "News search finished.");
        articles
    }

    /// Entries of one feed. Failures end in an empty list.
    async fn fetch_feed(&self, url: &str) -> Vec<FeedEntry> {
        let max_retries = self.settings.max_retries;
        for attempt in 0..=max_retries {
            match self.request_feed(url).await {
                Ok(FeedResponse::Entries(entries)) => return entries,
                Ok(FeedResponse::Rejected(status)) => {
                    tracing::debug!(%status, url, "Feed request rejected.");
                    return Vec::new();
                }
                Ok(FeedResponse::Malformed(error)) => {
                    tracing::warn!(?error, url, "Feed could not be parsed.");
                    return Vec::new();
                }
                Ok(FeedResponse::RateLimited(status)) => {
                    metrics::counter!(FEED_RATE_LIMITED).increment(1);
                    if attempt == max_retries {
                        tracing::warn!(%status, url, "Still rate limited after {max_retries} retries.");
                        return Vec::new();
                    }
                    if self.route.tor {
                        if let Some(tor) = &self.tor {
                            tor.rotate().await;
                        }
                    }
                    let base = self.settings.rate_limit_base;
                    let delay = backoff(base, attempt) + random_between(&(base / 5..=base / 2));
                    tracing::warn!(%status, delay_secs = delay.as_secs_f64(), "Rate limited, backing off.");
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    if attempt == max_retries {
                        tracing::warn!(?error, url, "Feed request failed.");
                        return Vec::new();
                    }
                    tracing::debug!(?error, attempt, "Feed request failed, retrying.");
                    tokio::time::sleep(backoff(self.settings.network_retry_base, attempt)).await;
                }
            }
        }
        Vec::new()
    }

    async fn request_feed(&self, url: &str) -> Result<FeedResponse> {
        let start = Instant::now();
        let response = self
            .route
            .client
            .get(url)
            .headers(browser::navigation_headers())
            .timeout(self.settings.timeout)
            .send()
            .await?;
        let status = response.status();
        let feed = match status {
            StatusCode::OK => match rss::parse_feed(&response.text().await?) {
                Ok(entries) => FeedResponse::Entries(entries),
                Err(error) => FeedResponse::Malformed(error),
            },
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => FeedResponse::RateLimited(status),
            _ => FeedResponse::Rejected(status),
        };
        metrics::histogram!(FEED_REQUEST_DURATION_SECS).record(start.elapsed().as_secs_f64());
        Ok(feed)
    }
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

fn random_between(range: &RangeInclusive<Duration>) -> Duration {
    rand::thread_rng().gen_range(range.clone())
}

/// Distinct articles in feed order, keyed by normalized title and source.
pub(crate) fn collect_articles(entries: impl IntoIterator<Item = FeedEntry>, max_articles: usize) -> Vec<Article> {
    let mut seen = HashSet::new();
    let mut articles = Vec::new();

    for entry in entries {
        if articles.len() >= max_articles {
            break;
        }
        let title = entry.title.trim();
        if title.is_empty() {
            continue;
        }
        let source = entry
            .source
            .map(|source| source.trim().to_string())
            .filter(|source| !source.is_empty())
            .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());
        let key = (WHITESPACE.replace_all(title, " ").to_lowercase(), source.clone());
        if !seen.insert(key) {
            continue;
        }

        let description = clean_description(&entry.description);
        articles.push(Article {
            title: title.to_string(),
            description: match description.is_empty() {
                true => NO_DESCRIPTION.to_string(),
                false => description,
            },
            source,
            link: entry.link.trim().to_string(),
            published: entry.published.trim().to_string(),
            full_text: None,
            summary: None,
            is_paywall: false,
        });
    }

    articles
}

fn clean_description(raw: &str) -> String {
    let text = extract::fragment_text(raw);
    AND_MORE.replace_all(&text, "").trim().to_string()
}
