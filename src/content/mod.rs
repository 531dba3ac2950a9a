pub(crate) mod extract;
mod google;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::browser;
use crate::config::ScrapeSection;
use crate::http_client::ClientRoute;
use crate::metrics::consts::{SCRAPE_FAILURE, SCRAPE_SUCCESS};
use crate::news::{Article, Progress};
use crate::tor::TorRotator;
use extract::ScrapedContent;

#[derive(Clone, Debug)]
pub(crate) struct ScrapeSettings {
    pub(crate) news_base_url: String,
    pub(crate) concurrency: usize,
    pub(crate) proxied_concurrency: usize,
    pub(crate) timeout: Duration,
    pub(crate) min_content_chars: usize,
}

impl ScrapeSettings {
    pub(crate) fn new(section: &ScrapeSection, news_base_url: &str) -> Self {
        Self {
            news_base_url: news_base_url.to_string(),
            concurrency: section.concurrency,
            proxied_concurrency: section.proxied_concurrency,
            timeout: section.timeout(),
            min_content_chars: section.min_content_chars,
        }
    }
}

pub(crate) struct ArticleScraper {
    route: ClientRoute,
    tor: Option<Arc<TorRotator>>,
    settings: ScrapeSettings,
}

impl ArticleScraper {
    pub(crate) fn new(route: ClientRoute, tor: Option<Arc<TorRotator>>, settings: ScrapeSettings) -> Self {
        Self { route, tor, settings }
    }

    /// Fills in full text, summary and paywall flag for each distinct link
    /// among the first `limit` articles.
    #[instrument(skip_all, fields(proxied = self.route.proxied))]
    pub(crate) async fn enhance(&self, articles: Vec<Article>, limit: Option<usize>, progress: Progress<'_>) -> Vec<Article> {
        let targets: Vec<Article> = articles
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .filter(|article| !article.link.is_empty())
            .unique_by(|article| article.link.clone())
            .collect();

        let total = targets.len();
        let concurrency = match self.route.proxied {
            true => self.settings.proxied_concurrency,
            false => self.settings.concurrency,
        };
        tracing::info!(articles = total, concurrency, "Scraping article content.");

        let completed = AtomicUsize::new(0);
        let links: Vec<String> = targets.iter().map(|article| article.link.clone()).collect();
        let outcomes: Vec<Option<ScrapedContent>> = stream::iter(links)
            .map(|link| {
                let completed = &completed;
                async move {
                    let outcome = self.scrape(&link).await;
                    progress(completed.fetch_add(1, Ordering::Relaxed) + 1, total);
                    outcome
                }
            })
            .buffered(concurrency)
            .collect()
            .await;

        targets
            .into_iter()
            .zip(outcomes)
            .map(|(article, outcome)| self.apply(article, outcome))
            .collect()
    }

    fn apply(&self, mut article: Article, outcome: Option<ScrapedContent>) -> Article {
        match outcome {
            Some(content) if content.full_text.chars().count() > self.settings.min_content_chars => {
                metrics::counter!(SCRAPE_SUCCESS).increment(1);
                article.full_text = Some(content.full_text);
                article.summary = Some(content.summary);
                article.is_paywall = content.is_paywall;
            }
            outcome => {
                metrics::counter!(SCRAPE_FAILURE).increment(1);
                article.full_text = Some(format!(
                    "Could not scrape full content automatically.\n\nSummary from source:\n{}",
                    article.description
                ));
                article.summary = Some(article.description.clone());
                article.is_paywall = outcome.is_some_and(|content| content.is_paywall);
            }
        }
        article
    }

    pub(crate) async fn scrape(&self, url: &str) -> Option<ScrapedContent> {
        match self.try_scrape(url).await {
            Ok(content) => content,
            Err(error) => {
                tracing::warn!(?error, url, "Scraping failed.");
                None
            }
        }
    }

    async fn try_scrape(&self, url: &str) -> Result<Option<ScrapedContent>> {
        let tor = self.tor.as_deref().filter(|_| self.route.tor);
        if let Some(tor) = tor {
            tor.wait_if_cooldown().await;
        }

        let url = match google::is_news_link(&self.settings.news_base_url, url) {
            true => google::decode_news_url(&self.route.client, &self.settings.news_base_url, url)
                .await
                .unwrap_or_else(|error| {
                    tracing::warn!(?error, url, "Failed to decode news link.");
                    url.to_string()
                }),
            false => url.to_string(),
        };

        let response = self
            .route
            .client
            .get(&url)
            .headers(browser::article_headers(self.route.tor))
            .timeout(self.settings.timeout)
            .send()
            .await?;
        let status = response.status();

        if matches!(status, StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE) {
            if let Some(tor) = tor {
                tracing::warn!(%status, url = %url, "Rate limited, rotating Tor identity.");
                tor.rotate().await;
            }
        }

        match status {
            StatusCode::OK => {
                let html = response.text().await?;
                Ok(Some(extract::extract_article(&html)))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(Some(ScrapedContent::paywalled())),
            _ => {
                tracing::debug!(%status, url = %url, "Article request rejected.");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::proxy::{ProxySettings, ProxySource};
    use crate::http_client::{ClientOptions, HttpClients};
    use crate::tor::test_support::{permissive_control_port, section};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SENTENCE: &str = "The chipmaker reported record quarterly revenue driven by data centre demand.";

    fn scraper(news_base_url: String) -> Result<ArticleScraper> {
        let clients = HttpClients::build(
            ProxySettings {
                source: ProxySource::None,
                url: None,
            },
            &ClientOptions {
                timeout: Duration::from_secs(5),
                accept_invalid_certs: false,
            },
        )?;
        Ok(ArticleScraper::new(
            clients.select(false),
            None,
            ScrapeSettings {
                news_base_url,
                concurrency: 4,
                proxied_concurrency: 2,
                timeout: Duration::from_secs(5),
                min_content_chars: 100,
            },
        ))
    }

    fn article(title: &str, link: String, description: &str) -> Article {
        Article {
            description: description.to_string(),
            ..Article::stub(title, &link)
        }
    }

    #[tokio::test]
    async fn enhance_applies_content_and_fallbacks() -> Result<()> {
        let server = MockServer::start().await;
        let body = format!("<html><body><article>{}</article></body></html>", format!("<p>{SENTENCE}</p>").repeat(4));
        Mock::given(method("GET"))
            .and(path("/open"))
            .and(header("referer", browser::NEWS_REFERER))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/locked"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let articles = vec![
            article("Open", format!("{}/open", server.uri()), "open rss"),
            article("Open again", format!("{}/open", server.uri()), "dup"),
            article("Locked", format!("{}/locked", server.uri()), "locked rss"),
            article("Missing", format!("{}/missing", server.uri()), "missing rss"),
            article("No link", String::new(), ""),
        ];

        let progress = |_: usize, _: usize| {};
        let enhanced = scraper("https://news.google.com".to_string())?
            .enhance(articles, None, &progress)
            .await;

        assert_eq!(enhanced.len(), 3);

        let open = &enhanced[0];
        assert_eq!(open.title, "Open");
        assert_eq!(open.full_text.as_deref().map(|t| t.split("\n\n").count()), Some(4));
        assert!(!open.is_paywall);

        let locked = &enhanced[1];
        assert!(locked.is_paywall);
        assert_eq!(locked.summary.as_deref(), Some("locked rss"));
        assert!(locked
            .full_text
            .as_deref()
            .is_some_and(|text| text.starts_with("Could not scrape") && text.ends_with("locked rss")));

        let missing = &enhanced[2];
        assert!(!missing.is_paywall);
        assert_eq!(missing.summary.as_deref(), Some("missing rss"));
        Ok(())
    }

    #[tokio::test]
    async fn limit_applies_before_deduplication() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let articles = (0..5)
            .map(|i| article(&format!("A{i}"), format!("{}/a{i}", server.uri()), ""))
            .collect();
        let progress = |_: usize, _: usize| {};
        let enhanced = scraper("https://news.google.com".to_string())?
            .enhance(articles, Some(2), &progress)
            .await;
        assert_eq!(enhanced.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn enhance_runs_on_a_spawned_task() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let scraper = scraper("https://news.google.com".to_string())?;
        let articles = vec![
            article("A", format!("{}/a", server.uri()), "a rss"),
            article("B", format!("{}/b", server.uri()), "b rss"),
        ];
        let enhanced = tokio::spawn(async move {
            let progress = |_: usize, _: usize| {};
            scraper.enhance(articles, None, &progress).await
        })
        .await?;
        assert_eq!(enhanced.len(), 2);
        assert_eq!(enhanced[1].summary.as_deref(), Some("b rss"));
        Ok(())
    }

    #[tokio::test]
    async fn news_links_are_decoded_before_fetching() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rss/articles/CBMi"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>no payload</body></html>"))
            .expect(2)
            .mount(&server)
            .await;

        let url = format!("{}/rss/articles/CBMi", server.uri());
        // The interstitial has no payload, so the original link is fetched as the article.
        let content = scraper(server.uri())?.scrape(&url).await;
        assert!(content.is_some_and(|content| content.full_text.is_empty()));
        Ok(())
    }

    #[tokio::test]
    async fn throttling_over_tor_rotates_identity() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .and(header("connection", "close"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/unavailable"))
            .and(header("connection", "close"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let (port, mut signals) = permissive_control_port().await?;
        let direct = scraper("https://news.google.com".to_string())?;
        let over_tor = ArticleScraper::new(
            ClientRoute {
                client: direct.route.client.clone(),
                proxied: true,
                tor: true,
            },
            Some(Arc::new(TorRotator::new(&section(port, 10)))),
            direct.settings.clone(),
        );

        assert!(over_tor.scrape(&format!("{}/limited", server.uri())).await.is_none());
        assert!(over_tor.scrape(&format!("{}/unavailable", server.uri())).await.is_none());
        assert!(signals.try_recv().is_ok());
        assert!(signals.try_recv().is_ok());
        assert!(signals.try_recv().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn direct_route_keeps_connections_open() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("connection", "close"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;

        let (port, mut signals) = permissive_control_port().await?;
        let direct = scraper("https://news.google.com".to_string())?;
        let scraper = ArticleScraper::new(
            direct.route.clone(),
            Some(Arc::new(TorRotator::new(&section(port, 10)))),
            direct.settings.clone(),
        );

        assert!(scraper.scrape(&format!("{}/limited", server.uri())).await.is_none());
        assert!(signals.try_recv().is_err());
        Ok(())
    }
}
