pub(crate) const HTTP_REQUEST_DURATION_SECS: &str =
    "http_request_duration_seconds";
pub(crate) const HTTP_RESPONSE_SIZE_BYTES: &str = "http_response_size_bytes";
pub(crate) const HTTP_RESPONSE_SUCCESS: &str = "http_response_success";
pub(crate) const HTTP_RESPONSE_FAILURE: &str = "http_response_failure";
pub(crate) const HTTP_SERVER_ERROR: &str = "http_server_error";
pub(crate) const FEED_REQUEST_DURATION_SECS: &str =
    "news_feed_request_duration_seconds";
pub(crate) const FEED_RATE_LIMITED: &str = "news_feed_rate_limited";
pub(crate) const ARTICLES_FOUND: &str = "news_articles_found";
pub(crate) const SCRAPE_SUCCESS: &str = "article_scrape_success";
pub(crate) const SCRAPE_FAILURE: &str = "article_scrape_failure";
pub(crate) const TOR_IDENTITY_RENEWALS: &str = "tor_identity_renewals";
