use super::errors::AppError;
use super::state::AppState;
use crate::config::proxy::ProxySource;
use crate::content::{ArticleScraper, ScrapeSettings};
use crate::entities::{self, RankedEntity};
use crate::export;
use crate::news::query::Region;
use crate::news::{Article, FetchSettings, NewsFetcher, SearchRequest};

use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::ops::RangeInclusive;
use tracing::instrument;

const DAYS_RANGE: RangeInclusive<u32> = 1..=3650;

const fn _default_days() -> u32 { 7 }
const fn _default_max_articles() -> usize { 100 }
const fn _default_scrape() -> bool { true }
const fn _default_top_n() -> usize { 5 }

fn uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum SortOrder {
    #[default]
    Newest,
    Oldest,
}

#[derive(Deserialize, Debug)]
pub(crate) struct SearchParams {
    keyword: String,
    #[serde(default)]
    sector: Option<String>,
    #[serde(default = "_default_days")]
    days: u32,
    #[serde(default)]
    regions: Vec<String>,
    #[serde(default = "_default_max_articles")]
    max_articles: usize,
    #[serde(default)]
    use_secure_proxy: bool,
    #[serde(default)]
    saturation_mode: bool,
    #[serde(default = "_default_scrape")]
    scrape: bool,
    #[serde(default = "_default_top_n")]
    top_n: usize,
    #[serde(default)]
    sort: SortOrder,
}

#[derive(Serialize, Debug)]
pub(crate) struct ProxyUsage {
    used: bool,
    source: ProxySource,
}

#[derive(Serialize, Debug)]
pub(crate) struct SearchResponse {
    query: String,
    proxy: ProxyUsage,
    total: usize,
    articles: Vec<Article>,
    top_companies: Vec<RankedEntity>,
}

#[derive(Serialize, Debug)]
pub(crate) struct ProxyInfo {
    source: ProxySource,
    url: Option<String>,
}

pub(crate) async fn healthz() -> &'static str {
    "ok"
}

pub(crate) async fn proxy_info(State(state): State<AppState>) -> Json<ProxyInfo> {
    let settings = state.clients.settings();
    Json(ProxyInfo {
        source: settings.source,
        url: settings.redacted(),
    })
}

#[instrument(skip_all, err, fields(request_id=uuid()))]
pub(crate) async fn search(
    State(state): State<AppState>,
    payload: Result<Json<SearchParams>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Json(params) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    Ok(Json(run_search(&state, params).await?))
}

/// Same pipeline as `search`, with the articles rendered as a CSV download.
#[instrument(skip_all, err, fields(request_id=uuid()))]
pub(crate) async fn search_csv(
    State(state): State<AppState>,
    payload: Result<Json<SearchParams>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(params) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let response = run_search(&state, params).await?;
    let body = export::articles_csv(&response.articles)?;
    let disposition = format!("attachment; filename=\"{}\"", export::file_name(&response.query));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

async fn run_search(state: &AppState, params: SearchParams) -> Result<SearchResponse, AppError> {
    let regions = validate(&params, &state.config.search.default_regions)?;
    let keyword = params.keyword.trim();

    tracing::info!(
        keyword,
        sector = params.sector.as_deref(),
        days = params.days,
        use_secure_proxy = params.use_secure_proxy,
        saturation = params.saturation_mode,
        "Search requested."
    );

    let route = state.clients.select(params.use_secure_proxy);
    let progress = |completed: usize, total: usize| tracing::debug!(completed, total, "Progress.");

    let fetcher = NewsFetcher::new(
        route.clone(),
        state.tor.clone(),
        FetchSettings::from(&state.config.search),
    );
    let mut articles = fetcher
        .search(
            &SearchRequest {
                keyword,
                sector: params.sector.as_deref(),
                days: params.days,
                regions: &regions,
                max_articles: params.max_articles,
                saturation: params.saturation_mode,
            },
            &progress,
        )
        .await;

    if params.scrape && !articles.is_empty() {
        let scraper = ArticleScraper::new(
            route.clone(),
            state.tor.clone(),
            ScrapeSettings::new(&state.config.scrape, &state.config.search.base_url),
        );
        articles = scraper.enhance(articles, Some(params.max_articles), &progress).await;
    }

    sort_articles(&mut articles, params.sort);
    let top_companies = entities::top_companies(&articles, params.top_n);

    Ok(SearchResponse {
        query: keyword.to_string(),
        proxy: ProxyUsage {
            used: route.proxied,
            source: match route.proxied {
                true => state.clients.settings().source,
                false => ProxySource::None,
            },
        },
        total: articles.len(),
        articles,
        top_companies,
    })
}

fn validate(params: &SearchParams, default_regions: &[String]) -> Result<Vec<Region>, AppError> {
    if params.keyword.trim().is_empty() {
        return Err(AppError::BadRequest("keyword must not be blank".to_string()));
    }
    if !DAYS_RANGE.contains(&params.days) {
        return Err(AppError::BadRequest(format!(
            "days must be between {} and {}, got {}",
            DAYS_RANGE.start(),
            DAYS_RANGE.end(),
            params.days
        )));
    }
    if params.max_articles == 0 {
        return Err(AppError::BadRequest("max_articles must be at least 1".to_string()));
    }

    let codes = match params.regions.is_empty() {
        true => default_regions,
        false => &params.regions,
    };
    codes
        .iter()
        .map(|code| code.parse::<Region>())
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(|error| AppError::BadRequest(format!("{error:#}")))
}

/// Orders by publication time. Unparseable dates count as the oldest.
fn sort_articles(articles: &mut [Article], order: SortOrder) {
    match order {
        SortOrder::Newest => articles.sort_by_cached_key(|article| Reverse(published_at(article))),
        SortOrder::Oldest => articles.sort_by_cached_key(published_at),
    }
}

fn published_at(article: &Article) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc2822(article.published.trim()).ok()
}
