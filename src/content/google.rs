//! Resolves `news.google.com` article links to the publisher's URL.
//!
//! The feed links redirect through an interstitial page carrying a `data-p`
//! payload. Posting that payload to the `batchexecute` endpoint yields the
//! real article URL, so the article can be fetched without the redirect hop.

use anyhow::{Context, Result};
use reqwest::header::USER_AGENT;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use std::sync::LazyLock;

use crate::browser;

const BATCH_EXECUTE_PATH: &str = "/_/DotsSplashUi/data/batchexecute";
const RPC_ID: &str = "Fbv4je";
const XSSI_PREFIX: &str = ")]}'";

static DATA_P: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("c-wiz[data-p]").expect("valid selector"));

pub(crate) fn is_news_link(base_url: &str, url: &str) -> bool {
    url.strip_prefix(base_url.trim_end_matches('/'))
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

pub(crate) async fn decode_news_url(client: &reqwest::Client, base_url: &str, url: &str) -> Result<String> {
    let user_agent = browser::user_agent();
    let response = client.get(url).header(USER_AGENT, user_agent).send().await?;
    let landed_on = response.url().to_string();
    let html = response.text().await?;

    let Some(data_p) = find_data_p(&html) else {
        return Ok(match is_news_link(base_url, &landed_on) {
            true => url.to_string(),
            false => landed_on,
        });
    };

    let endpoint = format!("{}{BATCH_EXECUTE_PATH}", base_url.trim_end_matches('/'));
    let body = client
        .post(endpoint)
        .header(USER_AGENT, user_agent)
        .form(&[("f.req", batch_request(&data_p)?)])
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    parse_batch_response(&body)
}

fn find_data_p(html: &str) -> Option<String> {
    Html::parse_document(html)
        .select(&DATA_P)
        .next()
        .and_then(|element| element.value().attr("data-p"))
        .map(String::from)
}

fn batch_request(data_p: &str) -> Result<String> {
    let payload: Vec<Value> = serde_json::from_str(&data_p.replace("%.@.", "[\"garturlreq\","))
        .context("Couldn't parse Google News data-p payload")?;
    // Keeps everything but the last six fields, then re-appends the final two.
    let head = payload.len().saturating_sub(6);
    let tail = payload.len().saturating_sub(2);
    let trimmed: Vec<&Value> = payload[..head].iter().chain(&payload[tail..]).collect();

    let request = json!([[[RPC_ID, serde_json::to_string(&trimmed)?, "null", "generic"]]]);
    Ok(request.to_string())
}

fn parse_batch_response(body: &str) -> Result<String> {
    let envelope: Value = serde_json::from_str(body.replace(XSSI_PREFIX, "").trim())
        .context("Couldn't parse batchexecute response")?;
    let inner = envelope[0][2]
        .as_str()
        .context("batchexecute response has no payload")?;
    let inner: Value = serde_json::from_str(inner).context("Couldn't parse batchexecute payload")?;
    inner[1]
        .as_str()
        .map(String::from)
        .context("batchexecute payload has no URL")
}
