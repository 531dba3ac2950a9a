//! CSV rendering of search results.

use anyhow::Result;
use serde::Serialize;

use crate::news::Article;

#[derive(Serialize)]
struct CsvRow<'a> {
    title: &'a str,
    description: &'a str,
    source: &'a str,
    link: &'a str,
    published: &'a str,
    full_text: Option<&'a str>,
    summary: Option<&'a str>,
    is_paywall: bool,
}

impl<'a> From<&'a Article> for CsvRow<'a> {
    fn from(article: &'a Article) -> Self {
        Self {
            title: &article.title,
            description: &article.description,
            source: &article.source,
            link: &article.link,
            published: &article.published,
            full_text: article.full_text.as_deref(),
            summary: article.summary.as_deref(),
            is_paywall: article.is_paywall,
        }
    }
}

/// One header row, then one row per article. Missing text is an empty cell.
pub(crate) fn articles_csv(articles: &[Article]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    // Headers come from the first serialized row.
    if articles.is_empty() {
        writer.write_record(COLUMNS)?;
    }
    for article in articles {
        writer.serialize(CsvRow::from(article))?;
    }
    writer
        .into_inner()
        .map_err(|error| anyhow::anyhow!("Couldn't flush CSV output: {}", error.error()))
}

const COLUMNS: [&str; 8] = [
    "title",
    "description",
    "source",
    "link",
    "published",
    "full_text",
    "summary",
    "is_paywall",
];

/// `news_<query>.csv`, with anything outside `[A-Za-z0-9_-]` replaced.
pub(crate) fn file_name(query: &str) -> String {
    let stem: String = query
        .chars()
        .map(|c| match c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            true => c,
            false => '_',
        })
        .collect();
    format!("news_{stem}.csv")
}
