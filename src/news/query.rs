use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use itertools::Itertools;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt;
use std::str::FromStr;

// Mirrors the characters a browser leaves untouched in a query component.
const QUERY_TERM: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const SATURATION_VARIATIONS: [&str; 12] = [
    "", "news", "report", "breaking", "update", "latest", "analysis", "forecast", "trends", "market",
    "sector", "industry",
];

/// Related topics searched alongside a keyword belonging to a known sector.
pub(crate) fn sector_topics(sector: &str) -> Option<&'static [&'static str]> {
    let topics: &'static [&'static str] = match sector {
        "Finance" => &[
            "stocks", "banking", "economy", "investment", "fintech", "market", "trading", "crypto",
            "dividend", "revenue", "fiscal", "quarterly", "merger", "acquisition",
        ],
        "Tech & AI" => &[
            "artificial intelligence", "startup", "cybersecurity", "software", "innovation",
            "gadgets", "cloud computing", "machine learning", "robotics", "semiconductor",
            "big data", "saas", "hardware",
        ],
        "Health" => &[
            "medicine", "healthcare", "pharma", "wellness", "medical", "biotech", "hospital",
            "clinical trial", "vaccine", "genomic", "telemedicine", "digital health",
        ],
        "Sustainability" => &[
            "climate change", "green energy", "renewable", "carbon", "environment", "esg", "solar",
            "wind", "electric vehicle", "circular economy", "biodiversity", "net zero",
        ],
        "Education" => &[
            "schools", "universities", "edtech", "learning", "students", "campus", "curriculum",
            "literacy", "higher education", "vocational", "scholarship",
        ],
        "Sports" => &[
            "cricket", "football", "olympics", "tournament", "championship", "league", "athlete",
            "sponsorship", "world cup", "transfer", "record",
        ],
        "Startups" => &[
            "funding", "unicorn", "venture capital", "entrepreneur", "ipo", "acquisition",
            "seed round", "series a", "accelerator", "incubator", "scalability",
        ],
        "Lifestyle" => &[
            "fashion", "travel", "food", "luxury", "trends", "culture", "design", "wellness",
            "real estate", "architecture", "gastronomy", "influencer",
        ],
        _ => return None,
    };
    Some(topics)
}

fn encode(term: &str) -> String {
    utf8_percent_encode(term, QUERY_TERM).to_string()
}

fn join(left: &str, right: &str) -> String {
    format!("{left}%20{right}")
}

/// Percent-encoded `q` values for one keyword.
pub(crate) fn build_queries(keyword: &str, sector: Option<&str>, saturation: bool) -> Vec<String> {
    let plain = encode(keyword);
    let quoted = encode(&format!("\"{keyword}\""));

    let mut queries = if saturation {
        SATURATION_VARIATIONS
            .iter()
            .flat_map(|variation| match *variation {
                "" => [plain.clone(), quoted.clone()],
                variation => [join(&plain, variation), join(&quoted, variation)],
            })
            .collect::<Vec<_>>()
    } else {
        vec![
            plain.clone(),
            quoted,
            join(&plain, "news"),
            join(&plain, "report"),
        ]
    };

    if let Some((sector, topics)) = sector.and_then(|s| sector_topics(s).map(|t| (s, t))) {
        tracing::debug!(sector, topics = topics.len(), "Expanding search with sector topics.");
        let keyword_is_sector = keyword.eq_ignore_ascii_case(sector);
        queries.extend(topics.iter().map(|topic| match keyword_is_sector {
            true => encode(topic),
            false => join(&plain, &encode(topic)),
        }));
    }

    queries
}

/// A Google News edition such as `IN:en`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Region {
    country: String,
    language: String,
}

impl FromStr for Region {
    type Err = anyhow::Error;

    fn from_str(code: &str) -> Result<Self> {
        let (country, language) = code
            .split_once(':')
            .with_context(|| format!("Region \"{code}\" must look like \"US:en\""))?;
        let valid = |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphabetic());
        anyhow::ensure!(
            valid(country) && valid(language),
            "Region \"{code}\" must look like \"US:en\""
        );
        Ok(Self {
            country: country.to_string(),
            language: language.to_string(),
        })
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.country, self.language)
    }
}

impl Region {
    fn query_params(&self) -> String {
        format!(
            "hl={language}-{country}&gl={country}&ceid={country}:{language}",
            language = self.language,
            country = self.country,
        )
    }
}

/// One RSS search URL per day window, query and region, without duplicates.
pub(crate) fn search_urls(
    base_url: &str,
    queries: &[String],
    regions: &[Region],
    days: u32,
    today: NaiveDate,
) -> Vec<String> {
    let base_url = base_url.trim_end_matches('/');
    (0..u64::from(days))
        .filter_map(|offset| {
            let end = today.checked_sub_days(Days::new(offset))?;
            let start = end.checked_sub_days(Days::new(1))?;
            Some(format!("%20after%3A{start}%20before%3A{end}"))
        })
        .flat_map(|window| {
            queries.iter().flat_map(move |query| {
                let window = window.clone();
                regions.iter().map(move |region| {
                    format!(
                        "{base_url}/rss/search?q={query}{window}&{params}",
                        params = region.query_params()
                    )
                })
            })
        })
        .unique()
        .collect()
}
