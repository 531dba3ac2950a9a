//! Company mentions across a set of articles.

use itertools::Itertools;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::news::Article;

const CHUNK_CHARS: usize = 2000;
const MAX_RUN_WORDS: usize = 4;
const MIN_SUMMARY_CHARS: usize = 10;
const MIN_FULL_TEXT_CHARS: usize = 50;
const MIN_TEXT_CHARS: usize = 10;
const NOISE_ARTICLE_COUNT: usize = 10;

const PUBLISHERS: [&str; 26] = [
    "reuters", "bloomberg", "cnbc", "cnn", "bbc", "forbes", "techcrunch", "times", "post", "guardian",
    "journal", "news", "press", "media", "tribune", "herald", "gazette", "chronicle", "observer",
    "telegraph", "associated press", "ap news", "afp", "pti", "ani", "ians",
];

const GENERIC_TERMS: [&str; 36] = [
    "government", "police", "court", "hospital", "university", "school", "company", "corporation",
    "industry", "market", "sector", "department", "ministry", "office", "bureau", "agency", "service",
    "center", "institute", "foundation", "trust", "group", "team", "committee", "council", "board",
    "commission", "authority", "people", "public", "officials", "sources", "experts", "analysts",
    "investors", "customers",
];

const LOCATIONS: [&str; 25] = [
    "india", "indian", "us", "usa", "uk", "china", "chinese", "japan", "america", "american", "europe",
    "european", "asia", "asian", "delhi", "mumbai", "bangalore", "london", "new york", "beijing", "tokyo",
    "singapore", "dubai", "california", "texas",
];

const COMPANY_SUFFIXES: [&str; 19] = [
    "inc", "corp", "ltd", "llc", "co", "group", "holdings", "technologies", "systems", "solutions",
    "services", "industries", "enterprises", "international", "global", "motors", "energy", "pharma", "labs",
];

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct RankedEntity {
    pub(crate) rank: usize,
    pub(crate) name: String,
    pub(crate) mentions: usize,
    pub(crate) articles: usize,
}

#[derive(Debug)]
struct Tally {
    name: String,
    mentions: usize,
    articles: usize,
}

/// The `top_n` most mentioned company names, most mentioned first.
pub(crate) fn top_companies(articles: &[Article], top_n: usize) -> Vec<RankedEntity> {
    if articles.is_empty() {
        return Vec::new();
    }
    rank(tally(articles), articles.len())
        .into_iter()
        .take(top_n)
        .collect()
}

/// Mention counts in first-seen order.
fn tally(articles: &[Article]) -> Vec<Tally> {
    let mut tallies: Vec<Tally> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for article in articles {
        let text = analysis_text(article);
        if text.chars().count() < MIN_TEXT_CHARS {
            continue;
        }

        let mut seen = HashSet::new();
        for chunk in &text.chars().chunks(CHUNK_CHARS) {
            let chunk: String = chunk.collect();
            for name in candidates(&chunk).into_iter().filter(|name| is_company_name(name)) {
                let slot = *index.entry(name.clone()).or_insert_with(|| {
                    tallies.push(Tally {
                        name: name.clone(),
                        mentions: 0,
                        articles: 0,
                    });
                    tallies.len() - 1
                });
                tallies[slot].mentions += 1;
                if seen.insert(slot) {
                    tallies[slot].articles += 1;
                }
            }
        }
    }
    tallies
}

fn rank(tallies: Vec<Tally>, article_count: usize) -> Vec<RankedEntity> {
    let mut kept: Vec<Tally> = tallies
        .into_iter()
        .filter(|tally| tally.mentions >= 2 || article_count <= NOISE_ARTICLE_COUNT)
        .collect();
    kept.sort_by(|a, b| b.mentions.cmp(&a.mentions));
    kept.into_iter()
        .enumerate()
        .map(|(i, tally)| RankedEntity {
            rank: i + 1,
            name: tally.name,
            mentions: tally.mentions,
            articles: tally.articles,
        })
        .collect()
}

/// Title, then the summary and body when they add anything.
fn analysis_text(article: &Article) -> String {
    let mut parts = vec![article.title.as_str()];
    let summary = article.summary.as_deref().unwrap_or_default();
    if summary.chars().count() > MIN_SUMMARY_CHARS {
        parts.push(summary);
    }
    if let Some(full_text) = article.full_text.as_deref() {
        if full_text.chars().count() > MIN_FULL_TEXT_CHARS && full_text != summary {
            parts.push(full_text);
        }
    }
    parts.join(". ")
}

/// Runs of capitalized words, at most four long. Company suffixes may be lowercase.
fn candidates(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut found = Vec::new();
    let mut i = 0;
    while i < words.len() {
        if !starts_uppercase(words[i]) {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        while j < words.len()
            && j < i + MAX_RUN_WORDS
            && (starts_uppercase(words[j]) || COMPANY_SUFFIXES.contains(&words[j].to_lowercase().as_str()))
        {
            j += 1;
        }
        let name = words[i..j].join(" ");
        let name = name.trim_matches(|c: char| c.is_ascii_punctuation() && c != '&');
        if !name.is_empty() {
            found.push(name.to_string());
        }
        i = j;
    }
    found
}

fn starts_uppercase(word: &str) -> bool {
    word.chars().next().is_some_and(char::is_uppercase)
}

fn is_company_name(name: &str) -> bool {
    let lower = name.trim().to_lowercase();

    if PUBLISHERS.iter().any(|publisher| lower.contains(publisher)) {
        return false;
    }
    if !lower.contains(' ') && GENERIC_TERMS.contains(&lower.as_str()) {
        return false;
    }
    if LOCATIONS.contains(&lower.as_str()) {
        return false;
    }
    if !starts_uppercase(name) || name.chars().count() < 2 {
        return false;
    }
    let all_upper = name.chars().any(char::is_alphabetic) && !name.chars().any(char::is_lowercase);
    if all_upper && name.chars().count() < 3 {
        return false;
    }
    !name
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_whitespace() || c == '-' || c == '/')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(title: &str, summary: Option<&str>, full_text: Option<&str>) -> Article {
        Article {
            summary: summary.map(String::from),
            full_text: full_text.map(String::from),
            ..Article::stub(title, "https://example.com")
        }
    }

    #[test]
    fn capitalized_runs_are_candidates() {
        assert_eq!(
            candidates("Shares of Tata Motors ltd rose while Apple Inc. and the Reserve Bank Of India Board watched"),
            vec!["Shares", "Tata Motors ltd", "Apple Inc", "Reserve Bank Of India", "Board"]
        );
        assert_eq!(candidates("Shares in Nvidia."), vec!["Shares", "Nvidia"]);
    }

    #[test]
    fn validation_rules() {
        assert!(is_company_name("Nvidia"));
        assert!(is_company_name("Tata Motors"));
        assert!(is_company_name("IBM"));
        assert!(!is_company_name("Reuters"));
        assert!(!is_company_name("Hindustan Times"));
        assert!(!is_company_name("Government"));
        assert!(is_company_name("Reliance Group"));
        assert!(!is_company_name("India"));
        assert!(!is_company_name("New York"));
        assert!(!is_company_name("apple"));
        assert!(!is_company_name("A"));
        assert!(!is_company_name("AI"));
        assert!(!is_company_name("2024"));
    }

    #[test]
    fn counts_mentions_and_distinct_articles() {
        let articles = vec![
            article("Nvidia beats estimates", Some("Nvidia and Micron lead chip rally"), None),
            article("Micron expands plant", None, None),
        ];
        let ranked = top_companies(&articles, 5);
        assert_eq!(
            ranked,
            vec![
                RankedEntity {
                    rank: 1,
                    name: "Nvidia".to_string(),
                    mentions: 2,
                    articles: 1,
                },
                RankedEntity {
                    rank: 2,
                    name: "Micron".to_string(),
                    mentions: 2,
                    articles: 2,
                },
            ]
        );
    }

    #[test]
    fn full_text_repeating_summary_is_not_counted_twice() {
        let summary = "Infosys signs a large deal with a European bank for cloud migration work";
        let articles = vec![article("Deal signed", Some(summary), Some(summary))];
        let ranked = top_companies(&articles, 5);
        let infosys = ranked.iter().find(|entity| entity.name == "Infosys");
        assert_eq!(infosys.map(|entity| entity.mentions), Some(1));
    }

    #[test]
    fn single_mentions_dropped_for_large_sets() {
        let mut articles: Vec<Article> = (0..10).map(|_| article("Wipro wins contract", None, None)).collect();
        articles.push(article("Zoho launches suite", None, None));
        let ranked = top_companies(&articles, 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].name, "Wipro");
        assert_eq!(ranked[0].mentions, 10);
        assert_eq!(ranked[0].articles, 10);
    }

    #[test]
    fn ties_keep_first_seen_order_and_top_n_applies() {
        let articles = vec![article("Alpha beats Beta and Gamma", None, None)];
        let names: Vec<String> = top_companies(&articles, 2).into_iter().map(|entity| entity.name).collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);
        assert!(top_companies(&[], 5).is_empty());
    }

    #[test]
    fn long_text_is_chunked_without_losing_mentions() {
        let body = "Sun Pharma reported growth in exports this quarter. ".repeat(100);
        let articles = vec![article("Exports", None, Some(&body))];
        let ranked = top_companies(&articles, 1);
        assert_eq!(ranked[0].name, "Sun Pharma");
        assert!(ranked[0].mentions >= 97);
    }
}
