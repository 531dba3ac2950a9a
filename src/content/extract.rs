//! Readable text from article pages.

use itertools::Itertools;
use regex::Regex;
use scraper::node::{Element, Node};
use scraper::{ElementRef, Html};
use serde::Serialize;
use std::sync::LazyLock;

const NOISE_TAGS: [&str; 18] = [
    "script", "style", "nav", "header", "footer", "aside", "form", "iframe", "button", "input",
    "textarea", "select", "option", "ads", "noscript", "svg", "figure", "figcaption",
];

const PARAGRAPH_TAGS: [&str; 4] = ["p", "h2", "h3", "li"];

const PAYWALL_PHRASES: [&str; 8] = [
    "subscription required",
    "subscribe now",
    "already a subscriber",
    "log in to continue",
    "read the full article",
    "premium content",
    "register to continue",
    "you have reached your limit",
];

const PAYWALL_HINTS: [&str; 3] = ["subscribe", "login", "register"];

const PAYWALL_SCAN_CHARS: usize = 1000;
const MIN_PARAGRAPH_CHARS: usize = 30;
const MIN_SUBSTANTIAL_PARAGRAPH_CHARS: usize = 50;
const MIN_FULL_TEXT_CHARS: usize = 200;
const MAX_PAGE_TEXT_CHARS: usize = 50_000;
const SHORT_ARTICLE_CHARS: usize = 500;
const SUMMARY_CHARS: usize = 400;
const SUMMARY_PARAGRAPHS: usize = 3;

static NOISE_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)ad-|ads|promo|subscribe|popup|cookie|menu|sidebar|social|share|comment|newsletter|related")
        .expect("valid regex")
});
static CONTENT_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)content|body|article|story|main").expect("valid regex"));
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ScrapedContent {
    pub(crate) full_text: String,
    pub(crate) summary: String,
    pub(crate) is_paywall: bool,
}

impl ScrapedContent {
    pub(crate) fn paywalled() -> Self {
        Self {
            is_paywall: true,
            ..Self::default()
        }
    }
}

pub(crate) fn extract_article(html: &str) -> ScrapedContent {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let page_text = root.text().collect::<String>().to_lowercase();
    let page_head: String = page_text.chars().take(PAYWALL_SCAN_CHARS).collect();
    let mut is_paywall = PAYWALL_PHRASES.iter().any(|phrase| page_head.contains(phrase));

    let target = find_target(root).unwrap_or(root);
    let paragraphs: Vec<String> = visible_elements(target)
        .into_iter()
        .filter(|element| PARAGRAPH_TAGS.contains(&element.value().name()))
        .map(|element| visible_text(element).join(" "))
        .filter(|text| text.chars().count() > MIN_PARAGRAPH_CHARS && !is_boilerplate(text))
        .collect();

    let mut full_text = paragraphs.join("\n\n");
    if full_text.chars().count() < MIN_FULL_TEXT_CHARS {
        let all_text = visible_text(root).join("\n\n");
        let length = all_text.chars().count();
        if length > MIN_FULL_TEXT_CHARS && length < MAX_PAGE_TEXT_CHARS {
            full_text = all_text;
        }
    }
    let full_text = BLANK_LINES.replace_all(&full_text, "\n\n").into_owned();

    let summary = match paragraphs.is_empty() {
        false => paragraphs.iter().take(SUMMARY_PARAGRAPHS).join(" "),
        true => truncate(&full_text, SUMMARY_CHARS),
    };

    if full_text.chars().count() < SHORT_ARTICLE_CHARS && PAYWALL_HINTS.iter().any(|hint| page_text.contains(hint)) {
        is_paywall = true;
    }

    ScrapedContent {
        full_text,
        summary,
        is_paywall,
    }
}

/// Text of an HTML snippet, pieces separated by single spaces.
pub(crate) fn fragment_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    fragment
        .root_element()
        .text()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .join(" ")
}

fn is_noise(element: &Element) -> bool {
    NOISE_TAGS.contains(&element.name())
        || element.attr("class").is_some_and(|class| NOISE_ATTRIBUTE.is_match(class))
        || element.id().is_some_and(|id| NOISE_ATTRIBUTE.is_match(id))
}

fn is_boilerplate(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("copyright") || lower.contains("all rights reserved")
}

/// The element most likely to hold the article body.
fn find_target(root: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let visible = visible_elements(root);
    let named = |name: &str| visible.iter().copied().find(|element| element.value().name() == name);

    if let Some(article) = named("article") {
        return Some(article);
    }

    let content_div = visible.iter().copied().find(|element| {
        element.value().name() == "div"
            && element.value().attr("class").is_some_and(|class| CONTENT_CLASS.is_match(class))
    });
    if content_div.is_some() {
        return content_div;
    }

    let mut parents: Vec<(ElementRef<'_>, usize)> = Vec::new();
    for paragraph in visible.iter().filter(|element| element.value().name() == "p") {
        let length = visible_text(*paragraph).concat().chars().count();
        if length <= MIN_SUBSTANTIAL_PARAGRAPH_CHARS {
            continue;
        }
        let Some(parent) = paragraph.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        match parents.iter_mut().find(|(element, _)| *element == parent) {
            Some((_, total)) => *total += length,
            None => parents.push((parent, length)),
        }
    }
    // First parent wins ties.
    let densest = parents
        .into_iter()
        .fold(None, |best: Option<(ElementRef<'_>, usize)>, candidate| match best {
            Some(best) if best.1 >= candidate.1 => Some(best),
            _ => Some(candidate),
        });
    if let Some((parent, _)) = densest {
        return Some(parent);
    }

    named("body")
}

/// `root` and its descendants in document order, skipping noise subtrees.
fn visible_elements(root: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    fn walk<'a>(element: ElementRef<'a>, out: &mut Vec<ElementRef<'a>>) {
        out.push(element);
        for child in element.children().filter_map(ElementRef::wrap) {
            if !is_noise(child.value()) {
                walk(child, out);
            }
        }
    }
    let mut out = Vec::new();
    walk(root, &mut out);
    out
}

/// Trimmed text pieces under `root`, skipping noise subtrees.
fn visible_text(root: ElementRef<'_>) -> Vec<&str> {
    fn walk<'a>(element: ElementRef<'a>, out: &mut Vec<&'a str>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => {
                    let text = text.trim();
                    if !text.is_empty() {
                        out.push(text);
                    }
                }
                Node::Element(element) if !is_noise(element) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        walk(child, out);
                    }
                }
                _ => {}
            }
        }
    }
    let mut out = Vec::new();
    walk(root, &mut out);
    out
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
