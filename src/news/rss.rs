use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::{Captures, Regex};
use std::sync::LazyLock;

static NAMED_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&([A-Za-z][A-Za-z0-9]*);").expect("valid regex"));

/// One `<item>` of an RSS 2.0 feed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct FeedEntry {
    pub(crate) title: String,
    pub(crate) link: String,
    pub(crate) published: String,
    pub(crate) description: String,
    pub(crate) source: Option<String>,
}

#[derive(Clone, Copy)]
enum Field {
    Title,
    Link,
    Published,
    Description,
    Source,
}

impl Field {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"title" => Some(Self::Title),
            b"link" => Some(Self::Link),
            b"pubDate" => Some(Self::Published),
            b"description" => Some(Self::Description),
            b"source" => Some(Self::Source),
            _ => None,
        }
    }
}

impl FeedEntry {
    fn push(&mut self, field: Field, text: &str) {
        match field {
            Field::Title => self.title.push_str(text),
            Field::Link => self.link.push_str(text),
            Field::Published => self.published.push_str(text),
            Field::Description => self.description.push_str(text),
            Field::Source => self.source.get_or_insert_with(String::new).push_str(text),
        }
    }
}

pub(crate) fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<FeedEntry> = None;
    let mut field: Option<Field> = None;

    loop {
        let event = reader
            .read_event()
            .with_context(|| format!("Malformed feed at byte {}", reader.buffer_position()))?;
        match event {
            Event::Start(tag) => match tag.local_name().as_ref() {
                b"item" => current = Some(FeedEntry::default()),
                name => field = current.as_ref().and(Field::from_tag(name)),
            },
            Event::End(tag) => match tag.local_name().as_ref() {
                b"item" => entries.extend(current.take()),
                _ => field = None,
            },
            Event::Text(text) => {
                if let (Some(entry), Some(field)) = (current.as_mut(), field) {
                    entry.push(field, &unescape_text(&String::from_utf8_lossy(&text))?);
                }
            }
            Event::CData(data) => {
                if let (Some(entry), Some(field)) = (current.as_mut(), field) {
                    entry.push(field, &String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(entries)
}

/// XML unescaping that keeps HTML-only entities such as `&ndash;` verbatim.
fn unescape_text(raw: &str) -> Result<String> {
    let escaped = NAMED_ENTITY.replace_all(raw, |captures: &Captures| match &captures[1] {
        "lt" | "gt" | "amp" | "quot" | "apos" => captures[0].to_string(),
        name => format!("&amp;{name};"),
    });
    Ok(quick_xml::escape::unescape(&escaped)?.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r##"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>"nvidia" - Google News</title>
    <link>https://news.google.com/search?q=nvidia</link>
    <item>
      <title>Nvidia &amp; TSMC expand packaging deal - Reuters</title>
      <link>https://news.google.com/rss/articles/CBMiAbc?oc=5</link>
      <guid isPermaLink="false">CBMiAbc</guid>
      <pubDate>Fri, 01 Mar 2024 08:00:00 GMT</pubDate>
      <description>&lt;a href="https://example.com"&gt;Nvidia &amp;amp; TSMC&lt;/a&gt;&amp;nbsp;&amp;nbsp;&lt;font color="#6f6f6f"&gt;Reuters&lt;/font&gt;</description>
      <source url="https://www.reuters.com">Reuters</source>
    </item>
    <item>
      <title><![CDATA[Chip stocks rally]]></title>
      <link>https://example.org/chips</link>
      <pubDate>Thu, 29 Feb 2024 12:30:00 GMT</pubDate>
      <source url="https://example.org"/>
    </item>
  </channel>
</rss>"##;

    #[test]
    fn parses_items_only() -> Result<()> {
        let entries = parse_feed(FEED)?;
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(first.title, "Nvidia & TSMC expand packaging deal - Reuters");
        assert_eq!(first.link, "https://news.google.com/rss/articles/CBMiAbc?oc=5");
        assert_eq!(first.published, "Fri, 01 Mar 2024 08:00:00 GMT");
        assert!(first.description.starts_with("<a href=\"https://example.com\">"));
        assert_eq!(first.source.as_deref(), Some("Reuters"));

        let second = &entries[1];
        assert_eq!(second.title, "Chip stocks rally");
        assert_eq!(second.description, "");
        assert_eq!(second.source, None);
        Ok(())
    }

    #[test]
    fn empty_channel_has_no_entries() -> Result<()> {
        let entries = parse_feed(r#"<rss version="2.0"><channel><title>x</title></channel></rss>"#)?;
        assert!(entries.is_empty());
        Ok(())
    }

    #[test]
    fn unknown_entities_survive_unescaping() -> Result<()> {
        assert_eq!(unescape_text("&lt;b&gt;A &ndash; B&lt;/b&gt; &#38; C")?, "<b>A &ndash; B</b> & C");
        Ok(())
    }

    #[test]
    fn html_entities_are_kept_verbatim() -> Result<()> {
        let entries = parse_feed(
            "<rss><channel><item><title>Q1 results &ndash; Reuters</title>\
             <link>https://example.com/a</link></item></channel></rss>",
        )?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Q1 results &ndash; Reuters");
        assert_eq!(entries[0].link, "https://example.com/a");
        Ok(())
    }

    #[test]
    fn mismatched_tags_are_an_error() {
        assert!(parse_feed("<rss><channel><item><title>a</link></item></channel></rss>").is_err());
    }
}
