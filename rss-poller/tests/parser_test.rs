use chrono::{TimeZone, Utc};
use rss_poller::{FeedParser, FieldProjector};

const RSS_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example News</title>
    <link>https://news.example.com/</link>
    <description>Everything that happened</description>
    <item>
      <title>First
 headline</title>
      <link>https://news.example.com/first</link>
      <description>Short summary</description>
      <author>editor@example.com (The Editor)</author>
      <guid>urn:example:first</guid>
      <category>world</category>
      <category>politics</category>
      <pubDate>Fri, 01 Mar 2024 09:30:00 GMT</pubDate>
    </item>
    <item>
      <title>Second headline</title>
      <link>https://news.example.com/second</link>
      <description>Another summary</description>
    </item>
  </channel>
</rss>"#;

const ATOM_SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Blog</title>
  <id>urn:example:blog</id>
  <updated>2024-03-02T12:00:00Z</updated>
  <entry>
    <title>Atom entry</title>
    <id>urn:example:entry:1</id>
    <link href="https://blog.example.com/entry-1"/>
    <updated>2024-03-02T12:00:00Z</updated>
    <published>2024-03-02T11:00:00Z</published>
    <author><name>Blog Author</name></author>
    <summary>Entry summary</summary>
    <content type="html">&lt;p&gt;Entry body&lt;/p&gt;</content>
  </entry>
</feed>"#;

#[test]
fn test_parse_rss_items_in_document_order() {
    let items = FeedParser::parse_items(RSS_SAMPLE.as_bytes()).unwrap();
    assert_eq!(items.len(), 2);

    let first = &items[0];
    assert_eq!(first.link, "https://news.example.com/first");
    assert_eq!(first.guid.as_deref(), Some("urn:example:first"));
    assert_eq!(first.description, "Short summary");
    assert_eq!(first.categories, vec!["world", "politics"]);
    assert_eq!(
        first.published_parsed,
        Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap())
    );
    assert!(!first.published.is_empty());

    let second = &items[1];
    assert_eq!(second.title, "Second headline");
    assert_eq!(second.published_parsed, None);
    assert!(second.published.is_empty());
}

#[test]
fn test_parse_atom_entry() {
    let items = FeedParser::parse_items(ATOM_SAMPLE.as_bytes()).unwrap();
    assert_eq!(items.len(), 1);

    let entry = &items[0];
    assert_eq!(entry.title, "Atom entry");
    assert_eq!(entry.guid.as_deref(), Some("urn:example:entry:1"));
    assert_eq!(entry.author.as_ref().map(|a| a.name.as_str()), Some("Blog Author"));
    assert!(entry.content.contains("Entry body"));
    assert_eq!(
        entry.updated_parsed,
        Some(Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap())
    );
}

#[test]
fn test_parsed_multiline_title_projects_on_one_line() {
    let items = FeedParser::parse_items(RSS_SAMPLE.as_bytes()).unwrap();
    let record = FieldProjector::default().project(
        &items[0],
        &["title".to_string()],
        "https://news.example.com/rss",
        Utc::now(),
    );
    let title = record.fields["title"].as_str().unwrap();
    assert!(!title.contains('\n'));
    assert!(title.starts_with("First"));
    assert_eq!(record.tags["world"], "true");
}

#[test]
fn test_garbage_is_a_parse_error() {
    let result = FeedParser::parse_items(b"<html><body>not a feed</body></html>");
    assert!(result.is_err());
    assert!(!FeedParser::is_valid_feed_content("<html><body>not a feed</body></html>"));
    assert!(FeedParser::is_valid_feed_content(RSS_SAMPLE));
    assert!(FeedParser::is_valid_feed_content(ATOM_SAMPLE));
}
