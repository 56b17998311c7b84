//! Streaming RSS/Atom parser.
//!
//! A single forward pass over `quick_xml` events, read asynchronously from
//! the response body so nothing past the last needed item is fetched. The
//! parser tracks whether it is inside an RSS `<item>`, an Atom `<entry>`, or
//! at feed level, and collects per-item scratch fields until the closing tag
//! decides whether an item is emitted. Feed-level metadata (title, icon, accent color) may
//! appear anywhere in the document and is applied to the shared
//! [`FeedSource`] before it is handed to the items.

use std::mem;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tokio::io::AsyncBufRead;

use super::date::{parse_atom_date, parse_rss_date};
use super::item::{FeedItem, ItemFilter};
use super::source::{FeedSource, OPAQUE_ALPHA};

/// Root elements accepted as a feed document.
const FEED_ROOTS: [&str; 3] = ["rss", "feed", "rdf:RDF"];

/// `<media:content>` URLs with these endings count as images regardless of `medium`.
const IMAGE_EXTENSIONS: [&str; 4] = [".jpg", ".png", ".svg", ".jpeg"];

/// Errors that abort one parse attempt.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document is not well-formed XML
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),
    /// An element carried a malformed attribute
    #[error("Malformed attribute: {0}")]
    Attribute(#[from] AttrError),
    /// The root element is not `rss`, `feed` or `rdf:RDF`
    #[error("not a feed: unexpected root element <{0}>")]
    NotAFeed(String),
    /// The document has no elements at all
    #[error("not a feed: document is empty")]
    Empty,
    /// The document ended inside an element
    #[error("unexpected end of document")]
    UnexpectedEof,
}

/// Everything one successful parse produced.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    /// Source metadata after the whole document (or the capped prefix) was read
    pub source: Arc<FeedSource>,
    /// Items in document order
    pub items: Vec<FeedItem>,
}

/// Parses one RSS or Atom document.
///
/// `filter` is consulted for every complete item; `max_items` (0 = unlimited)
/// stops reading as soon as that many items were accepted, and the rest of
/// `input` is never polled.
///
/// The character encoding comes from a BOM or the `<?xml encoding=..?>`
/// declaration, defaulting to UTF-8.
///
/// # Errors
///
/// Returns [`ParseError`] on malformed XML, malformed attributes, or a
/// document whose root is not a feed element.
pub async fn parse_feed<R: AsyncBufRead + Unpin>(
    input: R,
    source: FeedSource,
    filter: &ItemFilter,
    max_items: usize,
) -> Result<ParsedFeed, ParseError> {
    StreamParser::new(input, source, filter, max_items).run().await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemKind {
    None,
    RssItem,
    AtomEntry,
}

#[derive(Debug, Default)]
struct Scratch {
    title: Option<String>,
    link: Option<String>,
    image: Option<String>,
    published_at: Option<DateTime<Utc>>,
}

enum Lookahead {
    Child,
    ParentClosed,
    Skip,
}

/// An accepted item waiting for the final [`FeedSource`] handle.
struct PendingItem {
    title: String,
    link: String,
    cover_image_url: Option<String>,
    published_at: DateTime<Utc>,
}

struct StreamParser<'f, R> {
    reader: Reader<R>,
    /// Buffer for nested reads (element text, `<image>` lookahead)
    inner_buf: Vec<u8>,
    source: FeedSource,
    filter: &'f ItemFilter,
    max_items: usize,
    kind: ItemKind,
    scratch: Scratch,
    accepted: Vec<PendingItem>,
}

impl<'f, R: AsyncBufRead + Unpin> StreamParser<'f, R> {
    fn new(input: R, source: FeedSource, filter: &'f ItemFilter, max_items: usize) -> Self {
        let mut reader = Reader::from_reader(input);
        reader.config_mut().trim_text(true);

        Self {
            reader,
            inner_buf: Vec::new(),
            source,
            filter,
            max_items,
            kind: ItemKind::None,
            scratch: Scratch::default(),
            accepted: Vec::new(),
        }
    }

    async fn run(mut self) -> Result<ParsedFeed, ParseError> {
        let mut buf = Vec::new();
        let mut seen_root = false;

        loop {
            let done = match self.reader.read_event_into_async(&mut buf).await? {
                Event::Start(e) => {
                    if !seen_root {
                        check_root(&e)?;
                        seen_root = true;
                    }
                    self.on_start(&e, false).await?;
                    false
                }
                Event::Empty(e) => {
                    if !seen_root {
                        check_root(&e)?;
                        seen_root = true;
                    }
                    self.on_start(&e, true).await?;
                    self.on_end(e.name().as_ref())
                }
                Event::End(e) => self.on_end(e.name().as_ref()),
                Event::Eof => true,
                _ => false,
            };
            buf.clear();

            if done {
                break;
            }
        }

        if !seen_root {
            return Err(ParseError::Empty);
        }

        Ok(self.finish())
    }

    async fn on_start(&mut self, e: &BytesStart<'_>, empty: bool) -> Result<(), ParseError> {
        let name = e.name();
        let tag = name.as_ref();

        if tag_is(tag, "item") {
            self.begin(ItemKind::RssItem);
            return Ok(());
        }
        if tag_is(tag, "entry") {
            self.begin(ItemKind::AtomEntry);
            return Ok(());
        }

        match self.kind {
            ItemKind::RssItem => self.on_rss_tag(e, tag, empty).await,
            ItemKind::AtomEntry => self.on_atom_tag(tag, empty).await,
            ItemKind::None => self.on_feed_tag(tag, empty).await,
        }
    }

    fn begin(&mut self, kind: ItemKind) {
        self.kind = kind;
        self.scratch = Scratch::default();
    }

    /// Handles a closing tag. Returns `true` when reading should stop.
    fn on_end(&mut self, tag: &[u8]) -> bool {
        if !(tag_is(tag, "item") || tag_is(tag, "entry")) {
            return false;
        }

        self.kind = ItemKind::None;
        let scratch = mem::take(&mut self.scratch);

        let (Some(title), Some(link)) = (scratch.title, scratch.link) else {
            return false;
        };
        if title.trim().is_empty() || link.trim().is_empty() {
            return false;
        }

        let published_at = scratch
            .published_at
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        if !(self.filter)(&link, &title, published_at) {
            return false;
        }

        self.accepted.push(PendingItem {
            title,
            link,
            cover_image_url: scratch.image,
            published_at,
        });

        self.max_items != 0 && self.accepted.len() >= self.max_items
    }

    async fn on_rss_tag(&mut self, e: &BytesStart<'_>, tag: &[u8], empty: bool) -> Result<(), ParseError> {
        if tag_is(tag, "title") {
            self.scratch.title = Some(self.element_text(empty).await?);
        } else if tag_is(tag, "guid") {
            let perma_link = self.attribute(e, "isPermaLink")?;
            let is_perma_link = match perma_link.as_deref() {
                None => true,
                Some(value) => value.trim().eq_ignore_ascii_case("true"),
            };
            if is_perma_link {
                self.scratch.link = Some(self.element_text(empty).await?);
            }
        } else if tag_is(tag, "link") && self.scratch.link.is_none() {
            self.scratch.link = Some(self.element_text(empty).await?);
        } else if tag_is(tag, "pubDate") {
            let text = self.element_text(empty).await?;
            self.scratch.published_at = Some(parse_rss_date(&text));
        } else if self.scratch.image.is_none() {
            self.scratch.image = self.rss_image(e, tag, empty).await?;
        }
        Ok(())
    }

    /// Image heuristics for RSS items, first match wins.
    async fn rss_image(
        &mut self,
        e: &BytesStart<'_>,
        tag: &[u8],
        empty: bool,
    ) -> Result<Option<String>, ParseError> {
        if tag_is(tag, "description") || tag == b"content:encoded" {
            let html = self.element_text(empty).await?;
            return Ok(find_img_src(&html));
        }
        if tag_is(tag, "image") {
            return Ok(non_blank(self.element_text(empty).await?));
        }

        match tag {
            b"media:content" => {
                let Some(url) = self.attribute(e, "url")? else {
                    return Ok(None);
                };
                let medium = self.attribute(e, "medium")?;
                let is_image = medium.as_deref() == Some("image")
                    || IMAGE_EXTENSIONS.iter().any(|ext| url.ends_with(ext));
                Ok(is_image.then_some(url))
            }
            b"media:thumbnail" | b"enclosure" => Ok(self.attribute(e, "url")?.and_then(non_blank)),
            b"itunes:image" => Ok(self.attribute(e, "href")?.and_then(non_blank)),
            _ => Ok(None),
        }
    }

    async fn on_atom_tag(&mut self, tag: &[u8], empty: bool) -> Result<(), ParseError> {
        if tag_is(tag, "title") {
            self.scratch.title = Some(self.element_text(empty).await?);
        } else if tag_is(tag, "id") {
            self.scratch.link = Some(self.element_text(empty).await?);
        } else if tag_is(tag, "published") || tag_is(tag, "updated") {
            let text = self.element_text(empty).await?;
            self.scratch.published_at = Some(parse_atom_date(&text));
        } else if self.scratch.image.is_none() && (tag_is(tag, "summary") || tag_is(tag, "content"))
        {
            let html = self.element_text(empty).await?;
            self.scratch.image = find_img_src(&html);
        }
        Ok(())
    }

    /// Feed-level tags outside any item.
    async fn on_feed_tag(&mut self, tag: &[u8], empty: bool) -> Result<(), ParseError> {
        if tag_is(tag, "title") {
            if let Some(title) = non_blank(self.element_text(empty).await?) {
                self.source.display_name = title;
            }
        } else if tag_is(tag, "icon") || tag == b"webfeeds:icon" {
            if let Some(icon) = non_blank(self.element_text(empty).await?) {
                self.source.icon_url = Some(icon);
            }
        } else if tag_is(tag, "image") {
            if !empty {
                if let Some(icon) = self.image_url().await?.and_then(non_blank) {
                    self.source.icon_url = Some(icon);
                }
            }
        } else if tag == b"webfeeds:accentColor" {
            let text = self.element_text(empty).await?;
            if let Some(color) = parse_accent_color(&text) {
                self.source.accent_color = Some(color);
            }
        }
        Ok(())
    }

    /// Text content of the element whose start tag was just read.
    ///
    /// Concatenates direct text and CDATA children; nested elements are
    /// skipped. Consumes the element's end tag.
    async fn element_text(&mut self, empty: bool) -> Result<String, ParseError> {
        if empty {
            return Ok(String::new());
        }

        let mut text = String::new();
        let mut depth = 0usize;

        loop {
            let done = match self.reader.read_event_into_async(&mut self.inner_buf).await? {
                Event::Text(t) if depth == 0 => {
                    text.push_str(&t.unescape()?);
                    false
                }
                Event::CData(c) if depth == 0 => {
                    let decoded = self
                        .reader
                        .decoder()
                        .decode(&c)
                        .map_err(quick_xml::Error::from)?;
                    text.push_str(&decoded);
                    false
                }
                Event::Start(_) => {
                    depth += 1;
                    false
                }
                Event::End(_) if depth == 0 => true,
                Event::End(_) => {
                    depth -= 1;
                    false
                }
                Event::Eof => return Err(ParseError::UnexpectedEof),
                _ => false,
            };
            self.inner_buf.clear();

            if done {
                return Ok(text);
            }
        }
    }

    /// Bounded lookahead inside a feed-level `<image>` for its `<url>` child.
    ///
    /// Reads through the matching `</image>` so that the image's own
    /// `<title>` is never mistaken for the feed title.
    async fn image_url(&mut self) -> Result<Option<String>, ParseError> {
        let mut url = None;
        let mut depth = 0usize;

        loop {
            let step = match self.reader.read_event_into_async(&mut self.inner_buf).await? {
                Event::Start(e) if depth == 0 && tag_is(e.name().as_ref(), "url") => Lookahead::Child,
                Event::Start(_) => {
                    depth += 1;
                    Lookahead::Skip
                }
                Event::End(_) if depth == 0 => Lookahead::ParentClosed,
                Event::End(_) => {
                    depth -= 1;
                    Lookahead::Skip
                }
                Event::Eof => return Err(ParseError::UnexpectedEof),
                _ => Lookahead::Skip,
            };
            self.inner_buf.clear();

            match step {
                Lookahead::Child => {
                    let text = self.element_text(false).await?;
                    if url.is_none() {
                        url = Some(text);
                    }
                }
                Lookahead::ParentClosed => return Ok(url),
                Lookahead::Skip => {}
            }
        }
    }

    fn attribute(&self, e: &BytesStart<'_>, key: &str) -> Result<Option<String>, ParseError> {
        match e.try_get_attribute(key)? {
            Some(attr) => Ok(Some(
                attr.decode_and_unescape_value(self.reader.decoder())?
                    .into_owned(),
            )),
            None => Ok(None),
        }
    }

    fn finish(self) -> ParsedFeed {
        let source = Arc::new(self.source);
        let items = self
            .accepted
            .into_iter()
            .map(|pending| FeedItem {
                title: pending.title,
                link: pending.link,
                cover_image_url: pending.cover_image_url,
                published_at: pending.published_at,
                source: Arc::clone(&source),
            })
            .collect();

        ParsedFeed { source, items }
    }
}

fn check_root(e: &BytesStart<'_>) -> Result<(), ParseError> {
    let name = e.name();
    if FEED_ROOTS.iter().any(|root| tag_is(name.as_ref(), root)) {
        Ok(())
    } else {
        Err(ParseError::NotAFeed(
            String::from_utf8_lossy(name.as_ref()).into_owned(),
        ))
    }
}

/// Case-insensitive tag comparison (tag names are ASCII in practice).
fn tag_is(tag: &[u8], expected: &str) -> bool {
    tag.eq_ignore_ascii_case(expected.as_bytes())
}

fn non_blank(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Finds the first `src="..."` after the first `img` in an HTML fragment.
fn find_img_src(html: &str) -> Option<String> {
    const SRC: &str = "src=\"";

    let img = html.find("img")?;
    let start = img + html[img..].find(SRC)? + SRC.len();
    let len = html[start..].find('"')?;
    non_blank(html[start..start + len].to_owned())
}

/// Parses `webfeeds:accentColor` hex text into an opaque ARGB value.
fn parse_accent_color(text: &str) -> Option<u32> {
    let hex = text.trim();
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.is_empty() {
        return None;
    }

    match u32::from_str_radix(hex, 16) {
        Ok(rgb) => Some((rgb & 0x00ff_ffff) | OPAQUE_ALPHA),
        Err(e) => {
            tracing::debug!(color = %text, error = %e, "Ignoring unparseable accent color");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::item::accept_all;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn source() -> FeedSource {
        FeedSource::new("example.com", "https://example.com/feed", "https://example.com")
    }

    async fn parse(xml: &str) -> ParsedFeed {
        parse_feed(xml.as_bytes(), source(), &accept_all(), 0)
            .await
            .unwrap()
    }

    fn rss(items: &str) -> String {
        format!(r#"<?xml version="1.0"?><rss version="2.0"><channel>{items}</channel></rss>"#)
    }

    const RSS_TWO_ITEMS: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Example Blog</title>
    <item>
      <title>First Post</title>
      <link>https://example.com/post/1</link>
      <pubDate>Mon, 02 Jan 2006 15:04:05 GMT</pubDate>
    </item>
    <item>
      <title>Second Post</title>
      <link>https://example.com/post/2</link>
      <pubDate>Tue, 03 Jan 2006 10:00:00 +0000</pubDate>
    </item>
  </channel>
</rss>"#;

    const ATOM_FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Blog</title>
  <icon>https://example.com/favicon.png</icon>
  <entry>
    <title>Atom Entry</title>
    <id>https://example.com/atom/1</id>
    <updated>2024-01-01T00:00:00Z</updated>
    <summary type="html">&lt;p&gt;&lt;img src="https://example.com/a.png"&gt;&lt;/p&gt;</summary>
  </entry>
</feed>"#;

    #[tokio::test]
    async fn test_single_rss_item() {
        let parsed = parse(&rss(
            "<item><title>Hello</title><link>https://example.com/hello</link></item>",
        ))
        .await;
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].title, "Hello");
        assert_eq!(parsed.items[0].link, "https://example.com/hello");
        assert_eq!(parsed.items[0].cover_image_url, None);
        assert_eq!(parsed.items[0].published_at, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn test_rss_items_in_document_order() {
        let parsed = parse(RSS_TWO_ITEMS).await;
        let titles: Vec<_> = parsed.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["First Post", "Second Post"]);
        assert_eq!(
            parsed.items[0].published_at,
            Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap()
        );
        assert_eq!(parsed.source.display_name, "Example Blog");
    }

    #[tokio::test]
    async fn test_items_share_one_source() {
        let parsed = parse(RSS_TWO_ITEMS).await;
        assert!(Arc::ptr_eq(&parsed.items[0].source, &parsed.items[1].source));
        assert!(Arc::ptr_eq(&parsed.items[0].source, &parsed.source));
    }

    #[tokio::test]
    async fn test_metadata_after_items_is_visible() {
        let xml = rss(r#"<item><title>A</title><link>https://x/a</link></item>
            <title>Late Title</title>
            <webfeeds:icon>https://x/icon.png</webfeeds:icon>
            <webfeeds:accentColor>FF5500</webfeeds:accentColor>"#);
        let parsed = parse(&xml).await;
        let source = &parsed.items[0].source;
        assert_eq!(source.display_name, "Late Title");
        assert_eq!(source.icon_url.as_deref(), Some("https://x/icon.png"));
        assert_eq!(source.accent_color, Some(0xffff_5500));
    }

    #[tokio::test]
    async fn test_missing_title_or_link_dropped() {
        let parsed = parse(&rss(
            "<item><title>No link</title></item>\
             <item><link>https://x/no-title</link></item>\
             <item><title>   </title><link>https://x/blank</link></item>\
             <item><title>Kept</title><link>https://x/kept</link></item>",
        ))
        .await;
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].title, "Kept");
    }

    #[tokio::test]
    async fn test_guid_permalink_overrides_link() {
        let parsed = parse(&rss(
            "<item><title>T</title><link>https://x/link</link><guid>https://x/guid</guid></item>",
        ))
        .await;
        assert_eq!(parsed.items[0].link, "https://x/guid");
    }

    #[tokio::test]
    async fn test_guid_not_permalink_ignored() {
        let parsed = parse(&rss(
            r#"<item><title>T</title><guid isPermaLink="false">abc-123</guid><link>https://x/link</link></item>"#,
        ))
        .await;
        assert_eq!(parsed.items[0].link, "https://x/link");
    }

    #[tokio::test]
    async fn test_link_does_not_override_guid() {
        let parsed = parse(&rss(
            r#"<item><title>T</title><guid isPermaLink="true">https://x/guid</guid><link>https://x/link</link></item>"#,
        ))
        .await;
        assert_eq!(parsed.items[0].link, "https://x/guid");
    }

    #[tokio::test]
    async fn test_uppercase_standard_tags() {
        let parsed = parse(&rss(
            "<ITEM><Title>Upper</Title><LINK>https://x/upper</LINK></ITEM>",
        ))
        .await;
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].title, "Upper");
    }

    #[tokio::test]
    async fn test_cdata_title() {
        let parsed = parse(&rss(
            "<item><title><![CDATA[Tom & Jerry]]></title><link>https://x/tj</link></item>",
        ))
        .await;
        assert_eq!(parsed.items[0].title, "Tom & Jerry");
    }

    #[tokio::test]
    async fn test_image_from_description() {
        let parsed = parse(&rss(
            r#"<item><title>T</title><link>https://x/1</link><description><![CDATA[<p>Hi <img src="https://x/y.png"></p>]]></description></item>"#,
        ))
        .await;
        assert_eq!(parsed.items[0].cover_image_url.as_deref(), Some("https://x/y.png"));
    }

    #[tokio::test]
    async fn test_image_from_escaped_content_encoded() {
        let parsed = parse(&rss(
            r#"<item><title>T</title><link>https://x/1</link><content:encoded>&lt;img alt="" src="https://x/c.jpg"/&gt;</content:encoded></item>"#,
        ))
        .await;
        assert_eq!(parsed.items[0].cover_image_url.as_deref(), Some("https://x/c.jpg"));
    }

    #[tokio::test]
    async fn test_description_without_img_leaves_image_unset() {
        let parsed = parse(&rss(
            r#"<item><title>T</title><link>https://x/1</link><description>plain text</description><enclosure url="https://x/e.png" type="image/png"/></item>"#,
        ))
        .await;
        assert_eq!(parsed.items[0].cover_image_url.as_deref(), Some("https://x/e.png"));
    }

    #[tokio::test]
    async fn test_image_tag_text() {
        let parsed = parse(&rss(
            "<item><title>T</title><link>https://x/1</link><image>https://x/i.gif</image></item>",
        ))
        .await;
        assert_eq!(parsed.items[0].cover_image_url.as_deref(), Some("https://x/i.gif"));
    }

    #[tokio::test]
    async fn test_media_content_by_medium() {
        let parsed = parse(&rss(
            r#"<item><title>T</title><link>https://x/1</link><media:content url="https://x/pic" medium="image"/></item>"#,
        ))
        .await;
        assert_eq!(parsed.items[0].cover_image_url.as_deref(), Some("https://x/pic"));
    }

    #[tokio::test]
    async fn test_media_content_by_extension() {
        let parsed = parse(&rss(
            r#"<item><title>T</title><link>https://x/1</link><media:content url="https://x/pic.jpeg"/></item>"#,
        ))
        .await;
        assert_eq!(parsed.items[0].cover_image_url.as_deref(), Some("https://x/pic.jpeg"));
    }

    #[tokio::test]
    async fn test_media_content_video_skipped() {
        let parsed = parse(&rss(
            r#"<item><title>T</title><link>https://x/1</link><media:content url="https://x/clip.mp4" medium="video"/><media:thumbnail url="https://x/thumb.webp"/></item>"#,
        ))
        .await;
        assert_eq!(parsed.items[0].cover_image_url.as_deref(), Some("https://x/thumb.webp"));
    }

    #[tokio::test]
    async fn test_itunes_image_href() {
        let parsed = parse(&rss(
            r#"<item><title>T</title><link>https://x/1</link><itunes:image href="https://x/pod.png"/></item>"#,
        ))
        .await;
        assert_eq!(parsed.items[0].cover_image_url.as_deref(), Some("https://x/pod.png"));
    }

    #[tokio::test]
    async fn test_first_image_wins() {
        let parsed = parse(&rss(
            r#"<item><title>T</title><link>https://x/1</link><media:thumbnail url="https://x/first.png"/><enclosure url="https://x/second.png"/></item>"#,
        ))
        .await;
        assert_eq!(parsed.items[0].cover_image_url.as_deref(), Some("https://x/first.png"));
    }

    #[tokio::test]
    async fn test_scratch_reset_between_items() {
        let parsed = parse(&rss(
            r#"<item><title>A</title><link>https://x/a</link><enclosure url="https://x/a.png"/><pubDate>Mon, 02 Jan 2006 15:04:05 GMT</pubDate></item>
               <item><title>B</title><link>https://x/b</link></item>"#,
        ))
        .await;
        assert_eq!(parsed.items[1].cover_image_url, None);
        assert_eq!(parsed.items[1].published_at, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn test_latin1_declared_encoding() {
        let xml = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\
            <rss><channel><title>Le Caf\xE9</title>\
            <item><title>Caf\xE9</title><link>https://x/1</link></item>\
            </channel></rss>";
        let parsed = parse_feed(xml.as_slice(), source(), &accept_all(), 0)
            .await
            .unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].title, "Caf\u{e9}");
        assert_eq!(parsed.source.display_name, "Le Caf\u{e9}");
    }

    #[tokio::test]
    async fn test_windows1252_cdata() {
        let xml = b"<?xml version=\"1.0\" encoding=\"windows-1252\"?>\
            <rss><channel>\
            <item><title><![CDATA[\x93Quoted\x94 na\xEFve]]></title><link>https://x/1</link></item>\
            </channel></rss>";
        let parsed = parse_feed(xml.as_slice(), source(), &accept_all(), 0)
            .await
            .unwrap();
        assert_eq!(parsed.items[0].title, "\u{201c}Quoted\u{201d} na\u{ef}ve");
    }

    #[tokio::test]
    async fn test_utf8_bom() {
        let xml = "\u{feff}<rss><channel><item><title>Cr\u{e8}me</title><link>https://x/1</link></item></channel></rss>";
        assert_eq!(parse(xml).await.items[0].title, "Cr\u{e8}me");
    }

    #[tokio::test]
    async fn test_atom_entry() {
        let parsed = parse(ATOM_FEED).await;
        assert_eq!(parsed.items.len(), 1);
        let item = &parsed.items[0];
        assert_eq!(item.title, "Atom Entry");
        assert_eq!(item.link, "https://example.com/atom/1");
        assert_eq!(item.published_at, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(item.cover_image_url.as_deref(), Some("https://example.com/a.png"));
        assert_eq!(item.source.display_name, "Atom Blog");
        assert_eq!(item.source.icon_url.as_deref(), Some("https://example.com/favicon.png"));
    }

    #[tokio::test]
    async fn test_atom_link_element_not_used() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry><title>No id</title><link href="https://x/1"/></entry></feed>"#;
        assert!(parse(xml).await.items.is_empty());
    }

    #[tokio::test]
    async fn test_channel_image_url_sets_icon_not_title() {
        let xml = rss(
            "<title>Real Title</title>\
             <image><url>https://x/logo.png</url><title>Image Title</title><link>https://x</link></image>\
             <item><title>A</title><link>https://x/a</link></item>",
        );
        let parsed = parse(&xml).await;
        assert_eq!(parsed.source.display_name, "Real Title");
        assert_eq!(parsed.source.icon_url.as_deref(), Some("https://x/logo.png"));
        assert_eq!(parsed.items.len(), 1);
    }

    #[tokio::test]
    async fn test_channel_image_without_url() {
        let parsed = parse(&rss("<image><title>Only</title></image><title>Feed</title>")).await;
        assert_eq!(parsed.source.icon_url, None);
        assert_eq!(parsed.source.display_name, "Feed");
    }

    #[tokio::test]
    async fn test_blank_feed_title_keeps_resolved_name() {
        let parsed = parse(&rss("<title>  </title>")).await;
        assert_eq!(parsed.source.display_name, "example.com");
    }

    #[test]
    fn test_accent_color_with_hash() {
        assert_eq!(parse_accent_color("#00ff00"), Some(0xff00_ff00));
        assert_eq!(parse_accent_color("zzz"), None);
        assert_eq!(parse_accent_color(""), None);
    }

    #[tokio::test]
    async fn test_filter_excludes_items() {
        let filter: ItemFilter = Arc::new(|link: &str, _title: &str, _at: DateTime<Utc>| {
            !link.ends_with("/1")
        });
        let parsed = parse_feed(RSS_TWO_ITEMS.as_bytes(), source(), &filter, 0)
            .await
            .unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].title, "Second Post");
    }

    #[tokio::test]
    async fn test_filter_sees_parsed_date() {
        let cutoff = Utc.with_ymd_and_hms(2006, 1, 3, 0, 0, 0).unwrap();
        let filter: ItemFilter =
            Arc::new(move |_link: &str, _title: &str, at: DateTime<Utc>| at >= cutoff);
        let parsed = parse_feed(RSS_TWO_ITEMS.as_bytes(), source(), &filter, 0)
            .await
            .unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].title, "Second Post");
    }

    #[tokio::test]
    async fn test_max_items_stops_reading() {
        // The broken tail is never reached once the cap is hit
        let xml = r#"<rss><channel>
            <item><title>A</title><link>https://x/a</link></item>
            <item><title>B</title><link>https://x/b</link></item>
            <item><title>C</title></broken>"#;
        let parsed = parse_feed(xml.as_bytes(), source(), &accept_all(), 2)
            .await
            .unwrap();
        assert_eq!(parsed.items.len(), 2);
    }

    #[tokio::test]
    async fn test_max_items_counts_only_accepted() {
        let filter: ItemFilter =
            Arc::new(|link: &str, _title: &str, _at: DateTime<Utc>| link != "https://x/a");
        let xml = rss(
            "<item><title>A</title><link>https://x/a</link></item>\
             <item><title>B</title><link>https://x/b</link></item>\
             <item><title>C</title><link>https://x/c</link></item>",
        );
        let parsed = parse_feed(xml.as_bytes(), source(), &filter, 1)
            .await
            .unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].title, "B");
    }

    #[tokio::test]
    async fn test_malformed_xml_is_error() {
        let result = parse_feed(
            "<rss><channel><item><title>x</channel></rss>".as_bytes(),
            source(),
            &accept_all(),
            0,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_html_page_is_not_a_feed() {
        let result = parse_feed(
            "<html><body><p>Hello</p></body></html>".as_bytes(),
            source(),
            &accept_all(),
            0,
        )
        .await;
        assert!(matches!(result, Err(ParseError::NotAFeed(ref root)) if root == "html"));
    }

    #[tokio::test]
    async fn test_empty_document_is_error() {
        let result = parse_feed("".as_bytes(), source(), &accept_all(), 0).await;
        assert!(matches!(result, Err(ParseError::Empty)));
    }

    #[tokio::test]
    async fn test_rdf_root_accepted() {
        let xml = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
            <item><title>R</title><link>https://x/r</link></item></rdf:RDF>"#;
        assert_eq!(parse(xml).await.items.len(), 1);
    }

    #[test]
    fn test_find_img_src() {
        assert_eq!(
            find_img_src(r#"<p>x</p><img class="a" src="https://x/1.png" />"#).as_deref(),
            Some("https://x/1.png")
        );
        assert_eq!(find_img_src(r#"<a src="https://x/no-img">"#), None);
        assert_eq!(find_img_src(r#"<img src="unterminated"#), None);
        assert_eq!(find_img_src("no image here"), None);
    }
}
