use thiserror::Error;

use super::item::{FeedItem, ItemFilter};
use super::parser::{parse_feed, ParseError, ParsedFeed};
use super::source::ResolvedSource;
use super::transport::FeedTransport;
use super::FeedSource;

/// Path suffixes tried against a source's base URL, in order.
pub const ENDPOINT_SUFFIXES: [&str; 7] = [
    "",
    "/feed",
    "/feed.xml",
    "/rss",
    "/rss.xml",
    "/atom",
    "/atom.xml",
];

/// Errors that can occur while fetching one endpoint candidate or one source.
///
/// Candidate-level errors are logged and swallowed while other candidates
/// remain; only [`FetchError::Exhausted`] and [`FetchError::TaskFailed`]
/// ever reach the loader's report.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The candidate URL could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the transport's timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the transport's size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// The connection failed while the body was being read
    #[error("Response body interrupted: {0}")]
    BodyInterrupted(String),
    /// Body was fetched but is not a usable RSS/Atom document
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    /// Every endpoint candidate failed
    #[error("All {attempts} endpoint candidates failed (last: {last_error})")]
    Exhausted { attempts: usize, last_error: String },
    /// The fetch task panicked or was aborted
    #[error("Fetch task failed: {0}")]
    TaskFailed(String),
}

/// Outcome of fetching one source.
///
/// `source` always describes the source by its base URL, whichever
/// endpoint candidate eventually answered.
#[derive(Debug)]
pub struct FetchResult {
    pub source: FeedSource,
    /// Items from the accepted endpoint, or why no endpoint was accepted
    pub result: Result<Vec<FeedItem>, FetchError>,
}

impl FetchError {
    /// Body read failures reach the parser as I/O errors wrapping a
    /// `FetchError`; recover it so a capped or truncated body is reported
    /// as a transport problem rather than as bad XML.
    fn from_parse(error: ParseError) -> Self {
        let carried = match &error {
            ParseError::Xml(quick_xml::Error::Io(io)) => io
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<FetchError>())
                .map(|inner| match inner {
                    FetchError::Timeout => FetchError::Timeout,
                    FetchError::ResponseTooLarge => FetchError::ResponseTooLarge,
                    &FetchError::IncompleteResponse { expected, received } => {
                        FetchError::IncompleteResponse { expected, received }
                    }
                    other => FetchError::BodyInterrupted(other.to_string()),
                }),
            _ => None,
        };
        carried.unwrap_or_else(|| FetchError::Parse(error))
    }
}

/// Fetches one source, trying each endpoint suffix in turn.
///
/// Candidates are tried sequentially so a source never has more than one
/// request in flight. The first candidate that both downloads and parses is
/// accepted and no further candidates are tried.
pub async fn fetch_source(
    transport: &dyn FeedTransport,
    resolved: &ResolvedSource,
    filter: &ItemFilter,
    max_items: usize,
) -> FetchResult {
    let mut last_error = None;

    for suffix in ENDPOINT_SUFFIXES {
        let url = resolved.endpoint(suffix);

        match fetch_candidate(transport, resolved, &url, filter, max_items).await {
            Ok(parsed) => {
                tracing::debug!(
                    source = %resolved.base_url,
                    endpoint = %url,
                    items = parsed.items.len(),
                    "Feed endpoint accepted"
                );
                return FetchResult {
                    source: resolved.base_source(),
                    result: Ok(parsed.items),
                };
            }
            Err(e) => {
                tracing::debug!(endpoint = %url, error = %e, "Feed endpoint candidate failed");
                last_error = Some(e);
            }
        }
    }

    FetchResult {
        source: resolved.base_source(),
        result: Err(FetchError::Exhausted {
            attempts: ENDPOINT_SUFFIXES.len(),
            last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
        }),
    }
}

/// One endpoint attempt with its own fresh [`FeedSource`].
///
/// The body is parsed as it downloads; once `max_items` items are accepted
/// the response is dropped without reading the rest.
async fn fetch_candidate(
    transport: &dyn FeedTransport,
    resolved: &ResolvedSource,
    url: &str,
    filter: &ItemFilter,
    max_items: usize,
) -> Result<ParsedFeed, FetchError> {
    let body = transport.open(url).await?;
    parse_feed(body, resolved.to_source(url), filter, max_items)
        .await
        .map_err(FetchError::from_parse)
}
