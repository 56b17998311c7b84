//! The "open a byte stream for this URL" capability used by fetch tasks.

use std::io;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Buf;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio::io::AsyncBufRead;
use tokio_util::io::StreamReader;
use url::Url;

use super::fetcher::FetchError;

/// A response body, read as it arrives.
///
/// Failures while reading (size cap, truncation, network) surface as
/// `io::Error`s wrapping the corresponding [`FetchError`].
pub type FeedBody = Pin<Box<dyn AsyncBufRead + Send>>;

/// Opens the body behind a URL.
///
/// Implementations must be cheap to share across tasks; the loader holds
/// one behind an `Arc` and calls it from every fetch task concurrently.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Starts the request for `url` and returns its body as a stream.
    async fn open(&self, url: &str) -> Result<FeedBody, FetchError>;
}

/// [`FeedTransport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    request_timeout: Duration,
    max_body_bytes: usize,
}

impl HttpTransport {
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024; // 10MB

    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            max_body_bytes: Self::DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Upper bound for one request, headers and body included.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Bodies larger than this fail with [`FetchError::ResponseTooLarge`].
    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl FeedTransport for HttpTransport {
    async fn open(&self, url: &str) -> Result<FeedBody, FetchError> {
        let url = Url::parse(url)?;

        // The request-level timeout keeps running while the parser reads the body
        let request = self.client.get(url).timeout(self.request_timeout);
        let response = tokio::time::timeout(self.request_timeout, request.send())
            .await
            .map_err(|_| FetchError::Timeout)??;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let expected_length = response.content_length();

        // Fast path: check Content-Length header
        if let Some(len) = expected_length {
            if len > self.max_body_bytes as u64 {
                return Err(FetchError::ResponseTooLarge);
            }
        }

        let chunks = limited_body(response.bytes_stream(), expected_length, self.max_body_bytes);
        Ok(Box::pin(StreamReader::new(chunks)))
    }
}

struct BodyState<B> {
    chunks: BoxStream<'static, Result<B, reqwest::Error>>,
    received: usize,
    finished: bool,
}

/// Passes body chunks through while enforcing `limit` and, at the end,
/// comparing the byte count against `expected` (the `Content-Length`).
///
/// Nothing is read ahead: a chunk is only pulled when the consumer asks for
/// more bytes.
pub(crate) fn limited_body<S, B>(
    chunks: S,
    expected: Option<u64>,
    limit: usize,
) -> impl Stream<Item = io::Result<B>> + Send + 'static
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: Buf + Send + 'static,
{
    let state = BodyState {
        chunks: chunks.boxed(),
        received: 0,
        finished: false,
    };

    futures::stream::unfold(state, move |mut state| async move {
        if state.finished {
            return None;
        }

        match state.chunks.next().await {
            Some(Ok(chunk)) => {
                state.received = state.received.saturating_add(chunk.remaining());
                if state.received > limit {
                    state.finished = true;
                    return Some((Err(body_error(FetchError::ResponseTooLarge)), state));
                }
                Some((Ok(chunk), state))
            }
            Some(Err(e)) => {
                state.finished = true;
                let error = if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Network(e)
                };
                Some((Err(body_error(error)), state))
            }
            None => {
                state.finished = true;
                match expected {
                    Some(expected) if (state.received as u64) < expected => {
                        let error = FetchError::IncompleteResponse {
                            expected,
                            received: state.received,
                        };
                        Some((Err(body_error(error)), state))
                    }
                    _ => None,
                }
            }
        }
    })
}

fn body_error(error: FetchError) -> io::Error {
    io::Error::other(error)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    /// Serves fixed bodies by exact URL; anything else is a 404.
    /// URLs registered as slow never answer within any sane budget.
    #[derive(Default)]
    pub(crate) struct StaticTransport {
        bodies: HashMap<String, String>,
        slow: Vec<String>,
        requests: Mutex<Vec<String>>,
    }

    impl StaticTransport {
        pub(crate) fn serve(mut self, url: &str, body: &str) -> Self {
            self.bodies.insert(url.to_owned(), body.to_owned());
            self
        }

        pub(crate) fn hang(mut self, url: &str) -> Self {
            self.slow.push(url.to_owned());
            self
        }

        pub(crate) fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FeedTransport for StaticTransport {
        async fn open(&self, url: &str) -> Result<FeedBody, FetchError> {
            self.requests.lock().unwrap().push(url.to_owned());

            if self.slow.iter().any(|slow| slow == url) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }

            match self.bodies.get(url) {
                Some(body) => Ok(Box::pin(Cursor::new(body.clone().into_bytes()))),
                None => Err(FetchError::HttpStatus(404)),
            }
        }
    }

    /// Serves the same body for every URL, split into the given chunks and
    /// capped at `limit` bytes.
    pub(crate) struct ChunkedTransport {
        pub(crate) chunks: Vec<&'static [u8]>,
        pub(crate) limit: usize,
    }

    #[async_trait]
    impl FeedTransport for ChunkedTransport {
        async fn open(&self, _url: &str) -> Result<FeedBody, FetchError> {
            let chunks = futures::stream::iter(self.chunks.clone().into_iter().map(Ok));
            Ok(Box::pin(StreamReader::new(limited_body(
                chunks, None, self.limit,
            ))))
        }
    }
}
