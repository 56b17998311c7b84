//! Feed sources and the resolver that normalizes user input into one.
//!
//! A user hands us anything from `example.com` to `https://www.example.com/blog/`.
//! [`resolve_source`] turns that into a canonical base URL, a scheme-qualified
//! domain and a display name without touching the network.

use serde::Serialize;

const HTTP_SCHEME: &str = "http://";
const HTTPS_SCHEME: &str = "https://";

/// Alpha bits forced onto every accent color so it is always fully opaque.
pub(crate) const OPAQUE_ALPHA: u32 = 0xff00_0000;

/// The origin of a group of feed items.
///
/// One `FeedSource` is created per endpoint attempt. Every item parsed from
/// that attempt shares the same instance (see [`crate::feed::FeedItem::source`]),
/// so metadata found late in a document applies to items parsed before it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FeedSource {
    /// Human-readable name. Starts as the resolver-derived name and is
    /// replaced by the feed's own `<title>` when one is present.
    pub display_name: String,
    /// URL the feed was (or would have been) fetched from
    pub canonical_url: String,
    /// Scheme-qualified host, e.g. `https://www.example.com`
    pub domain: String,
    /// Feed icon from `<icon>`, `<image><url>` or `<webfeeds:icon>`
    pub icon_url: Option<String>,
    /// 24-bit RGB accent color with the alpha byte forced to `0xff`
    pub accent_color: Option<u32>,
}

impl FeedSource {
    pub fn new(
        display_name: impl Into<String>,
        canonical_url: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            canonical_url: canonical_url.into(),
            domain: domain.into(),
            icon_url: None,
            accent_color: None,
        }
    }

    /// Accent color as `0xRRGGBB`, without the alpha byte.
    pub fn accent_rgb(&self) -> Option<u32> {
        self.accent_color.map(|argb| argb & !OPAQUE_ALPHA)
    }
}

/// Result of normalizing one user-supplied source string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    /// Scheme-qualified URL with trailing slashes removed
    pub base_url: String,
    /// Scheme-qualified host
    pub domain: String,
    /// Host with a leading `www.` removed
    pub display_name: String,
}

impl ResolvedSource {
    /// Builds the candidate URL for one endpoint suffix (e.g. `/feed.xml`).
    pub fn endpoint(&self, suffix: &str) -> String {
        format!("{}{}", self.base_url, suffix)
    }

    /// Creates a fresh [`FeedSource`] for the given URL, carrying this
    /// source's domain and display name.
    pub fn to_source(&self, url: impl Into<String>) -> FeedSource {
        FeedSource::new(self.display_name.clone(), url, self.domain.clone())
    }

    /// The [`FeedSource`] that represents this source as a whole, keyed by
    /// the base URL rather than any endpoint candidate.
    pub fn base_source(&self) -> FeedSource {
        self.to_source(self.base_url.clone())
    }
}

/// Normalizes a raw source string.
///
/// - Inputs without an `http://` or `https://` prefix get `https://`.
/// - Trailing slashes are stripped from the base URL.
/// - The domain is the scheme plus everything up to the first `/` after it.
/// - The display name is the host with a leading `www.` removed.
///
/// The function is pure and idempotent: resolving `base_url` again yields
/// the same result.
///
/// # Examples
///
/// ```
/// use feedloader::feed::resolve_source;
///
/// let resolved = resolve_source("www.example.com/blog/");
/// assert_eq!(resolved.base_url, "https://www.example.com/blog");
/// assert_eq!(resolved.domain, "https://www.example.com");
/// assert_eq!(resolved.display_name, "example.com");
/// ```
pub fn resolve_source(raw: &str) -> ResolvedSource {
    let trimmed = raw.trim();

    let (scheme, rest) = if let Some(rest) = trimmed.strip_prefix(HTTPS_SCHEME) {
        (HTTPS_SCHEME, rest)
    } else if let Some(rest) = trimmed.strip_prefix(HTTP_SCHEME) {
        (HTTP_SCHEME, rest)
    } else {
        (HTTPS_SCHEME, trimmed)
    };

    // All trailing slashes go, so resolving a base_url again changes nothing
    let rest = rest.trim_end_matches('/');
    let host = rest.split('/').next().unwrap_or(rest);

    ResolvedSource {
        base_url: format!("{scheme}{rest}"),
        domain: format!("{scheme}{host}"),
        display_name: host.strip_prefix("www.").unwrap_or(host).to_owned(),
    }
}
