//! Date parsing for RSS `<pubDate>` and Atom `<published>`/`<updated>`.
//!
//! Parsing never fails: anything unrecognized becomes the Unix epoch.
//! Text after a successful match is ignored, so `"... +0000 (UTC)"` still parses.

use chrono::{DateTime, NaiveDateTime, Utc};

/// `Mon, 02 Jan 2006 15:04:05 +0000`
const RFC822_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";
/// `2006-01-02T15:04:05Z`, always read as UTC
const ISO_UTC_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Zone abbreviations rewritten to a numeric offset before parsing.
///
/// `EDT` maps to `+0000` for compatibility with previously loaded data,
/// even though Eastern Daylight Time is UTC-4.
const ZONE_REWRITES: [(&str, &str); 2] = [("GMT", "+0000"), ("EDT", "+0000")];

/// Parses an RSS `<pubDate>`: RFC 822 style first, then ISO 8601 UTC.
pub fn parse_rss_date(text: &str) -> DateTime<Utc> {
    let mut normalized = text.trim().to_owned();
    for (zone, offset) in ZONE_REWRITES {
        normalized = normalized.replace(zone, offset);
    }

    parse_rfc822(&normalized)
        .or_else(|| parse_iso_utc(&normalized))
        .unwrap_or_else(|| {
            tracing::debug!(date = %text, "Unrecognized pubDate, using epoch");
            DateTime::<Utc>::UNIX_EPOCH
        })
}

/// Parses an Atom `<published>`/`<updated>` in `yyyy-MM-ddTHH:mm:ssZ` form.
pub fn parse_atom_date(text: &str) -> DateTime<Utc> {
    parse_iso_utc(text.trim()).unwrap_or_else(|| {
        tracing::debug!(date = %text, "Unrecognized Atom date, using epoch");
        DateTime::<Utc>::UNIX_EPOCH
    })
}

fn parse_rfc822(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_and_remainder(text, RFC822_FORMAT)
        .ok()
        .map(|(dt, _)| dt.with_timezone(&Utc))
}

fn parse_iso_utc(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_and_remainder(text, ISO_UTC_FORMAT)
        .ok()
        .map(|(dt, _)| dt.and_utc())
}
