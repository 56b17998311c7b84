use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use super::source::FeedSource;

/// Caller-supplied inclusion rule, called with `(link, title, published_at)`.
///
/// Returning `false` drops the item before it is counted against any cap.
pub type ItemFilter = Arc<dyn Fn(&str, &str, DateTime<Utc>) -> bool + Send + Sync>;

/// A filter that keeps every item.
pub fn accept_all() -> ItemFilter {
    Arc::new(|_link: &str, _title: &str, _published_at: DateTime<Utc>| true)
}

/// Keeps items published within the last `max_age_days` days of `now`.
///
/// `0` disables the age check. Items without a parseable date carry the
/// epoch timestamp and are therefore dropped by any non-zero age.
pub fn max_age_filter(max_age_days: u32, now: DateTime<Utc>) -> ItemFilter {
    if max_age_days == 0 {
        return accept_all();
    }

    match now.checked_sub_signed(TimeDelta::days(i64::from(max_age_days))) {
        Some(cutoff) => {
            Arc::new(move |_link: &str, _title: &str, published_at: DateTime<Utc>| {
                published_at >= cutoff
            })
        }
        None => accept_all(),
    }
}

/// One parsed feed entry (RSS `<item>` or Atom `<entry>`).
///
/// `title` and `link` are never blank; the parser drops entries missing
/// either. `published_at` is the Unix epoch when no date could be parsed.
#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub cover_image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    /// Shared with every other item parsed from the same endpoint attempt
    pub source: Arc<FeedSource>,
}
