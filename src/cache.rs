//! In-memory quote cache with a fixed TTL.
//!
//! Time is injected by the caller so expiry is testable without sleeping.
//! The key space is bounded by the tickers an operator actually looks at, so
//! entries are only ever replaced, never evicted.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

pub const DEFAULT_TTL_SECS: i64 = 300;

#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub ticker: String,
    pub price: f64,
    pub currency: Option<String>,
    pub as_of: DateTime<Utc>,
}

pub struct PriceCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (DateTime<Utc>, Quote)>>,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(Duration::seconds(DEFAULT_TTL_SECS))
    }

    pub fn get(&self, ticker: &str, now: DateTime<Utc>) -> Option<Quote> {
        let entries = self.entries.lock().ok()?;
        let (stored_at, quote) = entries.get(ticker)?;
        if now - *stored_at > self.ttl {
            return None;
        }
        Some(quote.clone())
    }

    pub fn set(&self, quote: Quote, now: DateTime<Utc>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(quote.ticker.clone(), (now, quote));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn quote(ticker: &str, price: f64, as_of: DateTime<Utc>) -> Quote {
        Quote {
            ticker: ticker.into(),
            price,
            currency: Some("USD".into()),
            as_of,
        }
    }

    #[test]
    fn fresh_entry_is_returned() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let cache = PriceCache::new(Duration::minutes(5));
        cache.set(quote("AAPL", 212.5, t0), t0);

        let hit = cache.get("AAPL", t0 + Duration::minutes(4)).unwrap();
        assert_eq!(hit.price, 212.5);
    }

    #[test]
    fn expired_entry_is_dropped() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let cache = PriceCache::new(Duration::minutes(5));
        cache.set(quote("AAPL", 212.5, t0), t0);

        assert!(cache.get("AAPL", t0 + Duration::minutes(5) + Duration::seconds(1)).is_none());
        // exactly at the boundary still counts as fresh
        assert!(cache.get("AAPL", t0 + Duration::minutes(5)).is_some());
    }

    #[test]
    fn set_overwrites_existing_key() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let cache = PriceCache::new(Duration::minutes(5));
        cache.set(quote("NVDA", 100.0, t0), t0);
        cache.set(quote("NVDA", 105.0, t0 + Duration::minutes(1)), t0 + Duration::minutes(1));

        let hit = cache.get("NVDA", t0 + Duration::minutes(2)).unwrap();
        assert_eq!(hit.price, 105.0);
    }

    #[test]
    fn unknown_ticker_misses() {
        let cache = PriceCache::with_default_ttl();
        assert!(cache.get("MSFT", Utc::now()).is_none());
    }
}
