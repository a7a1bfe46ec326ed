//! Wall-clock timestamps for lock expiry and property dates.
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat, Utc};
use headers::Header;

/// A point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DavTime(SystemTime);

impl DavTime {
    /// The current time.
    pub fn now() -> DavTime {
        DavTime(SystemTime::now())
    }

    /// `self + d`, saturating at the far end of the clock.
    pub fn after(&self, d: Duration) -> DavTime {
        match self.0.checked_add(d) {
            Some(t) => DavTime(t),
            None => DavTime(self.0),
        }
    }

    /// True if `self` is at or before `now`.
    pub fn has_passed(&self, now: DavTime) -> bool {
        self.0 <= now.0
    }

    /// Time left until `self`, zero if already passed.
    pub fn remaining(&self, now: DavTime) -> Duration {
        self.0.duration_since(now.0).unwrap_or(Duration::ZERO)
    }

    pub fn as_system_time(&self) -> SystemTime {
        self.0
    }

    /// RFC3339, as used by `creationdate`.
    pub fn to_rfc3339(&self) -> String {
        DateTime::<Utc>::from(self.0).to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// RFC7231 HTTP-date, as used by `getlastmodified`.
    pub fn to_httpdate(&self) -> String {
        let d = headers::Date::from(self.0);
        let mut v: Vec<http::HeaderValue> = Vec::new();
        d.encode(&mut v);
        v.first()
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    /// Microseconds since the epoch, or zero for pre-epoch times.
    pub fn unix_micros(&self) -> u64 {
        match self.0.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() * 1_000_000 + u64::from(d.subsec_micros()),
            Err(_) => 0,
        }
    }
}

impl From<SystemTime> for DavTime {
    fn from(t: SystemTime) -> Self {
        DavTime(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry() {
        let now = DavTime::now();
        assert!(now.has_passed(now));
        assert!(now.after(Duration::ZERO).has_passed(now));
        assert!(!now.after(Duration::from_secs(60)).has_passed(now));
        assert_eq!(now.after(Duration::from_secs(60)).remaining(now), Duration::from_secs(60));
    }

    #[test]
    fn test_format() {
        let t = DavTime::from(UNIX_EPOCH + Duration::from_secs(784111777));
        assert_eq!(t.to_httpdate(), "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(t.to_rfc3339(), "1994-11-06T08:49:37Z");
    }
}
