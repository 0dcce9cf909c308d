use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A cached payload together with the moment it was written and how long it
/// stays fresh.
///
/// Persisted as `{"data": ..., "writtenAt": <ms>, "ttl": <ms>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub data: T,
    /// Milliseconds since the Unix epoch.
    pub written_at: i64,
    /// Milliseconds after `written_at` during which the entry is fresh.
    pub ttl: u64,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, ttl: Duration) -> Self {
        Self {
            data,
            written_at: now_millis(),
            ttl: ttl.as_millis().min(u64::MAX as u128) as u64,
        }
    }

    /// An entry is valid iff `now - written_at < ttl`.
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        // i128 so a far-future written_at or a huge ttl cannot overflow
        (now_ms as i128 - self.written_at as i128) < self.ttl as i128
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_millis())
    }

    pub fn written_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.written_at)
            .single()
            .unwrap_or_default()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        let ttl = chrono::Duration::milliseconds(self.ttl.min(i64::MAX as u64) as i64);
        self.written_at()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.written_at()).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew (negative age)
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheEntry<U> {
        CacheEntry {
            data: f(self.data),
            written_at: self.written_at,
            ttl: self.ttl,
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
