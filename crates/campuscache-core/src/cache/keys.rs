//! Cache keys for portal resources and the TTL tiers collaborators pick from.
//!
//! Keys here are logical keys; the store adds its namespace prefix when
//! persisting.

use std::fmt::Display;

pub const NEWS: &str = "news_list";
pub const EVENTS: &str = "events_list";
pub const SCHEDULE: &str = "schedule";
pub const USERS: &str = "users_list";

pub fn grades(user_id: impl Display) -> String {
    format!("grades_{}", user_id)
}

pub fn courses(user_id: impl Display) -> String {
    format!("courses_{}", user_id)
}

pub fn user_profile(user_id: impl Display) -> String {
    format!("user_{}", user_id)
}

pub fn schedule_for_group(group_id: impl Display) -> String {
    format!("schedule_{}", group_id)
}

pub mod ttl {
    use std::time::Duration;

    pub const SHORT: Duration = Duration::from_secs(5 * 60);
    pub const MEDIUM: Duration = Duration::from_secs(30 * 60);
    pub const LONG: Duration = Duration::from_secs(2 * 60 * 60);
    pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    /// Look up a tier by name (`short`, `medium`, `long`, `day`).
    pub fn parse_tier(name: &str) -> Option<Duration> {
        match name.trim().to_ascii_lowercase().as_str() {
            "short" => Some(SHORT),
            "medium" => Some(MEDIUM),
            "long" => Some(LONG),
            "day" => Some(DAY),
            _ => None,
        }
    }
}
