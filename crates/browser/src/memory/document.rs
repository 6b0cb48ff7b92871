use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use pagebridge_core::Result;
use tracing::debug;

use crate::env::Document;

/// Browsers clamp cookie lifetimes to 400 days.
const MAX_COOKIE_AGE_SECS: i64 = 400 * 24 * 60 * 60;

#[derive(Debug, Clone)]
struct StoredCookie {
    name: String,
    value: String,
    path: String,
    domain: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredCookie {
    fn same_slot(&self, other: &StoredCookie) -> bool {
        self.name == other.name && self.path == other.path && self.domain == other.domain
    }

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at > now).unwrap_or(true)
    }
}

/// Cookie jar of one document. Cookies are visible when their path is a
/// prefix of the document's path.
pub struct MemoryDocument {
    location_path: String,
    cookies: Mutex<Vec<StoredCookie>>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new("/")
    }
}

impl MemoryDocument {
    pub fn new(location_path: &str) -> Self {
        Self {
            location_path: location_path.to_string(),
            cookies: Mutex::new(Vec::new()),
        }
    }

    fn parse(&self, cookie: &str, now: DateTime<Utc>) -> Option<StoredCookie> {
        let mut parts = cookie.split(';');
        let pair = parts.next()?.trim();
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut parsed = StoredCookie {
            name: name.to_string(),
            value: value.trim().to_string(),
            path: "/".to_string(),
            domain: None,
            expires_at: None,
        };
        let mut max_age = None;
        let mut expires = None;

        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attr.trim(), ""),
            };
            match key.to_ascii_lowercase().as_str() {
                "path" if val.starts_with('/') => parsed.path = val.to_string(),
                "domain" if !val.is_empty() => {
                    parsed.domain = Some(val.trim_start_matches('.').to_ascii_lowercase())
                }
                "max-age" => max_age = val.parse::<i64>().ok(),
                "expires" => {
                    expires = DateTime::parse_from_rfc2822(val)
                        .ok()
                        .map(|d| d.with_timezone(&Utc))
                }
                // secure, samesite, httponly: no effect on what the page sees.
                _ => {}
            }
        }

        // Max-Age wins over Expires.
        parsed.expires_at = match (max_age, expires) {
            (Some(secs), _) if secs <= 0 => Some(now - Duration::seconds(1)),
            (Some(secs), _) => Some(now + Duration::seconds(secs.min(MAX_COOKIE_AGE_SECS))),
            (None, at) => at,
        };
        Some(parsed)
    }
}

impl Document for MemoryDocument {
    fn cookie(&self) -> String {
        let now = Utc::now();
        let cookies = self.cookies.lock().unwrap_or_else(|e| e.into_inner());
        cookies
            .iter()
            .filter(|c| c.is_live(now) && self.location_path.starts_with(&c.path))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn set_cookie(&self, cookie: &str) -> Result<()> {
        let now = Utc::now();
        let Some(parsed) = self.parse(cookie, now) else {
            debug!(cookie, "Ignoring malformed cookie string");
            return Ok(());
        };

        let mut cookies = self.cookies.lock().unwrap_or_else(|e| e.into_inner());
        cookies.retain(|c| c.is_live(now));
        let existing = cookies.iter().position(|c| c.same_slot(&parsed));
        match (existing, parsed.is_live(now)) {
            (Some(i), true) => cookies[i] = parsed,
            (Some(i), false) => {
                cookies.remove(i);
            }
            (None, true) => cookies.push(parsed),
            (None, false) => {}
        }
        Ok(())
    }
}
