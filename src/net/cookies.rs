use chrono::{DateTime, Duration, Utc};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub expires: Option<DateTime<Utc>>,
}

impl Cookie {
    /// Parse a `Set-Cookie` style string (`key=value; expires=...; path=/`) set for `url`.
    ///
    /// Returns `None` for strings without a `name=value` pair.
    pub fn parse(raw: &str, url: &Url) -> Option<Self> {
        let mut parts = raw.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie {
            name: name.to_string(),
            value: value.trim().to_string(),
            path: default_path(url),
            expires: None,
        };
        let mut max_age = None;

        for attribute in parts {
            let (key, val) = match attribute.split_once('=') {
                Some((key, val)) => (key.trim(), val.trim()),
                None => (attribute.trim(), ""),
            };
            match key.to_ascii_lowercase().as_str() {
                "path" if val.starts_with('/') => cookie.path = val.to_string(),
                "expires" => {
                    if let Ok(date) = DateTime::parse_from_rfc2822(val) {
                        cookie.expires = Some(date.with_timezone(&Utc));
                    }
                }
                "max-age" => {
                    max_age = val
                        .parse::<i64>()
                        .ok()
                        .and_then(Duration::try_seconds)
                        .and_then(|delta| Utc::now().checked_add_signed(delta));
                }
                _ => {}
            }
        }

        // Max-Age wins over Expires.
        if max_age.is_some() {
            cookie.expires = max_age;
        }

        Some(cookie)
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }

    fn matches_path(&self, request_path: &str) -> bool {
        if request_path == self.path {
            return true;
        }
        request_path.starts_with(&self.path)
            && (self.path.ends_with('/') || request_path[self.path.len()..].starts_with('/'))
    }
}

fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => path[..index].to_string(),
    }
}

/// Cookies belonging to one document origin.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a `Set-Cookie` string; a cookie with the same name and path is replaced.
    pub fn set(&mut self, raw: &str, url: &Url) {
        let Some(cookie) = Cookie::parse(raw, url) else {
            tracing::debug!(target: "env", cookie = raw, "ignoring malformed cookie");
            return;
        };
        self.cookies
            .retain(|existing| existing.name != cookie.name || existing.path != cookie.path);
        if !cookie.is_expired(Utc::now()) {
            self.cookies.push(cookie);
        }
    }

    /// `name=value` pairs visible to `url`, joined the way `document.cookie` reads them.
    pub fn cookie_string(&self, url: &Url) -> String {
        let now = Utc::now();
        self.cookies
            .iter()
            .filter(|cookie| !cookie.is_expired(now) && cookie.matches_path(url.path()))
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}
