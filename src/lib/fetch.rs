//! Fetching chapter pages over HTTP.
//!
//! The site only serves chapter text to a logged-in browser, so every request carries the
//! operator's cookie string and browser-like headers. Requests are blocking and followed by a
//! fixed pause to keep the request rate low.

use std::thread;
use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, COOKIE, USER_AGENT};

use crate::config::HttpConfig;
use crate::walker::PageSource;
use crate::DeglyphError;

/// Headers and credentials for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub user_agent: String,
    pub accept_language: String,
    /// Raw cookie string as copied from a browser, `name=value; name2=value2`
    pub cookie: String,
    /// Sleep after every fetch
    pub fetch_delay: Duration,
}

impl SessionConfig {
    pub fn new(http: &HttpConfig, cookie: impl Into<String>) -> Self {
        SessionConfig {
            user_agent: http.user_agent.clone(),
            accept_language: http.accept_language.clone(),
            cookie: cookie.into(),
            fetch_delay: http.fetch_delay,
        }
    }
}

/// Splits a browser cookie string into name/value pairs.
///
/// Pairs are separated by `;`, names from values by the first `=`. Entries without a name are
/// dropped; an entry without `=` becomes a name with an empty value.
pub fn parse_cookie_string(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let name = name.trim();
            if name.is_empty() {
                None
            } else {
                Some((name.to_string(), value.trim().to_string()))
            }
        })
        .collect()
}

/// Renders cookie pairs back into a `Cookie` header value.
pub fn cookie_header(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ")
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, DeglyphError> {
    HeaderValue::from_str(value).map_err(|e| DeglyphError::ConfigError {
        message: format!("invalid {} header: {}", name, e),
        suggestion: "Remove non-ASCII or control characters from the value".to_string(),
    })
}

/// A [`PageSource`] backed by a blocking `reqwest` client.
pub struct HttpPageSource {
    client: Client,
    fetch_delay: Duration,
}

impl HttpPageSource {
    pub fn new(session: &SessionConfig) -> Result<Self, DeglyphError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value("User-Agent", &session.user_agent)?);
        headers.insert(
            ACCEPT_LANGUAGE,
            header_value("Accept-Language", &session.accept_language)?,
        );
        let cookies = parse_cookie_string(&session.cookie);
        debug!("Session carries {} cookies", cookies.len());
        if !cookies.is_empty() {
            let mut value = header_value("Cookie", &cookie_header(&cookies))?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| DeglyphError::ConfigError {
                message: format!("could not build HTTP client: {}", e),
                suggestion: "Check the TLS feature the binary was built with".to_string(),
            })?;
        Ok(HttpPageSource {
            client,
            fetch_delay: session.fetch_delay,
        })
    }
}

impl PageSource for HttpPageSource {
    fn fetch(&mut self, url: &str) -> Result<String, DeglyphError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| DeglyphError::network(url, format!("request failed: {}", e)))?;
        let status = response.status();
        let response = response.error_for_status().map_err(|e| {
            let suggestion = if status.as_u16() == 401 || status.as_u16() == 403 {
                Some("Your cookies may have expired; copy a fresh cookie string".to_string())
            } else {
                None
            };
            DeglyphError::NetworkError {
                url: url.to_string(),
                message: e.to_string(),
                suggestion,
            }
        })?;
        let body = response
            .text()
            .map_err(|e| DeglyphError::network(url, format!("could not read body: {}", e)))?;
        debug!("Fetched {} bytes from {}", body.len(), url);

        if !self.fetch_delay.is_zero() {
            thread::sleep(self.fetch_delay);
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cookie_string() {
        let pairs = parse_cookie_string("sid=abc; token=x=y;  lang=zh ;flag");
        assert_eq!(
            pairs,
            vec![
                ("sid".to_string(), "abc".to_string()),
                ("token".to_string(), "x=y".to_string()),
                ("lang".to_string(), "zh".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_parse_cookie_string_skips_empty_entries() {
        assert!(parse_cookie_string("").is_empty());
        assert!(parse_cookie_string(" ; =orphan; ").is_empty());
    }

    #[test]
    fn test_cookie_header_round_trip() {
        let raw = "a=1; b=2";
        assert_eq!(cookie_header(&parse_cookie_string(raw)), raw);
    }

    #[test]
    fn test_session_from_http_config() {
        let http = HttpConfig::default();
        let session = SessionConfig::new(&http, "a=1");
        assert_eq!(session.user_agent, http.user_agent);
        assert_eq!(session.fetch_delay, Duration::from_secs(2));
        assert!(HttpPageSource::new(&session).is_ok());
    }

    #[test]
    fn test_invalid_header_is_config_error() {
        let mut session = SessionConfig::new(&HttpConfig::default(), "a=1");
        session.user_agent = "bad\nagent".to_string();
        assert!(matches!(
            HttpPageSource::new(&session),
            Err(DeglyphError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_unreachable_host_is_network_error() {
        let mut session = SessionConfig::new(&HttpConfig::default(), "a=1");
        session.fetch_delay = Duration::ZERO;
        let mut source = HttpPageSource::new(&session).unwrap();
        match source.fetch("http://127.0.0.1:9/chapter") {
            Err(DeglyphError::NetworkError { url, .. }) => {
                assert_eq!(url, "http://127.0.0.1:9/chapter")
            }
            other => panic!("expected NetworkError, got {:?}", other.map(|s| s.len())),
        }
    }
}
