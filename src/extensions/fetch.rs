// Sandboxed Fetch Bridge
//
// The only I/O capability a content source receives. Calls block until the
// response body has been read; there is no retry, caching or rate limiting
// here. Network errors and non-2xx statuses come back as `FetchError`.

use super::error::FetchError;
use super::normalize::preview;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;

/// Bodies larger than this are truncated
const MAX_BODY_BYTES: u64 = 10_000_000;

/// Request options, mirroring the `__fetch(url, { method, headers, body })` shape
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FetchOptions {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl FetchOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: String) -> Self {
        Self {
            method: Some("POST".to_string()),
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or("GET")
    }
}

/// Response handed back to the caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

/// Outbound HTTP primitive available to content sources
pub trait FetchBridge: Send + Sync {
    fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse, FetchError>;
}

/// Check a URL's host against an allow-list (exact host or any subdomain)
pub fn is_url_allowed(allowed_domains: &[String], url: &str) -> bool {
    let parsed = match url::Url::parse(url) {
        Ok(u) => u,
        Err(_) => return false,
    };

    let host = match parsed.host_str() {
        Some(h) => h,
        None => return false,
    };

    allowed_domains
        .iter()
        .any(|domain| host == domain || host.ends_with(&format!(".{}", domain)))
}

/// Production bridge backed by a blocking `ureq` agent
pub struct UreqFetchBridge {
    agent: ureq::Agent,
    allowed_domains: Option<Vec<String>>,
}

impl UreqFetchBridge {
    /// Bridge with no domain restriction
    pub fn new() -> Self {
        Self::with_timeout(None)
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            agent: builder.build(),
            allowed_domains: None,
        }
    }

    /// Restrict outbound requests to these domains and their subdomains
    pub fn with_allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = Some(domains);
        self
    }

    fn check_allowed(&self, url: &str) -> Result<(), FetchError> {
        let parsed = url::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if let Some(ref domains) = self.allowed_domains {
            if !is_url_allowed(domains, url) {
                return Err(FetchError::DomainNotAllowed {
                    host: parsed.host_str().unwrap_or_default().to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for UreqFetchBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchBridge for UreqFetchBridge {
    fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse, FetchError> {
        self.check_allowed(url)?;

        log::info!("__fetch called: {} {}", options.method(), preview(url, 100));

        let mut request = match options.method().to_ascii_uppercase().as_str() {
            "POST" => self.agent.post(url),
            _ => self.agent.get(url),
        };

        for (key, value) in &options.headers {
            request = request.set(key, value);
        }

        let result = match options.body {
            Some(ref body) => request.send_string(body),
            None => request.call(),
        };

        match result {
            Ok(response) => {
                let status = response.status();
                let mut body = String::new();
                response
                    .into_reader()
                    .take(MAX_BODY_BYTES)
                    .read_to_string(&mut body)?;

                log::info!("__fetch response: status={}, body_len={}", status, body.len());

                Ok(FetchResponse { status, body })
            }
            Err(ureq::Error::Status(status, _)) => {
                log::error!("__fetch HTTP {} for {}", status, preview(url, 100));
                Err(FetchError::Status {
                    status,
                    url: url.to_string(),
                })
            }
            Err(e) => {
                log::error!("__fetch error: {:?}", e);
                Err(FetchError::Transport(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_validation() {
        let allowed = vec!["example.com".to_string()];

        assert!(is_url_allowed(&allowed, "https://example.com/api/search"));
        assert!(is_url_allowed(&allowed, "https://www.example.com/data"));
        assert!(!is_url_allowed(&allowed, "https://evil.com/phishing"));
        assert!(!is_url_allowed(&allowed, "https://notexample.com/"));
        assert!(!is_url_allowed(&allowed, "not a url"));
    }

    #[test]
    fn test_disallowed_domain_fails_before_network() {
        let bridge = UreqFetchBridge::new().with_allowed_domains(vec!["allanime.day".to_string()]);
        let err = bridge
            .fetch("https://evil.com/steal", &FetchOptions::get())
            .unwrap_err();
        assert!(matches!(err, FetchError::DomainNotAllowed { ref host } if host == "evil.com"));

        let err = bridge.fetch("::nonsense", &FetchOptions::get()).unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }

    #[test]
    fn test_options_builder() {
        let opts = FetchOptions::post("{}".to_string()).header("Referer", "https://allanime.to");
        assert_eq!(opts.method(), "POST");
        assert_eq!(opts.headers.get("Referer").map(String::as_str), Some("https://allanime.to"));
        assert_eq!(FetchOptions::get().method(), "GET");
    }
}
