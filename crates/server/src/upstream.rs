//! Upstream (Alist) HTTP client.
//!
//! One pooled client serves all requests. Redirect following is disabled:
//! a backend 302 must be intercepted and re-keyed through the redirect
//! registry, never followed past the decrypting path.

use crate::caches::MIN_CACHEABLE_SIZE;
use axum::http::{HeaderMap, Method, StatusCode, header};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use shroud_core::{ProxyConfig, UpstreamConfig};
use std::time::Duration;

/// Characters percent-encoded when rebuilding a path whose segments were
/// produced by name conversion ('/' stays a separator).
const PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Percent-encode a decoded slash path for use in a URL.
pub fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH).to_string()
}

/// Percent-encode a single path segment (also escapes '/').
pub fn encode_segment(segment: &str) -> String {
    const SEGMENT: &AsciiSet = &PATH.add(b'/');
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// Headers never forwarded in either direction.
const HOP_BY_HOP: [header::HeaderName; 8] = [
    header::CONNECTION,
    header::HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Build the header set forwarded to the backend.
///
/// `strip_content` additionally drops `Content-Length`, `Content-Type` and
/// `Accept-Encoding` — required on decrypting fetches, where a transparent
/// upstream content transformation would change the apparent file length
/// and break the size-bound key derivation.
pub fn forward_headers(src: &HeaderMap, strip_content: bool) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in src {
        if *name == header::HOST || HOP_BY_HOP.contains(name) {
            continue;
        }
        if strip_content
            && (*name == header::CONTENT_LENGTH
                || *name == header::CONTENT_TYPE
                || *name == header::ACCEPT_ENCODING)
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Pooled client bound to one backend origin.
pub struct Upstream {
    client: reqwest::Client,
    origin: String,
    head_timeout: Duration,
}

impl Upstream {
    pub fn new(upstream: &UpstreamConfig, proxy: &ProxyConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(proxy.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(proxy.idle_timeout_secs))
            .danger_accept_invalid_certs(proxy.accept_invalid_certs)
            .build()?;
        Ok(Self {
            client,
            origin: upstream.origin_trimmed().to_string(),
            head_timeout: Duration::from_secs(upstream.head_timeout_secs),
        })
    }

    /// Absolute URL for a backend path (with optional query already
    /// attached).
    pub fn url_for(&self, path_and_query: &str) -> String {
        format!("{}{path_and_query}", self.origin)
    }

    /// Start a request against an absolute URL.
    pub fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client.request(method, url)
    }

    /// HEAD probe for a file's size.
    ///
    /// Rejected outcomes (all `None`): non-200 status, HTML content type
    /// (backends answer errors with HTML pages), sizes under the cacheable
    /// minimum, network errors.
    pub async fn head_probe(&self, url: &str) -> Option<u64> {
        let response = match self
            .client
            .head(url)
            .timeout(self.head_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(url, error = %err, "HEAD probe failed");
                return None;
            }
        };

        if response.status() != StatusCode::OK {
            return None;
        }
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if content_type.starts_with("text/html") {
            return None;
        }

        let size = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())?;
        (size >= MIN_CACHEABLE_SIZE).then_some(size)
    }
}
