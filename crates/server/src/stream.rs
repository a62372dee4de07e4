//! Streaming proxy engines: decrypting downloads, encrypting uploads, and
//! plain passthrough.
//!
//! Download state machine: Parse → Resolve → SizeProbe → Fetch → Stream.
//! The client's `Range` header passes to the backend unchanged — stream
//! ciphers are position-invariant, so both sides speak about the same byte
//! offsets — and the cipher is seeked to the range start before the first
//! chunk is transformed.

use crate::error::{ApiError, ApiResult};
use crate::range::{self, ByteRange};
use crate::state::AppState;
use crate::upstream::forward_headers;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, Stream, StreamExt};
use shroud_core::rule::Policy;
use shroud_crypto::{ContentCipher, SeekableCipher};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Response headers copied verbatim from the backend on decrypting
/// downloads. `Content-Length` and `Content-Range` are deliberately absent:
/// the proxy computes its own.
const PASSED_RESPONSE_HEADERS: [header::HeaderName; 5] = [
    header::CONTENT_TYPE,
    header::CONTENT_DISPOSITION,
    header::CACHE_CONTROL,
    header::ETAG,
    header::LAST_MODIFIED,
];

/// Byte stream mapped through a cipher keystream, with an optional upper
/// length cap for ranged responses.
pub struct CipherStream<E> {
    inner: BoxStream<'static, Result<Bytes, E>>,
    cipher: ContentCipher,
    remaining: Option<u64>,
}

impl<E> CipherStream<E> {
    pub fn new(
        inner: BoxStream<'static, Result<Bytes, E>>,
        cipher: ContentCipher,
        limit: Option<u64>,
    ) -> Self {
        Self {
            inner,
            cipher,
            remaining: limit,
        }
    }
}

impl<E> Stream for CipherStream<E> {
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.remaining == Some(0) {
            return Poll::Ready(None);
        }
        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                let mut buf = BytesMut::from(chunk.as_ref());
                if let Some(remaining) = this.remaining.as_mut() {
                    if buf.len() as u64 > *remaining {
                        buf.truncate(*remaining as usize);
                    }
                    *remaining -= buf.len() as u64;
                }
                this.cipher.apply_keystream(&mut buf);
                Poll::Ready(Some(Ok(buf.freeze())))
            }
            other => other,
        }
    }
}

/// Extract the file size the cipher must be keyed with.
///
/// A pre-resolved size wins; otherwise the `Content-Range` total of a 206,
/// then `Content-Length`. Zero means unknown.
pub fn resolve_response_size(cached: Option<u64>, response: &reqwest::Response) -> u64 {
    if let Some(size) = cached
        && size > 0
    {
        return size;
    }

    if response.status() == StatusCode::PARTIAL_CONTENT
        && let Some(total) = response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit('/').next())
            .and_then(|v| v.parse::<u64>().ok())
        && total > 0
    {
        return total;
    }

    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
}

/// Fetch `target_url` and stream it back decrypted, honoring the client's
/// `Range` header.
pub async fn proxy_download_decrypt(
    state: &AppState,
    method: Method,
    client_headers: &HeaderMap,
    target_url: &str,
    policy: &Policy,
    cached_size: Option<u64>,
) -> ApiResult<Response> {
    let response = state
        .upstream
        .request(method, target_url)
        .headers(forward_headers(client_headers, true))
        .send()
        .await?;

    // Backend errors are not ciphertext; relay them untouched.
    if !response.status().is_success() {
        tracing::debug!(
            status = %response.status(),
            url = target_url,
            "backend answered download with non-success, relaying"
        );
        return Ok(relay_response(response));
    }

    let total = resolve_response_size(cached_size, &response);

    let range_header = client_headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());
    let requested = range::parse_range(range_header, total)
        .map_err(|_| ApiError::RangeNotSatisfiable { size: total })?;

    let mut cipher = ContentCipher::new(policy.enc_type, &policy.password, total);
    if let Some(ByteRange { start, .. }) = requested {
        cipher.set_position(start)?;
    }

    let mut builder = Response::builder();
    let headers = builder.headers_mut().expect("fresh builder");
    for name in PASSED_RESPONSE_HEADERS {
        if let Some(value) = response.headers().get(&name) {
            headers.insert(name, value.clone());
        }
    }
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let (status, limit) = match requested {
        Some(r) => {
            headers.insert(
                header::CONTENT_RANGE,
                r.content_range_header(total).parse().map_err(|_| {
                    ApiError::Internal("content-range header construction".to_string())
                })?,
            );
            headers.insert(header::CONTENT_LENGTH, r.content_length().into());
            (StatusCode::PARTIAL_CONTENT, Some(r.content_length()))
        }
        None => {
            headers.insert(header::CONTENT_LENGTH, total.into());
            (StatusCode::OK, None)
        }
    };

    let body = Body::from_stream(CipherStream::new(
        response.bytes_stream().boxed(),
        cipher,
        limit,
    ));
    builder
        .status(status)
        .body(body)
        .map_err(|err| ApiError::Internal(err.to_string()))
}

/// Encrypt the request body on its way to `target_url`.
///
/// The cipher is keyed with the client's `Content-Length`, which is also
/// what the backend is told — ciphertext length equals plaintext length.
pub async fn proxy_upload_encrypt(
    state: &AppState,
    method: Method,
    client_headers: &HeaderMap,
    target_url: &str,
    policy: &Policy,
    body: Body,
) -> ApiResult<Response> {
    let content_length = client_headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|&len| len > 0)
        .ok_or_else(|| {
            ApiError::BadRequest(
                "encrypted upload requires a non-zero Content-Length".to_string(),
            )
        })?;

    let cipher = ContentCipher::new(policy.enc_type, &policy.password, content_length);
    let encrypted = CipherStream::new(body.into_data_stream().boxed(), cipher, None);

    let response = state
        .upstream
        .request(method, target_url)
        .headers(forward_headers(client_headers, false))
        .body(reqwest::Body::wrap_stream(encrypted))
        .send()
        .await?;

    Ok(relay_response(response))
}

/// Forward a request unchanged and stream the backend's answer back.
pub async fn proxy_passthrough(
    state: &AppState,
    method: Method,
    client_headers: &HeaderMap,
    target_url: &str,
    body: Body,
) -> ApiResult<Response> {
    let response = state
        .upstream
        .request(method, target_url)
        .headers(forward_headers(client_headers, false))
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await?;
    Ok(relay_response(response))
}

/// Convert a backend response into a client response, headers and body
/// streamed as-is (hop-by-hop headers dropped).
pub fn relay_response(response: reqwest::Response) -> Response {
    let status = response.status();
    let mut builder = Response::builder().status(status);
    if let Some(headers) = builder.headers_mut() {
        *headers = forward_headers(response.headers(), false);
    }
    builder
        .body(Body::from_stream(response.bytes_stream()))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}
