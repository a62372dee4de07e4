//! Catch-all passthrough proxy.
//!
//! Everything no explicit route claims is forwarded verbatim, with one
//! exception: a backend redirect whose `Location` lands on an encrypted
//! path is parked in the redirect registry and re-pointed at
//! `/redirect/<key>` so the client's follow-up stays on the decrypting
//! path.

use crate::error::ApiResult;
use crate::resolver;
use crate::state::AppState;
use crate::stream::relay_response;
use crate::upstream::forward_headers;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::response::Response;
use shroud_core::path;

/// Fallback handler: forward to the backend as-is, intercepting redirects.
pub async fn fallback(State(state): State<AppState>, req: Request) -> ApiResult<Response> {
    let method = req.method().clone();
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let target = state.upstream.url_for(&path_and_query);

    let (parts, body) = req.into_parts();
    let response = state
        .upstream
        .request(method, &target)
        .headers(forward_headers(&parts.headers, false))
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await?;

    if matches!(
        response.status(),
        StatusCode::FOUND | StatusCode::MOVED_PERMANENTLY
    ) && let Some(rewritten) = rewrite_location(&state, &response)
    {
        let mut relayed = relay_response(response);
        relayed.headers_mut().insert(header::LOCATION, rewritten);
        return Ok(relayed);
    }

    Ok(relay_response(response))
}

/// Park a redirect target that points into an encrypted realm; returns the
/// replacement `Location` value.
fn rewrite_location(
    state: &AppState,
    response: &reqwest::Response,
) -> Option<header::HeaderValue> {
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())?;

    // Absolute URL or bare path; either way only the path drives policy.
    let location_path = match url::Url::parse(location) {
        Ok(url) => url.path().to_string(),
        Err(_) => location
            .split(['?', '#'])
            .next()
            .unwrap_or(location)
            .to_string(),
    };
    let decoded = path::percent_decode(&location_path).into_owned();

    let policy = resolver::resolve(&state.rules, &decoded)?;
    let size = state
        .file_info
        .get(&decoded)
        .map(|info| info.size)
        .unwrap_or(0);
    let key = state
        .redirects
        .register(location, size, &policy.password, policy.enc_type);

    tracing::debug!(location = %decoded, key = %key, "parked backend redirect");
    format!("/redirect/{key}").parse().ok()
}
