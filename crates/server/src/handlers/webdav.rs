//! WebDAV adapter: method dispatch under `/dav` with name and content
//! crypto.

use crate::caches::FileInfo;
use crate::error::{ApiError, ApiResult};
use crate::handlers::download::real_path;
use crate::handlers::multistatus::{self, ResponseBlock};
use crate::resolver;
use crate::sizing;
use crate::state::AppState;
use crate::stream::{proxy_download_decrypt, proxy_passthrough, proxy_upload_encrypt};
use crate::upstream::{encode_path, encode_segment, forward_headers};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header, request::Parts};
use axum::response::Response;
use shroud_core::path;
use shroud_crypto::NameCodec;

/// Upper bound on buffered WebDAV request/response bodies (PROPFIND XML and
/// the like; file bodies stream and never pass through here).
const MAX_DAV_BODY: usize = 32 * 1024 * 1024;

/// Route any method under `/dav` to its handler.
pub async fn dispatch(State(state): State<AppState>, req: Request) -> ApiResult<Response> {
    match req.method().as_str() {
        "GET" | "HEAD" => get(state, req).await,
        "PUT" => put(state, req).await,
        "PROPFIND" => propfind(state, req).await,
        "DELETE" => delete(state, req).await,
        "MOVE" | "COPY" => move_or_copy(state, req).await,
        // LOCK, UNLOCK, MKCOL, PROPPATCH, OPTIONS and anything else.
        _ => passthrough(state, req).await,
    }
}

/// Strip the `/dav` prefix; the root collection maps to `/`.
fn dav_path(raw_path: &str) -> &str {
    match raw_path.strip_prefix("/dav") {
        Some("") | None => "/",
        Some(rest) => rest,
    }
}

fn query_of(parts: &Parts) -> String {
    parts
        .uri
        .query()
        .map(|q| format!("?{q}"))
        .unwrap_or_default()
}

async fn passthrough(state: AppState, req: Request) -> ApiResult<Response> {
    let method = req.method().clone();
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let target = state.upstream.url_for(&path_and_query);
    let (parts, body) = req.into_parts();
    proxy_passthrough(&state, method, &parts.headers, &target, body).await
}

/// GET/HEAD: display→real path translation, then the decrypting download
/// flow.
async fn get(state: AppState, req: Request) -> ApiResult<Response> {
    let raw_path = req.uri().path().to_string();
    let display_path = path::percent_decode(dav_path(&raw_path)).into_owned();

    let Some(policy) = resolver::resolve(&state.rules, &display_path) else {
        return passthrough(state, req).await;
    };

    let (parts, _) = req.into_parts();
    let real = if policy.enc_name {
        state
            .name_map
            .get(&display_path)
            .unwrap_or_else(|| real_path(&policy, &display_path))
    } else {
        display_path.clone()
    };

    let query = query_of(&parts);
    let target = state
        .upstream
        .url_for(&format!("/dav{}{query}", encode_path(&real)));

    let size = sizing::resolve_size(&state, &display_path, &real, &target).await;
    proxy_download_decrypt(&state, parts.method, &parts.headers, &target, &policy, size).await
}

/// PUT: encrypt the basename and the body; prime the caches so the
/// follow-up PROPFIND can size the entry without a probe.
async fn put(state: AppState, req: Request) -> ApiResult<Response> {
    let raw_path = req.uri().path().to_string();
    let display_path = path::percent_decode(dav_path(&raw_path)).into_owned();

    let Some(policy) = resolver::resolve(&state.rules, &display_path) else {
        return passthrough(state, req).await;
    };

    let (parts, body) = req.into_parts();
    let real = real_path(&policy, &display_path);

    if let Some(size) = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        state.file_info.insert(FileInfo {
            path: display_path.clone(),
            name: path::base_name(&display_path).to_string(),
            size,
            is_dir: false,
        });
    }
    state.name_map.insert(&display_path, &real);

    let query = query_of(&parts);
    let target = state
        .upstream
        .url_for(&format!("/dav{}{query}", encode_path(&real)));

    tracing::debug!(display_path = %display_path, real = %real, "WebDAV PUT encrypting");
    proxy_upload_encrypt(&state, parts.method, &parts.headers, &target, &policy, body).await
}

/// DELETE: translate the path when names are encrypted, else pass through.
async fn delete(state: AppState, req: Request) -> ApiResult<Response> {
    let raw_path = req.uri().path().to_string();
    let display_path = path::percent_decode(dav_path(&raw_path)).into_owned();

    let policy = resolver::resolve(&state.rules, &display_path);
    let Some(policy) = policy.filter(|p| p.enc_name) else {
        return passthrough(state, req).await;
    };

    let (parts, body) = req.into_parts();
    let real = state
        .name_map
        .get(&display_path)
        .unwrap_or_else(|| real_path(&policy, &display_path));
    let query = query_of(&parts);
    let target = state
        .upstream
        .url_for(&format!("/dav{}{query}", encode_path(&real)));

    proxy_passthrough(&state, parts.method, &parts.headers, &target, body).await
}

/// MOVE/COPY: translate the source path and the `Destination` header.
async fn move_or_copy(state: AppState, req: Request) -> ApiResult<Response> {
    let raw_path = req.uri().path().to_string();
    let display_path = path::percent_decode(dav_path(&raw_path)).into_owned();
    let (mut parts, body) = req.into_parts();

    let source_policy = resolver::resolve(&state.rules, &display_path);
    let real = match source_policy.as_ref().filter(|p| p.enc_name) {
        Some(policy) => state
            .name_map
            .get(&display_path)
            .unwrap_or_else(|| real_path(policy, &display_path)),
        None => display_path.clone(),
    };

    if let Some(rewritten) = rewrite_destination(&state, &parts.headers) {
        parts.headers.insert("destination", rewritten);
    }

    let query = query_of(&parts);
    let target = state
        .upstream
        .url_for(&format!("/dav{}{query}", encode_path(&real)));

    proxy_passthrough(&state, parts.method, &parts.headers, &target, body).await
}

/// Encrypt the basename of a `Destination` header when its path falls
/// under a name-encrypting rule.
fn rewrite_destination(state: &AppState, headers: &HeaderMap) -> Option<HeaderValue> {
    let destination = headers.get("destination")?.to_str().ok()?;

    // Either an absolute URL or a bare path.
    match url::Url::parse(destination) {
        Ok(mut url) => {
            let display_path = path::percent_decode(dav_path(url.path())).into_owned();
            let policy = resolver::resolve(&state.rules, &display_path).filter(|p| p.enc_name)?;
            let real = real_path(&policy, &display_path);
            url.set_path(&format!("/dav{}", encode_path(&real)));
            url.as_str().parse().ok()
        }
        Err(_) => {
            let display_path = path::percent_decode(dav_path(destination)).into_owned();
            let policy = resolver::resolve(&state.rules, &display_path).filter(|p| p.enc_name)?;
            let real = real_path(&policy, &display_path);
            format!("/dav{}", encode_path(&real)).parse().ok()
        }
    }
}

/// PROPFIND: forward, retry once with a re-encrypted basename on 404,
/// cache entry metadata, and rewrite names in the multistatus body.
async fn propfind(state: AppState, req: Request) -> ApiResult<Response> {
    let raw_path = req.uri().path().to_string();
    let display_path = path::percent_decode(dav_path(&raw_path)).into_owned();
    let query_string = req
        .uri()
        .query()
        .map(|q| format!("?{q}"))
        .unwrap_or_default();

    let (parts, body) = req.into_parts();
    let body_bytes = axum::body::to_bytes(body, MAX_DAV_BODY)
        .await
        .map_err(|_| ApiError::BadRequest("failed to read PROPFIND body".to_string()))?;

    let policy = resolver::resolve(&state.rules, &display_path);

    // Prefer the cached real path for this exact entry; otherwise forward
    // the display path as received.
    let mapped = state.name_map.get(&display_path);
    let first_target = match &mapped {
        Some(real) => state
            .upstream
            .url_for(&format!("/dav{}{query_string}", encode_path(real))),
        None => state.upstream.url_for(&format!("{raw_path}{query_string}")),
    };

    let mut response =
        forward_propfind(&state, &parts.headers, &body_bytes, &first_target).await?;

    // One retry with the re-encrypted basename covers entries the name map
    // has not seen yet.
    if response.status() == StatusCode::NOT_FOUND
        && mapped.is_none()
        && let Some(policy) = policy.as_ref().filter(|p| p.enc_name)
    {
        let real = real_path(policy, &display_path);
        let retry_target = state
            .upstream
            .url_for(&format!("/dav{}{query_string}", encode_path(&real)));
        tracing::debug!(display_path = %display_path, real = %real, "PROPFIND 404, retrying with encrypted name");
        response = forward_propfind(&state, &parts.headers, &body_bytes, &retry_target).await?;
    }

    let status = response.status();
    let mut resp_headers = forward_headers(response.headers(), false);
    let resp_bytes = response.bytes().await?;

    let Ok(text) = std::str::from_utf8(&resp_bytes) else {
        return relay_buffered(status, resp_headers, resp_bytes.to_vec());
    };

    let rewritten = process_multistatus(&state, text);

    resp_headers.insert(header::CONTENT_LENGTH, rewritten.len().into());
    relay_buffered(status, resp_headers, rewritten.into_bytes())
}

async fn forward_propfind(
    state: &AppState,
    client_headers: &HeaderMap,
    body: &[u8],
    target: &str,
) -> ApiResult<reqwest::Response> {
    let mut headers = forward_headers(client_headers, false);
    headers.remove(header::CONTENT_LENGTH);
    Ok(state
        .upstream
        .request(Method::from_bytes(b"PROPFIND").expect("valid method"), target)
        .headers(headers)
        .body(body.to_vec())
        .send()
        .await?)
}

fn relay_buffered(
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
) -> ApiResult<Response> {
    let mut builder = Response::builder().status(status);
    if let Some(out) = builder.headers_mut() {
        *out = headers;
    }
    builder
        .body(Body::from(body))
        .map_err(|err| ApiError::Internal(err.to_string()))
}

/// Cache metadata from a multistatus body and rewrite stored names to
/// display names — `displayname` contents plus the last segment of every
/// `/dav/` href whose name decodes.
fn process_multistatus(state: &AppState, text: &str) -> String {
    let blocks = multistatus::parse_blocks(text);
    let mut replacements: Vec<(std::ops::Range<usize>, String)> = Vec::new();

    for block in &blocks {
        let Some(stored) = entry_paths(block) else {
            continue;
        };

        let policy = resolver::resolve(&state.rules, &stored.real);
        let decodes_names = policy.as_ref().is_some_and(|p| p.enc_name) && !block.is_collection;

        let (display_base, decoded) = if decodes_names {
            let policy = policy.as_ref().expect("checked above");
            let codec = NameCodec::cached(&policy.password, policy.enc_type);
            let show = codec.show_name(&stored.base);
            let decoded = !show.starts_with(shroud_core::ORIG_PREFIX);
            (show, decoded)
        } else {
            (stored.base.clone(), false)
        };

        let display_path = path::join(&stored.dir, &display_base);
        state.file_info.insert(FileInfo {
            path: display_path.clone(),
            name: display_base.clone(),
            size: block.content_length.unwrap_or(0),
            is_dir: block.is_collection,
        });
        if decodes_names {
            state.name_map.insert(&display_path, &stored.real);
        }

        if decodes_names {
            if let Some((_, range)) = &block.display_name {
                replacements.push((range.clone(), multistatus::xml_escape(&display_base)));
            }
            // Hrefs address resources; only rewrite ones that actually
            // decoded, so foreign names keep working verbatim.
            if decoded {
                let new_href = rebuild_href(&block.href, &display_base);
                replacements.push((
                    block.href_range.clone(),
                    multistatus::xml_escape(&new_href),
                ));
            }
        }
    }

    if replacements.is_empty() {
        return text.to_string();
    }
    multistatus::splice(text, replacements)
}

struct StoredEntry {
    /// Stored path below `/dav`, percent-decoded.
    real: String,
    dir: String,
    base: String,
}

/// Extract the stored entry path from an href (absolute URL or path).
fn entry_paths(block: &ResponseBlock) -> Option<StoredEntry> {
    let href_path = match url::Url::parse(&block.href) {
        Ok(url) => url.path().to_string(),
        Err(_) => block.href.clone(),
    };
    if !href_path.starts_with("/dav") {
        return None;
    }

    let trimmed = href_path.trim_end_matches('/');
    if trimmed == "/dav" || trimmed.is_empty() {
        return None;
    }
    let real = path::percent_decode(dav_path(trimmed)).into_owned();
    let dir = path::dir_name(&real).to_string();
    let base = path::base_name(&real).to_string();
    if base.is_empty() {
        return None;
    }
    Some(StoredEntry { real, dir, base })
}

/// Swap the last segment of an href for the display name, preserving any
/// scheme/host prefix and a trailing slash.
fn rebuild_href(href: &str, display_base: &str) -> String {
    let (body, trailing_slash) = match href.strip_suffix('/') {
        Some(body) => (body, "/"),
        None => (href, ""),
    };
    match body.rfind('/') {
        Some(idx) => format!(
            "{}/{}{trailing_slash}",
            &body[..idx],
            encode_segment(display_base)
        ),
        None => href.to_string(),
    }
}
