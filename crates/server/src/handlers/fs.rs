//! Alist `/api/fs/*` interception.
//!
//! Listings get their entry names decrypted (bounded fan-out), cover images
//! folded into their videos, and entry metadata cached. `fs/get` responses
//! additionally have their `raw_url` parked in the redirect registry so the
//! client's direct download stays on the decrypting path. Mutating
//! operations translate display names back to stored names before
//! forwarding.

use crate::caches::FileInfo;
use crate::error::{ApiError, ApiResult};
use crate::handlers::download::real_path;
use crate::resolver;
use crate::state::AppState;
use crate::stream::{proxy_passthrough, proxy_upload_encrypt};
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::Response;
use futures::StreamExt;
use serde_json::{Value, json};
use shroud_core::{ORIG_PREFIX, path};
use shroud_crypto::NameCodec;
use std::collections::{HashMap, HashSet};

/// Upper bound on intercepted JSON bodies.
const MAX_JSON_BODY: usize = 10 * 1024 * 1024;

/// Concurrent name decryptions per listing.
const MAX_DECRYPT_WORKERS: usize = 32;

/// Alist entry type tag for videos.
const TYPE_VIDEO: i64 = 2;
/// Alist entry type tag for images.
const TYPE_IMAGE: i64 = 5;

async fn read_json(body: Body) -> ApiResult<(Bytes, Value)> {
    let bytes = axum::body::to_bytes(body, MAX_JSON_BODY)
        .await
        .map_err(|_| ApiError::BadRequest("failed to read request body".to_string()))?;
    let value = serde_json::from_slice(&bytes)
        .map_err(|_| ApiError::BadRequest("invalid JSON body".to_string()))?;
    Ok((bytes, value))
}

/// Forward a JSON body to an `/api/fs/*` endpoint. `Content-Length` is
/// recomputed by the client since the body may have been rewritten.
async fn forward_json(
    state: &AppState,
    endpoint: &str,
    client_headers: &HeaderMap,
    body: Vec<u8>,
) -> ApiResult<reqwest::Response> {
    let mut headers = crate::upstream::forward_headers(client_headers, false);
    headers.remove(header::CONTENT_LENGTH);
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    Ok(state
        .upstream
        .request(Method::POST, &state.upstream.url_for(endpoint))
        .headers(headers)
        .body(body)
        .send()
        .await?)
}

fn json_response(status: StatusCode, value: &Value) -> ApiResult<Response> {
    let body = serde_json::to_vec(value)
        .map_err(|err| ApiError::Internal(format!("response serialization: {err}")))?;
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .map_err(|err| ApiError::Internal(err.to_string()))
}

/// Relay a response we did not rewrite.
fn raw_response(
    status: StatusCode,
    content_type: Option<HeaderValue>,
    bytes: Bytes,
) -> ApiResult<Response> {
    let mut builder = Response::builder().status(status);
    if let Some(ct) = content_type {
        builder = builder.header(header::CONTENT_TYPE, ct);
    }
    builder
        .body(Body::from(bytes))
        .map_err(|err| ApiError::Internal(err.to_string()))
}

/// POST `/api/fs/list`: decrypt names, fold covers, cache entry metadata.
pub async fn fs_list(State(state): State<AppState>, req: Request) -> ApiResult<Response> {
    let (parts, body) = req.into_parts();
    let (body_bytes, req_json) = read_json(body).await?;
    let dir_path = req_json
        .get("path")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let response = forward_json(&state, "/api/fs/list", &parts.headers, body_bytes.to_vec()).await?;
    let status = response.status();
    let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
    let resp_bytes = response.bytes().await?;

    let Ok(mut resp_json) = serde_json::from_slice::<Value>(&resp_bytes) else {
        return raw_response(status, content_type, resp_bytes);
    };

    if resp_json.get("code").and_then(Value::as_i64) == Some(200) {
        process_listing(&state, &dir_path, &mut resp_json).await;
    }

    json_response(status, &resp_json)
}

struct DecryptTask {
    index: usize,
    name: String,
    policy: shroud_core::rule::Policy,
}

async fn process_listing(state: &AppState, dir_path: &str, resp_json: &mut Value) {
    let Some(content) = resp_json
        .pointer_mut("/data/content")
        .and_then(Value::as_array_mut)
    else {
        return;
    };

    let mut tasks = Vec::new();
    for (index, entry) in content.iter_mut().enumerate() {
        let Some(name) = entry.get("name").and_then(Value::as_str) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        let name = name.to_string();
        let is_dir = entry.get("is_dir").and_then(Value::as_bool).unwrap_or(false);

        let file_path = path::join(dir_path, &name);
        entry["path"] = Value::String(file_path.clone());
        state.file_info.insert(FileInfo::from_json(&file_path, entry));

        if is_dir {
            continue;
        }
        if let Some(policy) = resolver::resolve(&state.rules, &file_path)
            && policy.enc_name
        {
            tasks.push(DecryptTask {
                index,
                name,
                policy,
            });
        }
    }

    if !tasks.is_empty() {
        // PBKDF2 and Base64 are CPU work; fan out on the blocking pool,
        // capped so a huge listing cannot monopolize it.
        let results: Vec<(usize, String)> = futures::stream::iter(tasks)
            .map(|task| async move {
                let DecryptTask {
                    index,
                    name,
                    policy,
                } = task;
                let fallback = format!("{ORIG_PREFIX}{name}");
                let show = tokio::task::spawn_blocking(move || {
                    NameCodec::cached(&policy.password, policy.enc_type).show_name(&name)
                })
                .await
                .unwrap_or(fallback);
                (index, show)
            })
            .buffer_unordered(MAX_DECRYPT_WORKERS)
            .collect()
            .await;

        for (index, show) in results {
            if let Some(entry) = content.get_mut(index) {
                let display_path = path::join(dir_path, &show);
                entry["name"] = Value::String(show);
                entry["path"] = Value::String(display_path.clone());
                // Downloads address entries by display path; re-cache the
                // metadata under it.
                state.file_info.insert(FileInfo::from_json(&display_path, entry));
            }
        }
    }

    fold_covers(dir_path, content);
}

/// Remove image entries that serve as covers for a video with the same stem
/// and surface them as the video's `thumb`. Runs after name decryption, so
/// stems compare in display space.
fn fold_covers(dir_path: &str, content: &mut Vec<Value>) {
    let mut cover_by_stem: HashMap<String, String> = HashMap::new();
    for entry in content.iter() {
        if entry.get("is_dir").and_then(Value::as_bool).unwrap_or(false) {
            continue;
        }
        if entry.get("type").and_then(Value::as_i64) == Some(TYPE_IMAGE)
            && let Some(name) = entry.get("name").and_then(Value::as_str)
        {
            let stem = name.split('.').next().unwrap_or(name);
            cover_by_stem.insert(stem.to_string(), name.to_string());
        }
    }
    if cover_by_stem.is_empty() {
        return;
    }

    let mut omitted: HashSet<String> = HashSet::new();
    for entry in content.iter_mut() {
        if entry.get("is_dir").and_then(Value::as_bool).unwrap_or(false) {
            continue;
        }
        if entry.get("type").and_then(Value::as_i64) != Some(TYPE_VIDEO) {
            continue;
        }
        let Some(name) = entry.get("name").and_then(Value::as_str) else {
            continue;
        };
        let stem = name.split('.').next().unwrap_or(name);
        if let Some(cover) = cover_by_stem.get(stem) {
            entry["thumb"] = Value::String(format!("/d{}", path::join(dir_path, cover)));
            omitted.insert(cover.clone());
        }
    }

    if !omitted.is_empty() {
        content.retain(|entry| {
            entry
                .get("name")
                .and_then(Value::as_str)
                .is_none_or(|name| !omitted.contains(name))
        });
    }
}

/// POST `/api/fs/get`: translate the requested path, decrypt the response
/// name, park `raw_url`, cache sizes.
pub async fn fs_get(State(state): State<AppState>, req: Request) -> ApiResult<Response> {
    let (parts, body) = req.into_parts();
    let (_, mut req_json) = read_json(body).await?;
    let display_path = req_json
        .get("path")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let policy = resolver::resolve(&state.rules, &display_path);

    let mut forwarded_path = display_path.clone();
    if let Some(policy) = &policy
        && policy.enc_name
    {
        let cached_dir = state
            .file_info
            .get(&display_path)
            .map(|info| info.is_dir)
            .unwrap_or(false);
        if !cached_dir {
            forwarded_path = real_path(policy, &display_path);
            req_json["path"] = Value::String(forwarded_path.clone());
        }
    }

    let body = serde_json::to_vec(&req_json)
        .map_err(|err| ApiError::Internal(format!("request serialization: {err}")))?;
    let response = forward_json(&state, "/api/fs/get", &parts.headers, body).await?;
    let status = response.status();
    let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
    let resp_bytes = response.bytes().await?;

    let Ok(mut resp_json) = serde_json::from_slice::<Value>(&resp_bytes) else {
        return raw_response(status, content_type, resp_bytes);
    };

    if let Some(data) = resp_json.get_mut("data").filter(|d| d.is_object()) {
        state
            .file_info
            .insert(FileInfo::from_json(&display_path, data));
        if let Some(size) = data.get("size").and_then(Value::as_u64) {
            state.file_sizes.insert(&forwarded_path, size);
        }

        if let Some(policy) = &policy {
            if policy.enc_name
                && let Some(name) = data.get("name").and_then(Value::as_str)
            {
                let codec = NameCodec::cached(&policy.password, policy.enc_type);
                data["name"] = Value::String(codec.show_name(name));
            }

            if let Some(raw_url) = data.get("raw_url").and_then(Value::as_str)
                && !raw_url.is_empty()
            {
                let size = data.get("size").and_then(Value::as_u64).unwrap_or(0);
                let key =
                    state
                        .redirects
                        .register(raw_url, size, &policy.password, policy.enc_type);
                data["raw_url"] = Value::String(format!("/redirect/{key}"));
            }
        }
    }

    json_response(status, &resp_json)
}

/// PUT `/api/fs/put`: encrypt the body (and the `File-Path` name) on its
/// way to the backend.
pub async fn fs_put(State(state): State<AppState>, req: Request) -> ApiResult<Response> {
    let (parts, body) = req.into_parts();
    let query = parts
        .uri
        .query()
        .map(|q| format!("?{q}"))
        .unwrap_or_default();
    let endpoint = format!("/api/fs/put{query}");
    let target = state.upstream.url_for(&endpoint);

    let upload_path = parts
        .headers
        .get("file-path")
        .and_then(|v| v.to_str().ok())
        .map(|v| path::percent_decode(v).into_owned())
        .unwrap_or_else(|| "/-".to_string());

    let Some(policy) = resolver::resolve(&state.rules, &upload_path) else {
        return proxy_passthrough(&state, parts.method, &parts.headers, &target, body).await;
    };

    let mut headers = parts.headers.clone();
    if policy.enc_name {
        let real = real_path(&policy, &upload_path);
        let value: HeaderValue = crate::upstream::encode_path(&real)
            .parse()
            .map_err(|_| ApiError::BadRequest("unencodable File-Path".to_string()))?;
        headers.insert("file-path", value);
        tracing::debug!(original = %upload_path, encrypted = %real, "upload name encrypted");
    }

    proxy_upload_encrypt(&state, parts.method, &headers, &target, &policy, body).await
}

/// POST `/api/fs/remove`: forward the union of display and stored names so
/// either form of the entry is covered.
pub async fn fs_remove(State(state): State<AppState>, req: Request) -> ApiResult<Response> {
    let (parts, body) = req.into_parts();
    let (_, mut req_json) = read_json(body).await?;

    let dir = req_json
        .get("dir")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let names: Vec<String> = req_json
        .get("names")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if let Some(policy) = resolver::resolve(&state.rules, &dir)
        && policy.enc_name
    {
        let codec = NameCodec::cached(&policy.password, policy.enc_type);
        let mut union = names.clone();
        for name in &names {
            union.push(codec.real_name(name, &policy.enc_suffix));
        }
        req_json["names"] = json!(union);
    }

    forward_rewritten(&state, "/api/fs/remove", &parts.headers, &req_json).await
}

/// POST `/api/fs/rename`: translate the source path to its stored name and
/// re-encrypt the new name.
pub async fn fs_rename(State(state): State<AppState>, req: Request) -> ApiResult<Response> {
    let (parts, body) = req.into_parts();
    let (_, mut req_json) = read_json(body).await?;

    let src = req_json
        .get("path")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let new_name = req_json
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    if let Some(policy) = resolver::resolve(&state.rules, &src)
        && policy.enc_name
    {
        let real_src = real_path(&policy, &src);
        let is_dir = state
            .file_info
            .get(&src)
            .or_else(|| state.file_info.get(&real_src))
            .map(|info| info.is_dir)
            .unwrap_or(false);

        if !is_dir {
            let codec = NameCodec::cached(&policy.password, policy.enc_type);
            req_json["path"] = Value::String(real_src);
            req_json["name"] = Value::String(codec.real_name(&new_name, &policy.enc_suffix));
        }
    }

    forward_rewritten(&state, "/api/fs/rename", &parts.headers, &req_json).await
}

/// POST `/api/fs/move`.
pub async fn fs_move(State(state): State<AppState>, req: Request) -> ApiResult<Response> {
    move_or_copy(state, req, "/api/fs/move").await
}

/// POST `/api/fs/copy`.
pub async fn fs_copy(State(state): State<AppState>, req: Request) -> ApiResult<Response> {
    move_or_copy(state, req, "/api/fs/copy").await
}

async fn move_or_copy(state: AppState, req: Request, endpoint: &str) -> ApiResult<Response> {
    let (parts, body) = req.into_parts();
    let (_, mut req_json) = read_json(body).await?;

    let src_dir = req_json
        .get("src_dir")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    if let Some(policy) = resolver::resolve(&state.rules, &src_dir)
        && policy.enc_name
        && let Some(names) = req_json.get("names").and_then(Value::as_array)
    {
        let codec = NameCodec::cached(&policy.password, policy.enc_type);
        let translated: Vec<String> = names
            .iter()
            .filter_map(Value::as_str)
            .map(|name| codec.real_name(name, &policy.enc_suffix))
            .collect();
        req_json["names"] = json!(translated);
    }

    forward_rewritten(&state, endpoint, &parts.headers, &req_json).await
}

async fn forward_rewritten(
    state: &AppState,
    endpoint: &str,
    client_headers: &HeaderMap,
    req_json: &Value,
) -> ApiResult<Response> {
    let body = serde_json::to_vec(req_json)
        .map_err(|err| ApiError::Internal(format!("request serialization: {err}")))?;
    let response = forward_json(state, endpoint, client_headers, body).await?;
    let status = response.status();
    let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
    let resp_bytes = response.bytes().await?;
    raw_response(status, content_type, resp_bytes)
}
