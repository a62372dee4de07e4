//! Direct download endpoints: `/d/*`, `/p/*` and `/redirect/{key}`.

use crate::error::{ApiError, ApiResult};
use crate::resolver;
use crate::sizing;
use crate::state::AppState;
use crate::stream::{proxy_download_decrypt, proxy_passthrough};
use crate::upstream::encode_path;
use axum::extract::{Path as AxumPath, Request, State};
use axum::response::Response;
use shroud_core::path;
use shroud_core::rule::Policy;
use shroud_crypto::NameCodec;

/// Split the download prefix (`/d` or `/p`) off a request path.
fn split_prefix(raw_path: &str) -> (&str, &str) {
    for prefix in ["/d", "/p"] {
        if let Some(rest) = raw_path.strip_prefix(prefix)
            && rest.starts_with('/')
        {
            return (prefix, rest);
        }
    }
    ("", raw_path)
}

/// GET/HEAD `/d/{*path}` and `/p/{*path}`: streaming download, decrypted
/// when a rule matches, plain reverse proxy otherwise.
pub async fn download(State(state): State<AppState>, req: Request) -> ApiResult<Response> {
    let method = req.method().clone();
    let raw_path = req.uri().path().to_string();
    let query = req
        .uri()
        .query()
        .map(|q| format!("?{q}"))
        .unwrap_or_default();

    let (prefix, display_raw) = split_prefix(&raw_path);
    let display_path = path::percent_decode(display_raw).into_owned();

    let Some(policy) = resolver::resolve(&state.rules, &display_path) else {
        tracing::debug!(path = %display_path, "no rule, passing download through");
        let target = state.upstream.url_for(&format!("{raw_path}{query}"));
        let (parts, body) = req.into_parts();
        return proxy_passthrough(&state, method, &parts.headers, &target, body).await;
    };

    let real = real_path(&policy, &display_path);
    let target = state
        .upstream
        .url_for(&format!("{prefix}{}{query}", encode_path(&real)));

    tracing::debug!(
        display_path = %display_path,
        real = %real,
        enc_type = %policy.enc_type,
        "decrypting download"
    );

    let size = sizing::resolve_size(&state, &display_path, &real, &target).await;
    proxy_download_decrypt(&state, method, req.headers(), &target, &policy, size).await
}

/// GET `/redirect/{key}`: serve a parked upstream URL through the
/// decrypting path.
pub async fn redirect(
    State(state): State<AppState>,
    AxumPath(key): AxumPath<String>,
    req: Request,
) -> ApiResult<Response> {
    let entry = state
        .redirects
        .get(&key)
        .ok_or_else(|| ApiError::NotFound(format!("redirect key not found or expired: {key}")))?;

    let policy = Policy {
        password: entry.password.clone(),
        enc_type: entry.enc_type,
        enc_name: false,
        enc_suffix: String::new(),
    };

    proxy_download_decrypt(
        &state,
        req.method().clone(),
        req.headers(),
        &entry.url,
        &policy,
        Some(entry.total_size),
    )
    .await
}

/// Display path → stored path, converting the basename when names are
/// encrypted.
pub fn real_path(policy: &Policy, display_path: &str) -> String {
    if !policy.enc_name {
        return display_path.to_string();
    }
    let codec = NameCodec::cached(&policy.password, policy.enc_type);
    let real_base = codec.real_name(path::base_name(display_path), &policy.enc_suffix);
    path::join(path::dir_name(display_path), &real_base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_splitting() {
        assert_eq!(split_prefix("/d/e/a.bin"), ("/d", "/e/a.bin"));
        assert_eq!(split_prefix("/p/e/a.bin"), ("/p", "/e/a.bin"));
        assert_eq!(split_prefix("/davros"), ("", "/davros"));
        assert_eq!(split_prefix("/dir/file"), ("", "/dir/file"));
    }

    #[test]
    fn real_path_passthrough_without_name_encryption() {
        let policy = Policy {
            password: "k".into(),
            enc_type: shroud_core::EncType::Aesctr,
            enc_name: false,
            enc_suffix: String::new(),
        };
        assert_eq!(real_path(&policy, "/e/a.bin"), "/e/a.bin");
    }

    #[test]
    fn real_path_encrypts_only_the_basename() {
        let policy = Policy {
            password: "k".into(),
            enc_type: shroud_core::EncType::Aesctr,
            enc_name: true,
            enc_suffix: String::new(),
        };
        let real = real_path(&policy, "/e/sub/a.bin");
        assert!(real.starts_with("/e/sub/"));
        assert!(real.ends_with(".bin"));
        assert_ne!(real, "/e/sub/a.bin");
    }
}
