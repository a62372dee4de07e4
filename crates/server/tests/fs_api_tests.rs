//! `/api/fs/*` interception tests: listing decryption, cover folding,
//! raw_url parking, uploads and name-translating mutations.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::{TestProxy, body_bytes, keystream_xor, pattern, rule};
use httpmock::Method::{GET, POST, PUT};
use serde_json::{Value, json};
use shroud_core::rule::EncType;
use shroud_crypto::NameCodec;
use tower::ServiceExt;

fn json_request(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn listing_decrypts_names_and_rewrites_paths() {
    let proxy = TestProxy::new(vec![rule("k", EncType::Aesctr, true, &["/s/.*"])]).await;
    let codec = NameCodec::cached("k", EncType::Aesctr);
    let stored = format!("{}.mp4", codec.encode_name("holiday"));

    proxy
        .backend
        .mock_async(|when, then| {
            when.method(POST).path("/api/fs/list");
            then.status(200).json_body(json!({
                "code": 200,
                "message": "success",
                "data": {
                    "content": [
                        {"name": stored, "is_dir": false, "size": 4096, "type": 2},
                        {"name": "subdir", "is_dir": true, "size": 0, "type": 1}
                    ],
                    "total": 2
                }
            }));
        })
        .await;

    let response = proxy
        .router
        .clone()
        .oneshot(json_request("/api/fs/list", &json!({"path": "/s"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let content = body["data"]["content"].as_array().unwrap();

    assert_eq!(content[0]["name"], "holiday");
    assert_eq!(content[0]["path"], "/s/holiday");
    // Directories keep their names.
    assert_eq!(content[1]["name"], "subdir");

    // Display-path metadata is primed for later downloads.
    let info = proxy.state.file_info.get("/s/holiday").unwrap();
    assert_eq!(info.size, 4096);
}

#[tokio::test]
async fn listing_marks_foreign_names_as_originals() {
    let proxy = TestProxy::new(vec![rule("k", EncType::Aesctr, true, &["/s/.*"])]).await;

    proxy
        .backend
        .mock_async(|when, then| {
            when.method(POST).path("/api/fs/list");
            then.status(200).json_body(json!({
                "code": 200,
                "data": {"content": [
                    {"name": "plain.mp4", "is_dir": false, "size": 2048, "type": 2}
                ]}
            }));
        })
        .await;

    let response = proxy
        .router
        .clone()
        .oneshot(json_request("/api/fs/list", &json!({"path": "/s"})))
        .await
        .unwrap();

    let body = json_body(response).await;
    assert_eq!(body["data"]["content"][0]["name"], "orig_plain.mp4");
}

#[tokio::test]
async fn listing_folds_covers_into_thumbs() {
    let proxy = TestProxy::new(vec![rule("k", EncType::Aesctr, false, &["/never/.*"])]).await;

    proxy
        .backend
        .mock_async(|when, then| {
            when.method(POST).path("/api/fs/list");
            then.status(200).json_body(json!({
                "code": 200,
                "data": {"content": [
                    {"name": "video.mp4", "is_dir": false, "size": 9000, "type": 2},
                    {"name": "video.jpg", "is_dir": false, "size": 512, "type": 5}
                ]}
            }));
        })
        .await;

    let response = proxy
        .router
        .clone()
        .oneshot(json_request("/api/fs/list", &json!({"path": "/media"})))
        .await
        .unwrap();

    let body = json_body(response).await;
    let content = body["data"]["content"].as_array().unwrap();
    assert_eq!(content.len(), 1);
    assert_eq!(content[0]["name"], "video.mp4");
    assert_eq!(content[0]["thumb"], "/d/media/video.jpg");
}

#[tokio::test]
async fn get_parks_raw_url_behind_redirect_key() {
    let proxy = TestProxy::new(vec![rule("k", EncType::Aesctr, false, &["/e/.*"])]).await;

    proxy
        .backend
        .mock_async(|when, then| {
            when.method(POST).path("/api/fs/get");
            then.status(200).json_body(json!({
                "code": 200,
                "data": {
                    "name": "a.bin",
                    "size": 4096,
                    "is_dir": false,
                    "raw_url": "https://cdn.example/abc?sig=xyz"
                }
            }));
        })
        .await;

    let response = proxy
        .router
        .clone()
        .oneshot(json_request("/api/fs/get", &json!({"path": "/e/a.bin"})))
        .await
        .unwrap();

    let body = json_body(response).await;
    let raw_url = body["data"]["raw_url"].as_str().unwrap();
    let key = raw_url.strip_prefix("/redirect/").unwrap();
    assert_eq!(key.len(), 32);

    let entry = proxy.state.redirects.get(key).unwrap();
    assert_eq!(entry.url, "https://cdn.example/abc?sig=xyz");
    assert_eq!(entry.total_size, 4096);
}

#[tokio::test]
async fn redirect_key_serves_decrypted_content() {
    let proxy = TestProxy::new(vec![rule("k", EncType::Chacha20, false, &["/e/.*"])]).await;

    let plaintext = pattern(4096);
    let ciphertext = keystream_xor(EncType::Chacha20, "k", 4096, 0, &plaintext);
    proxy
        .backend
        .mock_async(|when, then| {
            when.method(GET).path("/cdn/a.bin");
            then.status(200)
                .header("content-length", "4096")
                .body(&ciphertext);
        })
        .await;

    let upstream_url = format!("{}/cdn/a.bin", proxy.backend.base_url());
    let key = proxy
        .state
        .redirects
        .register(&upstream_url, 4096, "k", EncType::Chacha20);

    let response = proxy
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/redirect/{key}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, plaintext);
}

#[tokio::test]
async fn unknown_redirect_key_is_404() {
    let proxy = TestProxy::new(vec![]).await;

    let response = proxy
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/redirect/00000000000000000000000000000000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn put_encrypts_body_and_file_path() {
    let proxy = TestProxy::new(vec![rule("k", EncType::Aesctr, true, &["/up/.*"])]).await;

    let codec = NameCodec::cached("k", EncType::Aesctr);
    let real = codec.real_name("report.pdf", "");

    // Choose the plaintext so the backend receives printable ASCII: XOR is
    // an involution, so feeding keystream(target) uploads exactly `target`.
    let target_body = "B".repeat(2048);
    let client_body = keystream_xor(EncType::Aesctr, "k", 2048, 0, target_body.as_bytes());

    let expected_path = format!("/up/{real}");
    let mock = proxy
        .backend
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/api/fs/put")
                .header("file-path", expected_path.as_str())
                .header("content-length", "2048")
                .body(target_body.as_str());
            then.status(200).json_body(json!({"code": 200}));
        })
        .await;

    let response = proxy
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/fs/put")
                .header("file-path", "/up/report.pdf")
                .header("content-length", "2048")
                .body(Body::from(client_body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    mock.assert_async().await;
}

#[tokio::test]
async fn put_without_content_length_is_rejected() {
    let proxy = TestProxy::new(vec![rule("k", EncType::Aesctr, false, &["/up/.*"])]).await;

    let response = proxy
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/fs/put")
                .header("file-path", "/up/x.bin")
                .header("content-length", "0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn remove_forwards_display_and_stored_names() {
    let proxy = TestProxy::new(vec![rule("k", EncType::Aesctr, true, &["/s/.*"])]).await;
    let codec = NameCodec::cached("k", EncType::Aesctr);
    let real = codec.real_name("holiday.mp4", "");

    let expected = json!({
        "dir": "/s",
        "names": ["holiday.mp4", real]
    });
    let mock = proxy
        .backend
        .mock_async(move |when, then| {
            when.method(POST)
                .path("/api/fs/remove")
                .json_body(expected);
            then.status(200).json_body(json!({"code": 200}));
        })
        .await;

    let response = proxy
        .router
        .clone()
        .oneshot(json_request(
            "/api/fs/remove",
            &json!({"dir": "/s", "names": ["holiday.mp4"]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    mock.assert_async().await;
}

#[tokio::test]
async fn move_translates_names_and_strips_orig_prefix() {
    let proxy = TestProxy::new(vec![rule("k", EncType::Aesctr, true, &["/s/.*"])]).await;
    let codec = NameCodec::cached("k", EncType::Aesctr);
    let real = codec.real_name("holiday.mp4", "");

    let expected = json!({
        "src_dir": "/s",
        "dst_dir": "/s/archive",
        "names": [real, "kept-plain.mp4"]
    });
    let mock = proxy
        .backend
        .mock_async(move |when, then| {
            when.method(POST).path("/api/fs/move").json_body(expected);
            then.status(200).json_body(json!({"code": 200}));
        })
        .await;

    let response = proxy
        .router
        .clone()
        .oneshot(json_request(
            "/api/fs/move",
            &json!({
                "src_dir": "/s",
                "dst_dir": "/s/archive",
                "names": ["holiday.mp4", "orig_kept-plain.mp4"]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    mock.assert_async().await;
}

#[tokio::test]
async fn fallback_rewrites_backend_redirects_into_keys() {
    let proxy = TestProxy::new(vec![rule("k", EncType::Aesctr, false, &["/e/.*"])]).await;

    proxy
        .backend
        .mock_async(|when, then| {
            when.method(GET).path("/landing");
            then.status(302)
                .header("location", "https://cdn.example/e/a.bin?sig=1");
        })
        .await;

    let response = proxy
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/landing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    let key = location.strip_prefix("/redirect/").unwrap();
    let entry = proxy.state.redirects.get(key).unwrap();
    assert_eq!(entry.url, "https://cdn.example/e/a.bin?sig=1");
}
