//! Test harness: an axum router wired to an httpmock backend.

use httpmock::MockServer;
use shroud_core::rule::{EncType, EncryptRule};
use shroud_core::AppConfig;
use shroud_server::{AppState, create_router};
use shroud_crypto::{ContentCipher, SeekableCipher};

/// A proxy under test with its mock backend.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestProxy {
    pub backend: MockServer,
    pub router: axum::Router,
    pub state: AppState,
}

#[allow(dead_code)]
impl TestProxy {
    /// Start a mock backend and build the proxy against it.
    pub async fn new(rules: Vec<EncryptRule>) -> Self {
        let backend = MockServer::start_async().await;
        let mut config = AppConfig::for_testing(&backend.base_url());
        config.rules = rules;

        let state = AppState::new(config).expect("failed to build state");
        let router = create_router(state.clone());

        Self {
            backend,
            router,
            state,
        }
    }
}

/// A rule with sensible test defaults.
#[allow(dead_code)]
pub fn rule(password: &str, enc_type: EncType, enc_name: bool, patterns: &[&str]) -> EncryptRule {
    EncryptRule {
        password: password.to_string(),
        enc_type,
        enc_name,
        enc_suffix: String::new(),
        enc_path: patterns.iter().map(|p| p.to_string()).collect(),
        enable: true,
        describe: String::new(),
    }
}

/// Apply the keystream for `(enc_type, password, total_size)` starting at
/// `position`. Encrypt == decrypt for every supported cipher.
#[allow(dead_code)]
pub fn keystream_xor(
    enc_type: EncType,
    password: &str,
    total_size: u64,
    position: u64,
    data: &[u8],
) -> Vec<u8> {
    let mut cipher = ContentCipher::new(enc_type, password, total_size);
    cipher.set_position(position).expect("seek");
    let mut out = data.to_vec();
    cipher.apply_keystream(&mut out);
    out
}

/// Deterministic pseudo-content for test files.
#[allow(dead_code)]
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Collect a response body into bytes.
#[allow(dead_code)]
pub async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body")
        .to_vec()
}
