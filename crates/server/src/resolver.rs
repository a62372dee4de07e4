//! Path → policy resolution.
//!
//! First-match over the ordered rule list, then a scan of the path segments
//! for a nested folder password. A successful folder decode overrides the
//! rule's password and cipher for this request only; the stored rule is
//! never mutated.

use shroud_core::rule::{Policy, RuleSet};
use shroud_core::path;
use shroud_crypto::NameCodec;

/// Resolve the effective encryption policy for a request path, or `None`
/// when no enabled rule matches.
pub fn resolve(rules: &RuleSet, url_path: &str) -> Option<Policy> {
    let rule = rules.first_match(url_path)?;
    let mut policy = rule.policy();

    let codec = NameCodec::cached(&rule.password, rule.enc_type);
    for segment in url_path.split('/').filter(|s| !s.is_empty()) {
        let decoded = path::percent_decode(segment);
        if let Some((enc_type, password)) = codec.decode_folder_name(&decoded) {
            tracing::debug!(segment = %decoded, "folder password override");
            policy.enc_type = enc_type;
            policy.password = password;
            break;
        }
    }

    Some(policy)
}
