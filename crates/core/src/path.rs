//! Slash-path helpers.
//!
//! Request paths and backend paths are always `/`-separated regardless of
//! platform, so these operate on plain strings, mirroring the backend's own
//! path semantics (extension starts at the last dot of the final element).

use percent_encoding::percent_decode_str;
use std::borrow::Cow;

/// Final path element. `base_name("/a/b.mp4")` is `"b.mp4"`.
pub fn base_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Everything before the final element. `dir_name("/a/b.mp4")` is `"/a"`;
/// the root stays `"/"` and a bare name yields `"."`.
pub fn dir_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => ".",
    }
}

/// Extension of the final element including the leading dot, or `""`.
pub fn ext(path: &str) -> &str {
    let name = base_name(path);
    match name.rfind('.') {
        Some(idx) => &name[idx..],
        None => "",
    }
}

/// Final element with its extension removed.
pub fn stem(path: &str) -> &str {
    let name = base_name(path);
    &name[..name.len() - ext(name).len()]
}

/// Join a directory and a name with exactly one separator.
pub fn join(dir: &str, name: &str) -> String {
    if dir == "/" || dir.is_empty() {
        format!("/{name}")
    } else {
        format!("{}/{name}", dir.trim_end_matches('/'))
    }
}

/// Percent-decode with path semantics; malformed escapes or invalid UTF-8
/// leave the input untouched.
pub fn percent_decode(s: &str) -> Cow<'_, str> {
    match percent_decode_str(s).decode_utf8() {
        Ok(decoded) => decoded,
        Err(_) => Cow::Borrowed(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_and_dir() {
        assert_eq!(base_name("/a/b/c.mp4"), "c.mp4");
        assert_eq!(base_name("c.mp4"), "c.mp4");
        assert_eq!(dir_name("/a/b/c.mp4"), "/a/b");
        assert_eq!(dir_name("/c.mp4"), "/");
        assert_eq!(dir_name("c.mp4"), ".");
    }

    #[test]
    fn extension_splitting() {
        assert_eq!(ext("/a/video.mp4"), ".mp4");
        assert_eq!(ext("/a/archive.tar.gz"), ".gz");
        assert_eq!(ext("/a/noext"), "");
        assert_eq!(ext("/a/.hidden"), ".hidden");
        assert_eq!(stem("/a/video.mp4"), "video");
        assert_eq!(stem("/a/noext"), "noext");
    }

    #[test]
    fn join_handles_root() {
        assert_eq!(join("/", "x"), "/x");
        assert_eq!(join("/a", "x"), "/a/x");
        assert_eq!(join("/a/", "x"), "/a/x");
    }

    #[test]
    fn decode_falls_back_on_bad_input() {
        assert_eq!(percent_decode("a%20b"), "a b");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%e6%98%a0%e7%94%bb"), "映画");
    }
}
