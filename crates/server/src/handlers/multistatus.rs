//! PROPFIND multistatus scanning and textual rewriting.
//!
//! Several WebDAV clients depend on the exact whitespace and attribute
//! order of the upstream response, so the body is never re-serialized:
//! element contents are located byte-precisely and spliced in place, and
//! everything outside the rewritten contents is preserved verbatim.

use std::ops::Range;

/// One `<response>` block of a multistatus document, with the byte ranges
/// needed for in-place rewriting.
#[derive(Debug)]
pub struct ResponseBlock {
    /// Unescaped `<href>` content.
    pub href: String,
    /// Byte range of the raw href content.
    pub href_range: Range<usize>,
    /// Unescaped `<displayname>` content and its byte range, if present.
    pub display_name: Option<(String, Range<usize>)>,
    /// Parsed `<getcontentlength>`, if present.
    pub content_length: Option<u64>,
    /// Whether `<resourcetype>` marks the entry as a collection.
    pub is_collection: bool,
}

/// Locate content ranges of `<target>` elements (namespace prefixes are
/// ignored) between `from` and `to`. Self-closing elements are skipped.
fn find_elements(xml: &str, target: &str, from: usize, to: usize) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut i = from;

    while i < to {
        let Some(offset) = xml[i..to].find('<') else {
            break;
        };
        let start = i + offset;
        let rest = &xml[start..to];

        if rest.starts_with("<!--") {
            match xml[start..to].find("-->") {
                Some(end) => {
                    i = start + end + 3;
                    continue;
                }
                None => break,
            }
        }
        if rest.starts_with("</") || rest.starts_with("<?") || rest.starts_with("<!") {
            i = start + 2;
            continue;
        }

        let Some(gt_offset) = xml[start..to].find('>') else {
            break;
        };
        let gt = start + gt_offset;
        let tag_inner = xml[start + 1..gt].trim_end_matches('/');
        let name = tag_inner.split_whitespace().next().unwrap_or("");
        let local = name.rsplit(':').next().unwrap_or(name);
        let self_closing = xml[start + 1..gt].ends_with('/');

        if !self_closing && local.eq_ignore_ascii_case(target) && !name.is_empty() {
            let close_pattern = format!("</{name}");
            if let Some(close_offset) = xml[gt + 1..to].find(&close_pattern) {
                let content = gt + 1..gt + 1 + close_offset;
                i = content.end + close_pattern.len();
                out.push(content);
                continue;
            }
        }
        i = gt + 1;
    }

    out
}

/// Parse the `<response>` blocks of a multistatus body. Blocks without an
/// `<href>` are skipped.
pub fn parse_blocks(xml: &str) -> Vec<ResponseBlock> {
    find_elements(xml, "response", 0, xml.len())
        .into_iter()
        .filter_map(|block| {
            let href_range = find_elements(xml, "href", block.start, block.end)
                .into_iter()
                .next()?;
            let href = xml_unescape(xml[href_range.clone()].trim());

            let display_name = find_elements(xml, "displayname", block.start, block.end)
                .into_iter()
                .next()
                .map(|range| (xml_unescape(&xml[range.clone()]), range));

            let content_length = find_elements(xml, "getcontentlength", block.start, block.end)
                .into_iter()
                .next()
                .and_then(|range| xml[range].trim().parse::<u64>().ok());

            let is_collection = find_elements(xml, "resourcetype", block.start, block.end)
                .into_iter()
                .next()
                .map(|range| xml[range].contains("collection"))
                .unwrap_or(false);

            Some(ResponseBlock {
                href,
                href_range,
                display_name,
                content_length,
                is_collection,
            })
        })
        .collect()
}

/// Splice replacement contents into the document. Ranges must be
/// non-overlapping; they are applied in ascending order and all other
/// bytes pass through untouched.
pub fn splice(xml: &str, mut replacements: Vec<(Range<usize>, String)>) -> String {
    replacements.sort_by_key(|(range, _)| range.start);

    let mut out = String::with_capacity(xml.len());
    let mut cursor = 0;
    for (range, replacement) in replacements {
        debug_assert!(range.start >= cursor, "overlapping splice ranges");
        out.push_str(&xml[cursor..range.start]);
        out.push_str(&replacement);
        cursor = range.end;
    }
    out.push_str(&xml[cursor..]);
    out
}

/// Minimal XML text escaping for spliced content.
pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Undo [`xml_escape`]; unknown entities pass through literally.
pub fn xml_unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];
        let replaced = [
            ("&amp;", '&'),
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&quot;", '"'),
            ("&apos;", '\''),
        ]
        .iter()
        .find(|(entity, _)| rest.starts_with(entity));
        match replaced {
            Some((entity, c)) => {
                out.push(*c);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
