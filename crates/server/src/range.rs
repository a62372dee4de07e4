//! RFC 7233 byte-range parsing.
//!
//! Accepted forms: `bytes=start-end`, `bytes=start-`, `bytes=-suffix`.
//! Multi-range requests collapse to full content (no multipart responses);
//! both malformed and unsatisfiable ranges surface as errors the handler
//! maps to a 416 with `Content-Range: bytes */<size>`.

/// One satisfiable byte range, inclusive on both ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes the range covers.
    pub fn content_length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value: `bytes start-end/total`.
    pub fn content_range_header(&self, total: u64) -> String {
        format!("bytes {}-{}/{total}", self.start, self.end)
    }
}

/// Range parse failure, either syntactic or positional.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeError {
    Malformed,
    Unsatisfiable,
}

/// Parse a `Range` header against a known file size.
///
/// `Ok(None)` means full content: no header, an empty range list, or a
/// multi-range request.
pub fn parse_range(header: Option<&str>, file_size: u64) -> Result<Option<ByteRange>, RangeError> {
    let Some(header) = header else {
        return Ok(None);
    };
    if header.is_empty() {
        return Ok(None);
    }

    let Some(spec_list) = header.strip_prefix("bytes=") else {
        return Err(RangeError::Malformed);
    };

    let mut ranges = Vec::new();
    for spec in spec_list.split(',') {
        let spec = spec.trim();
        if spec.is_empty() {
            continue;
        }

        let Some((start_text, end_text)) = spec.split_once('-') else {
            return Err(RangeError::Malformed);
        };

        let start;
        let end;
        if start_text.is_empty() {
            // Suffix range: "-500" means the last 500 bytes.
            let suffix: u64 = end_text.parse().map_err(|_| RangeError::Malformed)?;
            if suffix == 0 {
                return Err(RangeError::Malformed);
            }
            start = file_size.saturating_sub(suffix);
            if start >= file_size {
                return Err(RangeError::Unsatisfiable);
            }
            end = file_size - 1;
        } else if end_text.is_empty() {
            // Open-ended range: "100-" means from 100 to EOF.
            start = start_text.parse().map_err(|_| RangeError::Malformed)?;
            if start >= file_size {
                return Err(RangeError::Unsatisfiable);
            }
            end = file_size - 1;
        } else {
            // Bounded range: "100-200".
            start = start_text.parse().map_err(|_| RangeError::Malformed)?;
            let requested_end: u64 = end_text.parse().map_err(|_| RangeError::Malformed)?;
            if requested_end < start {
                return Err(RangeError::Malformed);
            }
            if start >= file_size {
                return Err(RangeError::Unsatisfiable);
            }
            end = requested_end.min(file_size - 1);
        }

        ranges.push(ByteRange { start, end });
    }

    match ranges.len() {
        1 => Ok(Some(ranges[0])),
        // Empty list or multi-range: serve full content.
        _ => Ok(None),
    }
}
