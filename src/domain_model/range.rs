//! Single-range `Range` header handling.
//!
//! Only `bytes=<start>-<end>` and `bytes=<start>-` are understood. Suffix
//! ranges (`bytes=-500`) and multi-range requests are answered as
//! unsatisfiable rather than partially honoured.

use std::fmt;

/// Inclusive byte interval `[start, end]` over a resource of `size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub size: u64,
}

impl ByteRange {
    pub fn content_length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` header of a 206 response.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.size)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}/{}", self.start, self.end, self.size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    FullBody,
    Partial(ByteRange),
    Unsatisfiable,
}

/// Value for the `Content-Range` header of a 416 response.
pub fn unsatisfied_content_range(size: u64) -> String {
    format!("bytes */{size}")
}

pub fn parse_range(header: Option<&str>, size: u64) -> RangeOutcome {
    let Some(header) = header else {
        return RangeOutcome::FullBody;
    };
    match parse_bounds(header) {
        Some((start, end)) => {
            let end = end.unwrap_or_else(|| size.saturating_sub(1));
            if start >= size || end >= size || start > end {
                RangeOutcome::Unsatisfiable
            } else {
                RangeOutcome::Partial(ByteRange { start, end, size })
            }
        }
        None => RangeOutcome::Unsatisfiable,
    }
}

fn parse_bounds(header: &str) -> Option<(u64, Option<u64>)> {
    let spec = header.trim().strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start = parse_digits(start.trim())?;
    let end = end.trim();
    if end.is_empty() {
        return Some((start, None));
    }
    Some((start, Some(parse_digits(end)?)))
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
